//! Rockboard Core Library
//!
//! Shared feedback markers for live climbing sessions: the annotation model,
//! its wire codec, and the per-client overlay that keeps every participant's
//! markers anchored to the same spot on the video.

pub mod broadcaster;
pub mod channel;
pub mod codec;
pub mod config;
pub mod event;
pub mod marker;
pub mod overlay;
pub mod relay;
pub mod session;
pub mod surface;

pub use broadcaster::{AnnotationBroadcaster, BroadcastError};
pub use channel::{ChannelError, InboundSignal, LoopbackChannel, LoopbackHub, SignalingChannel};
pub use codec::{DecodeError, WireMessage, decode, encode};
pub use config::{ConfigError, OverlayConfig};
pub use event::{AnnotationEvent, ResetEvent, SignalEvent};
pub use marker::{MarkerColor, MarkerKind, MarkerSelector};
pub use overlay::{AnnotationOverlay, OverlayUpdate, RenderedMarker, rescale};
pub use relay::{ClientMessage, ConnectionState, RelayEvent, ServerMessage};
pub use session::FeedbackOverlay;
pub use surface::{LocalCanvasSurface, SurfaceError};

#[cfg(not(target_arch = "wasm32"))]
pub use relay::RelayChannel;
