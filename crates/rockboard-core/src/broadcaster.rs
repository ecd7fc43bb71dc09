//! Publishes local marker placements and resets to the session.

use crate::channel::{ChannelError, SignalingChannel};
use crate::codec;
use crate::event::{AnnotationEvent, ResetEvent, SignalEvent};
use crate::marker::{MarkerColor, MarkerSelector};
use crate::surface::{LocalCanvasSurface, SurfaceError};
use kurbo::Point;
use thiserror::Error;

/// Placement errors. Reported to the local user only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BroadcastError {
    #[error("Canvas has not been laid out yet")]
    ZeroDimensionCanvas,
    #[error("Pointer position is not a finite point: {0:?}")]
    InvalidPosition(Point),
    #[error("Channel send failure: {0}")]
    ChannelSendFailure(#[from] ChannelError),
}

impl From<SurfaceError> for BroadcastError {
    fn from(err: SurfaceError) -> Self {
        match err {
            SurfaceError::ZeroDimensionCanvas => BroadcastError::ZeroDimensionCanvas,
        }
    }
}

/// Builds annotation events from local pointer input and sends them out.
///
/// Nothing is drawn locally: the sender sees its marker when its own
/// broadcast comes back through the channel.
#[derive(Debug, Clone)]
pub struct AnnotationBroadcaster {
    color: MarkerColor,
    recipients: Vec<String>,
}

impl AnnotationBroadcaster {
    /// Broadcaster addressing the whole session.
    pub fn new(color: MarkerColor) -> Self {
        Self {
            color,
            recipients: Vec::new(),
        }
    }

    /// Address a subset of participants instead of the whole session.
    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Highlight color stamped on placed markers.
    pub fn color(&self) -> MarkerColor {
        self.color
    }

    /// Change the highlight color for future placements.
    pub fn set_color(&mut self, color: MarkerColor) {
        self.color = color;
    }

    /// Place the armed marker at `local` on the local canvas.
    ///
    /// Refuses before the canvas is laid out. A failed send is returned and
    /// not retried.
    pub fn place_marker<C: SignalingChannel + ?Sized>(
        &self,
        channel: &mut C,
        surface: &LocalCanvasSurface,
        selector: &MarkerSelector,
        local: Point,
    ) -> Result<AnnotationEvent, BroadcastError> {
        let source = surface.size()?;
        let event = AnnotationEvent::new(local, source, self.color.to_hex(), selector.current());
        if !event.is_valid() {
            return Err(BroadcastError::InvalidPosition(local));
        }

        let message = codec::encode(&SignalEvent::Annotation(event.clone()), &self.recipients);
        channel.signal(&message)?;
        log::debug!(
            "Placed {} at ({:.1}, {:.1}) on {}x{} canvas",
            event.glyph,
            local.x,
            local.y,
            source.width,
            source.height
        );
        Ok(event)
    }

    /// Ask every participant, this one included, to clear its markers.
    pub fn reset_all<C: SignalingChannel + ?Sized>(
        &self,
        channel: &mut C,
    ) -> Result<(), BroadcastError> {
        let message = codec::encode(&SignalEvent::Reset(ResetEvent), &self.recipients);
        channel.signal(&message)?;
        log::debug!("Reset broadcast");
        Ok(())
    }
}

impl Default for AnnotationBroadcaster {
    fn default() -> Self {
        Self::new(MarkerColor::default())
    }
}
