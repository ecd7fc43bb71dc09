//! The feedback overlay a participant opens over the live video.
//!
//! Ties the marker selector, the local canvas, the broadcaster and the
//! receiving overlay to one session's signaling channel. The channel is
//! borrowed, never created or closed here.

use crate::broadcaster::{AnnotationBroadcaster, BroadcastError};
use crate::channel::SignalingChannel;
use crate::config::OverlayConfig;
use crate::event::AnnotationEvent;
use crate::marker::{MarkerKind, MarkerSelector};
use crate::overlay::{AnnotationOverlay, OverlayUpdate, RenderedMarker};
use crate::surface::LocalCanvasSurface;
use kurbo::Point;

/// An open feedback overlay.
///
/// Placing a marker only sends it; the marker appears once the channel
/// delivers it back through [`FeedbackOverlay::pump`], like everyone else's.
/// Calling [`FeedbackOverlay::close`], or dropping the overlay on any path,
/// releases all markers and stops consuming the channel.
pub struct FeedbackOverlay<'a, C: SignalingChannel + ?Sized> {
    channel: &'a mut C,
    selector: MarkerSelector,
    broadcaster: AnnotationBroadcaster,
    overlay: AnnotationOverlay,
    open: bool,
}

impl<'a, C: SignalingChannel + ?Sized> FeedbackOverlay<'a, C> {
    /// Open the overlay on `channel`. The canvas starts unmeasured.
    pub fn open(channel: &'a mut C, config: &OverlayConfig) -> Self {
        log::info!("Feedback overlay opened");
        Self {
            channel,
            selector: MarkerSelector::new(config.default_marker),
            broadcaster: AnnotationBroadcaster::new(config.color())
                .with_recipients(config.recipients.clone()),
            overlay: AnnotationOverlay::from_config(LocalCanvasSurface::unmeasured(), config),
            open: true,
        }
    }

    /// Record the canvas layout (first measurement or a resize).
    /// Returns how many annotations that waited for the layout were rendered.
    pub fn measure(&mut self, width: f64, height: f64) -> usize {
        self.overlay.resize(width, height)
    }

    /// Arm a marker kind for the next placement.
    pub fn arm(&mut self, kind: MarkerKind) {
        self.selector.arm(kind);
    }

    /// Currently armed kind.
    pub fn armed(&self) -> MarkerKind {
        self.selector.current()
    }

    /// Place the armed marker at a local canvas position.
    pub fn place_marker(&mut self, x: f64, y: f64) -> Result<AnnotationEvent, BroadcastError> {
        self.broadcaster.place_marker(
            &mut *self.channel,
            self.overlay.surface(),
            &self.selector,
            Point::new(x, y),
        )
    }

    /// Ask every participant to clear their markers.
    pub fn reset_all(&mut self) -> Result<(), BroadcastError> {
        self.broadcaster.reset_all(&mut *self.channel)
    }

    /// Apply everything the channel delivered since the last pump, in order.
    pub fn pump(&mut self) -> Vec<OverlayUpdate> {
        if !self.open {
            return Vec::new();
        }
        self.channel
            .poll_signals()
            .into_iter()
            .map(|inbound| {
                log::trace!(
                    "Signal {} from {}",
                    inbound.message.tag,
                    inbound.from.as_deref().unwrap_or("unknown")
                );
                self.overlay.on_message(&inbound.message)
            })
            .collect()
    }

    /// Markers currently shown, oldest first.
    pub fn markers(&self) -> impl ExactSizeIterator<Item = &RenderedMarker> {
        self.overlay.markers()
    }

    /// The underlying channel, for adapter-specific events.
    pub fn channel(&mut self) -> &mut C {
        self.channel
    }

    /// The receiving overlay.
    pub fn overlay(&self) -> &AnnotationOverlay {
        &self.overlay
    }

    /// Check if the overlay is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the overlay: release all markers and stop consuming the channel.
    /// Later pumps deliver nothing. Idempotent.
    pub fn close(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.open {
            let removed = self.overlay.clear();
            self.open = false;
            log::info!("Feedback overlay closed, released {} markers", removed);
        }
    }
}

impl<C: SignalingChannel + ?Sized> Drop for FeedbackOverlay<'_, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{InboundSignal, LoopbackChannel, LoopbackHub};
    use crate::codec::WireMessage;

    #[test]
    fn test_two_participants_see_the_same_spot() {
        let hub = LoopbackHub::new();
        let mut sender_channel = hub.connect();
        let mut viewer_channel = hub.connect();
        let config = OverlayConfig::default();

        let mut sender = FeedbackOverlay::open(&mut sender_channel, &config);
        let mut viewer = FeedbackOverlay::open(&mut viewer_channel, &config);
        sender.measure(300.0, 200.0);
        viewer.measure(600.0, 100.0);

        sender.arm(MarkerKind::Hand);
        sender.place_marker(150.0, 100.0).unwrap();
        // Nothing is drawn until the broadcast comes back.
        assert_eq!(sender.markers().len(), 0);

        sender.pump();
        viewer.pump();

        assert_eq!(sender.markers().next().unwrap().position, Point::new(150.0, 100.0));
        let seen = viewer.markers().next().unwrap();
        assert_eq!(seen.position, Point::new(300.0, 50.0));
        assert_eq!(seen.kind, Some(MarkerKind::Hand));
    }

    #[test]
    fn test_reset_clears_everyone_including_initiator() {
        let hub = LoopbackHub::new();
        let mut a_channel = hub.connect();
        let mut b_channel = hub.connect();
        let config = OverlayConfig::default();

        let mut a = FeedbackOverlay::open(&mut a_channel, &config);
        let mut b = FeedbackOverlay::open(&mut b_channel, &config);
        a.measure(100.0, 100.0);
        b.measure(100.0, 100.0);

        a.place_marker(10.0, 10.0).unwrap();
        a.arm(MarkerKind::Foot);
        a.place_marker(20.0, 20.0).unwrap();
        b.reset_all().unwrap();
        a.arm(MarkerKind::Pin);
        a.place_marker(30.0, 30.0).unwrap();

        a.pump();
        b.pump();

        for overlay in [&a, &b] {
            let kinds: Vec<_> = overlay.markers().map(|m| m.kind).collect();
            assert_eq!(kinds, vec![Some(MarkerKind::Pin)]);
        }
    }

    #[test]
    fn test_place_before_measure_is_refused() {
        let hub = LoopbackHub::new();
        let mut channel = hub.connect();
        let mut overlay = FeedbackOverlay::open(&mut channel, &OverlayConfig::default());
        assert_eq!(
            overlay.place_marker(1.0, 1.0),
            Err(BroadcastError::ZeroDimensionCanvas)
        );
        assert!(overlay.pump().is_empty());
    }

    #[test]
    fn test_default_marker_from_config() {
        let hub = LoopbackHub::new();
        let mut channel = hub.connect();
        let config = OverlayConfig {
            default_marker: MarkerKind::Miss,
            ..Default::default()
        };
        let overlay = FeedbackOverlay::open(&mut channel, &config);
        assert_eq!(overlay.armed(), MarkerKind::Miss);
    }

    #[test]
    fn test_close_releases_channel_and_markers() {
        let hub = LoopbackHub::new();
        let mut channel = hub.connect();
        let mut peer = hub.connect();
        {
            let mut overlay = FeedbackOverlay::open(&mut channel, &OverlayConfig::default());
            overlay.measure(100.0, 100.0);
            overlay.place_marker(1.0, 1.0).unwrap();
            overlay.pump();
            assert_eq!(overlay.markers().len(), 1);

            overlay.close();
            assert!(!overlay.is_open());
            assert_eq!(overlay.markers().len(), 0);

            // Closed overlays stop consuming the channel.
            AnnotationBroadcaster::default().reset_all(&mut peer).unwrap();
            assert!(overlay.pump().is_empty());
            overlay.close();
        }
        // The channel is usable again and still connected.
        assert!(channel.is_connected());
        assert_eq!(channel.poll_signals().len(), 1);
    }

    /// Shows a marker, then bails out with `?` before any explicit close.
    fn show_then_fail(channel: &mut LoopbackChannel) -> Result<usize, BroadcastError> {
        let mut overlay = FeedbackOverlay::open(channel, &OverlayConfig::default());
        overlay.measure(100.0, 100.0);
        overlay.place_marker(10.0, 10.0)?;
        overlay.pump();
        assert_eq!(overlay.markers().len(), 1);

        overlay.measure(0.0, 0.0);
        overlay.place_marker(20.0, 20.0)?;
        Ok(overlay.markers().len())
    }

    #[test]
    fn test_drop_on_error_path_tears_down() {
        let hub = LoopbackHub::new();
        let mut channel = hub.connect();
        let mut peer = hub.connect();

        assert_eq!(
            show_then_fail(&mut channel),
            Err(BroadcastError::ZeroDimensionCanvas)
        );

        // The borrow ended with the overlay; nothing it rendered survives.
        assert!(channel.is_connected());
        peer.poll_signals();
        let mut reopened = FeedbackOverlay::open(&mut channel, &OverlayConfig::default());
        reopened.measure(100.0, 100.0);
        assert!(reopened.pump().is_empty());
        assert_eq!(reopened.markers().len(), 0);

        reopened.place_marker(30.0, 30.0).unwrap();
        reopened.pump();
        assert_eq!(reopened.markers().len(), 1);
    }

    #[test]
    fn test_drop_without_close_releases_markers() {
        let hub = LoopbackHub::new();
        let mut channel = hub.connect();
        let mut overlay = FeedbackOverlay::open(&mut channel, &OverlayConfig::default());
        overlay.measure(100.0, 100.0);
        overlay.place_marker(1.0, 1.0).unwrap();
        overlay.pump();
        assert!(overlay.is_open());
        drop(overlay);

        assert!(channel.is_connected());
        assert!(channel.poll_signals().is_empty());
        assert_eq!(hub.participant_count(), 1);
    }

    /// Fails every send and delivers a fixed script of signals.
    struct ScriptedChannel {
        script: Vec<InboundSignal>,
    }

    impl SignalingChannel for ScriptedChannel {
        fn signal(&mut self, _message: &WireMessage) -> Result<(), crate::channel::ChannelError> {
            Err(crate::channel::ChannelError::SendFailed("link down".to_string()))
        }

        fn poll_signals(&mut self) -> Vec<InboundSignal> {
            std::mem::take(&mut self.script)
        }
    }

    #[test]
    fn test_bad_signals_do_not_break_the_overlay() {
        let inbound = |json: &str| InboundSignal {
            from: None,
            message: WireMessage::from_json(json).unwrap(),
        };
        let mut channel = ScriptedChannel {
            script: vec![
                inbound(r#"{"type":"unknown"}"#),
                inbound(r#"{"type":"drawingSignal","data":"{\"x\":1}"}"#),
                inbound(
                    r#"{"type":"drawingSignal","data":"{\"x\":5,\"y\":5,\"width\":10,\"height\":10,\"imoji\":\"📌\"}"}"#,
                ),
            ],
        };
        let mut overlay = FeedbackOverlay::open(&mut channel, &OverlayConfig::default());
        overlay.measure(20.0, 20.0);

        let updates = overlay.pump();
        assert!(matches!(updates[0], OverlayUpdate::Dropped(_)));
        assert!(matches!(updates[1], OverlayUpdate::Dropped(_)));
        assert!(matches!(updates[2], OverlayUpdate::Placed(_)));
        assert_eq!(overlay.markers().next().unwrap().position, Point::new(10.0, 10.0));

        assert!(matches!(
            overlay.place_marker(1.0, 1.0),
            Err(BroadcastError::ChannelSendFailure(_))
        ));
    }
}
