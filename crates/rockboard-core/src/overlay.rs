//! Receiving side of the annotation channel.
//!
//! Every inbound signal is decoded and applied in delivery order. Annotations
//! are rescaled from the sender's canvas to the local one and kept as
//! [`RenderedMarker`]s; a reset clears them all.

use crate::codec::{self, DecodeError, WireMessage};
use crate::config::OverlayConfig;
use crate::event::{AnnotationEvent, SignalEvent};
use crate::marker::{MarkerColor, MarkerKind};
use crate::surface::LocalCanvasSurface;
use kurbo::{Affine, Point, Rect, Size};
use std::collections::VecDeque;

/// On-screen edge length of a marker glyph, in local pixels.
pub const DEFAULT_GLYPH_SIZE: f64 = 40.0;

/// Map a point on a `source` canvas to the equivalent point on a `local` canvas.
///
/// Each axis is scaled on its own, so a point keeps its relative position on
/// the shared video frame even when the two canvases differ in aspect ratio.
pub fn rescale(origin: Point, source: Size, local: Size) -> Point {
    let transform =
        Affine::scale_non_uniform(local.width / source.width, local.height / source.height);
    transform * origin
}

/// A marker as shown on this client's canvas.
///
/// Derived from the event that created it; not a source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarker {
    /// Center of the glyph in local canvas pixels.
    pub position: Point,
    /// `None` for glyphs outside the known marker set.
    pub kind: Option<MarkerKind>,
    pub color: MarkerColor,
    event: AnnotationEvent,
}

impl RenderedMarker {
    fn from_event(event: AnnotationEvent, local: Size, fallback: MarkerColor) -> Self {
        let color = MarkerColor::parse_hex(&event.color).unwrap_or(fallback);
        Self {
            position: rescale(event.origin, event.source, local),
            kind: event.kind(),
            color,
            event,
        }
    }

    /// Glyph to draw.
    pub fn glyph(&self) -> &str {
        &self.event.glyph
    }

    /// Square footprint of the glyph, centered on the marker position.
    /// The size is constant regardless of canvas size.
    pub fn bounds(&self, glyph_size: f64) -> Rect {
        Rect::from_center_size(self.position, Size::new(glyph_size, glyph_size))
    }

    /// The event this marker was derived from.
    pub fn source_event(&self) -> &AnnotationEvent {
        &self.event
    }

    fn relayout(&mut self, local: Size) {
        self.position = rescale(self.event.origin, self.event.source, local);
    }
}

/// Outcome of handling one inbound signal.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayUpdate {
    /// A marker was added.
    Placed(RenderedMarker),
    /// An annotation arrived before the local canvas was laid out; it is
    /// rendered once the layout is known.
    Deferred,
    /// A reset removed this many markers.
    Cleared { removed: usize },
    /// The message could not be decoded and was ignored.
    Dropped(DecodeError),
}

/// Per-client marker list, kept in sync with the session by inbound signals.
#[derive(Debug, Clone)]
pub struct AnnotationOverlay {
    surface: LocalCanvasSurface,
    markers: VecDeque<RenderedMarker>,
    /// Annotations received while the canvas had no layout.
    pending: VecDeque<AnnotationEvent>,
    max_markers: Option<usize>,
    known_markers_only: bool,
    glyph_size: f64,
    fallback_color: MarkerColor,
}

impl AnnotationOverlay {
    /// Create an unbounded overlay on `surface`.
    pub fn new(surface: LocalCanvasSurface) -> Self {
        Self {
            surface,
            markers: VecDeque::new(),
            pending: VecDeque::new(),
            max_markers: None,
            known_markers_only: false,
            glyph_size: DEFAULT_GLYPH_SIZE,
            fallback_color: MarkerColor::default(),
        }
    }

    /// Create an overlay using the configured capacity, glyph size and color.
    pub fn from_config(surface: LocalCanvasSurface, config: &OverlayConfig) -> Self {
        Self {
            glyph_size: config.glyph_size,
            fallback_color: config.color(),
            known_markers_only: config.known_markers_only,
            ..Self::new(surface)
        }
        .with_capacity(config.max_markers)
    }

    /// Keep at most `max_markers` markers, dropping the oldest first.
    /// The same limit applies to annotations waiting for a layout.
    pub fn with_capacity(mut self, max_markers: Option<usize>) -> Self {
        self.max_markers = max_markers.filter(|&max| max > 0);
        self.enforce_capacity();
        self
    }

    /// Drop annotations whose glyph is not a known [`MarkerKind`].
    pub fn with_known_markers_only(mut self, known_only: bool) -> Self {
        self.known_markers_only = known_only;
        self
    }

    /// The local canvas.
    pub fn surface(&self) -> &LocalCanvasSurface {
        &self.surface
    }

    /// Glyph edge length in local pixels.
    pub fn glyph_size(&self) -> f64 {
        self.glyph_size
    }

    /// Handle one message delivered by the signaling channel.
    pub fn on_message(&mut self, message: &WireMessage) -> OverlayUpdate {
        match codec::decode(message) {
            Ok(event) => self.apply(event),
            Err(err) => {
                log::warn!("Dropping {} signal: {}", message.tag, err);
                OverlayUpdate::Dropped(err)
            }
        }
    }

    /// Apply a decoded signal.
    pub fn apply(&mut self, event: SignalEvent) -> OverlayUpdate {
        match event {
            SignalEvent::Reset(_) => {
                let removed = self.clear();
                log::debug!("Reset cleared {} markers", removed);
                OverlayUpdate::Cleared { removed }
            }
            SignalEvent::Annotation(annotation) => {
                if !annotation.is_valid() {
                    log::warn!("Dropping annotation with invalid geometry");
                    return OverlayUpdate::Dropped(DecodeError::MalformedPayload(
                        "source canvas must be positive".to_string(),
                    ));
                }
                if self.known_markers_only && annotation.kind().is_none() {
                    log::warn!("Dropping annotation with unknown glyph {}", annotation.glyph);
                    return OverlayUpdate::Dropped(DecodeError::MalformedPayload(format!(
                        "unknown marker glyph: {}",
                        annotation.glyph
                    )));
                }
                match self.surface.size() {
                    Ok(local) => OverlayUpdate::Placed(self.push(annotation, local)),
                    Err(_) => {
                        self.pending.push_back(annotation);
                        self.enforce_capacity();
                        OverlayUpdate::Deferred
                    }
                }
            }
        }
    }

    /// The local canvas was laid out or changed size.
    ///
    /// Existing markers are re-derived for the new size and annotations that
    /// were waiting for a layout are rendered. Returns how many waiting
    /// annotations were rendered.
    pub fn resize(&mut self, width: f64, height: f64) -> usize {
        if !self.surface.measure(width, height) {
            return 0;
        }
        let Ok(local) = self.surface.size() else {
            return 0;
        };
        for marker in self.markers.iter_mut() {
            marker.relayout(local);
        }
        let pending = std::mem::take(&mut self.pending);
        let flushed = pending.len();
        for annotation in pending {
            self.push(annotation, local);
        }
        flushed
    }

    /// Rendered markers, oldest first.
    pub fn markers(&self) -> impl ExactSizeIterator<Item = &RenderedMarker> {
        self.markers.iter()
    }

    /// Number of rendered markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Check if nothing is rendered.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Number of annotations waiting for a canvas layout.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove every marker, rendered or waiting. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.markers.len() + self.pending.len();
        self.markers.clear();
        self.pending.clear();
        removed
    }

    fn push(&mut self, annotation: AnnotationEvent, local: Size) -> RenderedMarker {
        let marker = RenderedMarker::from_event(annotation, local, self.fallback_color);
        self.markers.push_back(marker.clone());
        self.enforce_capacity();
        marker
    }

    fn enforce_capacity(&mut self) {
        if let Some(max) = self.max_markers {
            while self.markers.len() > max {
                self.markers.pop_front();
                log::debug!("Marker limit {} reached, dropped oldest", max);
            }
            while self.pending.len() > max {
                self.pending.pop_front();
                log::debug!("Pending limit {} reached, dropped oldest", max);
            }
        }
    }
}
