//! Annotation events exchanged between participants.

use crate::marker::MarkerKind;
use kurbo::{Point, Size};

/// One placed marker, in the sender's canvas space at the moment of placement.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEvent {
    /// Pointer position on the sender's canvas.
    pub origin: Point,
    /// Sender's canvas dimensions when the marker was placed.
    pub source: Size,
    /// Highlight color, passed through as sent.
    pub color: String,
    /// Marker glyph, passed through as sent.
    pub glyph: String,
}

impl AnnotationEvent {
    pub fn new(origin: Point, source: Size, color: impl Into<String>, kind: MarkerKind) -> Self {
        Self::with_glyph(origin, source, color, kind.glyph())
    }

    /// Event carrying an arbitrary glyph, known or not.
    pub fn with_glyph(
        origin: Point,
        source: Size,
        color: impl Into<String>,
        glyph: impl Into<String>,
    ) -> Self {
        Self {
            origin,
            source,
            color: color.into(),
            glyph: glyph.into(),
        }
    }

    /// The marker kind, when the glyph is one of ours.
    pub fn kind(&self) -> Option<MarkerKind> {
        MarkerKind::from_glyph(&self.glyph)
    }

    /// An event is only meaningful when the source canvas had a real layout.
    pub fn is_valid(&self) -> bool {
        is_laid_out(self.source) && self.origin.is_finite()
    }
}

/// Clear every displayed marker for every participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetEvent;

/// Everything that travels on the annotation channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    Annotation(AnnotationEvent),
    Reset(ResetEvent),
}

impl From<AnnotationEvent> for SignalEvent {
    fn from(event: AnnotationEvent) -> Self {
        SignalEvent::Annotation(event)
    }
}

impl From<ResetEvent> for SignalEvent {
    fn from(event: ResetEvent) -> Self {
        SignalEvent::Reset(event)
    }
}

/// Both dimensions positive and finite.
pub(crate) fn is_laid_out(size: Size) -> bool {
    size.width.is_finite() && size.height.is_finite() && size.width > 0.0 && size.height > 0.0
}
