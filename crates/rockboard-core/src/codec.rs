//! Wire codec for annotation and reset signals.
//!
//! Signals travel as JSON objects tagged by `type`:
//!
//! ```json
//! { "type": "drawingSignal", "data": "{\"x\":150,\"y\":100,\"width\":300,\"height\":200,\"color\":\"#8ED6FF\",\"imoji\":\"🤚🏻\"}", "to": [] }
//! { "type": "reset", "to": [] }
//! ```
//!
//! `data` is a JSON document stored in a string field. Decoding also accepts
//! `data` as an inline object. An empty `to` addresses the whole session.
//! Only the structure is checked: glyph and color are passed through as sent.

use crate::event::{AnnotationEvent, ResetEvent, SignalEvent, is_laid_out};
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tag of a placed-marker signal.
pub const DRAWING_SIGNAL: &str = "drawingSignal";
/// Tag of a clear-everything signal.
pub const RESET_SIGNAL: &str = "reset";

/// Decode errors. Both are dropped by receivers without affecting the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Unknown signal type: {0}")]
    UnknownTag(String),
}

/// A signal as carried by the session's signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Signal discriminator.
    #[serde(rename = "type")]
    pub tag: String,
    /// Encoded payload (drawing signals only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Recipient connection ids; empty means every participant.
    #[serde(default)]
    pub to: Vec<String>,
}

impl WireMessage {
    /// Whether this message is addressed to the whole session.
    pub fn is_broadcast(&self) -> bool {
        self.to.is_empty()
    }

    /// Whether `connection_id` is among the recipients.
    pub fn is_addressed_to(&self, connection_id: &str) -> bool {
        self.is_broadcast() || self.to.iter().any(|id| id == connection_id)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from JSON. Anything that is not a tagged object is malformed.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(|e| DecodeError::MalformedPayload(e.to_string()))
    }
}

/// Flat record inside `data` of a drawing signal.
#[derive(Debug, Deserialize)]
struct DrawingPayload {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    color: String,
    imoji: String,
}

/// Encode a signal addressed to `recipients` (empty = whole session).
pub fn encode(event: &SignalEvent, recipients: &[String]) -> WireMessage {
    match event {
        SignalEvent::Annotation(annotation) => {
            let payload = serde_json::json!({
                "x": annotation.origin.x,
                "y": annotation.origin.y,
                "width": annotation.source.width,
                "height": annotation.source.height,
                "color": annotation.color,
                "imoji": annotation.glyph,
            });
            WireMessage {
                tag: DRAWING_SIGNAL.to_string(),
                data: Some(Value::String(payload.to_string())),
                to: recipients.to_vec(),
            }
        }
        SignalEvent::Reset(_) => WireMessage {
            tag: RESET_SIGNAL.to_string(),
            data: None,
            to: recipients.to_vec(),
        },
    }
}

/// Decode a wire message into a signal.
pub fn decode(message: &WireMessage) -> Result<SignalEvent, DecodeError> {
    match message.tag.as_str() {
        DRAWING_SIGNAL => decode_drawing(message.data.as_ref()).map(SignalEvent::Annotation),
        RESET_SIGNAL => Ok(SignalEvent::Reset(ResetEvent)),
        other => Err(DecodeError::UnknownTag(other.to_string())),
    }
}

/// Encode straight to a JSON string.
pub fn encode_json(event: &SignalEvent, recipients: &[String]) -> serde_json::Result<String> {
    encode(event, recipients).to_json()
}

/// Decode straight from a JSON string.
pub fn decode_json(json: &str) -> Result<SignalEvent, DecodeError> {
    decode(&WireMessage::from_json(json)?)
}

fn decode_drawing(data: Option<&Value>) -> Result<AnnotationEvent, DecodeError> {
    let malformed = |e: serde_json::Error| DecodeError::MalformedPayload(e.to_string());
    let payload: DrawingPayload = match data {
        Some(Value::String(inner)) => serde_json::from_str(inner).map_err(malformed)?,
        Some(inline) if inline.is_object() => {
            DrawingPayload::deserialize(inline).map_err(malformed)?
        }
        Some(_) => {
            return Err(DecodeError::MalformedPayload(
                "data is neither a string nor an object".to_string(),
            ));
        }
        None => {
            return Err(DecodeError::MalformedPayload("missing data".to_string()));
        }
    };

    let source = Size::new(payload.width, payload.height);
    if !is_laid_out(source) {
        return Err(DecodeError::MalformedPayload(format!(
            "source canvas must be positive, got {}x{}",
            payload.width, payload.height
        )));
    }
    Ok(AnnotationEvent {
        origin: Point::new(payload.x, payload.y),
        source,
        color: payload.color,
        glyph: payload.imoji,
    })
}
