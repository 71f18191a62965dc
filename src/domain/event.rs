//! Relay event - an upstream record decoded once and shared by every delivery.

use serde_json::Value;
use thiserror::Error;

/// Reasons an upstream message is dropped instead of relayed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Event must be a JSON object")]
    NotAnObject,

    #[error("Event has no string `kind` (or `event`) discriminator")]
    MissingKind,
}

/// An event received from the broker channel.
///
/// The relay never interprets the record beyond its discriminator. The
/// original text is kept so clients receive exactly what the publisher sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    kind: String,
    payload: Value,
    frame: String,
}

impl RelayEvent {
    /// Decode a broker message.
    ///
    /// The discriminator is read from `kind`, falling back to `event` which is
    /// what the ticket service publishes. `payload` is the record's `payload`
    /// field when present and the whole record otherwise.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let record: Value = serde_json::from_str(text)?;
        let fields = record.as_object().ok_or(DecodeError::NotAnObject)?;

        let kind = fields
            .get("kind")
            .or_else(|| fields.get("event"))
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingKind)?
            .to_string();

        let payload = match fields.get("payload") {
            Some(payload) => payload.clone(),
            None => record.clone(),
        };

        Ok(Self {
            kind,
            payload,
            frame: text.to_string(),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Wire text sent to clients, byte-for-byte as received.
    pub fn frame(&self) -> &str {
        &self.frame
    }
}
