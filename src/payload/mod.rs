// ABOUTME: Payload module - the raw outcome shapes an operation can settle with.
// ABOUTME: Also hosts the coercion hook that turns payloads into stored values.

mod coerce;

pub use coerce::{Coerce, FnCoercer, JsonCoercer};

use async_trait::async_trait;
use serde_json::Value;

/// Raw outcome of an operation, before coercion.
///
/// The provider picks the variant, so the coercion hook never has to guess
/// at a payload's shape.
pub enum Payload {
    /// Raw bytes, typically a response body.
    Bytes(Vec<u8>),
    /// Text that may hold an encoded document.
    Text(String),
    /// A value that knows how to decode itself (a response-like object).
    Decodable(Box<dyn Decodable>),
    /// An already structured value, stored as-is.
    Opaque(Value),
}

impl Payload {
    /// Build a text payload from anything displayable, usually an error.
    pub fn error(err: impl std::fmt::Display) -> Self {
        Payload::Text(err.to_string())
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Decodable(_) => f.write_str("Decodable(..)"),
            Payload::Opaque(value) => f.debug_tuple("Opaque").field(value).finish(),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Opaque(value)
    }
}

impl From<reqwest::Response> for Payload {
    fn from(response: reqwest::Response) -> Self {
        Payload::Decodable(Box::new(response))
    }
}

impl From<reqwest::Error> for Payload {
    fn from(err: reqwest::Error) -> Self {
        Payload::error(err)
    }
}

/// Failed structured decode.
///
/// Carries the raw form the payload could still produce, if any, so the
/// coercer can fall back to it.
#[derive(Debug, thiserror::Error)]
#[error("structured decode failed: {source}")]
pub struct DecodeError {
    #[source]
    pub source: anyhow::Error,
    pub raw: Option<Box<Payload>>,
}

impl DecodeError {
    /// Create a decode error with nothing to fall back to.
    pub fn new(source: impl Into<anyhow::Error>) -> Self {
        Self {
            source: source.into(),
            raw: None,
        }
    }

    /// Attach the raw payload to fall back to.
    pub fn with_raw(mut self, raw: Payload) -> Self {
        self.raw = Some(Box::new(raw));
        self
    }
}

/// A payload that performs its own structured decode.
#[async_trait]
pub trait Decodable: Send {
    /// Consume the payload and decode it into a structured value.
    async fn decode(self: Box<Self>) -> Result<Value, DecodeError>;
}

#[async_trait]
impl Decodable for reqwest::Response {
    async fn decode(self: Box<Self>) -> Result<Value, DecodeError> {
        let body = (*self).bytes().await.map_err(DecodeError::new)?;
        serde_json::from_slice(&body)
            .map_err(|e| DecodeError::new(e).with_raw(Payload::Bytes(body.to_vec())))
    }
}
