// ABOUTME: Defines the Coerce hook applied to every settled payload before storage.
// ABOUTME: JsonCoercer is the default; FnCoercer adapts a plain closure.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::Payload;
use crate::config::TextFallback;

/// Turns a raw payload into the value stored in the result maps.
///
/// Coercion never fails: a payload that cannot be decoded falls back to a
/// representation of the raw payload, or to the error text when there is none.
#[async_trait]
pub trait Coerce: Send + Sync {
    async fn coerce(&self, raw: Payload) -> Value;
}

/// Default coercer backed by serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCoercer {
    fallback: TextFallback,
}

impl JsonCoercer {
    pub fn new(fallback: TextFallback) -> Self {
        Self { fallback }
    }

    fn coerce_text(&self, text: String) -> Value {
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "JsonCoercer: text is not JSON, using fallback");
                Value::String(self.fallback.apply(text))
            }
        }
    }

    fn coerce_bytes(&self, bytes: Vec<u8>) -> Value {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return value;
        }
        match String::from_utf8(bytes) {
            Ok(text) => Value::String(self.fallback.apply(text)),
            Err(err) => Value::Array(err.into_bytes().into_iter().map(Value::from).collect()),
        }
    }
}

#[async_trait]
impl Coerce for JsonCoercer {
    async fn coerce(&self, raw: Payload) -> Value {
        match raw {
            Payload::Decodable(decodable) => match decodable.decode().await {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, "JsonCoercer: decode failed, falling back to raw payload");
                    let message = err.to_string();
                    match err.raw.map(|raw| *raw) {
                        Some(Payload::Text(text)) => self.coerce_text(text),
                        Some(Payload::Bytes(bytes)) => self.coerce_bytes(bytes),
                        Some(Payload::Opaque(value)) => value,
                        Some(Payload::Decodable(_)) | None => Value::String(message),
                    }
                }
            },
            Payload::Text(text) => self.coerce_text(text),
            Payload::Bytes(bytes) => self.coerce_bytes(bytes),
            Payload::Opaque(value) => value,
        }
    }
}

/// Adapts a synchronous closure into a coercion hook.
pub struct FnCoercer<F> {
    f: F,
}

impl<F> FnCoercer<F>
where
    F: Fn(Payload) -> Value + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Coerce for FnCoercer<F>
where
    F: Fn(Payload) -> Value + Send + Sync,
{
    async fn coerce(&self, raw: Payload) -> Value {
        (self.f)(raw)
    }
}
