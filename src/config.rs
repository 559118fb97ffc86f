// ABOUTME: Bundle configuration - initial gating flags, policy and coercion fallback.
// ABOUTME: Serde-friendly so a coordinator can be set up from a JSON document.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::Strictness;
use crate::error::ConfigError;

/// What the default coercer does with text that is not valid JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFallback {
    /// Keep the original text unchanged.
    #[default]
    Verbatim,
    /// Percent-encode the original text.
    UriEncoded,
}

impl TextFallback {
    /// Apply the fallback to text that failed structured parsing.
    pub fn apply(self, text: String) -> String {
        match self {
            TextFallback::Verbatim => text,
            TextFallback::UriEncoded => urlencoding::encode(&text).into_owned(),
        }
    }
}

/// Initial state of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Whether handles may start awaiting their sources right away.
    #[serde(default)]
    pub fetch_enabled: bool,

    /// Whether the continuation may be invoked.
    #[serde(default)]
    pub armed: bool,

    /// Completion policy.
    #[serde(default)]
    pub strictness: Strictness,

    /// Pass the aggregated results to the continuation.
    #[serde(default = "default_send_data")]
    pub send_data: bool,

    /// Fallback for unparsable text in the default coercer.
    #[serde(default)]
    pub text_fallback: TextFallback,
}

fn default_send_data() -> bool {
    true
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            fetch_enabled: false,
            armed: false,
            strictness: Strictness::default(),
            send_data: default_send_data(),
            text_fallback: TextFallback::default(),
        }
    }
}

impl BundleConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        debug!(?config, "BundleConfig::from_json: parsed");
        Ok(config)
    }
}
