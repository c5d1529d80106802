//! Decay thresholds and configuration-file loading.
//!
//! Every threshold is independent and optional. A threshold is active only
//! when it holds a positive integer; a file value of `0`, a negative number,
//! a fraction, a string or `null` all mean "off" rather than "always".
//!
//! # Examples
//!
//! Builder style:
//!
//! ```
//! use context_decay::config::DecayConfig;
//!
//! let config = DecayConfig::new()
//!     .with_summarize_tool_results_after(3)
//!     .with_strip_tool_results_after(5);
//! assert!(config.any_enabled());
//! assert!(!DecayConfig::default().any_enabled());
//! ```
//!
//! From an agent-defaults JSON file:
//!
//! ```json
//! {
//!   "contextDecay": {
//!     "stripThinkingAfterTurns": 2,
//!     "summarizeToolResultsAfterTurns": 3,
//!     "stripToolResultsAfterTurns": 5,
//!     "maxContextMessages": 200
//!   }
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;

/// Key under which decay settings may be nested in a larger config file.
pub const CONFIG_SECTION: &str = "contextDecay";

/// Turn-age and size thresholds driving
/// [`apply_context_decay`](crate::context::decay::apply_context_decay).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecayConfig {
    /// Strip `thinking` blocks from assistant messages at least this many turns old.
    #[serde(
        default,
        deserialize_with = "lenient_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub strip_thinking_after_turns: Option<NonZeroUsize>,
    /// Swap tool results at least this many turns old for their stored summary.
    #[serde(
        default,
        deserialize_with = "lenient_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub summarize_tool_results_after_turns: Option<NonZeroUsize>,
    /// Replace tool results at least this many turns old with a placeholder.
    #[serde(
        default,
        deserialize_with = "lenient_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub strip_tool_results_after_turns: Option<NonZeroUsize>,
    /// Keep at most this many messages (newest win).
    #[serde(
        default,
        deserialize_with = "lenient_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_context_messages: Option<NonZeroUsize>,
}

impl DecayConfig {
    /// All thresholds disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Passing `0` disables the threshold.
    pub fn with_strip_thinking_after(mut self, turns: usize) -> Self {
        self.strip_thinking_after_turns = NonZeroUsize::new(turns);
        self
    }

    /// Passing `0` disables the threshold.
    pub fn with_summarize_tool_results_after(mut self, turns: usize) -> Self {
        self.summarize_tool_results_after_turns = NonZeroUsize::new(turns);
        self
    }

    /// Passing `0` disables the threshold.
    pub fn with_strip_tool_results_after(mut self, turns: usize) -> Self {
        self.strip_tool_results_after_turns = NonZeroUsize::new(turns);
        self
    }

    /// Passing `0` disables the cap.
    pub fn with_max_context_messages(mut self, max: usize) -> Self {
        self.max_context_messages = NonZeroUsize::new(max);
        self
    }

    pub fn strip_thinking_after(&self) -> Option<usize> {
        self.strip_thinking_after_turns.map(NonZeroUsize::get)
    }

    pub fn summarize_after(&self) -> Option<usize> {
        self.summarize_tool_results_after_turns.map(NonZeroUsize::get)
    }

    pub fn strip_tool_results_after(&self) -> Option<usize> {
        self.strip_tool_results_after_turns.map(NonZeroUsize::get)
    }

    pub fn max_messages(&self) -> Option<usize> {
        self.max_context_messages.map(NonZeroUsize::get)
    }

    /// Whether at least one threshold is active.
    pub fn any_enabled(&self) -> bool {
        self.strip_thinking_after_turns.is_some()
            || self.summarize_tool_results_after_turns.is_some()
            || self.strip_tool_results_after_turns.is_some()
            || self.max_context_messages.is_some()
    }

    /// Summarization can never fire when its threshold is at or past the
    /// strip threshold: every message old enough to summarize is stripped.
    pub fn summarization_shadowed(&self) -> bool {
        matches!(
            (self.summarize_after(), self.strip_tool_results_after()),
            (Some(summarize), Some(strip)) if summarize >= strip
        )
    }

    /// Parse decay settings from JSON text.
    ///
    /// Accepts either the bare settings object or a document carrying them
    /// under [`CONFIG_SECTION`]. Unknown keys are ignored.
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format!("Failed to parse decay config: {e}"))?;
        let section = match value.get(CONFIG_SECTION) {
            Some(nested) => nested.clone(),
            None => value,
        };
        if !section.is_object() {
            return Err("Decay config must be a JSON object".to_string());
        }
        serde_json::from_value(section).map_err(|e| format!("Invalid decay config: {e}"))
    }

    /// Read and parse a JSON config file. See [`from_json_str`](Self::from_json_str).
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read decay config {}: {e}", path.display()))?;
        Self::from_json_str(&text)
    }
}

/// Accept any JSON value; only positive integers enable the threshold.
fn lenient_threshold<'de, D>(deserializer: D) -> Result<Option<NonZeroUsize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .and_then(NonZeroUsize::new))
}
