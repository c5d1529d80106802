//! Graduated context decay for long-running LLM agent sessions.
//!
//! An agent conversation grows without bound, but the model's context window
//! does not. Most of what accumulates in older turns — extended thinking,
//! 30KB `read_file` dumps, `grep` output — has already been consumed by the
//! model and is no longer needed at full fidelity. `context-decay` degrades
//! that older content progressively while keeping the transcript structurally
//! valid for the provider (every tool result still follows its tool call).
//!
//! # Getting started
//!
//! ```ignore
//! use context_decay::prelude::*;
//!
//! # async fn run(messages: Vec<Message>) -> std::io::Result<()> {
//! let session = std::path::Path::new(".agents/sessions/tr-abc/session.jsonl");
//! let store = load_summary_store(session).await;
//!
//! let config = DecayConfig::new()
//!     .with_strip_thinking_after(2)
//!     .with_summarize_tool_results_after(3)
//!     .with_strip_tool_results_after(5)
//!     .with_max_context_messages(200);
//!
//! let outcome = apply_context_decay(&messages, &config, &store);
//! if outcome.is_changed() {
//!     tracing::info!("{}", outcome.report.to_log_string());
//! }
//! let to_send = outcome.into_messages();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Turn ages, the decay pipeline, the summary store, tool pairing repair |
//! | [`config`] | [`DecayConfig`](config::DecayConfig) thresholds and file loading |
//!
//! # Pipeline
//!
//! [`apply_context_decay`](context::decay::apply_context_decay) runs four
//! steps in a fixed order, each driven by an optional threshold:
//!
//! 1. Strip `thinking` blocks from old assistant messages.
//! 2. Swap old tool results for pre-computed summaries from the
//!    [`SummaryStore`](context::SummaryStore).
//! 3. Replace even older tool results with a removal placeholder.
//! 4. Hard-cap the message count, then repair any tool pairing the cut broke.

pub mod config;
pub mod context;
pub mod prelude;

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageRole {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "toolResult")]
    ToolResult,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::ToolResult => write!(f, "toolResult"),
        }
    }
}

/// Fields of a block beyond the ones this crate reads.
pub type BlockFields = serde_json::Map<String, serde_json::Value>;

/// A single block of structured message content, tagged by `type`.
///
/// Blocks are classified by tag alone: any `thinking`-tagged block is a
/// [`ContentBlock::Thinking`] whatever its other fields (redacted blocks
/// carry `data` instead of `thinking`). Fields a variant doesn't name are
/// kept in `extra`, and blocks with a tag this crate doesn't interpret
/// (images, provider-specific extensions) land in [`ContentBlock::Other`].
/// Either way a block is serialized back exactly as it was read.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(flatten)]
        extra: BlockFields,
    },
    Thinking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(flatten)]
        extra: BlockFields,
    },
    ToolUse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        #[serde(flatten)]
        extra: BlockFields,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            extra: BlockFields::new(),
        }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        ContentBlock::Thinking {
            thinking: Some(thinking.into()),
            signature: None,
            extra: BlockFields::new(),
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>) -> Self {
        ContentBlock::ToolUse {
            id: Some(id.into()),
            name: Some(name.into()),
            input: Some(serde_json::json!({})),
            extra: BlockFields::new(),
        }
    }

    /// The block's `type` tag, if it has one.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { .. } => Some("text"),
            ContentBlock::Thinking { .. } => Some("thinking"),
            ContentBlock::ToolUse { .. } => Some("tool_use"),
            ContentBlock::Other(v) => v.get("type").and_then(serde_json::Value::as_str),
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.tag() == Some("thinking")
    }

    /// Call id of a `tool_use` block.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse { id, .. } => id.as_deref(),
            ContentBlock::Other(v) if self.tag() == Some("tool_use") => {
                v.get("id").and_then(serde_json::Value::as_str)
            }
            _ => None,
        }
    }
}

/// Message content: either a bare string or an ordered list of blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Blocks(Vec::new())
    }
}

impl Content {
    /// Concatenated text of all `text` blocks (or the bare string).
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Approximate character count of everything the model would read.
    pub fn char_count(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text, .. } => text.len(),
                    ContentBlock::Thinking { thinking, .. } => {
                        thinking.as_deref().map_or(0, str::len)
                    }
                    ContentBlock::ToolUse { name, input, .. } => {
                        name.as_deref().map_or(0, str::len)
                            + input.as_ref().map_or(0, |v| v.to_string().len())
                    }
                    ContentBlock::Other(v) => v.to_string().len(),
                })
                .sum(),
        }
    }
}

/// A message in the conversation.
///
/// Fields beyond role, content and tool correlation (timestamps, usage,
/// provider metadata) are kept in `extra` and round-trip untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    #[serde(default)]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn new(role: MessageRole, content: Content) -> Self {
        Self {
            role,
            content,
            tool_call_id: None,
            tool_name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, Content::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, Content::Text(content.into()))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Assistant,
            Content::Blocks(vec![ContentBlock::text(content)]),
        )
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, Content::Blocks(blocks))
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::new(
                MessageRole::ToolResult,
                Content::Blocks(vec![ContentBlock::text(content)]),
            )
        }
    }

    /// Ids of every `tool_use` block in this message.
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        let blocks: &[ContentBlock] = match &self.content {
            Content::Blocks(blocks) => blocks,
            Content::Text(_) => &[],
        };
        blocks.iter().filter_map(ContentBlock::tool_use_id)
    }
}
