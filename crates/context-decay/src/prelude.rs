//! Convenience re-exports for common `context-decay` types.
//!
//! ```ignore
//! use context_decay::prelude::*;
//! ```
//!
//! Pulls in the message model, [`DecayConfig`], the decay entry points and
//! the summary store operations. Repair strategies other than the default
//! are imported from [`crate::context::repair`] directly.

// ── Message model ───────────────────────────────────────────────────
pub use crate::{BlockFields, Content, ContentBlock, Message, MessageRole};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::DecayConfig;

// ── Decay ───────────────────────────────────────────────────────────
pub use crate::context::decay::{
    DecayOutcome, DecayReport, apply_context_decay, apply_context_decay_with,
    summarization_candidates,
};
pub use crate::context::turn_ages::compute_turn_ages;

// ── Summary store ───────────────────────────────────────────────────
pub use crate::context::summary_store::{
    SummaryEntry, SummaryStore, clear_summary_store, load_summary_store, load_summary_store_sync,
    save_summary_store, summary_store_path,
};
