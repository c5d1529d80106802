//! Context decay: turn ages, the decay pipeline, and the summary store.
//!
//! Layered degradation of old conversation content, cheapest first:
//!
//! 1. **[`turn_ages`]** — how many user turns separate each message from the
//!    current one. Every threshold in [`DecayConfig`](crate::config::DecayConfig)
//!    is measured in these ages.
//!
//! 2. **[`decay`]** — the ordered pipeline: strip thinking, apply cached
//!    summaries, strip tool results, cap the message count. Pure and
//!    synchronous; returns the input untouched when nothing applies.
//!
//! 3. **[`summary_store`]** — position-keyed cache of tool-result summaries
//!    persisted next to the session transcript. Produced by an external
//!    summarizer, only read by the pipeline.
//!
//! 4. **[`repair`]** — restores tool call / tool result pairing after the
//!    message cap cuts through a pair.

pub mod decay;
pub mod repair;
pub mod summary_store;
pub mod turn_ages;

// Re-export commonly used items at the module level.
pub use decay::{DecayOutcome, DecayReport, apply_context_decay, apply_context_decay_with};
pub use repair::{DropOrphanedResults, PairingRepair, RepairOutcome, RepairReport};
pub use summary_store::{DEFAULT_CHARS_PER_TOKEN, SummaryEntry, SummaryStore};
pub use turn_ages::compute_turn_ages;
