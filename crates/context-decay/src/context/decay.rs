//! Graduated decay of old conversation content.
//!
//! Each message is aged in turns ([`compute_turn_ages`]) and then run through
//! four steps in a fixed order:
//!
//! 1. **Thinking strip** — assistant messages at or past
//!    `stripThinkingAfterTurns` lose their `thinking` blocks.
//! 2. **Summarization** — tool results at or past
//!    `summarizeToolResultsAfterTurns` that have an entry in the
//!    [`SummaryStore`] become `"[Summarized] …"`. Skipped for results that
//!    step 3 will strip anyway, so summaries only live in the band between
//!    the two thresholds.
//! 3. **Tool-result strip** — tool results at or past
//!    `stripToolResultsAfterTurns` become a one-line removal placeholder.
//! 4. **Hard cap** — only the newest `maxContextMessages` messages survive,
//!    after which tool pairing is repaired.
//!
//! The pipeline never fails and never allocates when it has nothing to do:
//! the returned [`DecayOutcome`] borrows the caller's slice unless at least
//! one message actually changed or the cap dropped something.

use crate::config::DecayConfig;
use crate::context::repair::{DropOrphanedResults, PairingRepair, RepairReport};
use crate::context::summary_store::SummaryStore;
use crate::context::turn_ages::compute_turn_ages;
use crate::{Content, ContentBlock, Message, MessageRole};
use std::borrow::Cow;
use tracing::{debug, trace, warn};

/// Prefix of a tool result replaced by its cached summary.
pub const SUMMARIZED_PREFIX: &str = "[Summarized] ";

/// Prefix of a tool result replaced by the removal placeholder.
pub const REMOVED_PREFIX: &str = "[Tool result removed";

/// Placeholder text for a tool result stripped at `threshold` turns.
pub fn removed_placeholder(threshold: usize) -> String {
    format!("{REMOVED_PREFIX} — aged past {threshold} turns]")
}

// ── Outcome types ──────────────────────────────────────────────────

/// Counts of what a decay pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayReport {
    /// Assistant messages that lost at least one thinking block.
    pub thinking_stripped: usize,
    /// Tool results replaced by a stored summary.
    pub summarized: usize,
    /// Tool results replaced by the removal placeholder.
    pub tool_results_stripped: usize,
    /// Messages dropped from the front by the hard cap.
    pub dropped_by_cap: usize,
    /// Present only when the cap fired and pairing repair ran.
    pub repair: Option<RepairReport>,
}

impl DecayReport {
    /// Whether the pass touched nothing.
    pub fn is_empty(&self) -> bool {
        self.thinking_stripped == 0
            && self.summarized == 0
            && self.tool_results_stripped == 0
            && self.dropped_by_cap == 0
    }

    /// One-line summary for logs.
    pub fn to_log_string(&self) -> String {
        let mut line = format!(
            "thinking stripped: {}, summarized: {}, tool results stripped: {}, dropped by cap: {}",
            self.thinking_stripped,
            self.summarized,
            self.tool_results_stripped,
            self.dropped_by_cap,
        );
        if let Some(repair) = self.repair.filter(|r| !r.is_empty()) {
            line.push_str(&format!(
                ", repaired: {} orphaned + {} duplicate tool result(s)",
                repair.dropped_orphans, repair.dropped_duplicates,
            ));
        }
        line
    }
}

/// Result of [`apply_context_decay`].
///
/// `messages` is [`Cow::Borrowed`] — the caller's own slice — when nothing
/// changed, and [`Cow::Owned`] otherwise.
#[derive(Debug, Clone)]
pub struct DecayOutcome<'a> {
    pub messages: Cow<'a, [Message]>,
    pub report: DecayReport,
}

impl<'a> DecayOutcome<'a> {
    fn unchanged(messages: &'a [Message]) -> Self {
        Self {
            messages: Cow::Borrowed(messages),
            report: DecayReport::default(),
        }
    }

    /// Whether any message was modified or dropped.
    pub fn is_changed(&self) -> bool {
        matches!(self.messages, Cow::Owned(_))
    }

    /// Take the resulting messages, cloning only if nothing changed.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages.into_owned()
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

/// Apply graduated decay, repairing tool pairing with [`DropOrphanedResults`]
/// if the message cap fires.
///
/// `store` is keyed by positions in `messages` as passed here, i.e. before
/// any truncation.
pub fn apply_context_decay<'a>(
    messages: &'a [Message],
    config: &DecayConfig,
    store: &SummaryStore,
) -> DecayOutcome<'a> {
    apply_context_decay_with(messages, config, store, &DropOrphanedResults)
}

/// Apply graduated decay with a caller-supplied pairing repair strategy.
///
/// `repairer` runs only when the message cap actually dropped messages.
pub fn apply_context_decay_with<'a>(
    messages: &'a [Message],
    config: &DecayConfig,
    store: &SummaryStore,
    repairer: &dyn PairingRepair,
) -> DecayOutcome<'a> {
    if messages.is_empty() || !config.any_enabled() {
        return DecayOutcome::unchanged(messages);
    }

    if config.summarization_shadowed() {
        warn!(
            "summarizeToolResultsAfterTurns ({}) >= stripToolResultsAfterTurns ({}); \
             summaries will never be applied",
            config.summarize_after().unwrap_or_default(),
            config.strip_tool_results_after().unwrap_or_default(),
        );
    }

    let ages = compute_turn_ages(messages);
    let mut report = DecayReport::default();
    let mut result: Cow<'a, [Message]> = Cow::Borrowed(messages);

    for (idx, (msg, &age)) in messages.iter().zip(&ages).enumerate() {
        if let Some(content) = decay_content(msg, idx, age, config, store, &mut report) {
            result.to_mut()[idx].content = content;
        }
    }

    if let Some(max) = config.max_messages()
        && result.len() > max
    {
        let dropped = result.len() - max;
        let window = match result {
            Cow::Borrowed(all) => all[dropped..].to_vec(),
            Cow::Owned(mut all) => {
                all.drain(..dropped);
                all
            }
        };
        trace!("Hard cap {max}: dropping {dropped} oldest message(s)");
        report.dropped_by_cap = dropped;

        let repaired = repairer.repair(window);
        report.repair = Some(repaired.report);
        result = Cow::Owned(repaired.messages);
    }

    if matches!(result, Cow::Borrowed(_)) {
        return DecayOutcome::unchanged(messages);
    }

    debug!(
        "Context decay over {} message(s): {}",
        messages.len(),
        report.to_log_string()
    );
    DecayOutcome {
        messages: result,
        report,
    }
}

/// Run steps 1–3 on a single message. Returns replacement content only when
/// it differs from what the message already holds.
fn decay_content(
    msg: &Message,
    idx: usize,
    age: usize,
    config: &DecayConfig,
    store: &SummaryStore,
    report: &mut DecayReport,
) -> Option<Content> {
    match msg.role {
        MessageRole::Assistant => {
            let threshold = config.strip_thinking_after()?;
            if age < threshold {
                return None;
            }
            let Content::Blocks(blocks) = &msg.content else {
                return None;
            };
            if !blocks.iter().any(ContentBlock::is_thinking) {
                return None;
            }
            trace!("Stripping thinking from message {idx} (age {age})");
            report.thinking_stripped += 1;
            Some(Content::Blocks(
                blocks.iter().filter(|b| !b.is_thinking()).cloned().collect(),
            ))
        }
        MessageRole::ToolResult => {
            let strip_at = config.strip_tool_results_after().filter(|&n| age >= n);

            if let Some(threshold) = strip_at {
                let placeholder = single_text(removed_placeholder(threshold));
                if msg.content == placeholder {
                    return None;
                }
                trace!("Stripping tool result {idx} (age {age})");
                report.tool_results_stripped += 1;
                return Some(placeholder);
            }

            let threshold = config.summarize_after()?;
            if age < threshold {
                return None;
            }
            let entry = store.get(idx)?;
            let summarized = single_text(format!("{SUMMARIZED_PREFIX}{}", entry.summary));
            if msg.content == summarized {
                return None;
            }
            trace!("Summarizing tool result {idx} (age {age})");
            report.summarized += 1;
            Some(summarized)
        }
        MessageRole::User | MessageRole::System => None,
    }
}

fn single_text(text: String) -> Content {
    Content::Blocks(vec![ContentBlock::text(text)])
}

/// Tool results that are old enough to be summarized but have no cached
/// summary yet.
///
/// A result qualifies when its age is at or past the summarize threshold and,
/// if stripping is enabled, still below the strip threshold. Feed these
/// indices to the summarizer and store its output under the same keys before
/// the next decay pass. Empty when summarization is disabled.
pub fn summarization_candidates(
    messages: &[Message],
    config: &DecayConfig,
    store: &SummaryStore,
) -> Vec<usize> {
    let Some(summarize_at) = config.summarize_after() else {
        return Vec::new();
    };
    let strip_at = config.strip_tool_results_after();

    compute_turn_ages(messages)
        .into_iter()
        .enumerate()
        .filter(|&(idx, age)| {
            messages[idx].role == MessageRole::ToolResult
                && age >= summarize_at
                && strip_at.is_none_or(|n| age < n)
                && !store.contains(idx)
        })
        .map(|(idx, _)| idx)
        .collect()
}
