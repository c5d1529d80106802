//! Tool call / tool result pairing repair.
//!
//! Providers reject a transcript in which a tool result appears without the
//! assistant `tool_use` block that requested it. Dropping the oldest messages
//! can cut exactly between the two, so after the message cap fires the
//! surviving window is passed through a [`PairingRepair`] strategy.

use crate::{Message, MessageRole};
use std::collections::HashSet;
use tracing::trace;

/// What a repair pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Tool results with no preceding matching `tool_use` block.
    pub dropped_orphans: usize,
    /// Second and later results answering an already-answered call.
    pub dropped_duplicates: usize,
}

impl RepairReport {
    pub fn is_empty(&self) -> bool {
        self.dropped_orphans == 0 && self.dropped_duplicates == 0
    }
}

/// Corrected sequence plus diagnostics.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub messages: Vec<Message>,
    pub report: RepairReport,
}

/// A strategy that restores tool pairing in a truncated message window.
pub trait PairingRepair {
    fn repair(&self, messages: Vec<Message>) -> RepairOutcome;
}

impl<F> PairingRepair for F
where
    F: Fn(Vec<Message>) -> RepairOutcome,
{
    fn repair(&self, messages: Vec<Message>) -> RepairOutcome {
        self(messages)
    }
}

/// Default strategy: drop every tool result that can't be paired.
///
/// A result is kept only if an earlier message in the window carries a
/// `tool_use` block with the same id, and no earlier result already answered
/// that id. Results without a `toolCallId` can never be paired and are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropOrphanedResults;

impl PairingRepair for DropOrphanedResults {
    fn repair(&self, messages: Vec<Message>) -> RepairOutcome {
        let mut report = RepairReport::default();
        let mut requested: HashSet<String> = HashSet::new();
        let mut answered: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(messages.len());

        for (idx, msg) in messages.into_iter().enumerate() {
            if msg.role != MessageRole::ToolResult {
                requested.extend(msg.tool_use_ids().map(str::to_string));
                kept.push(msg);
                continue;
            }

            let call_id = msg.tool_call_id.clone();
            match call_id.as_deref() {
                Some(id) if requested.contains(id) => {
                    if answered.insert(id.to_string()) {
                        kept.push(msg);
                    } else {
                        trace!("Dropping duplicate tool result {id} at window index {idx}");
                        report.dropped_duplicates += 1;
                    }
                }
                id => {
                    trace!(
                        "Dropping orphaned tool result {} at window index {idx}",
                        id.unwrap_or("(no id)")
                    );
                    report.dropped_orphans += 1;
                }
            }
        }

        RepairOutcome {
            messages: kept,
            report,
        }
    }
}
