//! Turn-age computation.
//!
//! A turn is closed by a user message. Ages count backward from the newest
//! message: everything after the last user message is age 0, everything
//! between the previous two user messages is age 1, and so on. A user
//! message at position 0 never closes a turn (there is nothing older to age).

use crate::{Message, MessageRole};

/// Compute the turn age of every message, indexed by position.
///
/// The returned vector has the same length as `messages`.
pub fn compute_turn_ages(messages: &[Message]) -> Vec<usize> {
    let mut ages = vec![0; messages.len()];
    let mut turn_age = 0;

    for (idx, msg) in messages.iter().enumerate().rev() {
        ages[idx] = turn_age;
        if msg.role == MessageRole::User && idx > 0 {
            turn_age += 1;
        }
    }
    ages
}
