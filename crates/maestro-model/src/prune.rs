// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::types::{Message, Role};

/// Drop the oldest non-system messages until the estimated total fits
/// `budget_tokens`.  Leading system messages are always preserved.
///
/// After each drop, tool replies left at the head of the conversation are
/// removed too: their assistant-with-tool-calls message was just pruned, and
/// an orphaned tool reply violates the pairing invariant the endpoint
/// enforces.
///
/// Returns the estimated token total after pruning; the caller surfaces a
/// budget error when even the un-prunable remainder exceeds the window.
pub fn prune_messages(
    messages: &mut Vec<Message>,
    budget_tokens: usize,
    chars_per_token: usize,
) -> usize {
    let total = |msgs: &[Message]| -> usize {
        msgs.iter().map(|m| m.approx_tokens(chars_per_token)).sum()
    };

    let mut current = total(messages);
    while current > budget_tokens {
        let Some(idx) = messages.iter().position(|m| m.role != Role::System) else {
            break;
        };
        messages.remove(idx);
        // Orphan cleanup: tool replies whose assistant turn is gone.
        while messages
            .get(idx)
            .is_some_and(|m| m.role == Role::Tool)
        {
            messages.remove(idx);
        }
        current = total(messages);
    }
    current
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
