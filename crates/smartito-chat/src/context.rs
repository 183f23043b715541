//! Conversation memory.
//!
//! Keeps the ordered turn history of one session and the parameter context
//! that follow-up questions inherit. The current parameters are always the
//! fold of [`merge`] over each turn's own extracted parameters, so they can be
//! recomputed from history at any time with [`ConversationMemory::replay`].

use smartito_core::types::ParameterSet;

use crate::types::Turn;

/// Longest assistant answer quoted back into prompt context.
const ANSWER_PREVIEW_CHARS: usize = 200;

/// Field-wise override of `current` by `extracted`.
///
/// Unspecified fields in `extracted` keep their prior value. A non-empty set
/// replaces the prior set wholesale, so "mobile" after "mobile and desktop"
/// narrows rather than accumulates.
pub fn merge(current: &ParameterSet, extracted: &ParameterSet) -> ParameterSet {
    ParameterSet {
        date_range: extracted.date_range.or(current.date_range),
        markets: if extracted.markets.is_empty() {
            current.markets.clone()
        } else {
            extracted.markets.clone()
        },
        devices: if extracted.devices.is_empty() {
            current.devices.clone()
        } else {
            extracted.devices.clone()
        },
        traffic_source: extracted.traffic_source.or(current.traffic_source),
    }
}

// =============================================================================
// ConversationMemory
// =============================================================================

/// Turn history and inherited parameters for one session.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
    current: ParameterSet,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn and fold its extracted parameters in.
    pub fn record(&mut self, turn: Turn) {
        self.current = merge(&self.current, &turn.extracted);
        self.turns.push(turn);
    }

    /// Owned copy of the current parameters.
    pub fn snapshot(&self) -> ParameterSet {
        self.current.clone()
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Recompute the current parameters from history alone.
    pub fn replay(&self) -> ParameterSet {
        self.turns
            .iter()
            .fold(ParameterSet::default(), |acc, turn| merge(&acc, &turn.extracted))
    }

    /// Render the last `n` turns as prompt context lines.
    ///
    /// Long answers are cut to a short preview.
    pub fn context_lines(&self, n: usize) -> Vec<String> {
        self.recent_turns(n)
            .iter()
            .flat_map(|turn| {
                let answer = preview(&turn.final_answer, ANSWER_PREVIEW_CHARS);
                [
                    format!("User asked: {}", turn.user_text),
                    format!("You responded: {}", answer),
                ]
            })
            .collect()
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// =============================================================================
// Tests
// =============================================================================
