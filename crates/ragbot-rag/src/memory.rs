//! Conversation memory: a bounded window of recent turns.

use std::collections::VecDeque;

use ragbot_config::MemoryConfig;
use ragbot_types::ConversationTurn;

/// Bounded FIFO window over the most recent conversation turns.
///
/// User and assistant turns both count toward the capacity.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationMemory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Push a turn, evicting the oldest one when full.
    pub fn append(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Turns from oldest to newest.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
