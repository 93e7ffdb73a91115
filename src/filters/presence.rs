//! Presence voting - debounces per-frame "hand detected" flags.

use std::collections::VecDeque;

pub const PRESENCE_WINDOW: usize = 5;

/// Sliding-window majority vote over recent detection outcomes for one hand.
#[derive(Debug, Clone)]
pub struct PresenceVoter {
    history: VecDeque<bool>,
    capacity: usize,
}

impl PresenceVoter {
    pub fn new() -> Self {
        Self::with_capacity(PRESENCE_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, detected: bool) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(detected);
    }

    /// Strict majority against the current history length.
    pub fn is_present(&self) -> bool {
        let hits = self.history.iter().filter(|&&seen| seen).count();
        hits * 2 > self.history.len()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for PresenceVoter {
    fn default() -> Self {
        Self::new()
    }
}
