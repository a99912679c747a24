//! Bounded record of external commands, newest first.

use crate::lexer::Argv;
use log::trace;
use std::collections::VecDeque;

/// Size limit a fresh shell starts with.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// History of executed external commands.
///
/// Entry `1` is always the most recent command. The store never holds more
/// than `limit` entries: anything past the limit is evicted from the oldest end.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Argv>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Record `argv` as the newest entry.
    ///
    /// Returns `false` without changing anything when `argv` is identical to
    /// the current newest entry.
    pub fn push(&mut self, argv: Argv) -> bool {
        if self.entries.front() == Some(&argv) {
            return false;
        }
        self.entries.push_front(argv);
        self.evict();
        true
    }

    /// Change the size limit, evicting old entries immediately if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.evict();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by 1-based index, `1` being the newest.
    pub fn get(&self, index: usize) -> Option<&Argv> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Entries paired with their 1-based index, newest first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Argv)> {
        self.entries.iter().enumerate().map(|(i, argv)| (i + 1, argv))
    }

    fn evict(&mut self) {
        while self.entries.len() > self.limit {
            if let Some(old) = self.entries.pop_back() {
                trace!("history: evicted `{old}`");
            }
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
