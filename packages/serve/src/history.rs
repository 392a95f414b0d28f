//! Generation history for late joiners.
//!
//! Every generation gets an entry, scopes without operations included, so a
//! listener that asks for "everything since K" receives a gap-free slice.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use timeline_editor::Operation;

/// Operations of one forwarded scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationEntry {
    pub generation: u64,
    pub operations: Vec<Operation>,
}

impl GenerationEntry {
    pub fn is_placeholder(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<GenerationEntry>,
    latest: u64,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            latest: 0,
            limit,
        }
    }

    /// Most recently assigned generation, 0 before the first scope
    pub fn latest(&self) -> u64 {
        self.latest
    }

    /// Oldest generation still retained
    pub fn oldest(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.generation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assign the next generation to `operations` and remember them
    pub fn record(&mut self, operations: Vec<Operation>) -> u64 {
        self.latest += 1;
        self.entries.push_back(GenerationEntry {
            generation: self.latest,
            operations,
        });
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
        self.latest
    }

    /// Every retained entry with a generation greater than `since`
    pub fn since(&self, since: u64) -> Vec<GenerationEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.generation > since)
            .cloned()
            .collect()
    }
}
