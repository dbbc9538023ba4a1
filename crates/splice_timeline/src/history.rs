// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo of timeline edits.
//!
//! Each successful edit stores bincode snapshots of the clips it touched,
//! taken before and after the edit. Undo restores the `before` snapshot,
//! redo the `after` one.

use crate::clip::ClipState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Serialized clip states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    data: Vec<u8>,
}

impl Snapshot {
    /// Serialize clip states
    pub fn capture(states: &[ClipState]) -> Result<Self> {
        Ok(Self {
            data: bincode::serialize(states)?,
        })
    }

    /// Deserialize the clip states
    pub fn states(&self) -> Result<Vec<ClipState>> {
        Ok(bincode::deserialize(&self.data)?)
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// One undoable edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    /// Sequence number
    pub id: u64,
    /// Human-readable description
    pub description: String,
    /// Touched clips before the edit
    pub before: Snapshot,
    /// Touched clips after the edit
    pub after: Snapshot,
}

impl EditRecord {
    /// Memory used by both snapshots
    pub fn memory_size(&self) -> usize {
        self.before.size() + self.after.size()
    }
}

/// History statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Records in the undo stack
    pub undo_count: usize,
    /// Records in the redo stack
    pub redo_count: usize,
    /// Bytes used by all snapshots
    pub memory_used: usize,
    /// Maximum undo depth
    pub max_depth: usize,
}

/// Undo/redo stacks
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<EditRecord>,
    redo_stack: VecDeque<EditRecord>,
    next_id: u64,
    max_depth: usize,
    memory_used: usize,
}

impl History {
    /// Create a history keeping at most `max_depth` edits
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            next_id: 1,
            max_depth,
            memory_used: 0,
        }
    }

    /// Record an edit. Clears the redo stack and drops the oldest records
    /// beyond the maximum depth.
    pub fn record(&mut self, description: impl Into<String>, before: Snapshot, after: Snapshot) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        for record in self.redo_stack.drain(..) {
            self.memory_used = self.memory_used.saturating_sub(record.memory_size());
        }

        let record = EditRecord {
            id,
            description: description.into(),
            before,
            after,
        };
        self.memory_used += record.memory_size();
        self.undo_stack.push_back(record);

        while self.undo_stack.len() > self.max_depth {
            if let Some(old) = self.undo_stack.pop_front() {
                self.memory_used = self.memory_used.saturating_sub(old.memory_size());
            }
        }
        id
    }

    /// Pop the last edit onto the redo stack; returns the states to restore
    pub fn undo(&mut self) -> Result<Vec<ClipState>> {
        let record = self.undo_stack.back().ok_or(HistoryError::NothingToUndo)?;
        let states = record.before.states()?;
        if let Some(record) = self.undo_stack.pop_back() {
            self.redo_stack.push_back(record);
        }
        Ok(states)
    }

    /// Pop the last undone edit back onto the undo stack; returns the
    /// states to restore
    pub fn redo(&mut self) -> Result<Vec<ClipState>> {
        let record = self.redo_stack.back().ok_or(HistoryError::NothingToRedo)?;
        let states = record.after.states()?;
        if let Some(record) = self.redo_stack.pop_back() {
            self.undo_stack.push_back(record);
        }
        Ok(states)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.memory_used = 0;
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            memory_used: self.memory_used,
            max_depth: self.max_depth,
        }
    }

    /// Description of the next undo
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|r| r.description.as_str())
    }

    /// Description of the next redo
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|r| r.description.as_str())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_max_depth(crate::config::DEFAULT_HISTORY_DEPTH)
    }
}
