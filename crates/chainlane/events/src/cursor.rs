//! Progress of a live subscription.
//!
//! The cursor remembers the hash of every block it delivered logs from, plus
//! the head seen at the end of each round, for the last `reorg_window` blocks.
//! Hashes chain, so a reorg at any height changes the newest remembered hash;
//! the subscriber then walks down to the highest block that still matches and
//! rewinds there.

use std::collections::BTreeMap;

use alloy_primitives::B256;
use chainlane_primitives::{ChainLog, EventDelta};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    last_processed: u64,
    blocks: BTreeMap<u64, B256>,
    /// Logs delivered as `Added`, in delivery order.
    delivered: Vec<ChainLog>,
}

impl Cursor {
    /// A cursor that has processed everything up to `head`.
    pub fn new(head: u64, head_hash: B256) -> Self {
        Self {
            last_processed: head,
            blocks: BTreeMap::from([(head, head_hash)]),
            delivered: Vec::new(),
        }
    }

    pub const fn last_processed(&self) -> u64 {
        self.last_processed
    }

    pub fn newest(&self) -> Option<(u64, B256)> {
        self.blocks.last_key_value().map(|(n, h)| (*n, *h))
    }

    /// Remembered blocks, newest first.
    pub fn remembered(&self) -> Vec<(u64, B256)> {
        self.blocks.iter().rev().map(|(n, h)| (*n, *h)).collect()
    }

    pub fn delivered(&self) -> &[ChainLog] {
        &self.delivered
    }

    /// Forgets everything above `height` and returns removals for the logs
    /// delivered from those blocks, most recent first.
    pub fn rewind(&mut self, height: u64) -> Vec<EventDelta> {
        self.blocks.retain(|number, _| *number <= height);
        let keep = self
            .delivered
            .iter()
            .position(|log| log.block_number > height)
            .unwrap_or(self.delivered.len());
        let removed = self.delivered.split_off(keep);
        self.last_processed = self.last_processed.min(height);
        removed.into_iter().rev().map(EventDelta::Removed).collect()
    }

    /// Records `logs` as delivered and `head` as processed.
    pub fn advance(&mut self, head: u64, head_hash: B256, logs: &[ChainLog]) {
        for log in logs {
            self.blocks.insert(log.block_number, log.block_hash);
        }
        self.blocks.insert(head, head_hash);
        self.delivered.extend_from_slice(logs);
        self.last_processed = head;
    }

    /// Forgets blocks more than `window` below `head`.
    pub fn prune(&mut self, head: u64, window: u64) {
        let floor = head.saturating_sub(window);
        self.blocks.retain(|number, _| *number > floor);
        self.delivered.retain(|log| log.block_number > floor);
    }
}
