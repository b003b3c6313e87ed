use std::cmp::Ordering;

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

/// A log emitted on chain, positioned by block and log index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl ChainLog {
    /// Position used for delivery ordering.
    pub const fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// Decodes the log as event `E`.
    pub fn decode<E: SolEvent>(&self) -> Result<E, alloy_sol_types::Error> {
        E::decode_raw_log(self.topics.iter().copied(), &self.data)
    }
}

impl PartialOrd for ChainLog {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChainLog {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| self.block_hash.cmp(&other.block_hash))
    }
}

/// Event notification delivered to subscribers.
///
/// `Removed` retracts a previously delivered `Added` whose block was reorganized
/// away; it is always delivered before any event replacing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "log", rename_all = "lowercase")]
pub enum EventDelta {
    Added(ChainLog),
    Removed(ChainLog),
}

impl EventDelta {
    pub const fn log(&self) -> &ChainLog {
        match self {
            Self::Added(log) | Self::Removed(log) => log,
        }
    }

    pub const fn is_removed(&self) -> bool {
        matches!(self, Self::Removed(_))
    }
}

/// Accepted values for one indexed topic. `None` accepts anything.
pub type TopicFilter = Option<Vec<B256>>;

/// Contract address, event signature and indexed-argument predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter {
    pub address: Address,
    pub signature: B256,
    pub topics: [TopicFilter; 3],
}

impl EventFilter {
    pub fn new(address: Address, signature: B256) -> Self {
        Self {
            address,
            signature,
            topics: Default::default(),
        }
    }

    /// Filter for every `E` emitted by `address`.
    pub fn for_event<E: SolEvent>(address: Address) -> Self {
        Self::new(address, E::SIGNATURE_HASH)
    }

    pub fn with_topic1(self, value: impl Into<B256>) -> Self {
        self.with_topic(0, value.into())
    }

    pub fn with_topic2(self, value: impl Into<B256>) -> Self {
        self.with_topic(1, value.into())
    }

    pub fn with_topic3(self, value: impl Into<B256>) -> Self {
        self.with_topic(2, value.into())
    }

    fn with_topic(mut self, slot: usize, value: B256) -> Self {
        self.topics[slot].get_or_insert_with(Vec::new).push(value);
        self
    }

    pub fn matches(&self, log: &ChainLog) -> bool {
        if log.address != self.address || log.topics.first() != Some(&self.signature) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, accepted)| match accepted {
            None => true,
            Some(values) => log
                .topics
                .get(i + 1)
                .is_some_and(|topic| values.contains(topic)),
        })
    }

    /// The node query for this filter over an inclusive block range.
    pub fn query(&self, from_block: u64, to_block: u64) -> LogQuery {
        LogQuery {
            address: self.address,
            topics: [
                Some(vec![self.signature]),
                self.topics[0].clone(),
                self.topics[1].clone(),
                self.topics[2].clone(),
            ],
            from_block,
            to_block,
        }
    }
}

/// `eth_getLogs` parameters over an inclusive block range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topics: [TopicFilter; 4],
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    pub fn matches(&self, log: &ChainLog) -> bool {
        log.address == self.address
            && (self.from_block..=self.to_block).contains(&log.block_number)
            && self.topics.iter().enumerate().all(|(i, accepted)| match accepted {
                None => true,
                Some(values) => log.topics.get(i).is_some_and(|t| values.contains(t)),
            })
    }
}
