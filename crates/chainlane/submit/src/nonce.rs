//! Per-account nonce allocation.
//!
//! A reservation holds the account's lock until it is committed or dropped, so
//! concurrent submissions for one account are serialized and receive
//! consecutive nonces. The counter only advances on [`NonceReservation::commit`].

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::Address;
use chainlane_node::{NodeClient, NodeError};
use chainlane_primitives::BlockTag;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct AccountNonce {
    /// Next nonce to hand out. `None` until synced from the node.
    next: Option<u64>,
}

#[derive(Debug, Default)]
pub struct NonceManager {
    accounts: parking_lot::Mutex<HashMap<Address, Arc<Mutex<AccountNonce>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of `address`'s nonce and returns the next one.
    ///
    /// The first reservation for an account syncs from the node's pending
    /// transaction count.
    pub async fn reserve<N: NodeClient + ?Sized>(
        &self,
        node: &N,
        address: Address,
    ) -> Result<NonceReservation, NodeError> {
        let slot = self.accounts.lock().entry(address).or_default().clone();
        let mut guard = slot.lock_owned().await;

        let nonce = match guard.next {
            Some(nonce) => nonce,
            None => {
                let nonce = node.transaction_count(address, BlockTag::Pending).await?;
                debug!(target: "chainlane::submit", %address, nonce, "synced nonce from node");
                guard.next = Some(nonce);
                nonce
            }
        };

        Ok(NonceReservation {
            guard,
            address,
            nonce,
        })
    }

    /// The next nonce for `address`, if it has been synced.
    pub fn peek(&self, address: Address) -> Option<u64> {
        let slot = self.accounts.lock().get(&address).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.next
    }
}

/// Exclusive claim on an account's next nonce.
///
/// Dropping it without committing leaves the counter untouched.
#[derive(Debug)]
pub struct NonceReservation {
    guard: OwnedMutexGuard<AccountNonce>,
    address: Address,
    nonce: u64,
}

impl NonceReservation {
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    /// The node accepted a transaction with this nonce.
    pub fn commit(mut self) {
        self.guard.next = Some(self.nonce + 1);
    }

    /// Forgets the cached counter so the next reservation resyncs.
    pub fn invalidate(mut self) {
        debug!(target: "chainlane::submit", address = %self.address, "nonce invalidated");
        self.guard.next = None;
    }
}
