use std::sync::Arc;

use alloy_consensus::TxEip1559;
use alloy_primitives::{Address, TxHash, TxKind, U256};
use chainlane_fees::{math::bump_pct, FeeQuote};
use chainlane_node::{with_timeout, NodeClient};
use chainlane_primitives::{CallDescriptor, FeeCaps, OperationKind, PendingOperation};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    config::SubmitConfig,
    error::SubmissionError,
    nonce::NonceManager,
    signer::{OperationSigner, SignerRegistry},
};

/// Gas of a zero-value call without calldata.
pub const CANCEL_GAS_LIMIT: u64 = 21_000;

/// Signs and broadcasts state-changing calls.
#[derive(Debug)]
pub struct WriteSubmitter<N> {
    node: Arc<N>,
    signers: SignerRegistry,
    nonces: NonceManager,
    config: SubmitConfig,
}

impl<N: NodeClient> WriteSubmitter<N> {
    pub fn new(node: Arc<N>, signers: SignerRegistry, config: SubmitConfig) -> Self {
        Self {
            node,
            signers,
            nonces: NonceManager::new(),
            config,
        }
    }

    pub const fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    pub const fn signers(&self) -> &SignerRegistry {
        &self.signers
    }

    pub const fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Broadcasts `descriptor` from `from` with the next nonce of the account.
    ///
    /// The signer and quote are checked before a nonce is reserved, so a
    /// rejected precondition never consumes one.
    pub async fn submit(
        &self,
        descriptor: &CallDescriptor,
        quote: &FeeQuote,
        from: Address,
    ) -> Result<PendingOperation, SubmissionError> {
        let signer = self.signer_for(from)?;
        self.check_quote(quote, descriptor, from)?;

        let timeout = self.config.timeout;
        let reservation = with_timeout(timeout, self.nonces.reserve(&*self.node, from))
            .await
            .map_err(|_| SubmissionError::Timeout(timeout))??;
        let nonce = reservation.nonce();

        let tx = transaction(descriptor, quote, nonce);
        let sent = with_timeout(timeout, self.sign_and_send(signer.as_ref(), tx)).await;
        match sent {
            Ok(Ok(tx_hash)) => {
                reservation.commit();
                info!(target: "chainlane::submit", %from, nonce, ?tx_hash, "transaction broadcast");
                Ok(PendingOperation {
                    descriptor: descriptor.clone(),
                    from,
                    nonce,
                    fees: quote.caps(),
                    tx_hash,
                    submitted_at: Utc::now(),
                    kind: OperationKind::Submit,
                })
            }
            Ok(Err(SubmissionError::NonceTooLow)) => {
                warn!(target: "chainlane::submit", %from, nonce, "node rejected nonce, resyncing");
                reservation.invalidate();
                Err(SubmissionError::NonceTooLow)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                // The broadcast may have landed; the counter can't be trusted.
                reservation.invalidate();
                Err(SubmissionError::Timeout(timeout))
            }
        }
    }

    /// Rebroadcasts `op`'s call with the same nonce and higher fees.
    pub async fn replace(
        &self,
        op: &PendingOperation,
        quote: &FeeQuote,
    ) -> Result<PendingOperation, SubmissionError> {
        let signer = self.signer_for(op.from)?;
        self.check_quote(quote, &op.descriptor, op.from)?;
        self.check_bump(op, quote)?;

        let tx = transaction(&op.descriptor, quote, op.nonce);
        let tx_hash = self.broadcast(signer.as_ref(), tx).await?;
        info!(
            target: "chainlane::submit",
            from = %op.from,
            nonce = op.nonce,
            replaces = ?op.tx_hash,
            ?tx_hash,
            "replacement broadcast"
        );
        Ok(PendingOperation {
            descriptor: op.descriptor.clone(),
            from: op.from,
            nonce: op.nonce,
            fees: quote.caps(),
            tx_hash,
            submitted_at: Utc::now(),
            kind: OperationKind::Replace {
                replaces: op.tx_hash,
            },
        })
    }

    /// Occupies `op`'s nonce with a zero-value self call.
    ///
    /// Only the sender and freshness of `quote` are checked; its gas limit is
    /// replaced with [`CANCEL_GAS_LIMIT`].
    pub async fn cancel(
        &self,
        op: &PendingOperation,
        quote: &FeeQuote,
    ) -> Result<PendingOperation, SubmissionError> {
        let signer = self.signer_for(op.from)?;
        if quote.from() != op.from {
            return Err(SubmissionError::QuoteMismatch);
        }
        if quote.is_stale(self.config.quote_horizon) {
            return Err(SubmissionError::StaleQuote);
        }
        self.check_bump(op, quote)?;

        let fees = FeeCaps {
            gas_limit: CANCEL_GAS_LIMIT,
            ..quote.caps()
        };
        let tx = TxEip1559 {
            chain_id: quote.chain_id(),
            nonce: op.nonce,
            gas_limit: fees.gas_limit,
            max_fee_per_gas: fees.max_fee,
            max_priority_fee_per_gas: fees.max_priority_fee,
            to: TxKind::Call(op.from),
            value: U256::ZERO,
            access_list: Default::default(),
            input: Default::default(),
        };
        let tx_hash = self.broadcast(signer.as_ref(), tx).await?;
        info!(
            target: "chainlane::submit",
            from = %op.from,
            nonce = op.nonce,
            cancels = ?op.tx_hash,
            ?tx_hash,
            "cancellation broadcast"
        );
        Ok(PendingOperation {
            descriptor: op.descriptor.clone(),
            from: op.from,
            nonce: op.nonce,
            fees,
            tx_hash,
            submitted_at: Utc::now(),
            kind: OperationKind::Cancel {
                cancels: op.tx_hash,
            },
        })
    }

    /// Raises `quote`'s fee caps to the minimum a replacement of `op` needs.
    pub fn bump_for_replacement(&self, op: &PendingOperation, quote: &FeeQuote) -> FeeQuote {
        let (max_fee, max_priority_fee) = self.min_replacement_fees(op);
        quote.with_fees(max_fee, max_priority_fee)
    }

    fn min_replacement_fees(&self, op: &PendingOperation) -> (u128, u128) {
        let pct = self.config.min_replacement_bump_pct;
        // Strictly higher even when the percentage rounds to nothing.
        let bump = |fee: u128| bump_pct(fee, pct).max(fee.saturating_add(1));
        (bump(op.fees.max_fee), bump(op.fees.max_priority_fee))
    }

    fn check_bump(&self, op: &PendingOperation, quote: &FeeQuote) -> Result<(), SubmissionError> {
        let (max_fee, max_priority_fee) = self.min_replacement_fees(op);
        if quote.max_fee() < max_fee || quote.max_priority_fee() < max_priority_fee {
            return Err(SubmissionError::Underpriced);
        }
        Ok(())
    }

    fn signer_for(&self, from: Address) -> Result<Arc<dyn OperationSigner>, SubmissionError> {
        self.signers
            .get(from)
            .ok_or(SubmissionError::MissingSigner(from))
    }

    fn check_quote(
        &self,
        quote: &FeeQuote,
        descriptor: &CallDescriptor,
        from: Address,
    ) -> Result<(), SubmissionError> {
        if !quote.covers(descriptor, from) {
            return Err(SubmissionError::QuoteMismatch);
        }
        if quote.is_stale(self.config.quote_horizon) {
            return Err(SubmissionError::StaleQuote);
        }
        Ok(())
    }

    async fn broadcast(
        &self,
        signer: &dyn OperationSigner,
        tx: TxEip1559,
    ) -> Result<TxHash, SubmissionError> {
        let timeout = self.config.timeout;
        with_timeout(timeout, self.sign_and_send(signer, tx))
            .await
            .map_err(|_| SubmissionError::Timeout(timeout))?
    }

    async fn sign_and_send(
        &self,
        signer: &dyn OperationSigner,
        tx: TxEip1559,
    ) -> Result<TxHash, SubmissionError> {
        let raw = signer
            .sign(tx)
            .await
            .map_err(|e| SubmissionError::Signing(e.to_string()))?;
        Ok(self.node.send_raw_transaction(raw).await?)
    }
}

fn transaction(descriptor: &CallDescriptor, quote: &FeeQuote, nonce: u64) -> TxEip1559 {
    TxEip1559 {
        chain_id: quote.chain_id(),
        nonce,
        gas_limit: quote.gas_limit(),
        max_fee_per_gas: quote.max_fee(),
        max_priority_fee_per_gas: quote.max_priority_fee(),
        to: TxKind::Call(descriptor.target()),
        value: descriptor.value(),
        access_list: Default::default(),
        input: descriptor.calldata(),
    }
}
