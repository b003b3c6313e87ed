use std::{collections::HashMap, fmt, sync::Arc};

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Capability to sign transactions for one account.
///
/// Implementations own their key material; the submitter only ever sees the
/// encoded, signed transaction.
#[async_trait]
pub trait OperationSigner: Send + Sync + 'static {
    fn address(&self) -> Address;

    /// Signs `tx` and returns its EIP-2718 encoding.
    async fn sign(&self, tx: TxEip1559) -> Result<Bytes, alloy_signer::Error>;
}

#[async_trait]
impl OperationSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self)
    }

    async fn sign(&self, mut tx: TxEip1559) -> Result<Bytes, alloy_signer::Error> {
        let signature = TxSigner::sign_transaction(self, &mut tx).await?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }
}

/// Signers available to a submitter, by account.
#[derive(Clone, Default)]
pub struct SignerRegistry {
    signers: HashMap<Address, Arc<dyn OperationSigner>>,
}

impl fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerRegistry")
            .field("accounts", &self.signers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `signer` under its own address, replacing any previous one.
    pub fn register(&mut self, signer: impl OperationSigner) -> Address {
        let address = signer.address();
        self.signers.insert(address, Arc::new(signer));
        address
    }

    pub fn with(mut self, signer: impl OperationSigner) -> Self {
        self.register(signer);
        self
    }

    pub fn get(&self, address: Address) -> Option<Arc<dyn OperationSigner>> {
        self.signers.get(&address).cloned()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.signers.contains_key(&address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = Address> + '_ {
        self.signers.keys().copied()
    }
}
