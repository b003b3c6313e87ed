use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// 4 byte function selector.
pub type Selector = [u8; 4];

/// A contract call: target, selector, ABI-encoded arguments and attached value.
///
/// Descriptors are immutable once built. The same descriptor drives reads, fee
/// estimation and submission, and its [`digest`](Self::digest) binds a fee quote
/// to exactly the call it was computed for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallDescriptor {
    target: Address,
    selector: Selector,
    args: Bytes,
    value: U256,
}

impl CallDescriptor {
    /// Builds a descriptor from a typed `sol!` call.
    pub fn from_call<C: SolCall>(target: Address, call: &C) -> Self {
        let encoded = call.abi_encode();
        Self {
            target,
            selector: C::SELECTOR,
            args: Bytes::copy_from_slice(&encoded[4..]),
            value: U256::ZERO,
        }
    }

    /// Builds a descriptor from raw calldata (selector followed by encoded arguments).
    pub fn from_calldata(target: Address, calldata: impl AsRef<[u8]>) -> Result<Self, EncodingError> {
        let calldata = calldata.as_ref();
        if calldata.len() < 4 {
            return Err(EncodingError::CalldataTooShort(calldata.len()));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&calldata[..4]);
        Ok(Self {
            target,
            selector,
            args: Bytes::copy_from_slice(&calldata[4..]),
            value: U256::ZERO,
        })
    }

    /// Like [`from_calldata`](Self::from_calldata) but also checks the calldata
    /// decodes as `C`.
    pub fn from_calldata_checked<C: SolCall>(
        target: Address,
        calldata: impl AsRef<[u8]>,
    ) -> Result<Self, EncodingError> {
        let descriptor = Self::from_calldata(target, calldata)?;
        if descriptor.selector != C::SELECTOR {
            return Err(EncodingError::ArgumentMismatch(format!(
                "selector {} does not match {}",
                alloy_primitives::hex::encode_prefixed(descriptor.selector),
                C::SIGNATURE
            )));
        }
        C::abi_decode(&descriptor.calldata())
            .map_err(|e| EncodingError::ArgumentMismatch(e.to_string()))?;
        Ok(descriptor)
    }

    /// Returns a copy carrying `value` wei.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub const fn target(&self) -> Address {
        self.target
    }

    pub const fn selector(&self) -> Selector {
        self.selector
    }

    pub fn args(&self) -> &Bytes {
        &self.args
    }

    pub const fn value(&self) -> U256 {
        self.value
    }

    /// Selector followed by the encoded arguments.
    pub fn calldata(&self) -> Bytes {
        let mut out = Vec::with_capacity(4 + self.args.len());
        out.extend_from_slice(&self.selector);
        out.extend_from_slice(&self.args);
        out.into()
    }

    /// Stable identity of the call, covering target, calldata and value.
    pub fn digest(&self) -> B256 {
        let mut buf = Vec::with_capacity(20 + 4 + self.args.len() + 32);
        buf.extend_from_slice(self.target.as_slice());
        buf.extend_from_slice(&self.selector);
        buf.extend_from_slice(&self.args);
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        keccak256(buf)
    }

    /// The node-level request for this call as sent by `from`.
    pub fn to_request(&self, from: Option<Address>) -> CallRequest {
        CallRequest {
            from,
            to: self.target,
            input: self.calldata(),
            value: self.value,
        }
    }
}

/// Wire-level call request handed to the node client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20;
    use alloy_primitives::address;

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");
    const ALICE: Address = address!("00000000000000000000000000000000000a11ce");

    #[test]
    fn typed_and_raw_construction_agree() {
        let call = IERC20::balanceOfCall { account: ALICE };
        let typed = CallDescriptor::from_call(TOKEN, &call);
        let raw = CallDescriptor::from_calldata(TOKEN, call.abi_encode()).unwrap();

        assert_eq!(typed, raw);
        assert_eq!(typed.selector(), IERC20::balanceOfCall::SELECTOR);
        assert_eq!(typed.args().len(), 32);
        assert_eq!(typed.digest(), raw.digest());
    }

    #[test]
    fn digest_covers_value() {
        let call = IERC20::balanceOfCall { account: ALICE };
        let plain = CallDescriptor::from_call(TOKEN, &call);
        let paid = plain.clone().with_value(U256::from(1));
        assert_ne!(plain.digest(), paid.digest());
    }

    #[test]
    fn short_calldata_is_rejected() {
        assert_eq!(
            CallDescriptor::from_calldata(TOKEN, [0xa9, 0x05]),
            Err(EncodingError::CalldataTooShort(2))
        );
    }

    #[test]
    fn checked_construction_rejects_mismatched_arguments() {
        let mut calldata = IERC20::transferCall {
            to: ALICE,
            amount: U256::from(5),
        }
        .abi_encode();
        calldata.truncate(4 + 32);

        let res = CallDescriptor::from_calldata_checked::<IERC20::transferCall>(TOKEN, &calldata);
        assert!(matches!(res, Err(EncodingError::ArgumentMismatch(_))));

        let res = CallDescriptor::from_calldata_checked::<IERC20::balanceOfCall>(
            TOKEN,
            IERC20::transferCall {
                to: ALICE,
                amount: U256::from(5),
            }
            .abi_encode(),
        );
        assert!(matches!(res, Err(EncodingError::ArgumentMismatch(_))));
    }
}
