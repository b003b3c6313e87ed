use alloy_primitives::{keccak256, Address, Bytes, LogData, B256, U256};
use alloy_sol_types::{Revert, SolError, SolEvent, SolInterface, SolValue};
use chainlane_primitives::contracts::IERC20::{self, IERC20Calls};

use crate::node::WorldState;

/// Intrinsic gas of any transaction.
pub const BASE_GAS: u64 = 21_000;

/// Result of a successful contract execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: Bytes,
    pub logs: Vec<LogData>,
    pub gas_used: u64,
}

/// Code the in-memory node runs for calls to a deployed address.
///
/// An `Err` carries revert data. State changes made before a revert are
/// discarded by the caller.
pub trait MockContract: Send + Sync + std::fmt::Debug {
    fn call(
        &self,
        state: &mut WorldState,
        from: Address,
        to: Address,
        input: &Bytes,
        value: U256,
    ) -> Result<Execution, Bytes>;
}

/// Minimal ERC-20 storing balances and allowances in the world state.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockErc20;

fn revert(reason: &str) -> Bytes {
    Revert {
        reason: reason.into(),
    }
    .abi_encode()
    .into()
}

fn balance_slot(holder: Address) -> B256 {
    holder.into_word()
}

fn allowance_slot(owner: Address, spender: Address) -> B256 {
    keccak256([owner.as_slice(), spender.as_slice()].concat())
}

fn supply_slot() -> B256 {
    keccak256(b"totalSupply")
}

impl MockErc20 {
    /// Credits `amount` tokens to `holder` out of thin air.
    pub fn mint(state: &mut WorldState, token: Address, holder: Address, amount: U256) {
        let balance = state.storage(token, balance_slot(holder));
        state.set_storage(token, balance_slot(holder), balance + amount);
        let supply = state.storage(token, supply_slot());
        state.set_storage(token, supply_slot(), supply + amount);
    }

    pub fn balance_of(state: &WorldState, token: Address, holder: Address) -> U256 {
        state.storage(token, balance_slot(holder))
    }

    fn move_tokens(
        state: &mut WorldState,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<LogData, Bytes> {
        let from_balance = state.storage(token, balance_slot(from));
        if from_balance < amount {
            return Err(revert("insufficient balance"));
        }
        state.set_storage(token, balance_slot(from), from_balance - amount);
        let to_balance = state.storage(token, balance_slot(to));
        state.set_storage(token, balance_slot(to), to_balance + amount);

        Ok(IERC20::Transfer {
            from,
            to,
            value: amount,
        }
        .encode_log_data())
    }
}

impl MockContract for MockErc20 {
    fn call(
        &self,
        state: &mut WorldState,
        from: Address,
        to: Address,
        input: &Bytes,
        value: U256,
    ) -> Result<Execution, Bytes> {
        if !value.is_zero() {
            return Err(revert("not payable"));
        }
        let call = IERC20Calls::abi_decode(input).map_err(|_| Bytes::new())?;

        let read = |output: Vec<u8>| Execution {
            output: output.into(),
            logs: Vec::new(),
            gas_used: BASE_GAS + 2_600,
        };
        let write = |log: LogData| Execution {
            output: true.abi_encode().into(),
            logs: vec![log],
            gas_used: BASE_GAS + 30_000,
        };

        match call {
            IERC20Calls::totalSupply(_) => Ok(read(state.storage(to, supply_slot()).abi_encode())),
            IERC20Calls::balanceOf(call) => {
                Ok(read(state.storage(to, balance_slot(call.account)).abi_encode()))
            }
            IERC20Calls::allowance(call) => Ok(read(
                state
                    .storage(to, allowance_slot(call.owner, call.spender))
                    .abi_encode(),
            )),
            IERC20Calls::decimals(_) => Ok(read(<alloy_sol_types::sol_data::Uint<8> as alloy_sol_types::SolType>::abi_encode(&18u8))),
            IERC20Calls::transfer(call) => {
                Self::move_tokens(state, to, from, call.to, call.amount).map(write)
            }
            IERC20Calls::approve(call) => {
                state.set_storage(to, allowance_slot(from, call.spender), call.amount);
                Ok(write(
                    IERC20::Approval {
                        owner: from,
                        spender: call.spender,
                        value: call.amount,
                    }
                    .encode_log_data(),
                ))
            }
            IERC20Calls::transferFrom(call) => {
                let slot = allowance_slot(call.from, from);
                let allowance = state.storage(to, slot);
                if allowance < call.amount {
                    return Err(revert("insufficient allowance"));
                }
                state.set_storage(to, slot, allowance - call.amount);
                Self::move_tokens(state, to, call.from, call.to, call.amount).map(write)
            }
        }
    }
}
