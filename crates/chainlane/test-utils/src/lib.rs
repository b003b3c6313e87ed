#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use alloy_primitives::{address, Address};

pub mod contract;
pub mod node;
pub mod utils;

pub use contract::{Execution, MockContract, MockErc20};
pub use node::{MockNode, WorldState};
pub use utils::{account, signer};

pub const DEV_CHAIN_ID: u64 = 1337;

pub const MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Address the mock ERC-20 is deployed at in fixtures.
pub const TOKEN: Address = address!("00000000000000000000000000000000000070cE");

/// One gwei.
pub const GWEI: u128 = 1_000_000_000;
