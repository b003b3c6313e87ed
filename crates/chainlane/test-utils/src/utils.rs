use alloy_primitives::Address;
use alloy_signer_local::{coins_bip39::English, PrivateKeySigner};

use crate::MNEMONIC;

pub fn signer(index: u32) -> PrivateKeySigner {
    alloy_signer_local::MnemonicBuilder::<English>::default()
        .phrase(MNEMONIC)
        .index(index)
        .expect("Failed to set index")
        .build()
        .expect("Failed to create signer")
}

pub fn account(index: u32) -> Address {
    let signer = signer(index);
    signer.address()
}
