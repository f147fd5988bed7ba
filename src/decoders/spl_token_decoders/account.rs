// src/decoders/spl_token_decoders/account.rs

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;
use spl_token_2022::{extension::StateWithExtensions, state::Account as TokenAccount};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSplAccount {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

/// Décode les données brutes d'un compte de jeton (SPL Token ou Token-2022).
pub fn decode_account(address: &Pubkey, data: &[u8]) -> Result<DecodedSplAccount> {
    let account_state = StateWithExtensions::<TokenAccount>::unpack(data)?;
    let base = account_state.base;
    Ok(DecodedSplAccount {
        address: *address,
        mint: base.mint,
        owner: base.owner,
        amount: base.amount,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use solana_sdk::pubkey::Pubkey;

    /// Encode un compte de jeton SPL minimal (165 octets, sans extensions).
    /// Layout : mint (32), owner (32), amount u64 (8), delegate COption (36),
    /// state (1), is_native COption (12), delegated_amount (8),
    /// close_authority COption (36).
    pub(crate) fn token_account_bytes(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
        let mut data = vec![0u8; 165];
        data[0..32].copy_from_slice(mint.as_ref());
        data[32..64].copy_from_slice(owner.as_ref());
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data[108] = 1; // state = Initialized
        data
    }
}
