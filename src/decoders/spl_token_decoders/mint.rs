// src/decoders/spl_token_decoders/mint.rs

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;
use spl_token_2022::{extension::StateWithExtensions, state::Mint};

// --- STRUCTURE DE SORTIE PROPRE ---
// Contient les informations que nous extrayons d'un compte de mint. Pour le
// suivi du burn, c'est l'offre courante qui compte : elle diminue à chaque
// burn de LP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMint {
    pub address: Pubkey,
    pub supply: u64,
    pub decimals: u8,
    pub mint_authority: Option<Pubkey>,
}

/// Décode les données brutes d'un compte de mint (SPL Token ou Token-2022)
/// et en extrait les informations essentielles.
pub fn decode_mint(address: &Pubkey, data: &[u8]) -> Result<DecodedMint> {
    // StateWithExtensions est capable de lire à la fois les anciens mints
    // (sans extensions) et les nouveaux mints Token-2022.
    let mint_state = StateWithExtensions::<Mint>::unpack(data)?;
    let base_mint = mint_state.base;

    Ok(DecodedMint {
        address: *address,
        supply: base_mint.supply,
        decimals: base_mint.decimals,
        mint_authority: base_mint.mint_authority.into(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use solana_sdk::pubkey::Pubkey;

    /// Encode un compte de mint SPL minimal (82 octets, sans extensions).
    /// Layout : mint_authority COption (36), supply u64 (8), decimals (1),
    /// is_initialized (1), freeze_authority COption (36).
    pub(crate) fn mint_account_bytes(supply: u64, decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; 82];
        data[36..44].copy_from_slice(&supply.to_le_bytes());
        data[44] = decimals;
        data[45] = 1; // is_initialized
        data
    }

    pub(crate) fn mint_account_bytes_with_authority(
        supply: u64,
        decimals: u8,
        authority: &Pubkey,
    ) -> Vec<u8> {
        let mut data = mint_account_bytes(supply, decimals);
        data[0..4].copy_from_slice(&1u32.to_le_bytes()); // COption::Some
        data[4..36].copy_from_slice(authority.as_ref());
        data
    }
}
