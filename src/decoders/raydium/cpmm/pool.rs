// src/decoders/raydium/cpmm/pool.rs

use anyhow::{bail, Result};
use bytemuck::{from_bytes, Pod, Zeroable};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Le programme CPMM de Raydium, créateur de tous les pools que l'on surveille.
pub const CPMM_POOL_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");

// Discriminator pour les comptes PoolState du programme CPMM
const CPMM_POOL_STATE_DISCRIMINATOR: [u8; 8] = [247, 237, 227, 245, 215, 195, 222, 70];

/// Taille totale d'un compte PoolState (discriminateur inclus). C'est le
/// filtre `dataSize` de l'abonnement programme : un seul abonnement, tous
/// les pools.
pub const CPMM_POOL_STATE_SIZE: usize = 8 + std::mem::size_of::<CpmmPoolStateData>();

// --- STRUCTURE DE SORTIE PROPRE ---
// Contient les champs du PoolState dont le screener a réellement besoin :
// les comptes référencés (pour ouvrir les vues dépendantes), l'offre LP
// initiale et l'heure d'ouverture (pour les minuteries du cycle de vie).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCpmmPool {
    pub address: Pubkey,
    pub amm_config: Pubkey,
    pub lp_mint: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub vault_a: Pubkey,
    pub vault_b: Pubkey,
    pub status: u8,
    pub lp_decimals: u8,
    pub mint_a_decimals: u8,
    pub mint_b_decimals: u8,
    /// L'offre de LP mintée à la création du pool. C'est la référence du
    /// calcul de burn : tout ce qui manque à l'offre courante a été brûlé.
    pub lp_supply: u64,
    /// Heure d'ouverture du trading, en secondes unix.
    pub open_time: u64,
}

// --- STRUCTURE DE DONNÉES BRUTES (Miroir exact de l'IDL) ---
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
struct CpmmPoolStateData {
    pub amm_config: Pubkey,
    pub pool_creator: Pubkey,
    pub vault_a: Pubkey,
    pub vault_b: Pubkey,
    pub lp_mint: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub mint_a_program: Pubkey,
    pub mint_b_program: Pubkey,
    pub observation_key: Pubkey,
    pub auth_bump: u8,
    pub status: u8,
    pub lp_decimals: u8,
    pub mint_a_decimals: u8,
    pub mint_b_decimals: u8,
    pub lp_supply: u64,
    pub protocol_fees_mint_a: u64,
    pub protocol_fees_mint_b: u64,
    pub fund_fees_mint_a: u64,
    pub fund_fees_mint_b: u64,
    pub open_time: u64,
    pub recent_epoch: u64,
    pub creator_fee_on: u8,
    pub enable_creator_fee: u8, // bool est 1 byte
    pub padding1: [u8; 6],
    pub creator_fees_mint_a: u64,
    pub creator_fees_mint_b: u64,
    // Padding final réduit
    pub padding: [u64; 28],
}

/// Tente de décoder les données brutes d'un compte Raydium CPMM PoolState.
pub fn decode_pool(address: &Pubkey, data: &[u8]) -> Result<DecodedCpmmPool> {
    // Étape 1: Vérifier le discriminateur. C'est le seul moyen fiable d'identifier un PoolState.
    if data.get(..8) != Some(&CPMM_POOL_STATE_DISCRIMINATOR) {
        bail!("Invalid discriminator. Not a Raydium CPMM PoolState account.");
    }

    let data_slice = &data[8..];

    // Étape 2: Vérifier que les données sont AU MOINS assez longues.
    // Cela nous protège contre les données corrompues et permet les futures mises à jour du programme.
    if data_slice.len() < std::mem::size_of::<CpmmPoolStateData>() {
        bail!(
            "CPMM PoolState data length mismatch. Expected at least {}, got {}.",
            std::mem::size_of::<CpmmPoolStateData>(),
            data_slice.len()
        );
    }

    // Étape 3: "Caster" les données en utilisant la taille de notre struct.
    // On ignore les octets supplémentaires s'il y en a.
    let pool_struct: &CpmmPoolStateData =
        from_bytes(&data_slice[..std::mem::size_of::<CpmmPoolStateData>()]);

    // Étape 4: Créer la sortie propre et unifiée
    Ok(DecodedCpmmPool {
        address: *address,
        amm_config: pool_struct.amm_config,
        lp_mint: pool_struct.lp_mint,
        mint_a: pool_struct.mint_a,
        mint_b: pool_struct.mint_b,
        vault_a: pool_struct.vault_a,
        vault_b: pool_struct.vault_b,
        status: pool_struct.status,
        lp_decimals: pool_struct.lp_decimals,
        mint_a_decimals: pool_struct.mint_a_decimals,
        mint_b_decimals: pool_struct.mint_b_decimals,
        lp_supply: pool_struct.lp_supply,
        open_time: pool_struct.open_time,
    })
}
