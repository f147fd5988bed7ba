// src/decoders/metaplex.rs

use anyhow::{bail, Result};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

/// Le programme Token Metadata de Metaplex.
pub const METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

// Le premier octet d'un compte de métadonnées V1 (enum Key::MetadataV1).
const METADATA_V1_KEY: u8 = 4;

// --- STRUCTURE DE DONNÉES BRUTES ---
// Préfixe borsh du compte de métadonnées. On s'arrête après l'uri : la
// suite (frais, créateurs, collections...) ne sert pas au screener, et
// borsh tolère les octets restants quand on désérialise depuis un reader.
#[derive(BorshSerialize, BorshDeserialize)]
struct MetadataPrefix {
    key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    name: String,
    symbol: String,
    uri: String,
}

// --- STRUCTURE DE SORTIE PROPRE ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMetadata {
    pub update_authority: Pubkey,
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

/// Dérive l'adresse du compte de métadonnées d'un mint. La dérivation est
/// déterministe : seed "metadata", programme, mint.
pub fn find_metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

/// Décode les données brutes d'un compte de métadonnées Metaplex.
/// Les chaînes sont stockées à taille fixe et complétées de NUL : on les nettoie.
pub fn decode_metadata(_address: &Pubkey, data: &[u8]) -> Result<DecodedMetadata> {
    if data.first() != Some(&METADATA_V1_KEY) {
        bail!("Invalid key byte. Not a Metaplex MetadataV1 account.");
    }

    let mut reader = data;
    let prefix = MetadataPrefix::deserialize(&mut reader)?;

    Ok(DecodedMetadata {
        update_authority: Pubkey::new_from_array(prefix.update_authority),
        mint: Pubkey::new_from_array(prefix.mint),
        name: prefix.name.trim_end_matches('\0').to_string(),
        symbol: prefix.symbol.trim_end_matches('\0').to_string(),
        uri: prefix.uri.trim_end_matches('\0').to_string(),
    })
}
