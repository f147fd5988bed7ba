// src/decoders/mod.rs

// Les décodeurs sont des fonctions pures `bytes -> T` : toute la logique de
// flux vit dans `state`, ici on ne fait que lire des layouts.
pub mod metaplex;
pub mod raydium;
pub mod spl_token_decoders;
