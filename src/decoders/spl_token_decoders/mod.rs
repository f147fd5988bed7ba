pub mod account;
pub mod mint;

pub use account::{decode_account, DecodedSplAccount};
pub use mint::{decode_mint, DecodedMint};
