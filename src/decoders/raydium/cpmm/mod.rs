pub mod pool;

// On ré-exporte les éléments principaux pour un accès plus facile
pub use pool::{
    decode_pool, DecodedCpmmPool, CPMM_POOL_PROGRAM_ID, CPMM_POOL_STATE_SIZE,
};
