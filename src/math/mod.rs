pub mod token_amount;

pub use token_amount::TokenAmount;
