// src/rpc/mod.rs

pub mod scheduler;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use scheduler::Scheduler;
pub use transport::{
    AccountSubscription, AccountUpdate, LedgerTransport, ProgramAccountUpdate,
    ProgramSubscription, RawAccount, SolanaTransport,
};
