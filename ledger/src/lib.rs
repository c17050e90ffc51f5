//! Capo Cash ledger
//!
//! Sole authority over account balances. Every applied change is persisted
//! together with an immutable transaction record, and changes to one
//! account are serialized through that account's actor.

pub mod account;
mod actor;
pub mod balance;
pub mod claims;
pub mod engine;
pub mod journal;
pub mod rank;
pub mod store;

pub use account::{Account, ClaimState};
pub use balance::{ApplyOutcome, MutationRequest};
pub use claims::ClaimOutcome;
pub use engine::{LedgerConfig, LedgerEngine};
pub use journal::{AuditFailure, AuditReport};
pub use rank::{LeaderboardPage, LeaderboardRow};
pub use store::{EventInsert, MemoryStore, PgStore, SharedStore, StorageGateway};
