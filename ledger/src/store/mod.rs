//! Storage gateway contract and adapters.
//!
//! The ledger never talks to a database directly; it consumes this trait.
//! `commit` is the only write the ledger uses for balance changes and must
//! persist the account row and its transaction record atomically.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use capo_common::{
    AccountRef, Balance, ExternalEventId, ExternalEventRecord, GuildConfig, GuildId, Result,
    Timestamp, TransactionRecord,
};

use crate::account::Account;

/// Result of inserting an external event marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventInsert {
    /// The marker was written; this caller owns the credit.
    Inserted,
    /// A marker for this event already exists.
    Duplicate,
}

/// Durable storage consumed by the ledger.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Fetch an account.
    async fn get_account(&self, account: &AccountRef) -> Result<Option<Account>>;

    /// Fetch an account, creating it with a zero balance if absent.
    async fn upsert_account(&self, account: &AccountRef, now: Timestamp) -> Result<Account>;

    /// Overwrite a balance without a log record. Repair tooling only.
    async fn set_balance(&self, account: &AccountRef, balance: Balance) -> Result<()>;

    /// Append a record without touching the balance. Repair tooling only.
    async fn append_transaction(&self, record: &TransactionRecord) -> Result<()>;

    /// Persist the full account row and, if given, its transaction record in
    /// one atomic write.
    async fn commit(&self, account: &Account, record: Option<&TransactionRecord>) -> Result<()>;

    /// Transaction log of an account, in append order.
    async fn transactions(&self, account: &AccountRef) -> Result<Vec<TransactionRecord>>;

    /// Guild settings, created with defaults on first access.
    async fn get_config(&self, guild_id: &GuildId) -> Result<GuildConfig>;

    /// Replace guild settings.
    async fn save_config(&self, config: &GuildConfig) -> Result<()>;

    /// Whether a marker exists for an external event.
    async fn has_event_record(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<bool>;

    /// Insert a marker; uniqueness on `(guild_id, event_id)` is enforced here.
    async fn record_event(&self, record: &ExternalEventRecord) -> Result<EventInsert>;

    /// Remove a marker whose credit could not be applied.
    async fn release_event(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<()>;

    /// Accounts of a guild ordered by balance (descending), then user id,
    /// with the total account count.
    async fn query_ranked_accounts(
        &self,
        guild_id: &GuildId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Account>, u64)>;
}

/// Shared storage handle.
pub type SharedStore = Arc<dyn StorageGateway>;
