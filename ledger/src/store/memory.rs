//! In-memory storage adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use capo_common::{
    AccountRef, Balance, EconomyError, ExternalEventId, ExternalEventRecord, GuildConfig, GuildId,
    Result, Timestamp, TransactionRecord,
};

use super::{EventInsert, StorageGateway};
use crate::account::Account;

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountRef, Account>,
    transactions: HashMap<AccountRef, Vec<TransactionRecord>>,
    configs: HashMap<GuildId, GuildConfig>,
    events: HashMap<(GuildId, ExternalEventId), ExternalEventRecord>,
}

/// Process-local storage. Every call yields to the scheduler first so
/// callers see the same suspension points a networked store would have.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    passing_commits: AtomicU32,
    failing_commits: AtomicU32,
    lost_acks: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            passing_commits: AtomicU32::new(0),
            failing_commits: AtomicU32::new(0),
            lost_acks: AtomicU32::new(0),
        }
    }

    /// Make the next `count` commits fail with a storage error.
    pub fn fail_next_commits(&self, count: u32) {
        self.fail_commits_after(0, count);
    }

    /// Let `skip` commits through, then fail the following `count`.
    pub fn fail_commits_after(&self, skip: u32, count: u32) {
        self.passing_commits.store(skip, Ordering::SeqCst);
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` commits land but report an unknown outcome,
    /// like a connection dropped while the database acknowledged.
    pub fn lose_next_commit_acks(&self, count: u32) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Number of stored accounts across all guilds.
    pub fn account_count(&self) -> usize {
        self.tables.read().accounts.len()
    }

    /// Every stored account.
    pub fn all_accounts(&self) -> Vec<Account> {
        self.tables.read().accounts.values().cloned().collect()
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageGateway for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_account(&self, account: &AccountRef) -> Result<Option<Account>> {
        tokio::task::yield_now().await;
        Ok(self.tables.read().accounts.get(account).cloned())
    }

    async fn upsert_account(&self, account: &AccountRef, now: Timestamp) -> Result<Account> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.write();
        let row = tables
            .accounts
            .entry(account.clone())
            .or_insert_with(|| Account::new(account.clone(), now));
        Ok(row.clone())
    }

    async fn set_balance(&self, account: &AccountRef, balance: Balance) -> Result<()> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.write();
        match tables.accounts.get_mut(account) {
            Some(row) => {
                row.balance = balance;
                Ok(())
            }
            None => Err(EconomyError::Storage(format!("no account {account}"))),
        }
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> Result<()> {
        tokio::task::yield_now().await;
        self.tables
            .write()
            .transactions
            .entry(record.account.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn commit(&self, account: &Account, record: Option<&TransactionRecord>) -> Result<()> {
        tokio::task::yield_now().await;
        if !Self::take_one(&self.passing_commits) && Self::take_one(&self.failing_commits) {
            debug!(account = %account.account, "Injected commit failure");
            return Err(EconomyError::Storage("injected commit failure".to_string()));
        }

        let mut tables = self.tables.write();
        tables
            .accounts
            .insert(account.account.clone(), account.clone());
        if let Some(record) = record {
            tables
                .transactions
                .entry(record.account.clone())
                .or_default()
                .push(record.clone());
        }
        drop(tables);

        if Self::take_one(&self.lost_acks) {
            debug!(account = %account.account, "Injected lost commit acknowledgement");
            return Err(EconomyError::CommitUnknown("injected lost ack".to_string()));
        }
        Ok(())
    }

    async fn transactions(&self, account: &AccountRef) -> Result<Vec<TransactionRecord>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables
            .read()
            .transactions
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_config(&self, guild_id: &GuildId) -> Result<GuildConfig> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.write();
        let config = tables
            .configs
            .entry(guild_id.clone())
            .or_insert_with(|| GuildConfig::new(guild_id.clone()));
        Ok(config.clone())
    }

    async fn save_config(&self, config: &GuildConfig) -> Result<()> {
        tokio::task::yield_now().await;
        self.tables
            .write()
            .configs
            .insert(config.guild_id.clone(), config.clone());
        Ok(())
    }

    async fn has_event_record(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(self
            .tables
            .read()
            .events
            .contains_key(&(guild_id.clone(), event_id.clone())))
    }

    async fn record_event(&self, record: &ExternalEventRecord) -> Result<EventInsert> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.write();
        let key = (record.guild_id.clone(), record.event_id.clone());
        if tables.events.contains_key(&key) {
            return Ok(EventInsert::Duplicate);
        }
        tables.events.insert(key, record.clone());
        Ok(EventInsert::Inserted)
    }

    async fn release_event(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<()> {
        tokio::task::yield_now().await;
        self.tables
            .write()
            .events
            .remove(&(guild_id.clone(), event_id.clone()));
        Ok(())
    }

    async fn query_ranked_accounts(
        &self,
        guild_id: &GuildId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Account>, u64)> {
        tokio::task::yield_now().await;
        let tables = self.tables.read();
        let mut rows: Vec<&Account> = tables
            .accounts
            .values()
            .filter(|a| &a.account.guild_id == guild_id)
            .collect();
        let total = rows.len() as u64;

        rows.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.account.user_id.cmp(&b.account.user_id))
        });

        let page = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capo_common::UserId;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let account = AccountRef::new("1", "2");
        let now = capo_common::now();

        let first = store.upsert_account(&account, now).await.unwrap();
        let mut changed = first.clone();
        changed.balance = 50;
        store.commit(&changed, None).await.unwrap();

        let again = store.upsert_account(&account, now).await.unwrap();
        assert_eq!(again.balance, 50);
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn test_event_uniqueness() {
        let store = MemoryStore::new();
        let record = ExternalEventRecord {
            guild_id: GuildId::new("1"),
            event_id: ExternalEventId::new("m1"),
            recipient: UserId::new("2"),
            amount: 100,
            recorded_at: capo_common::now(),
        };

        assert_eq!(store.record_event(&record).await.unwrap(), EventInsert::Inserted);
        assert_eq!(store.record_event(&record).await.unwrap(), EventInsert::Duplicate);
        assert!(store
            .has_event_record(&record.guild_id, &record.event_id)
            .await
            .unwrap());

        store
            .release_event(&record.guild_id, &record.event_id)
            .await
            .unwrap();
        assert_eq!(store.record_event(&record).await.unwrap(), EventInsert::Inserted);
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryStore::new();
        let account = store
            .upsert_account(&AccountRef::new("1", "2"), capo_common::now())
            .await
            .unwrap();

        store.fail_next_commits(1);
        assert!(store.commit(&account, None).await.is_err());
        assert!(store.commit(&account, None).await.is_ok());

        store.fail_commits_after(1, 1);
        assert!(store.commit(&account, None).await.is_ok());
        assert!(store.commit(&account, None).await.is_err());
        assert!(store.commit(&account, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_lost_ack_still_writes() {
        let store = MemoryStore::new();
        let mut account = store
            .upsert_account(&AccountRef::new("1", "2"), capo_common::now())
            .await
            .unwrap();
        account.balance = 40;

        store.lose_next_commit_acks(1);
        let err = store.commit(&account, None).await.unwrap_err();
        assert!(err.outcome_unknown());
        let stored = store.get_account(&account.account).await.unwrap().unwrap();
        assert_eq!(stored.balance, 40);
    }

    #[tokio::test]
    async fn test_config_auto_created() {
        let store = MemoryStore::new();
        let config = store.get_config(&GuildId::new("7")).await.unwrap();
        assert_eq!(config.currency_name, "Capo Cash");
    }

    #[tokio::test]
    async fn test_ranked_accounts_order_and_paging() {
        let store = MemoryStore::new();
        let now = capo_common::now();
        for (user, balance) in [("10", 5), ("11", 50), ("12", 50), ("13", 1)] {
            let mut account = store
                .upsert_account(&AccountRef::new("1", user), now)
                .await
                .unwrap();
            account.balance = balance;
            store.commit(&account, None).await.unwrap();
        }
        store
            .upsert_account(&AccountRef::new("2", "99"), now)
            .await
            .unwrap();

        let (rows, total) = store
            .query_ranked_accounts(&GuildId::new("1"), 0, 2)
            .await
            .unwrap();
        assert_eq!(total, 4);
        let users: Vec<_> = rows.iter().map(|a| a.account.user_id.as_str()).collect();
        assert_eq!(users, vec!["11", "12"]);

        let (rows, _) = store
            .query_ranked_accounts(&GuildId::new("1"), 2, 2)
            .await
            .unwrap();
        assert_eq!(rows[0].balance, 5);
        assert_eq!(rows[1].balance, 1);
    }
}
