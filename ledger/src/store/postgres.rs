//! PostgreSQL storage adapter.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use capo_common::{
    AccountRef, Balance, EconomyError, ExternalEventId, ExternalEventRecord, GuildConfig, GuildId,
    Initiator, Result, Timestamp, TransactionCategory, TransactionId, TransactionRecord,
};

use super::{EventInsert, StorageGateway};
use crate::account::{Account, ClaimState};

fn db_err(e: sqlx::Error) -> EconomyError {
    EconomyError::Storage(e.to_string())
}

fn to_db_amount(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| EconomyError::Storage(format!("amount {value} exceeds BIGINT")))
}

fn from_db_amount(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| EconomyError::Storage(format!("negative stored amount {value}")))
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let guild_id: String = row.try_get("guild_id").map_err(db_err)?;
    let user_id: String = row.try_get("user_id").map_err(db_err)?;
    let daily_streak: i32 = row.try_get("daily_streak").map_err(db_err)?;
    let weekly_streak: i32 = row.try_get("weekly_streak").map_err(db_err)?;

    Ok(Account {
        account: AccountRef::new(guild_id, user_id),
        balance: from_db_amount(row.try_get("balance").map_err(db_err)?)?,
        daily: ClaimState {
            last_claimed_at: row.try_get("last_daily_at").map_err(db_err)?,
            streak: daily_streak.max(0) as u32,
        },
        weekly: ClaimState {
            last_claimed_at: row.try_get("last_weekly_at").map_err(db_err)?,
            streak: weekly_streak.max(0) as u32,
        },
        robbable: row.try_get("robbable").map_err(db_err)?,
        robbable_locked_until: row.try_get("robbable_locked_until").map_err(db_err)?,
        last_rob_at: row.try_get("last_rob_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord> {
    let guild_id: String = row.try_get("guild_id").map_err(db_err)?;
    let user_id: String = row.try_get("user_id").map_err(db_err)?;
    let category: String = row.try_get("category").map_err(db_err)?;
    let actor: String = row.try_get("actor").map_err(db_err)?;
    let external_event_id: Option<String> = row.try_get("external_event_id").map_err(db_err)?;

    Ok(TransactionRecord {
        id: TransactionId::from_uuid(row.try_get("id").map_err(db_err)?),
        account: AccountRef::new(guild_id, user_id),
        amount: row.try_get("amount").map_err(db_err)?,
        balance_before: from_db_amount(row.try_get("balance_before").map_err(db_err)?)?,
        balance_after: from_db_amount(row.try_get("balance_after").map_err(db_err)?)?,
        category: TransactionCategory::parse(&category)
            .ok_or_else(|| EconomyError::Storage(format!("unknown category {category}")))?,
        reason: row.try_get("reason").map_err(db_err)?,
        initiator: Initiator::from_column(&actor),
        external_event_id: external_event_id.map(ExternalEventId::new),
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

const UPSERT_ACCOUNT: &str = "
    INSERT INTO accounts (guild_id, user_id, balance, last_daily_at, daily_streak,
                          last_weekly_at, weekly_streak, robbable, robbable_locked_until,
                          last_rob_at, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (guild_id, user_id) DO UPDATE SET
        balance = EXCLUDED.balance,
        last_daily_at = EXCLUDED.last_daily_at,
        daily_streak = EXCLUDED.daily_streak,
        last_weekly_at = EXCLUDED.last_weekly_at,
        weekly_streak = EXCLUDED.weekly_streak,
        robbable = EXCLUDED.robbable,
        robbable_locked_until = EXCLUDED.robbable_locked_until,
        last_rob_at = EXCLUDED.last_rob_at,
        updated_at = EXCLUDED.updated_at";

const INSERT_TRANSACTION: &str = "
    INSERT INTO transactions (id, guild_id, user_id, amount, balance_before, balance_after,
                              category, reason, actor, external_event_id, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

/// Postgres-backed storage. Schema lives in `ledger/migrations`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        info!(max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EconomyError::Storage(e.to_string()))
    }

    fn bind_record<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        record: &'q TransactionRecord,
    ) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
        Ok(query
            .bind(*record.id.as_uuid())
            .bind(record.account.guild_id.as_str())
            .bind(record.account.user_id.as_str())
            .bind(record.amount)
            .bind(to_db_amount(record.balance_before)?)
            .bind(to_db_amount(record.balance_after)?)
            .bind(record.category.as_str())
            .bind(record.reason.as_str())
            .bind(record.initiator.as_column())
            .bind(record.external_event_id.as_ref().map(|id| id.as_str()))
            .bind(record.created_at))
    }
}

#[async_trait]
impl StorageGateway for PgStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn get_account(&self, account: &AccountRef) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE guild_id = $1 AND user_id = $2")
            .bind(account.guild_id.as_str())
            .bind(account.user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn upsert_account(&self, account: &AccountRef, now: Timestamp) -> Result<Account> {
        let row = sqlx::query(
            "INSERT INTO accounts (guild_id, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (guild_id, user_id) DO UPDATE SET guild_id = EXCLUDED.guild_id
             RETURNING *",
        )
        .bind(account.guild_id.as_str())
        .bind(account.user_id.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        account_from_row(&row)
    }

    async fn set_balance(&self, account: &AccountRef, balance: Balance) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET balance = $3, updated_at = now()
             WHERE guild_id = $1 AND user_id = $2",
        )
        .bind(account.guild_id.as_str())
        .bind(account.user_id.as_str())
        .bind(to_db_amount(balance)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EconomyError::Storage(format!("no account {account}")));
        }
        Ok(())
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> Result<()> {
        Self::bind_record(sqlx::query(INSERT_TRANSACTION), record)?
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self, account, record), fields(account = %account.account))]
    async fn commit(&self, account: &Account, record: Option<&TransactionRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(UPSERT_ACCOUNT)
            .bind(account.account.guild_id.as_str())
            .bind(account.account.user_id.as_str())
            .bind(to_db_amount(account.balance)?)
            .bind(account.daily.last_claimed_at)
            .bind(account.daily.streak.min(i32::MAX as u32) as i32)
            .bind(account.weekly.last_claimed_at)
            .bind(account.weekly.streak.min(i32::MAX as u32) as i32)
            .bind(account.robbable)
            .bind(account.robbable_locked_until)
            .bind(account.last_rob_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if let Some(record) = record {
            Self::bind_record(sqlx::query(INSERT_TRANSACTION), record)?
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| EconomyError::CommitUnknown(e.to_string()))?;
        debug!(with_record = record.is_some(), "Account committed");
        Ok(())
    }

    async fn transactions(&self, account: &AccountRef) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE guild_id = $1 AND user_id = $2 ORDER BY seq",
        )
        .bind(account.guild_id.as_str())
        .bind(account.user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn get_config(&self, guild_id: &GuildId) -> Result<GuildConfig> {
        let row = sqlx::query("SELECT settings FROM guild_config WHERE guild_id = $1")
            .bind(guild_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        if let Some(row) = row {
            let settings: String = row.try_get("settings").map_err(db_err)?;
            return Ok(serde_json::from_str(&settings)?);
        }

        let config = GuildConfig::new(guild_id.clone());
        sqlx::query(
            "INSERT INTO guild_config (guild_id, settings) VALUES ($1, $2)
             ON CONFLICT (guild_id) DO NOTHING",
        )
        .bind(guild_id.as_str())
        .bind(serde_json::to_string(&config)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(config)
    }

    async fn save_config(&self, config: &GuildConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO guild_config (guild_id, settings) VALUES ($1, $2)
             ON CONFLICT (guild_id) DO UPDATE SET settings = EXCLUDED.settings",
        )
        .bind(config.guild_id.as_str())
        .bind(serde_json::to_string(config)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn has_event_record(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM external_events WHERE guild_id = $1 AND event_id = $2")
            .bind(guild_id.as_str())
            .bind(event_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn record_event(&self, record: &ExternalEventRecord) -> Result<EventInsert> {
        let result = sqlx::query(
            "INSERT INTO external_events (guild_id, event_id, recipient, amount, recorded_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT ON CONSTRAINT external_events_unique DO NOTHING",
        )
        .bind(record.guild_id.as_str())
        .bind(record.event_id.as_str())
        .bind(record.recipient.as_str())
        .bind(to_db_amount(record.amount)?)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result.rows_affected() == 0 {
            EventInsert::Duplicate
        } else {
            EventInsert::Inserted
        })
    }

    async fn release_event(&self, guild_id: &GuildId, event_id: &ExternalEventId) -> Result<()> {
        sqlx::query("DELETE FROM external_events WHERE guild_id = $1 AND event_id = $2")
            .bind(guild_id.as_str())
            .bind(event_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn query_ranked_accounts(
        &self,
        guild_id: &GuildId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Account>, u64)> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM accounts WHERE guild_id = $1")
            .bind(guild_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .try_get("total")
            .map_err(db_err)?;

        let rows = sqlx::query(
            "SELECT * FROM accounts WHERE guild_id = $1
             ORDER BY balance DESC, user_id ASC
             OFFSET $2 LIMIT $3",
        )
        .bind(guild_id.as_str())
        .bind(to_db_amount(offset)?)
        .bind(to_db_amount(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let accounts = rows.iter().map(account_from_row).collect::<Result<Vec<_>>>()?;
        Ok((accounts, from_db_amount(total)?))
    }
}
