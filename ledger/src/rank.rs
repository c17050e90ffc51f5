//! Balance leaderboard.

use capo_common::{Balance, GuildId, Result, UserId};
use serde::{Deserialize, Serialize};

use crate::store::StorageGateway;

/// Largest page size served.
pub const MAX_PER_PAGE: u64 = 25;

/// One ranked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// 1-based position in the guild.
    pub rank: u64,
    pub user_id: UserId,
    pub balance: Balance,
}

/// A page of the ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub guild_id: GuildId,
    /// 1-based page number actually served.
    pub page: u64,
    pub per_page: u64,
    pub total_accounts: u64,
    pub page_count: u64,
    pub rows: Vec<LeaderboardRow>,
}

/// Read one page of the ranking. `page` is 1-based (0 is read as 1) and
/// `per_page` is clamped to `1..=MAX_PER_PAGE`.
pub async fn leaderboard(
    store: &dyn StorageGateway,
    guild_id: &GuildId,
    page: u64,
    per_page: u64,
) -> Result<LeaderboardPage> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let offset = (page - 1).saturating_mul(per_page);

    let (accounts, total_accounts) = store
        .query_ranked_accounts(guild_id, offset, per_page)
        .await?;

    let rows = accounts
        .into_iter()
        .zip(offset + 1..)
        .map(|(account, rank)| LeaderboardRow {
            rank,
            user_id: account.account.user_id,
            balance: account.balance,
        })
        .collect();

    Ok(LeaderboardPage {
        guild_id: guild_id.clone(),
        page,
        per_page,
        total_accounts,
        page_count: total_accounts.div_ceil(per_page),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use capo_common::AccountRef;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let now = capo_common::now();
        for i in 0..30u64 {
            let mut account = store
                .upsert_account(&AccountRef::new("1", format!("{}", 100 + i)), now)
                .await
                .unwrap();
            account.balance = i * 10;
            store.commit(&account, None).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_first_page_ranks_from_one() {
        let store = seeded().await;
        let page = leaderboard(&store, &GuildId::new("1"), 1, 10).await.unwrap();

        assert_eq!(page.total_accounts, 30);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.rows.len(), 10);
        assert_eq!(page.rows[0].rank, 1);
        assert_eq!(page.rows[0].balance, 290);
        assert_eq!(page.rows[9].rank, 10);
    }

    #[tokio::test]
    async fn test_later_page_continues_ranks() {
        let store = seeded().await;
        let page = leaderboard(&store, &GuildId::new("1"), 3, 10).await.unwrap();
        assert_eq!(page.rows[0].rank, 21);
        assert_eq!(page.rows[0].balance, 90);
    }

    #[tokio::test]
    async fn test_per_page_is_clamped() {
        let store = seeded().await;
        let page = leaderboard(&store, &GuildId::new("1"), 0, 500).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.rows.len(), 25);
        assert_eq!(page.page_count, 2);

        let page = leaderboard(&store, &GuildId::new("1"), 1, 0).await.unwrap();
        assert_eq!(page.per_page, 1);
        assert_eq!(page.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_guild() {
        let store = MemoryStore::new();
        let page = leaderboard(&store, &GuildId::new("9"), 1, 10).await.unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.page_count, 0);
    }
}
