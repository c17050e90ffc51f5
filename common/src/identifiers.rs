//! Identifier types for economy entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Platform ids are non-empty ASCII digit strings.
            pub fn is_valid(&self) -> bool {
                !self.0.is_empty()
                    && self.0.len() <= 32
                    && self.0.chars().all(|c| c.is_ascii_digit())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

snowflake_id!(
    /// A community (guild) on the chat platform.
    GuildId
);

snowflake_id!(
    /// A platform user.
    UserId
);

snowflake_id!(
    /// A channel inside a guild.
    ChannelId
);

/// Stable identifier of an externally observed event (e.g. the id of the
/// announcement message that triggered a payout).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalEventId(String);

impl ExternalEventId {
    /// Create a new event ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExternalEventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Reference to a single account: one balance per user per guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    /// Guild the account lives in.
    pub guild_id: GuildId,
    /// Owning user.
    pub user_id: UserId,
}

impl AccountRef {
    /// Create a new account reference.
    pub fn new(guild_id: impl Into<GuildId>, user_id: impl Into<UserId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Create a canonical string representation.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.guild_id, self.user_id)
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Key of an in-progress multi-step game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

impl SessionKey {
    /// Create a new session key.
    pub fn new(
        guild_id: impl Into<GuildId>,
        channel_id: impl Into<ChannelId>,
        user_id: impl Into<UserId>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Account of the user this session belongs to.
    pub fn account(&self) -> AccountRef {
        AccountRef {
            guild_id: self.guild_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.guild_id, self.channel_id, self.user_id)
    }
}

/// Unique identifier for a transaction record.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new transaction ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_creation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_transaction_id_parse() {
        let uuid_str = "019456ab-1234-7def-8901-234567890abc";
        let id = TransactionId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_snowflake_validation() {
        assert!(UserId::new("123456789012345678").is_valid());
        assert!(!UserId::new("").is_valid());
        assert!(!GuildId::new("guild-1").is_valid());
    }

    #[test]
    fn test_account_ref_canonical() {
        let account = AccountRef::new("111", "222");
        assert_eq!(account.canonical(), "111:222");
    }

    #[test]
    fn test_session_key_account() {
        let key = SessionKey::new("1", "2", "3");
        assert_eq!(key.account(), AccountRef::new("1", "3"));
        assert_eq!(key.to_string(), "1:2:3");
    }
}
