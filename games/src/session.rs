//! In-progress game sessions with a TTL.

use capo_common::{constants, Rejection, SessionKey, SharedClock, Timestamp, UserId};
use chrono::Duration;
use dashmap::DashMap;
use tracing::debug;

/// Stored session.
#[derive(Debug, Clone)]
struct SessionEntry<S> {
    state: S,
    owner: UserId,
    created_at: Timestamp,
}

impl<S> SessionEntry<S> {
    fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// Configuration for a session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Lifetime of a session, measured from creation.
    pub ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            ttl: constants::session_ttl(),
        }
    }
}

/// Keyed game state. Expiry is checked when a session is touched; there is
/// no background sweep.
pub struct SessionStore<S> {
    sessions: DashMap<SessionKey, SessionEntry<S>>,
    clock: SharedClock,
    config: SessionStoreConfig,
}

impl<S: Clone> SessionStore<S> {
    /// Create a store with the default TTL.
    pub fn new(clock: SharedClock) -> Self {
        Self::with_config(clock, SessionStoreConfig::default())
    }

    /// Create a store with custom configuration.
    pub fn with_config(clock: SharedClock, config: SessionStoreConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            config,
        }
    }

    /// Session state for `key`, or `None` if absent or expired. Expired
    /// sessions are removed.
    pub fn get(&self, key: &SessionKey) -> Option<S> {
        self.lookup(key, &key.user_id).ok()
    }

    /// Session state for `key` on behalf of `actor`.
    ///
    /// Fails with `SessionNotFound`, `SessionExpired` (the session is
    /// removed) or `SessionNotOwned` (the session is left untouched).
    pub fn lookup(&self, key: &SessionKey, actor: &UserId) -> Result<S, Rejection> {
        let now = self.clock.now();
        let Some(entry) = self.sessions.get(key) else {
            return Err(Rejection::SessionNotFound);
        };

        if entry.is_expired(now, self.config.ttl) {
            drop(entry);
            self.sessions.remove(key);
            debug!(session = %key, "Session expired");
            return Err(Rejection::SessionExpired);
        }

        if &entry.owner != actor {
            debug!(session = %key, actor = %actor, "Session access by non-owner");
            return Err(Rejection::SessionNotOwned);
        }

        Ok(entry.state.clone())
    }

    /// Whether a live session exists for `key`.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.get(key).is_some()
    }

    /// Start a session for `key`, replacing whatever was stored. The TTL
    /// runs from now.
    pub fn put(&self, key: SessionKey, state: S) {
        let owner = key.user_id.clone();
        self.sessions.insert(
            key,
            SessionEntry {
                state,
                owner,
                created_at: self.clock.now(),
            },
        );
    }

    /// Replace the state of a live session, keeping its creation time.
    ///
    /// A session that expired or vanished since it was looked up is not
    /// brought back: the expired entry is removed and the call fails.
    pub fn update(&self, key: &SessionKey, state: S) -> Result<(), Rejection> {
        let now = self.clock.now();
        let Some(mut entry) = self.sessions.get_mut(key) else {
            return Err(Rejection::SessionNotFound);
        };
        if entry.is_expired(now, self.config.ttl) {
            drop(entry);
            self.sessions.remove(key);
            debug!(session = %key, "Session expired before update");
            return Err(Rejection::SessionExpired);
        }
        entry.state = state;
        Ok(())
    }

    /// Remove a session, returning its state.
    pub fn delete(&self, key: &SessionKey) -> Option<S> {
        self.sessions.remove(key).map(|(_, entry)| entry.state)
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
