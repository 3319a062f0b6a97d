//! Durable token storage trait.

use std::fmt::Debug;

use crate::{AccessToken, RefreshToken, Result, TokenPair};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Durable key-value string storage for the token pair.
///
/// Methods are synchronous: a store is updated inside the same critical
/// section that updates the in-memory session, so it must not suspend.
///
/// # Blocking
///
/// Login, logout and refresh call the store while holding the session's
/// mutex, on whichever thread is polling the session. Every other task that
/// touches the session waits for the call to return, and on an async
/// runtime the worker thread itself is stalled until it does. Implementations
/// should return quickly. A store that can wait on something outside the
/// process, such as a file lock held by another program, should only back a
/// session driven from [`spawn_blocking`] or a runtime where stalling a
/// worker is acceptable.
///
/// [`spawn_blocking`]: https://docs.rs/tokio/latest/tokio/task/fn.spawn_blocking.html
pub trait TokenStore: Send + Sync + Debug {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Load whichever tokens are present.
    fn load(&self) -> Result<(Option<AccessToken>, Option<RefreshToken>)> {
        let access = self.get(ACCESS_TOKEN_KEY)?.map(AccessToken::new);
        let refresh = self.get(REFRESH_TOKEN_KEY)?.map(RefreshToken::new);
        Ok((access, refresh))
    }

    /// Persist both tokens of a pair.
    fn save(&self, pair: &TokenPair) -> Result<()> {
        self.set(ACCESS_TOKEN_KEY, pair.access_token.as_str())?;
        self.set(REFRESH_TOKEN_KEY, pair.refresh_token.as_str())
    }

    /// Remove both tokens.
    fn clear(&self) -> Result<()> {
        self.remove(ACCESS_TOKEN_KEY)?;
        self.remove(REFRESH_TOKEN_KEY)
    }
}
