//! Authenticated session: the credential pair and its refresh coordination.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use quire_core::error::{AuthError, Error};
use quire_core::{AccessToken, Credentials, RefreshToken, Result, TokenPair, TokenStore};

use crate::client::HttpClient;
use crate::endpoints::{LOGIN, LoginRequest, LoginResponse, REFRESH, RefreshRequest, TokenResponse, User};
use crate::refresh::{RefreshOutcome, RefreshState, Ticket};

/// The credential state shared by every request of one application session.
///
/// Created with [`AuthSession::init`] at startup and ended with
/// [`AuthSession::logout`]. Cheap to clone; clones share state, so a handle
/// can be given to the transport, the streaming session and the caller.
///
/// Tokens are mirrored into a [`TokenStore`] on every change. All state
/// changes happen under one mutex that is never held across an `.await`, so
/// no task can observe a half-applied login, refresh or logout.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use quire_core::{ApiUrl, Credentials, MemoryTokenStore};
/// use quire_http::{AuthSession, HttpClient};
///
/// # async fn example() -> Result<(), quire_core::Error> {
/// let client = HttpClient::new(ApiUrl::new("https://proposals.example.com/api/v1")?);
/// let session = AuthSession::init(client, Arc::new(MemoryTokenStore::new()))?;
/// let user = session.login(Credentials::new("alice@example.com", "hunter2")).await?;
/// println!("Logged in as {}", user.email);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: HttpClient,
    store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
    refresh: RefreshState,
    /// Bumped by login and logout so a refresh that started under an older
    /// session cannot write its tokens into a newer one.
    epoch: u64,
}

impl SessionState {
    fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }

    fn set_pair(&mut self, pair: TokenPair) {
        self.access_token = Some(pair.access_token);
        self.refresh_token = Some(pair.refresh_token);
    }
}

/// How a caller takes part in a refresh.
enum Role {
    Leader {
        refresh_token: RefreshToken,
        epoch: u64,
    },
    Waiter(tokio::sync::oneshot::Receiver<RefreshOutcome>),
}

/// Fails the waiters if the leader's future is dropped mid-refresh.
struct LeaderGuard<'a> {
    session: &'a AuthSession,
    armed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.session.state();
            let notified = state.refresh.finish(&Err(AuthError::RefreshInterrupted));
            warn!(waiters = notified, "Token refresh abandoned before completion");
        }
    }
}

impl AuthSession {
    /// Start a session, loading any tokens already in `store`.
    pub fn init(client: HttpClient, store: Arc<dyn TokenStore>) -> Result<Self> {
        let (access_token, refresh_token) = store.load()?;
        debug!(
            has_access = access_token.is_some(),
            has_refresh = refresh_token.is_some(),
            "Session initialized from store"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                store,
                state: Mutex::new(SessionState {
                    access_token,
                    refresh_token,
                    ..SessionState::default()
                }),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the HTTP client this session talks through.
    pub fn client(&self) -> &HttpClient {
        &self.inner.client
    }

    /// Returns the current access token, if any.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.state().access_token.clone()
    }

    /// Returns true if an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.state().access_token.is_some()
    }

    /// Returns true if a refresh token is held.
    pub fn can_refresh(&self) -> bool {
        self.state().refresh_token.is_some()
    }

    /// Returns true while a token refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state().refresh.is_refreshing()
    }

    /// Authenticate and store the issued token pair.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] if the API rejects the credentials
    /// with 401; any other failure is returned as-is and leaves the current
    /// tokens untouched.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: Credentials) -> Result<User> {
        info!("Logging in");

        let request = LoginRequest {
            email: credentials.email(),
            password: credentials.password(),
        };

        let response: LoginResponse = match self.inner.client.post_json(LOGIN, &request).await {
            Ok(response) => response,
            Err(Error::Protocol(e)) if e.is_auth_error() => {
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let pair = TokenPair::new(response.tokens.access_token, response.tokens.refresh_token);
        {
            let mut state = self.state();
            self.inner.store.save(&pair)?;
            state.set_pair(pair);
            state.epoch += 1;
        }

        debug!(user = %response.user.id, "Login succeeded");
        Ok(response.user)
    }

    /// End the session: forget both tokens in memory and in the store.
    ///
    /// A refresh still in flight is not aborted, but its result is discarded
    /// and its waiters fail with a session-expired error.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<()> {
        info!("Logging out");
        let mut state = self.state();
        state.clear_tokens();
        state.epoch += 1;
        self.inner.store.clear()
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// Shares an in-flight refresh if there is one, so calling this while
    /// requests are being renewed never burns the refresh token twice.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let role = {
            let mut state = self.state();
            self.join_refresh(&mut state)?
        };
        self.complete(role).await
    }

    /// Obtain a usable token after a request sent with `sent_with` got 401.
    ///
    /// If a completed refresh already replaced that token, the current one is
    /// returned straight away. Otherwise the caller joins (or starts) the
    /// shared refresh.
    pub(crate) async fn renew_after_rejection(
        &self,
        sent_with: Option<&AccessToken>,
    ) -> Result<AccessToken> {
        let role = {
            let mut state = self.state();
            if !state.refresh.is_refreshing()
                && let Some(current) = state.access_token.as_ref()
                && sent_with != Some(current)
            {
                debug!("Token already renewed; replaying with current token");
                return Ok(current.clone());
            }
            self.join_refresh(&mut state)?
        };
        self.complete(role).await
    }

    fn join_refresh(&self, state: &mut SessionState) -> Result<Role> {
        match state.refresh.join() {
            Ticket::Wait(rx) => {
                debug!(
                    waiters = state.refresh.waiter_count(),
                    "Refresh in flight; queued as waiter"
                );
                Ok(Role::Waiter(rx))
            }
            Ticket::Lead => {
                let Some(refresh_token) = state.refresh_token.clone() else {
                    let expired = AuthError::SessionExpired {
                        reason: "no refresh token available".to_string(),
                    };
                    state.refresh.finish(&Err(expired.clone()));

                    warn!("No refresh token; clearing credentials");
                    state.clear_tokens();
                    if let Err(e) = self.inner.store.clear() {
                        warn!(error = %e, "Failed to clear stored tokens");
                    }
                    return Err(expired.into());
                };

                Ok(Role::Leader {
                    refresh_token,
                    epoch: state.epoch,
                })
            }
        }
    }

    async fn complete(&self, role: Role) -> Result<AccessToken> {
        match role {
            Role::Waiter(rx) => match rx.await {
                Ok(outcome) => outcome.map_err(Error::from),
                Err(_) => Err(AuthError::RefreshInterrupted.into()),
            },
            Role::Leader {
                refresh_token,
                epoch,
            } => {
                let mut guard = LeaderGuard {
                    session: self,
                    armed: true,
                };
                let result = self.call_refresh(&refresh_token).await;
                guard.armed = false;
                self.finish_refresh(epoch, result)
            }
        }
    }

    #[instrument(skip(self, refresh_token))]
    async fn call_refresh(&self, refresh_token: &RefreshToken) -> Result<TokenResponse> {
        info!("Refreshing session");
        let request = RefreshRequest {
            refresh_token: refresh_token.as_str(),
        };
        self.inner.client.post_json(REFRESH, &request).await
    }

    fn finish_refresh(&self, epoch: u64, result: Result<TokenResponse>) -> Result<AccessToken> {
        let mut state = self.state();

        let outcome: RefreshOutcome = match result {
            Ok(tokens) if state.epoch == epoch => {
                let pair = TokenPair::new(tokens.access_token, tokens.refresh_token);
                if let Err(e) = self.inner.store.save(&pair) {
                    warn!(error = %e, "Failed to persist refreshed tokens");
                }
                let access = pair.access_token.clone();
                state.set_pair(pair);
                debug!("Session refreshed successfully");
                Ok(access)
            }
            Ok(_) => {
                debug!("Session changed during refresh; discarding refreshed tokens");
                state
                    .access_token
                    .clone()
                    .ok_or_else(|| AuthError::SessionExpired {
                        reason: "logged out during token refresh".to_string(),
                    })
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing credentials");
                if state.epoch == epoch {
                    state.clear_tokens();
                    if let Err(e) = self.inner.store.clear() {
                        warn!(error = %e, "Failed to clear stored tokens");
                    }
                }
                Err(AuthError::SessionExpired {
                    reason: e.to_string(),
                })
            }
        };

        let notified = state.refresh.finish(&outcome);
        debug!(waiters = notified, ok = outcome.is_ok(), "Refresh outcome delivered");
        outcome.map_err(Error::from)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("base", self.inner.client.base_url())
            .field("store", &self.inner.store)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}
