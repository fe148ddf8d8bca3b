//! Auth session manager.
//!
//! Owns the current [`Credential`] and keeps it in sync with durable storage
//! and the identity provider. Group membership is always derived from the
//! credential itself.
//!
//! Every state-setting write (login, logout, an applied restore) bumps a
//! session epoch. A restore remembers the epoch it started from and drops
//! its result if anything else wrote in the meantime, so a slow restore can
//! never bring back a session the user has since left. Storage is written
//! after the state lock is released; a write tagged with an older epoch than
//! the last persisted one is skipped.

mod storage;

pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, TOKEN_KEY};

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument, warn};

use ann_traders_core::{Credential, Email, GroupSet, RouteAccess, RouteDecision, decode_claims};

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::identity::{IdentityError, IdentityProvider, SignUpOutcome};

/// Whether someone is signed in, as seen after a session operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated { groups: GroupSet },
}

impl SessionStatus {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Groups of the signed-in user; empty when anonymous.
    #[must_use]
    pub fn groups(&self) -> GroupSet {
        match self {
            Self::Anonymous => GroupSet::empty(),
            Self::Authenticated { groups } => groups.clone(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated { groups } => write!(f, "signed in (groups: {groups})"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<Credential>,
    epoch: u64,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        self.credential
            .as_ref()
            .map_or(SessionStatus::Anonymous, |credential| {
                SessionStatus::Authenticated {
                    groups: credential.groups(),
                }
            })
    }
}

/// The auth session manager.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn KeyValueStore>,
    state: RwLock<SessionState>,
    // Epoch of the last storage write.
    persisted: Mutex<u64>,
}

impl SessionManager {
    /// Create a manager, picking up any token left in storage by a previous
    /// run. Call [`restore_session`](Self::restore_session) to check that
    /// token against the provider.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, storage: Arc<dyn KeyValueStore>) -> Self {
        let credential = match storage.get(TOKEN_KEY) {
            Ok(token) => token.map(Credential::new),
            Err(e) => {
                warn!(error = %e, "Could not read stored session token");
                None
            }
        };
        let credential = credential.filter(|credential| {
            let expired = credential.is_expired_at(Utc::now());
            if expired {
                debug!("Stored session token has expired; starting anonymous");
            }
            !expired
        });

        Self {
            provider,
            storage,
            state: RwLock::new(SessionState {
                credential,
                epoch: 0,
            }),
            persisted: Mutex::new(0),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `credential` as the current session and return the new
    /// epoch. Caller holds the lock and persists afterwards.
    fn apply_credential(state: &mut SessionState, credential: Credential) -> u64 {
        let claims = decode_claims(credential.as_str()).unwrap_or_default();
        let user_id = claims.subject.unwrap_or_else(|| "unknown".to_string());
        set_sentry_user(&user_id, claims.email.as_deref());

        state.epoch += 1;
        state.credential = Some(credential);
        state.epoch
    }

    /// Drop the current session and return the new epoch.
    fn apply_anonymous(state: &mut SessionState) -> u64 {
        clear_sentry_user();

        state.epoch += 1;
        state.credential = None;
        state.epoch
    }

    /// Write the session as of `epoch` to storage, unless a newer one
    /// already has been.
    fn persist(&self, epoch: u64, credential: Option<&Credential>) {
        let mut persisted = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        if epoch <= *persisted {
            debug!(epoch, persisted = *persisted, "Skipping stale session write");
            return;
        }
        *persisted = epoch;

        let result = match credential {
            Some(credential) => self.storage.set(TOKEN_KEY, credential.as_str()),
            None => self.storage.remove(TOKEN_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "Could not persist session token");
        }
    }

    /// Ask the identity provider for the current session and adopt it.
    ///
    /// Never fails: a missing session or a provider error leaves the
    /// manager anonymous with storage cleared. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> SessionStatus {
        let started_at = self.epoch();
        let fetched = self.provider.current_session().await;

        let mut state = self.write_state();
        if state.epoch != started_at {
            debug!(
                started_at,
                current = state.epoch,
                "Session changed during restore; discarding result"
            );
            return state.status();
        }

        let credential = match fetched {
            Ok(Some(tokens)) => Some(Credential::new(tokens.id_token.expose_secret())),
            Ok(None) => {
                debug!("No session to restore");
                None
            }
            Err(e) => {
                warn!(error = %e, "Session restore failed; continuing anonymously");
                None
            }
        };
        let epoch = match credential.clone() {
            Some(credential) => Self::apply_credential(&mut state, credential),
            None => Self::apply_anonymous(&mut state),
        };
        let status = state.status();
        drop(state);

        self.persist(epoch, credential.as_ref());
        info!(authenticated = status.is_authenticated(), "Session restored");
        status
    }

    /// Adopt `token` as the current session.
    ///
    /// Any string is accepted. A token whose payload cannot be decoded
    /// signs the user in with no groups.
    pub fn login(&self, token: impl Into<String>) -> SessionStatus {
        let credential = Credential::new(token);
        if credential.claims().is_none() {
            warn!("Session token payload is unreadable; signing in with no groups");
        }

        let mut state = self.write_state();
        let epoch = Self::apply_credential(&mut state, credential.clone());
        let status = state.status();
        drop(state);

        self.persist(epoch, Some(&credential));

        info!(groups = %status.groups(), "Signed in");
        status
    }

    /// Sign in with email and password, then adopt the issued ID token.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; the session is left unchanged.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SessionStatus, IdentityError> {
        let tokens = self.provider.sign_in(email, password).await?;
        Ok(self.login(tokens.id_token.expose_secret()))
    }

    /// Create an account. The provider emails a confirmation code.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let outcome = self.provider.sign_up(email, password, name).await?;
        info!(
            email = %email,
            confirmed = outcome.user_confirmed,
            "Account registered"
        );
        Ok(outcome)
    }

    /// Confirm an account with the emailed code.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    pub async fn confirm_registration(&self, email: &Email, code: &str) -> Result<(), IdentityError> {
        self.provider.confirm_sign_up(email, code).await?;
        info!(email = %email, "Account confirmed");
        Ok(())
    }

    /// Sign out remotely (best effort), then forget the session locally.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Remote sign-out failed; clearing local session anyway");
        }

        let mut state = self.write_state();
        let epoch = Self::apply_anonymous(&mut state);
        drop(state);

        self.persist(epoch, None);

        info!("Signed out");
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.read_state(SessionState::status)
    }

    /// Groups decoded from the current credential; empty when anonymous.
    #[must_use]
    pub fn current_groups(&self) -> GroupSet {
        self.read_state(|state| {
            state
                .credential
                .as_ref()
                .map(Credential::groups)
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read_state(|state| state.credential.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read_state(|state| state.credential.is_some())
    }

    /// The current token for `Authorization: Bearer` headers.
    #[must_use]
    pub fn bearer_token(&self) -> Option<SecretString> {
        self.read_state(|state| {
            state
                .credential
                .as_ref()
                .map(|credential| SecretString::from(credential.as_str()))
        })
    }

    /// Number of state-setting writes so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.read_state(|state| state.epoch)
    }

    /// Apply a route's access rule to the current session.
    #[must_use]
    pub fn decide(&self, access: RouteAccess) -> RouteDecision {
        self.read_state(|state| {
            let groups = state
                .credential
                .as_ref()
                .map(Credential::groups)
                .unwrap_or_default();
            access.decide(&groups, state.credential.is_some())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use tokio::sync::Notify;

    use super::*;
    use crate::identity::SessionTokens;

    fn jwt(groups: &[&str]) -> String {
        let payload = serde_json::json!({
            "sub": "user-1",
            "email": "buyer@shop.com",
            "cognito:groups": groups,
        });
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn tokens(id_token: &str) -> SessionTokens {
        SessionTokens {
            access_token: SecretString::from("access"),
            id_token: SecretString::from(id_token),
            refresh_token: None,
            expires_in: 3600,
            obtained_at: chrono::Utc::now().timestamp(),
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        session: Option<String>,
        fail_session: bool,
        fail_sign_out: bool,
        gate: Option<Notify>,
        sign_out_calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_up(
            &self,
            _email: &Email,
            _password: &SecretString,
            _name: Option<&str>,
        ) -> Result<SignUpOutcome, IdentityError> {
            Ok(SignUpOutcome {
                user_confirmed: false,
                code_destination: Some("b***@s***".to_string()),
            })
        }

        async fn confirm_sign_up(&self, _email: &Email, code: &str) -> Result<(), IdentityError> {
            if code == "000000" {
                Err(IdentityError::InvalidCode("wrong".to_string()))
            } else {
                Ok(())
            }
        }

        async fn sign_in(
            &self,
            _email: &Email,
            password: &SecretString,
        ) -> Result<SessionTokens, IdentityError> {
            if password.expose_secret() == "good" {
                Ok(tokens(&jwt(&["admin"])))
            } else {
                Err(IdentityError::NotAuthorized("Incorrect username or password.".to_string()))
            }
        }

        async fn current_session(&self) -> Result<Option<SessionTokens>, IdentityError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_session {
                return Err(IdentityError::Service {
                    code: "InternalErrorException".to_string(),
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.session.as_deref().map(tokens))
        }

        async fn sign_out(&self) -> Result<(), IdentityError> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_sign_out {
                Err(IdentityError::NotAuthorized("revoked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn manager(provider: FakeProvider) -> (SessionManager, Arc<FakeProvider>, Arc<MemoryStore>) {
        let provider = Arc::new(provider);
        let storage = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(provider.clone(), storage.clone());
        (manager, provider, storage)
    }

    #[test]
    fn test_login_with_non_jwt_is_authenticated_without_groups() {
        let (manager, _, storage) = manager(FakeProvider::default());
        let status = manager.login("not-a-jwt");

        assert_eq!(
            status,
            SessionStatus::Authenticated {
                groups: GroupSet::empty()
            }
        );
        assert!(manager.is_authenticated());
        assert!(manager.current_groups().is_empty());
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("not-a-jwt"));
    }

    #[test]
    fn test_login_derives_groups() {
        let (manager, _, _) = manager(FakeProvider::default());
        manager.login(jwt(&["admin", "user"]));
        assert!(manager.current_groups().contains("admin"));
        assert_eq!(manager.decide(RouteAccess::Protected(&["admin"])), RouteDecision::Allow);
        assert_eq!(manager.decide(RouteAccess::PublicOnly), RouteDecision::RedirectToHome);
    }

    #[test]
    fn test_anonymous_accessors() {
        let (manager, _, _) = manager(FakeProvider::default());
        assert_eq!(manager.status(), SessionStatus::Anonymous);
        assert!(manager.current_groups().is_empty());
        assert!(manager.bearer_token().is_none());
        assert_eq!(
            manager.decide(RouteAccess::Protected(&["admin"])),
            RouteDecision::RedirectToLogin
        );
    }

    #[test]
    fn test_new_picks_up_stored_token() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, &jwt(&["user"])).unwrap();
        let manager = SessionManager::new(Arc::new(FakeProvider::default()), storage);
        assert!(manager.current_groups().contains("user"));
        assert_eq!(manager.epoch(), 0);
    }

    #[test]
    fn test_new_ignores_expired_stored_token() {
        let payload = serde_json::json!({ "cognito:groups": ["admin"], "exp": 1_000 });
        let expired = format!("h.{}.s", URL_SAFE_NO_PAD.encode(payload.to_string()));
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, &expired).unwrap();

        let manager = SessionManager::new(Arc::new(FakeProvider::default()), storage);
        assert!(!manager.is_authenticated());
        assert_eq!(manager.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_older_epoch_write_is_skipped() {
        let (manager, _, storage) = manager(FakeProvider::default());
        manager.login(jwt(&["user"]));
        manager.login(jwt(&["admin"]));
        assert_eq!(manager.epoch(), 2);

        // A write from epoch 1 arriving late must not clobber epoch 2.
        manager.persist(1, None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), Some(jwt(&["admin"])));

        manager.persist(3, None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_adopts_provider_session() {
        let (manager, _, storage) = manager(FakeProvider {
            session: Some(jwt(&["user"])),
            ..FakeProvider::default()
        });

        let status = manager.restore_session().await;
        assert!(status.is_authenticated());
        assert!(status.groups().contains("user"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), Some(jwt(&["user"])));

        // Idempotent.
        assert_eq!(manager.restore_session().await, status);
    }

    #[tokio::test]
    async fn test_restore_without_session_clears_storage() {
        let (manager, _, storage) = manager(FakeProvider::default());
        manager.login(jwt(&["user"]));

        let status = manager.restore_session().await;
        assert_eq!(status, SessionStatus::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_failure_is_anonymous_not_error() {
        let (manager, _, storage) = manager(FakeProvider {
            fail_session: true,
            ..FakeProvider::default()
        });
        storage.set(TOKEN_KEY, "stale").unwrap();

        assert_eq!(manager.restore_session().await, SessionStatus::Anonymous);
        assert!(!manager.is_authenticated());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_restore_after_logout_is_discarded() {
        let (manager, provider, storage) = manager(FakeProvider {
            session: Some(jwt(&["admin"])),
            gate: Some(Notify::new()),
            ..FakeProvider::default()
        });

        let restore = manager.restore_session();
        let logout = async {
            manager.logout().await;
            provider.gate.as_ref().unwrap().notify_one();
        };
        let (status, ()) = tokio::join!(restore, logout);

        assert_eq!(status, SessionStatus::Anonymous);
        assert!(!manager.is_authenticated());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(manager.epoch(), 1);
    }

    #[tokio::test]
    async fn test_stale_restore_does_not_overwrite_newer_login() {
        let (manager, provider, _) = manager(FakeProvider {
            gate: Some(Notify::new()),
            ..FakeProvider::default()
        });

        let restore = manager.restore_session();
        let login = async {
            manager.login(jwt(&["user"]));
            provider.gate.as_ref().unwrap().notify_one();
        };
        let (status, ()) = tokio::join!(restore, login);

        assert!(status.is_authenticated());
        assert!(manager.current_groups().contains("user"));
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let (manager, provider, storage) = manager(FakeProvider {
            fail_sign_out: true,
            ..FakeProvider::default()
        });
        manager.login(jwt(&["admin"]));

        manager.logout().await;
        assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(), SessionStatus::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_in_adopts_id_token() {
        let (manager, _, _) = manager(FakeProvider::default());
        let email = Email::parse("buyer@shop.com").unwrap();

        let err = manager
            .sign_in(&email, &SecretString::from("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::NotAuthorized(_)));
        assert!(!manager.is_authenticated());

        let status = manager
            .sign_in(&email, &SecretString::from("good"))
            .await
            .unwrap();
        assert!(status.groups().contains("admin"));
        assert_eq!(
            manager.bearer_token().map(|t| t.expose_secret().to_string()),
            Some(jwt(&["admin"]))
        );
    }

    #[tokio::test]
    async fn test_register_and_confirm() {
        let (manager, _, _) = manager(FakeProvider::default());
        let email = Email::parse("new@shop.com").unwrap();

        let outcome = manager
            .register(&email, &SecretString::from("pw"), Some("New"))
            .await
            .unwrap();
        assert!(!outcome.user_confirmed);

        assert!(manager.confirm_registration(&email, "123456").await.is_ok());
        assert!(matches!(
            manager.confirm_registration(&email, "000000").await,
            Err(IdentityError::InvalidCode(_))
        ));
        assert!(!manager.is_authenticated());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Anonymous.to_string(), "anonymous");
        let status = SessionStatus::Authenticated {
            groups: ["admin"].into_iter().collect(),
        };
        assert_eq!(status.to_string(), "signed in (groups: admin)");
    }
}
