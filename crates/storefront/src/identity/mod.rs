//! Managed identity provider.
//!
//! The storefront only needs five capabilities from the identity provider:
//! sign-up, confirm sign-up, sign-in, fetch-current-session and sign-out.
//! [`IdentityProvider`] captures exactly those; [`CognitoClient`] implements
//! them against an AWS Cognito user pool.

mod cognito;

pub use cognito::CognitoClient;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use thiserror::Error;

use ann_traders_core::Email;

use crate::session::StorageError;

/// Seconds before expiry at which tokens are treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Errors returned by an identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response could not be parsed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Wrong email/password, or the session was revoked.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The account exists but the email has not been confirmed.
    #[error("account is not confirmed")]
    UserNotConfirmed,

    /// An account with this email already exists.
    #[error("an account with this email already exists")]
    UsernameExists,

    /// The confirmation code is wrong or expired.
    #[error("invalid confirmation code: {0}")]
    InvalidCode(String),

    /// The password does not meet the pool's policy.
    #[error("password rejected: {0}")]
    InvalidPassword(String),

    /// The pool requires an extra sign-in step the storefront does not support.
    #[error("unsupported sign-in challenge: {0}")]
    ChallengeRequired(String),

    /// Any other service error.
    #[error("identity service error {code}: {message}")]
    Service { code: String, message: String },

    /// Local token storage failed.
    #[error("token storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Tokens issued for a signed-in user.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// Access token for provider calls such as sign-out.
    pub access_token: SecretString,
    /// ID token; carries email and group claims and is what the catalog API
    /// accepts as a bearer token.
    pub id_token: SecretString,
    /// Refresh token, if the provider issued one.
    pub refresh_token: Option<SecretString>,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    /// Unix timestamp when the tokens were obtained.
    pub obtained_at: i64,
}

impl SessionTokens {
    /// Check if the tokens are expired (with a 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let expires_at = self.obtained_at + self.expires_in;
        Utc::now().timestamp() >= expires_at - EXPIRY_BUFFER_SECS
    }
}

/// Result of a sign-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    /// Whether the account is usable without confirmation.
    pub user_confirmed: bool,
    /// Masked destination of the confirmation code (e.g. `j***@e***`).
    pub code_destination: Option<String>,
}

/// The identity provider capabilities the storefront consumes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError>;

    /// Confirm an account with the code sent to its email.
    async fn confirm_sign_up(&self, email: &Email, code: &str) -> Result<(), IdentityError>;

    /// Sign in with email and password.
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SessionTokens, IdentityError>;

    /// Current session tokens, refreshed if needed. `Ok(None)` when nobody
    /// is signed in.
    async fn current_session(&self) -> Result<Option<SessionTokens>, IdentityError>;

    /// Revoke the remote session and forget local tokens.
    async fn sign_out(&self) -> Result<(), IdentityError>;
}
