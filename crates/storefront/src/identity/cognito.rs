//! AWS Cognito user pool client.
//!
//! Talks to the public `cognito-idp` JSON 1.1 API. Every operation used here
//! is callable by a public app client without request signing.
//!
//! Tokens obtained by sign-in are kept in memory and persisted to the
//! durable store so `current_session` still works after a restart. Expired
//! tokens are refreshed with the refresh token.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use ann_traders_core::Email;

use super::{IdentityError, IdentityProvider, SessionTokens, SignUpOutcome};
use crate::config::CognitoConfig;
use crate::session::KeyValueStore;

/// Storage key for the persisted token bundle.
const TOKENS_KEY: &str = "cognito.tokens";

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

/// Client for a Cognito user pool.
#[derive(Clone)]
pub struct CognitoClient {
    inner: Arc<CognitoClientInner>,
}

struct CognitoClientInner {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    storage: Arc<dyn KeyValueStore>,
    tokens: RwLock<Option<SessionTokens>>,
}

/// Token bundle as persisted in storage.
#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    id_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    obtained_at: i64,
}

impl From<&SessionTokens> for StoredTokens {
    fn from(tokens: &SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token.expose_secret().to_string(),
            id_token: tokens.id_token.expose_secret().to_string(),
            refresh_token: tokens
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            expires_in: tokens.expires_in,
            obtained_at: tokens.obtained_at,
        }
    }
}

impl From<StoredTokens> for SessionTokens {
    fn from(stored: StoredTokens) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            id_token: SecretString::from(stored.id_token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_in: stored.expires_in,
            obtained_at: stored.obtained_at,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpResponse {
    #[serde(default)]
    user_confirmed: bool,
    code_delivery_details: Option<CodeDeliveryDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CodeDeliveryDetails {
    destination: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    id_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Deserialize)]
struct EmptyResponse {}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl CognitoClient {
    /// Create a client for the configured user pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: &CognitoConfig,
        timeout: std::time::Duration,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(CognitoClientInner {
                http,
                endpoint: config.endpoint.clone(),
                client_id: config.client_id.clone(),
                storage,
                tokens: RwLock::new(None),
            }),
        })
    }

    /// Call a Cognito operation.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<T, IdentityError> {
        let response = self
            .inner
            .http
            .post(format!("{}/", self.inner.endpoint))
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = map_service_error(&text);
            debug!(operation, status = %status, error = %error, "Cognito call failed");
            return Err(error);
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                operation,
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse Cognito response"
            );
            IdentityError::Parse(e)
        })
    }

    fn cached_tokens(&self) -> Option<SessionTokens> {
        self.inner
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tokens from memory, falling back to durable storage.
    fn load_tokens(&self) -> Result<Option<SessionTokens>, IdentityError> {
        if let Some(tokens) = self.cached_tokens() {
            return Ok(Some(tokens));
        }
        let Some(json) = self.inner.storage.get(TOKENS_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<StoredTokens>(&json) {
            Ok(stored) => {
                let tokens = SessionTokens::from(stored);
                *self
                    .inner
                    .tokens
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
                Ok(Some(tokens))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable stored Cognito tokens");
                self.inner.storage.remove(TOKENS_KEY)?;
                Ok(None)
            }
        }
    }

    fn store_tokens(&self, tokens: &SessionTokens) -> Result<(), IdentityError> {
        let json = serde_json::to_string(&StoredTokens::from(tokens))?;
        self.inner.storage.set(TOKENS_KEY, &json)?;
        *self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn forget_tokens(&self) -> Result<(), IdentityError> {
        *self
            .inner
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.inner.storage.remove(TOKENS_KEY)?;
        Ok(())
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        parameters: serde_json::Value,
    ) -> Result<AuthenticationResult, IdentityError> {
        let body = json!({
            "AuthFlow": flow,
            "ClientId": self.inner.client_id,
            "AuthParameters": parameters,
        });
        let response: InitiateAuthResponse = self.call("InitiateAuth", &body).await?;

        match (response.authentication_result, response.challenge_name) {
            (Some(result), _) => Ok(result),
            (None, Some(challenge)) => Err(IdentityError::ChallengeRequired(challenge)),
            (None, None) => Err(IdentityError::Service {
                code: "MissingAuthenticationResult".to_string(),
                message: "InitiateAuth returned neither tokens nor a challenge".to_string(),
            }),
        }
    }

    /// Exchange the refresh token for fresh access and ID tokens.
    #[instrument(skip_all)]
    async fn refresh(&self, expired: &SessionTokens) -> Result<SessionTokens, IdentityError> {
        let Some(refresh_token) = expired.refresh_token.as_ref() else {
            return Err(IdentityError::NotAuthorized(
                "session expired and no refresh token is available".to_string(),
            ));
        };

        let result = self
            .initiate_auth(
                "REFRESH_TOKEN_AUTH",
                json!({ "REFRESH_TOKEN": refresh_token.expose_secret() }),
            )
            .await?;

        // Cognito does not rotate the refresh token on this flow.
        let tokens = tokens_from(result, Some(refresh_token.clone()));
        self.store_tokens(&tokens)?;
        debug!("Refreshed Cognito session");
        Ok(tokens)
    }
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    #[instrument(skip(self, password, name), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let mut attributes = vec![json!({ "Name": "email", "Value": email.as_str() })];
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            attributes.push(json!({ "Name": "name", "Value": name }));
        }

        let body = json!({
            "ClientId": self.inner.client_id,
            "Username": email.as_str(),
            "Password": password.expose_secret(),
            "UserAttributes": attributes,
        });
        let response: SignUpResponse = self.call("SignUp", &body).await?;

        Ok(SignUpOutcome {
            user_confirmed: response.user_confirmed,
            code_destination: response
                .code_delivery_details
                .and_then(|details| details.destination),
        })
    }

    #[instrument(skip(self, code), fields(email = %email))]
    async fn confirm_sign_up(&self, email: &Email, code: &str) -> Result<(), IdentityError> {
        let body = json!({
            "ClientId": self.inner.client_id,
            "Username": email.as_str(),
            "ConfirmationCode": code.trim(),
        });
        let _: EmptyResponse = self.call("ConfirmSignUp", &body).await?;
        Ok(())
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SessionTokens, IdentityError> {
        let result = self
            .initiate_auth(
                "USER_PASSWORD_AUTH",
                json!({
                    "USERNAME": email.as_str(),
                    "PASSWORD": password.expose_secret(),
                }),
            )
            .await?;

        let tokens = tokens_from(result, None);
        self.store_tokens(&tokens)?;
        Ok(tokens)
    }

    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<SessionTokens>, IdentityError> {
        let Some(tokens) = self.load_tokens()? else {
            return Ok(None);
        };
        if !tokens.is_expired() {
            return Ok(Some(tokens));
        }

        match self.refresh(&tokens).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(e @ IdentityError::NotAuthorized(_)) => {
                // Refresh token revoked or expired; nothing left to restore.
                self.forget_tokens()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), IdentityError> {
        let remote = match self.load_tokens() {
            Ok(Some(tokens)) => {
                let body = json!({ "AccessToken": tokens.access_token.expose_secret() });
                self.call::<EmptyResponse>("GlobalSignOut", &body)
                    .await
                    .map(|_| ())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        // Local tokens go regardless of what the service said.
        self.forget_tokens()?;
        remote
    }
}

fn tokens_from(result: AuthenticationResult, fallback_refresh: Option<SecretString>) -> SessionTokens {
    SessionTokens {
        access_token: SecretString::from(result.access_token),
        id_token: SecretString::from(result.id_token),
        refresh_token: result
            .refresh_token
            .map(SecretString::from)
            .or(fallback_refresh),
        expires_in: result.expires_in,
        obtained_at: Utc::now().timestamp(),
    }
}

/// Map a Cognito error body to an `IdentityError`.
///
/// The `__type` field may carry a namespace prefix
/// (`com.amazonaws...#NotAuthorizedException`).
fn map_service_error(body: &str) -> IdentityError {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or(ErrorResponse {
        kind: None,
        message: Some(body.chars().take(200).collect()),
    });
    let code = parsed
        .kind
        .as_deref()
        .map(|kind| kind.rsplit('#').next().unwrap_or(kind).to_string())
        .unwrap_or_else(|| "UnknownError".to_string());
    let message = parsed.message.unwrap_or_default();

    match code.as_str() {
        "NotAuthorizedException" | "UserNotFoundException" => IdentityError::NotAuthorized(message),
        "UserNotConfirmedException" => IdentityError::UserNotConfirmed,
        "UsernameExistsException" => IdentityError::UsernameExists,
        "CodeMismatchException" | "ExpiredCodeException" => IdentityError::InvalidCode(message),
        "InvalidPasswordException" => IdentityError::InvalidPassword(message),
        _ => IdentityError::Service { code, message },
    }
}
