//! Integration tests for the ANN Traders storefront.
//!
//! The scenarios in `tests/` run the storefront crates end to end against
//! `mockito` stand-ins for the Cognito and catalog APIs. No network access
//! or credentials are needed:
//!
//! ```bash
//! cargo test -p ann-traders-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

use ann_traders_storefront::config::{ConfigError, StorefrontConfig};

/// A JWT-shaped ID token for `email` in `groups`, expiring in an hour.
#[must_use]
pub fn id_token(email: &str, groups: &[&str]) -> String {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
        + 3600;
    let payload = json!({
        "sub": format!("sub-{email}"),
        "email": email,
        "cognito:groups": groups,
        "exp": exp,
    });
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"test"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// `InitiateAuth` response body carrying `id_token`.
#[must_use]
pub fn auth_response(id_token: &str) -> String {
    json!({
        "AuthenticationResult": {
            "AccessToken": "access-token",
            "IdToken": id_token,
            "RefreshToken": "refresh-token",
            "ExpiresIn": 3600,
            "TokenType": "Bearer",
        },
        "ChallengeParameters": {},
    })
    .to_string()
}

/// A fresh session file path under the system temp directory.
#[must_use]
pub fn temp_session_file() -> PathBuf {
    std::env::temp_dir()
        .join(format!("ann-traders-it-{}", uuid::Uuid::new_v4()))
        .join("session.json")
}

/// Configuration pointing both APIs at `server_url`.
///
/// # Errors
///
/// Returns `ConfigError` if `server_url` is not an http(s) URL.
pub fn config_for(server_url: &str, session_file: &std::path::Path) -> Result<StorefrontConfig, ConfigError> {
    let session_file = session_file.display().to_string();
    StorefrontConfig::from_lookup(|key| match key {
        "ANN_API_URL" | "COGNITO_ENDPOINT" => Some(server_url.to_string()),
        "COGNITO_USER_POOL_ID" => Some("us-east-1_integration".to_string()),
        "COGNITO_CLIENT_ID" => Some("integration-client".to_string()),
        "ANN_SESSION_FILE" => Some(session_file.clone()),
        "ANN_HTTP_TIMEOUT_SECS" => Some("5".to_string()),
        _ => None,
    })
}
