//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type for the storefront surface. Errors the
//! user cannot fix are captured to Sentry by [`AppError::report`]; everything
//! has a short [`user_message`](AppError::user_message) for display.

use thiserror::Error;

use ann_traders_core::{EmailError, ProductError};

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::session::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Durable storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Identity provider operation failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Catalog API operation failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The email address is malformed.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// The product draft is invalid.
    #[error("Invalid product: {0}")]
    Product(#[from] ProductError),

    /// User is not signed in or lacks the required group.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input from the user.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error points at a fault on our side or upstream rather
    /// than at the user's input.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        match self {
            Self::Config(_) | Self::Storage(_) | Self::Internal(_) => true,
            Self::Identity(err) => matches!(
                err,
                IdentityError::Http(_)
                    | IdentityError::Parse(_)
                    | IdentityError::Service { .. }
                    | IdentityError::Storage(_)
            ),
            Self::Catalog(err) => matches!(
                err,
                CatalogError::Http(_)
                    | CatalogError::Parse(_)
                    | CatalogError::Status { .. }
                    | CatalogError::MissingPresignFields
                    | CatalogError::Io(_)
            ),
            _ => false,
        }
    }

    /// Capture server-side errors to Sentry and log them.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        } else {
            tracing::debug!(error = %self, "User-facing error");
        }
    }

    /// Message suitable for showing to the user.
    ///
    /// Internal details are not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(err) => format!("Configuration problem: {err}"),
            Self::Storage(_) | Self::Internal(_) => "Internal error".to_string(),
            Self::Identity(err) => match err {
                IdentityError::NotAuthorized(_) => "Invalid credentials".to_string(),
                IdentityError::UserNotConfirmed => {
                    "Account not confirmed; check your email for the code".to_string()
                }
                IdentityError::UsernameExists => {
                    "An account with this email already exists".to_string()
                }
                IdentityError::InvalidCode(_) => "Invalid or expired confirmation code".to_string(),
                IdentityError::InvalidPassword(msg) => msg.clone(),
                IdentityError::ChallengeRequired(challenge) => {
                    format!("Sign-in step not supported: {challenge}")
                }
                _ => "Authentication service error".to_string(),
            },
            Self::Catalog(err) => match err {
                CatalogError::NotFound(what) => format!("Not found: {what}"),
                CatalogError::Unauthorized => "You are not allowed to do that".to_string(),
                CatalogError::RateLimited(secs) => {
                    format!("Too many requests; try again in {secs}s")
                }
                CatalogError::InvalidProduct(err) => err.to_string(),
                CatalogError::UnsupportedImage(file) => {
                    format!("Please select an image file (got {file})")
                }
                _ => "Catalog service error".to_string(),
            },
            _ => self.to_string(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
