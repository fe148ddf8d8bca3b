//! Account and session commands.
//!
//! # Usage
//!
//! ```bash
//! ann-cli register -e buyer@example.com -n "Jane Buyer" -p 'S3cret!pass'
//! ann-cli confirm -e buyer@example.com -c 123456
//! ann-cli login -e buyer@example.com -p 'S3cret!pass'
//! ann-cli session
//! ann-cli logout
//! ```

use secrecy::SecretString;

use ann_traders_core::Email;
use ann_traders_storefront::session::SessionStatus;
use ann_traders_storefront::{AppError, AppState};

pub async fn register(
    state: &AppState,
    email: &str,
    name: Option<&str>,
    password: String,
) -> Result<(), AppError> {
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    let outcome = state.session().register(&email, &password, name).await?;
    if outcome.user_confirmed {
        println!("Account {email} is ready. Sign in with `ann-cli login`.");
    } else {
        let destination = outcome
            .code_destination
            .unwrap_or_else(|| email.to_string());
        println!("Registration successful. A confirmation code was sent to {destination}.");
        println!("Run `ann-cli confirm -e {email} -c <code>` to activate the account.");
    }
    Ok(())
}

pub async fn confirm(state: &AppState, email: &str, code: &str) -> Result<(), AppError> {
    let email = Email::parse(email)?;
    if code.trim().is_empty() {
        return Err(AppError::BadRequest("confirmation code is empty".to_string()));
    }

    state.session().confirm_registration(&email, code).await?;
    println!("Account confirmed. Sign in with `ann-cli login`.");
    Ok(())
}

pub async fn login(state: &AppState, email: &str, password: String) -> Result<(), AppError> {
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    let status = state.session().sign_in(&email, &password).await?;
    println!("Welcome, {email}: {status}");
    Ok(())
}

pub async fn logout(state: &AppState) -> Result<(), AppError> {
    state.session().logout().await;
    println!("Signed out.");
    Ok(())
}

pub async fn session(state: &AppState) -> Result<(), AppError> {
    let status = state.session().restore_session().await;
    print_status(state, &status);
    Ok(())
}

/// Print who is signed in and what they may see.
pub fn print_status(state: &AppState, status: &SessionStatus) {
    println!("Session: {status}");

    if let Some(claims) = state.session().credential().and_then(|c| c.claims()) {
        if let Some(email) = claims.email {
            println!("Email:   {email}");
        }
        if let Some(expires_at) = claims.expires_at {
            println!("Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }

    let menu = state.nav_menu();
    let links: Vec<String> = menu.links.iter().map(ToString::to_string).collect();
    println!("Menu:    {}", links.join("  "));
}
