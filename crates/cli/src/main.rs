//! ANN Traders CLI - the storefront in a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Create and confirm an account
//! ann-cli register -e buyer@example.com -n "Jane Buyer" -p 'S3cret!pass'
//! ann-cli confirm -e buyer@example.com -c 123456
//!
//! # Sign in (the session survives restarts) and check it
//! ann-cli login -e buyer@example.com -p 'S3cret!pass'
//! ann-cli session
//!
//! # Browse and publish products
//! ann-cli products list
//! ann-cli products show 42
//! ann-cli products add --sku TEA-1 --title "Green Tea" --description "Loose leaf" \
//!     --price 12.50 --category tea --image ./tea.png
//!
//! # Interactive shopping session with a cart
//! ann-cli shop
//! ```
//!
//! Configuration comes from the environment (see `StorefrontConfig`).
//! Passwords may be given through `ANN_PASSWORD` instead of `-p`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ann_traders_core::{CurrencyCode, ProductId};
use ann_traders_storefront::config::StorefrontConfig;
use ann_traders_storefront::{AppError, AppState};

mod commands;

#[derive(Parser)]
#[command(name = "ann-cli")]
#[command(author, version, about = "ANN Traders storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account; a confirmation code is emailed
    Register {
        /// Email address (also the username)
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Password
        #[arg(short, long, env = "ANN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Confirm an account with the emailed code
    Confirm {
        #[arg(short, long)]
        email: String,

        /// Confirmation code
        #[arg(short, long)]
        code: String,
    },
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "ANN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out everywhere and forget the local session
    Logout,
    /// Show the current session
    Session,
    /// Browse or add catalog products
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },
    /// Interactive shopping session with a cart
    Shop,
}

#[derive(Subcommand)]
enum ProductAction {
    /// List all products
    List,
    /// Show one product
    Show {
        /// Product id
        id: ProductId,
    },
    /// Add a product (requires the `admin` group)
    Add {
        #[arg(long)]
        sku: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        /// Price, e.g. 12.50
        #[arg(long)]
        price: String,

        /// ISO 4217 currency code
        #[arg(long, default_value_t = CurrencyCode::USD)]
        currency: CurrencyCode,

        #[arg(long)]
        category: String,

        /// Image file (png, jpg, gif, webp)
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Log filter used when `RUST_LOG` is unset. Logs go to stderr.
const DEFAULT_LOG_FILTER: &str = "ann_traders_storefront=info,ann_traders_cli=info";

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry must be up before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.report();
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), AppError> {
    let state = AppState::new(config)?;

    match cli.command {
        Commands::Register {
            email,
            name,
            password,
        } => commands::account::register(&state, &email, name.as_deref(), password).await,
        Commands::Confirm { email, code } => {
            commands::account::confirm(&state, &email, &code).await
        }
        Commands::Login { email, password } => {
            commands::account::login(&state, &email, password).await
        }
        Commands::Logout => commands::account::logout(&state).await,
        Commands::Session => commands::account::session(&state).await,
        Commands::Products { action } => match action {
            ProductAction::List => commands::products::list(&state).await,
            ProductAction::Show { id } => commands::products::show(&state, id).await,
            ProductAction::Add {
                sku,
                title,
                description,
                price,
                currency,
                category,
                image,
            } => {
                let draft = commands::products::Draft {
                    sku,
                    title,
                    description,
                    price,
                    currency,
                    category,
                };
                commands::products::add(&state, draft, image.as_deref()).await
            }
        },
        Commands::Shop => commands::shop::run(&state).await,
    }
}
