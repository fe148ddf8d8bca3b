//! Application state shared across the storefront surface.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use ann_traders_core::{Cart, CheckoutSummary, Product, RouteDecision};

use crate::catalog::CatalogClient;
use crate::config::StorefrontConfig;
use crate::error::{AppError, add_breadcrumb};
use crate::identity::CognitoClient;
use crate::routes::{NavMenu, Navigation, Route, navigate, purchase_gate};
use crate::session::{FileStore, KeyValueStore, SessionManager};

/// Application state: the session manager, the cart and the catalog client.
///
/// This struct is cheaply cloneable via `Arc`. The session and the cart are
/// independent containers; neither knows about the other.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    session: SessionManager,
    catalog: CatalogClient,
    cart: Mutex<Cart>,
}

impl AppState {
    /// Wire up the storefront from configuration: file-backed session
    /// storage, the Cognito client and the catalog client.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, AppError> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.session_file));
        let identity = CognitoClient::new(&config.cognito, config.http_timeout, storage.clone())?;
        let session = SessionManager::new(Arc::new(identity), storage);
        let catalog = CatalogClient::from_config(&config)?;

        Ok(Self::from_parts(config, session, catalog))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        session: SessionManager,
        catalog: CatalogClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                session,
                catalog,
                cart: Mutex::new(Cart::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    /// Run `f` with exclusive access to the cart.
    pub fn with_cart<T>(&self, f: impl FnOnce(&mut Cart) -> T) -> T {
        let mut cart = self.inner.cart.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cart)
    }

    /// Copy of the cart as it is now.
    #[must_use]
    pub fn cart_snapshot(&self) -> Cart {
        self.with_cart(|cart| cart.clone())
    }

    /// Add a product to the cart if the visitor is signed in.
    ///
    /// Returns the purchase gate decision; the cart is only touched when it
    /// is `Allow`.
    pub fn add_to_cart(&self, product: Product, quantity: u32) -> RouteDecision {
        let decision = purchase_gate(self.session().is_authenticated());
        if decision.is_allowed() {
            let product_id = product.id.to_string();
            self.with_cart(|cart| cart.add_item(product, quantity));
            add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
        } else {
            debug!("Add to cart requires sign-in");
        }
        decision
    }

    /// Check out and empty the cart. `None` if the cart is empty.
    pub fn checkout(&self) -> Option<CheckoutSummary> {
        let summary = self.with_cart(Cart::checkout);
        if summary.is_some() {
            add_breadcrumb("cart", "Checked out", None);
        }
        summary
    }

    /// Resolve a path through the route guard. `None` for unknown paths.
    #[must_use]
    pub fn navigate(&self, path: &str) -> Option<Navigation> {
        let route = Route::parse(path)?;
        let session = self.session();
        Some(navigate(
            route,
            &session.current_groups(),
            session.is_authenticated(),
        ))
    }

    /// Menu for the current session and cart.
    #[must_use]
    pub fn nav_menu(&self) -> NavMenu {
        let session = self.session();
        let quantity = self.with_cart(|cart| cart.total_quantity());
        NavMenu::build(
            &session.current_groups(),
            session.is_authenticated(),
            quantity,
        )
    }
}
