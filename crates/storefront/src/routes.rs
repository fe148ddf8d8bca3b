//! Storefront route table.
//!
//! Binds each view to an access rule and resolves navigation requests
//! through the guard:
//!
//! | Path             | Access                |
//! |------------------|-----------------------|
//! | `/`              | open                  |
//! | `/cart`          | open                  |
//! | `/product/{id}`  | open                  |
//! | `/add-product`   | signed in, `admin`    |
//! | `/register`      | anonymous only        |
//! | `/login`         | anonymous only        |

use std::fmt;

use serde::Serialize;

use ann_traders_core::{GroupSet, ProductId, RouteAccess, RouteDecision};

/// Groups allowed to add products.
pub const ADMIN_ROLES: &[&str] = &["admin"];

/// A storefront view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Route {
    Home,
    Cart,
    Product(ProductId),
    AddProduct,
    Register,
    Login,
}

impl Route {
    /// Parse a path such as `/product/42`. Returns `None` for unknown paths.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Some(Self::Home),
            ["cart"] => Some(Self::Cart),
            ["product", id] => id.parse().ok().map(Self::Product),
            ["add-product"] => Some(Self::AddProduct),
            ["register"] => Some(Self::Register),
            ["login"] => Some(Self::Login),
            _ => None,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Cart => "/cart".to_string(),
            Self::Product(id) => format!("/product/{id}"),
            Self::AddProduct => "/add-product".to_string(),
            Self::Register => "/register".to_string(),
            Self::Login => "/login".to_string(),
        }
    }

    /// Access rule for this view.
    #[must_use]
    pub const fn access(&self) -> RouteAccess {
        match self {
            Self::Home | Self::Cart | Self::Product(_) => RouteAccess::Open,
            Self::AddProduct => RouteAccess::Protected(ADMIN_ROLES),
            Self::Register | Self::Login => RouteAccess::PublicOnly,
        }
    }

    /// View a guard decision sends the visitor to instead of `self`.
    #[must_use]
    pub const fn redirected(self, decision: RouteDecision) -> Self {
        match decision {
            RouteDecision::Allow => self,
            RouteDecision::RedirectToLogin => Self::Login,
            RouteDecision::RedirectToHome => Self::Home,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Result of resolving a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Navigation {
    /// View that was asked for.
    pub requested: Route,
    /// Guard decision for that view.
    pub decision: RouteDecision,
    /// View actually shown.
    pub shown: Route,
}

/// Resolve a navigation request against the session state.
#[must_use]
pub fn navigate(requested: Route, groups: &GroupSet, has_credential: bool) -> Navigation {
    let decision = requested.access().decide(groups, has_credential);
    Navigation {
        requested,
        decision,
        shown: requested.redirected(decision),
    }
}

/// Adding to the cart requires a signed-in visitor.
#[must_use]
pub const fn purchase_gate(has_credential: bool) -> RouteDecision {
    if has_credential {
        RouteDecision::Allow
    } else {
        RouteDecision::RedirectToLogin
    }
}

/// Navigation menu contents for the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavMenu {
    /// Links shown in the menu bar, in order.
    pub links: Vec<Route>,
    /// Cart button; `Some(total quantity)` when signed in.
    pub cart: Option<u64>,
    /// Whether to offer logout rather than sign-in and register.
    pub signed_in: bool,
}

impl NavMenu {
    #[must_use]
    pub fn build(groups: &GroupSet, has_credential: bool, cart_quantity: u64) -> Self {
        let mut links = vec![Route::Home];
        if has_credential && groups.intersects(ADMIN_ROLES) {
            links.push(Route::AddProduct);
        }
        if !has_credential {
            links.extend([Route::Login, Route::Register]);
        }

        Self {
            links,
            cart: has_credential.then_some(cart_quantity),
            signed_in: has_credential,
        }
    }

    /// Badge text for the cart button; hidden for an empty cart.
    #[must_use]
    pub fn cart_badge(&self) -> Option<String> {
        self.cart
            .filter(|quantity| *quantity > 0)
            .map(|quantity| quantity.to_string())
    }
}
