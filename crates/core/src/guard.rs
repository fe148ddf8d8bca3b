//! Route guard decisions.
//!
//! Pure functions from credential state to an allow/redirect decision. The
//! storefront's route table decides which rule applies to which path.

use serde::Serialize;

use crate::credential::GroupSet;

/// Outcome of a navigation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RouteDecision {
    /// Show the requested view.
    Allow,
    /// Not signed in; go to the login view.
    RedirectToLogin,
    /// Signed in but not permitted here; go home.
    RedirectToHome,
}

impl RouteDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Guard for views that require a credential and one of `required_roles`.
#[must_use]
pub fn can_enter<S: AsRef<str>>(
    required_roles: &[S],
    current_groups: &GroupSet,
    has_credential: bool,
) -> RouteDecision {
    if !has_credential {
        RouteDecision::RedirectToLogin
    } else if current_groups.intersects(required_roles) {
        RouteDecision::Allow
    } else {
        RouteDecision::RedirectToHome
    }
}

/// Guard for views only meaningful to anonymous visitors (login, register).
#[must_use]
pub const fn can_enter_public_only(has_credential: bool) -> RouteDecision {
    if has_credential {
        RouteDecision::RedirectToHome
    } else {
        RouteDecision::Allow
    }
}

/// Access rule attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Anyone may enter.
    Open,
    /// Requires a credential in one of these groups.
    Protected(&'static [&'static str]),
    /// Only anonymous visitors may enter.
    PublicOnly,
}

impl RouteAccess {
    /// Apply this rule to the given session state.
    #[must_use]
    pub fn decide(&self, current_groups: &GroupSet, has_credential: bool) -> RouteDecision {
        match self {
            Self::Open => RouteDecision::Allow,
            Self::Protected(roles) => can_enter(*roles, current_groups, has_credential),
            Self::PublicOnly => can_enter_public_only(has_credential),
        }
    }
}
