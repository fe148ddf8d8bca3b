//! ANN Traders Core - Shared types and client-side state.
//!
//! This crate provides the pieces of the storefront that carry invariants:
//! - [`cart`] - The in-memory cart store (product lines and derived totals)
//! - [`credential`] - Session credential wrapper and claim decoding
//! - [`guard`] - Pure route guard decisions
//! - [`types`] - Newtype wrappers for IDs, prices, emails, and products
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O,
//! no HTTP clients, no storage. Session persistence and identity-provider
//! calls live in the `storefront` crate and call into these types.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod credential;
pub mod guard;
pub mod types;

pub use cart::{Cart, CartLine, CheckoutSummary};
pub use credential::{Claims, Credential, GroupSet, decode_claims, groups_from_token};
pub use guard::{RouteAccess, RouteDecision, can_enter, can_enter_public_only};
pub use types::*;
