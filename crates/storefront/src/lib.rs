//! ANN Traders storefront library.
//!
//! Session management, the catalog client and the route table, wired
//! together by [`AppState`](state::AppState). The terminal surface lives in
//! the `ann-traders-cli` crate.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod session;
pub mod state;

pub use error::{AppError, Result};
pub use state::AppState;
