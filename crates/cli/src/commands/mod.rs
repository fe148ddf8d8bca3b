//! Subcommand implementations.
//!
//! These write to stdout; logs go to stderr through `tracing`.

#[allow(clippy::print_stdout)]
pub mod account;
#[allow(clippy::print_stdout)]
pub mod products;
#[allow(clippy::print_stdout)]
pub mod shop;
