//! Shared test utilities for the Vault lifecycle crates.
//!
//! This crate provides:
//! - Scripted mock backends for sessions and leases
//! - Proptest generators for lifecycle types
//! - Vault API response fixtures for HTTP-level tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{MockAuthBackend, MockSecretBackend, RenewBehavior};
