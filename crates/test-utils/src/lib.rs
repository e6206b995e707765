//! Shared test utilities for the opt-in gate crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`assert_eventually`] / [`wait_for_value`] - Wait for async state to settle
//! - [`test_identity`], [`alice`], [`bob`] - Identity fixtures
//! - [`test_timing`] - Poll interval and timeouts shared by timer tests
//! - [`strategies`] - Proptest generators

#![deny(unsafe_code)]

mod assertions;
pub use assertions::{assert_eventually, wait_for_value};

mod config;
pub use config::{TestTiming, test_timing};

mod fixtures;
pub use fixtures::{alice, bob, test_identity};

pub mod strategies;
