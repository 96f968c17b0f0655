//! # Scenario Test Suite
//!
//! End-to-end tests that drive [`crate::TideEngine`] over small fixture datasets
//! written to temporary directories. Unit tests for individual algorithms live next
//! to the code they cover.

pub(crate) mod fixtures;

mod catalog_tests;
