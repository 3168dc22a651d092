//! Integration test crate for the parkmesh marketplace.
//!
//! This crate exists solely to run tests that span the ledger, marketplace
//! and API crates. It has no public API.

#![forbid(unsafe_code)]
