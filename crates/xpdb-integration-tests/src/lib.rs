//! xpdb Integration Tests
//!
//! This crate contains integration tests that run xpdb against real
//! PostgreSQL and MySQL servers. It is NOT published to crates.io.
//!
//! # Test Categories
//!
//! - **reconcile_postgres**: Insert-or-find batches, existence flags, literal round-trips
//! - **bootstrap_postgres**: Schema bootstrap with dollar-quoted function bodies
//! - **mysql_staging**: MySQL staging load and enumeration
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests (Docker required)
//! cargo test -p xpdb-integration-tests -- --ignored
//!
//! # Run specific test suite
//! cargo test -p xpdb-integration-tests --test reconcile_postgres -- --ignored
//!
//! # Run with logging
//! RUST_LOG=debug cargo test -p xpdb-integration-tests -- --ignored --nocapture
//!
//! # Run against an existing PostgreSQL server instead of a container
//! XPDB_TEST_PG_CONFIG=pg-scratch.yaml \
//!     cargo test -p xpdb-integration-tests -- --ignored --test-threads=1
//! ```
//!
//! # Requirements
//!
//! The database tests use testcontainers and require Docker to be running,
//! unless `XPDB_TEST_PG_CONFIG` or `XPDB_TEST_MYSQL_CONFIG` names a
//! connection config YAML file. The database it points at is emptied when a
//! fixture starts.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
