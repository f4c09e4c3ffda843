//! Testkit Fixture Library
//!
//! Lifecycle-managed test resources for applications built on a
//! modular web framework: a built application, a transactional
//! database session, a registered search-index set, captured mail and
//! gated browser automation — shared across the tests of one file
//! group instead of being rebuilt per test.
//!
//! # Overview
//!
//! - **Scope Registry**: resources keyed by process, file-group or
//!   test scope; created once per scope, torn down in reverse order
//! - **Application Builder**: user factory invoked once per group from
//!   a merged, env-overridable configuration map
//! - **Database Isolation**: schema once per group; per-test savepoint
//!   sessions whose writes are rolled back wholesale at test end
//! - **Index Isolation**: group-scoped index set with delete/recreate
//!   clearing for tests that mutate index contents
//! - **Entry-Point Injection**: synthetic plugin distributions overlaid
//!   on discovery for a group's duration, restored fail-safe
//!
//! Execution is strictly sequential: one test runs to completion
//! before the next begins. Only the database session rolls back
//! automatically; anything else a test mutates (index contents, cache
//! entries, filesystem state) needs an explicit clearing fixture, or
//! it leaks into later tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use testkit::{AppConfig, TestHarness};
//! use testkit::db::{PgStorage, SqlSchema};
//!
//! # struct MyApp;
//! # fn create_app(_: &AppConfig) -> testkit::FixtureResult<MyApp> { Ok(MyApp) }
//! # async fn example() -> testkit::FixtureResult<()> {
//! let harness = TestHarness::new();
//! let group = harness.group("test_records", create_app).await?;
//!
//! let schema = Arc::new(SqlSchema::new(
//!     ["CREATE TABLE IF NOT EXISTS records (id BIGSERIAL PRIMARY KEY)"],
//!     ["DROP TABLE IF EXISTS records"],
//! ));
//! group.database(Arc::new(PgStorage::new()), schema).await?;
//!
//! let mut session = group.session().await?;
//! session.execute("INSERT INTO records DEFAULT VALUES").await?;
//! session.finish().await?; // rolled back; the next test sees an empty table
//!
//! harness.end_group("test_records").await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod plugins;
pub mod scope;
pub mod search;

// Re-export commonly used types
pub use app::{build, CapabilityRegistry, GroupContext, TestApplication, TestHarness};
pub use config::AppConfig;
pub use error::{FixtureError, FixtureResult};
pub use scope::{ScopeId, ScopeRegistry};
