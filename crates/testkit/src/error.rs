//! Fixture error types

use thiserror::Error;

/// Result type alias for fixture operations
pub type FixtureResult<T> = std::result::Result<T, FixtureError>;

/// Error taxonomy for fixture setup, use and teardown.
///
/// Setup failures are fatal for the whole file group; errors from
/// external resources (database, search engine) propagate unwrapped so
/// the underlying client error stays visible in the test report.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Fatal setup failure (schema creation, application factory).
    /// Every test depending on the group sees this error.
    #[error("Fixture setup failed: {0}")]
    Setup(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage-engine semantic error outside of the sqlx driver
    /// (unknown savepoint, unsupported statement in a test double).
    #[error("Storage error: {0}")]
    Storage(String),

    /// An index already exists with an incompatible definition.
    /// `IndexIsolation::create_all` recovers from this by deleting
    /// and recreating all indices.
    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Search engine error: {0}")]
    Search(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A fixture depends on an optional application capability that
    /// was not registered.
    #[error("Capability '{0}' is not installed on the application. \
             Register it on the capability registry before requesting this fixture.")]
    MissingCapability(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] testkit_common::CommonError),
}

impl FixtureError {
    /// Create a fatal setup error
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a search error
    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a missing-capability error
    pub fn missing_capability(name: impl Into<String>) -> Self {
        Self::MissingCapability(name.into())
    }
}
