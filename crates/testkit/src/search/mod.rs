//! Search-index isolation.
//!
//! Indices registered by extensions are created once per file group
//! and deleted at group end. Tests that mutate index contents opt into
//! [`IndexIsolation::clear`], which deletes and recreates everything
//! for a guaranteed-clean slate; without it, index mutations leak into
//! later tests in the same group (an accepted performance trade-off).
//!
//! Precondition: file groups never run concurrently against the same
//! search cluster. The controller performs no cross-process
//! coordination.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FixtureError, FixtureResult};

/// A registered search index: name plus mapping definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub mapping: Value,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, mapping: Value) -> Self {
        Self {
            name: name.into(),
            mapping,
        }
    }
}

/// Narrow search-engine seam consumed by the isolation controller.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create an index. Returns [`FixtureError::IndexConflict`] when an
    /// index with this name already exists.
    async fn create_index(&self, spec: &IndexSpec) -> FixtureResult<()>;

    /// Delete an index. With `ignore_missing`, a not-found index is
    /// not an error.
    async fn delete_index(&self, name: &str, ignore_missing: bool) -> FixtureResult<()>;

    /// Make recent writes to an index query-visible.
    async fn refresh(&self, name: &str) -> FixtureResult<()>;

    /// Whether the index exists.
    async fn index_exists(&self, name: &str) -> FixtureResult<bool>;
}

/// Group-scoped index lifecycle controller.
pub struct IndexIsolation {
    engine: Arc<dyn SearchEngine>,
    indices: Vec<IndexSpec>,
}

impl IndexIsolation {
    pub fn new(engine: Arc<dyn SearchEngine>, indices: Vec<IndexSpec>) -> Self {
        Self { engine, indices }
    }

    /// The registered index set.
    pub fn indices(&self) -> &[IndexSpec] {
        &self.indices
    }

    /// Create every registered index and refresh so they are
    /// immediately query-visible.
    ///
    /// If any index already exists (possibly with an incompatible
    /// definition), recovery deletes all registered indices and
    /// recreates them from scratch. Calling this twice in a row
    /// therefore never errors.
    pub async fn create_all(&self) -> FixtureResult<()> {
        if let Err(err) = self.try_create_all().await {
            match err {
                FixtureError::IndexConflict(reason) => {
                    tracing::warn!(reason = %reason, "index conflict, recreating all indices");
                    self.delete_all().await?;
                    self.try_create_all().await?;
                }
                other => return Err(other),
            }
        }

        for spec in &self.indices {
            self.engine.refresh(&spec.name).await?;
        }
        Ok(())
    }

    async fn try_create_all(&self) -> FixtureResult<()> {
        for spec in &self.indices {
            self.engine.create_index(spec).await?;
        }
        Ok(())
    }

    /// Delete every registered index, ignoring missing ones.
    pub async fn delete_all(&self) -> FixtureResult<()> {
        for spec in self.indices.iter().rev() {
            self.engine.delete_index(&spec.name, true).await?;
        }
        Ok(())
    }

    /// Per-test clearing: delete and recreate all indices so the next
    /// test starts from an empty, existing index set.
    pub async fn clear(&self) -> FixtureResult<()> {
        self.delete_all().await?;
        self.create_all().await
    }
}
