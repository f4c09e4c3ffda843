//! Application builder and group-scoped composition.
//!
//! The application under test is built by a user-supplied factory,
//! exactly once per file group, from the merged [`AppConfig`]. The
//! [`TestHarness`] ties the pieces together: it owns the process-wide
//! [`ScopeRegistry`] and hands out [`GroupContext`]s that lazily wire
//! the database and index fixtures into the group's lifetime.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::OnceCell;

use crate::config::AppConfig;
use crate::db::isolation::{DatabaseFixture, IsolatedSession};
use crate::db::{Schema, StorageEngine};
use crate::error::{FixtureError, FixtureResult};
use crate::scope::{ScopeId, ScopeRegistry};
use crate::search::{IndexIsolation, IndexSpec, SearchEngine};

/// Named lookup of optional application extensions.
///
/// Capability-dependent fixtures (e.g. the mailbox) resolve their
/// extension here and fail with a descriptive error when it is absent,
/// instead of probing the application object at runtime.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under `name`.
    pub fn register<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, capability: T) {
        self.capabilities.insert(name.into(), Arc::new(capability));
    }

    /// Look up a capability, if registered with a matching type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.capabilities
            .get(name)
            .and_then(|cap| Arc::clone(cap).downcast::<T>().ok())
    }

    /// Look up a required capability, failing descriptively when absent.
    pub fn require<T: Send + Sync + 'static>(&self, name: &str) -> FixtureResult<Arc<T>> {
        self.get(name)
            .ok_or_else(|| FixtureError::missing_capability(name))
    }

    /// Remove a capability (used by tests simulating a missing extension).
    pub fn remove(&mut self, name: &str) {
        self.capabilities.remove(name);
    }
}

/// Implemented by applications the harness can manage.
pub trait TestApplication: Send + Sync + 'static {
    /// The application's extension lookup.
    fn capabilities(&self) -> &CapabilityRegistry;
}

/// Build an application from `config` via the user-supplied factory.
///
/// Attaches the diagnostic tracing handler first (no-op when one is
/// already installed) so factory output is captured. A factory error
/// is a fatal setup failure for the whole file group.
pub fn build<A, F>(config: &AppConfig, factory: F) -> FixtureResult<A>
where
    F: FnOnce(&AppConfig) -> FixtureResult<A>,
{
    testkit_common::logging::init_test_logging();
    config.validate()?;

    factory(config).map_err(|e| FixtureError::setup(format!("application factory failed: {}", e)))
}

/// File-group context: the built application plus lazily initialized
/// database and index fixtures, all sharing the group's lifetime.
pub struct GroupContext<A> {
    name: String,
    config: AppConfig,
    app: A,
    // Keeps the temporary instance directory alive for the group.
    _instance_dir: TempDir,
    database: OnceCell<Arc<DatabaseFixture>>,
    search: OnceCell<Arc<IndexIsolation>>,
}

impl<A: Send + Sync + 'static> GroupContext<A> {
    /// The group's name (normally the test source file).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The merged configuration the application was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The application under test. Stable for the group's lifetime.
    pub fn app(&self) -> &A {
        &self.app
    }

    /// Initialize (once) and return the group's database fixture.
    ///
    /// Creates the database if missing and the schema exactly once;
    /// later calls return the same fixture regardless of arguments.
    pub async fn database(
        &self,
        engine: Arc<dyn StorageEngine>,
        schema: Arc<dyn Schema>,
    ) -> FixtureResult<Arc<DatabaseFixture>> {
        self.database
            .get_or_try_init(|| async {
                let fixture =
                    DatabaseFixture::setup(engine, self.config.storage_uri.clone(), schema).await?;
                Ok(Arc::new(fixture))
            })
            .await
            .cloned()
    }

    /// Open a per-test isolated session on the group's database.
    ///
    /// The database fixture must have been initialized first.
    pub async fn session(&self) -> FixtureResult<IsolatedSession> {
        let fixture = self.database.get().ok_or_else(|| {
            FixtureError::setup("database fixture was not initialized for this group")
        })?;
        fixture.session().await
    }

    /// Initialize (once) the group's index set and create all indices.
    pub async fn search(
        &self,
        engine: Arc<dyn SearchEngine>,
        indices: Vec<IndexSpec>,
    ) -> FixtureResult<Arc<IndexIsolation>> {
        self.search
            .get_or_try_init(|| async {
                let isolation = IndexIsolation::new(engine, indices);
                isolation.create_all().await?;
                Ok(Arc::new(isolation))
            })
            .await
            .cloned()
    }
}

impl<A: TestApplication> GroupContext<A> {
    /// Resolve a required application capability.
    pub fn capability<T: Send + Sync + 'static>(&self, name: &str) -> FixtureResult<Arc<T>> {
        self.app.capabilities().require(name)
    }
}

/// Process-scoped harness: owns the scope registry and amortizes
/// group setup across the tests of each file group.
pub struct TestHarness {
    registry: Arc<ScopeRegistry>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ScopeRegistry::new()),
        }
    }

    /// The process-wide scope registry.
    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// Get or create the context for file group `name`.
    ///
    /// The factory runs only for the first caller; later callers in
    /// the same group share the built application. Database schema and
    /// indices are dropped when the group ends.
    pub async fn group<A, F>(&self, name: &str, factory: F) -> FixtureResult<Arc<GroupContext<A>>>
    where
        A: Send + Sync + 'static,
        F: FnOnce(&AppConfig) -> FixtureResult<A>,
    {
        let scope = ScopeId::group(name);
        let group_name = name.to_string();

        self.registry
            .acquire_with_teardown(
                scope,
                "app",
                || async move {
                    let instance_dir = TempDir::new()?;
                    let config = AppConfig::for_tests(instance_dir.path());
                    let app = build(&config, factory)?;
                    tracing::info!(group = %group_name, "application built for group");
                    Ok(GroupContext {
                        name: group_name,
                        config,
                        app,
                        _instance_dir: instance_dir,
                        database: OnceCell::new(),
                        search: OnceCell::new(),
                    })
                },
                |group: Arc<GroupContext<A>>| {
                    Box::pin(async move {
                        let mut first_error = None;

                        if let Some(search) = group.search.get() {
                            if let Err(err) = search.delete_all().await {
                                tracing::error!(error = %err, "index teardown failed");
                                first_error.get_or_insert(err);
                            }
                        }
                        if let Some(database) = group.database.get() {
                            if let Err(err) = database.teardown().await {
                                tracing::error!(error = %err, "database teardown failed");
                                first_error.get_or_insert(err);
                            }
                        }

                        match first_error {
                            Some(err) => Err(err),
                            None => Ok(()),
                        }
                    })
                },
            )
            .await
    }

    /// End file group `name`, tearing down everything it acquired.
    pub async fn end_group(&self, name: &str) -> FixtureResult<()> {
        self.registry.end_scope(&ScopeId::group(name)).await
    }
}
