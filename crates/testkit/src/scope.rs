//! Scope registry: shared, lifetime-bound test resources.
//!
//! Resources live at one of three scopes: process, file group or test.
//! A resource acquired at a scope is instantiated exactly once for that
//! scope; every later consumer with the same key shares the handle. The
//! resource is disposed exactly once, either when the last consumer
//! releases it or when the scope ends, whichever comes first.
//!
//! Teardown runs in reverse acquisition order so dependency chains
//! unwind correctly (an index controller tears down before the
//! application owning its client). Ending a scope also ends any
//! narrower scopes nested inside it, so a leaked test-scoped resource
//! can never outlive its file group.
//!
//! The registry assumes the runner's strictly sequential execution
//! model: one test runs to completion before the next begins.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{FixtureError, FixtureResult};

/// Boxed future returned by resource finalizers.
pub type TeardownFuture = Pin<Box<dyn Future<Output = FixtureResult<()>> + Send>>;

type Teardown = Box<dyn FnOnce() -> TeardownFuture + Send>;

/// A lifetime boundary for shared test resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeId {
    /// The whole test process.
    Process,
    /// All tests in one test source file.
    Group(String),
    /// A single test function within a group.
    Test { group: String, test: String },
}

impl ScopeId {
    /// File-group scope for the named test file.
    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    /// Test scope for one test function within a group.
    pub fn test(group: impl Into<String>, test: impl Into<String>) -> Self {
        Self::Test {
            group: group.into(),
            test: test.into(),
        }
    }

    /// The enclosing scope, if any.
    pub fn parent(&self) -> Option<ScopeId> {
        match self {
            ScopeId::Process => None,
            ScopeId::Group(_) => Some(ScopeId::Process),
            ScopeId::Test { group, .. } => Some(ScopeId::Group(group.clone())),
        }
    }

    /// Whether `self` is `ancestor` or nested inside it.
    pub fn is_within(&self, ancestor: &ScopeId) -> bool {
        if self == ancestor {
            return true;
        }
        match self.parent() {
            Some(parent) => parent.is_within(ancestor),
            None => false,
        }
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeId::Process => write!(f, "process"),
            ScopeId::Group(name) => write!(f, "group:{}", name),
            ScopeId::Test { group, test } => write!(f, "test:{}::{}", group, test),
        }
    }
}

struct Entry {
    scope: ScopeId,
    key: String,
    value: Arc<dyn Any + Send + Sync>,
    consumers: usize,
    teardown: Option<Teardown>,
}

/// Registry of scope-bound resources.
///
/// ```no_run
/// use std::sync::Arc;
/// use testkit::scope::{ScopeId, ScopeRegistry};
///
/// # async fn example() -> testkit::FixtureResult<()> {
/// let registry = ScopeRegistry::new();
/// let scope = ScopeId::group("test_users");
/// let pool: Arc<String> = registry
///     .acquire(scope.clone(), "pool", || async { Ok("connected".to_string()) })
///     .await?;
/// registry.end_scope(&scope).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ScopeRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the resource registered under `key` at `scope`,
    /// running `init` only if no consumer has acquired it yet.
    ///
    /// The resource is dropped (without a finalizer) when released;
    /// use [`acquire_with_teardown`](Self::acquire_with_teardown) for
    /// resources needing async disposal.
    pub async fn acquire<T, F, Fut>(
        &self,
        scope: ScopeId,
        key: &str,
        init: F,
    ) -> FixtureResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FixtureResult<T>>,
    {
        self.acquire_inner(scope, key, init, None::<fn(Arc<T>) -> TeardownFuture>)
            .await
    }

    /// Like [`acquire`](Self::acquire), but registers an async
    /// finalizer that runs exactly once when the resource is disposed.
    pub async fn acquire_with_teardown<T, F, Fut, D>(
        &self,
        scope: ScopeId,
        key: &str,
        init: F,
        teardown: D,
    ) -> FixtureResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FixtureResult<T>>,
        D: FnOnce(Arc<T>) -> TeardownFuture + Send + 'static,
    {
        self.acquire_inner(scope, key, init, Some(teardown)).await
    }

    async fn acquire_inner<T, F, Fut, D>(
        &self,
        scope: ScopeId,
        key: &str,
        init: F,
        teardown: Option<D>,
    ) -> FixtureResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FixtureResult<T>>,
        D: FnOnce(Arc<T>) -> TeardownFuture + Send + 'static,
    {
        // Held across the init await: tests run strictly sequentially,
        // so no other consumer can be racing for the same entry.
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.scope == scope && e.key == key)
        {
            entry.consumers += 1;
            return entry.value.clone().downcast::<T>().map_err(|_| {
                FixtureError::config(format!(
                    "resource '{}' at scope {} was registered with a different type",
                    key, scope
                ))
            });
        }

        let value = Arc::new(init().await?);
        tracing::debug!(scope = %scope, key, "scoped resource created");

        let finalizer: Option<Teardown> = teardown.map(|teardown| {
            let value = Arc::clone(&value);
            Box::new(move || teardown(value)) as Teardown
        });

        entries.push(Entry {
            scope,
            key: key.to_string(),
            value: value.clone() as Arc<dyn Any + Send + Sync>,
            consumers: 1,
            teardown: finalizer,
        });

        Ok(value)
    }

    /// Release one consumer of `key` at `scope`.
    ///
    /// When the last consumer releases, the resource is removed and
    /// its finalizer runs.
    pub async fn release(&self, scope: &ScopeId, key: &str) -> FixtureResult<()> {
        let finalizer = {
            let mut entries = self.entries.lock().await;
            let index = entries
                .iter()
                .position(|e| &e.scope == scope && e.key == key)
                .ok_or_else(|| {
                    FixtureError::config(format!(
                        "release of unknown resource '{}' at scope {}",
                        key, scope
                    ))
                })?;

            entries[index].consumers -= 1;
            if entries[index].consumers > 0 {
                return Ok(());
            }
            entries.remove(index).teardown
        };

        tracing::debug!(scope = %scope, key, "scoped resource disposed");
        match finalizer {
            Some(teardown) => teardown().await,
            None => Ok(()),
        }
    }

    /// End `scope`: finalize every resource still registered at it, or
    /// at any scope nested inside it, in reverse acquisition order.
    ///
    /// All finalizers run even if one fails; the first error is
    /// returned afterwards. This is the fail-safe teardown path for
    /// resources whose consumers never released them (e.g. after a
    /// panicking test body).
    pub async fn end_scope(&self, scope: &ScopeId) -> FixtureResult<()> {
        let ending: Vec<Entry> = {
            let mut entries = self.entries.lock().await;
            let mut ending = Vec::new();
            let mut index = 0;
            while index < entries.len() {
                if entries[index].scope.is_within(scope) {
                    ending.push(entries.remove(index));
                } else {
                    index += 1;
                }
            }
            ending
        };

        let mut first_error = None;
        for entry in ending.into_iter().rev() {
            if entry.consumers > 0 {
                tracing::warn!(
                    scope = %entry.scope,
                    key = %entry.key,
                    consumers = entry.consumers,
                    "scope ended with outstanding consumers"
                );
            }
            if let Some(teardown) = entry.teardown {
                if let Err(err) = teardown().await {
                    tracing::error!(key = %entry.key, error = %err, "resource teardown failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of resources currently registered at `scope`.
    pub async fn active_count(&self, scope: &ScopeId) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| &e.scope == scope)
            .count()
    }
}
