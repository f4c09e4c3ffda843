//! Plugin discovery and entry-point injection.
//!
//! Extensions are discovered as distributions exposing named entry
//! points, grouped by the hook they plug into. During tests, a
//! synthetic distribution carrying extra entry points can be overlaid
//! on the registry so the application builder sees plugins that are
//! not actually installed. The overlay is removed when its
//! [`InjectionToken`] is uninstalled or dropped, panic or not; a
//! leaked overlay would corrupt discovery for every later file group
//! in the same process.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, FixtureResult};

/// Name given to the synthetic distribution carrying injected entries.
pub const SYNTHETIC_DIST_NAME: &str = "testkit-synthetic";

/// A named, discoverable reference to a pluggable component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// The hook this entry plugs into (e.g. `app.blueprints`).
    pub group: String,
    /// Entry name, unique within its group and distribution.
    pub name: String,
    /// Reference to the component (implementation-defined format).
    pub value: String,
}

impl EntryPoint {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An installed package descriptor exposing entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub name: String,
    pub version: String,
    pub entry_points: Vec<EntryPoint>,
}

/// Source of installed distributions.
pub trait PluginSource: Send + Sync {
    fn distributions(&self) -> FixtureResult<Vec<Distribution>>;
}

/// Fixed, in-memory distribution list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    distributions: Vec<Distribution>,
}

impl StaticSource {
    pub fn new(distributions: Vec<Distribution>) -> Self {
        Self { distributions }
    }
}

impl PluginSource for StaticSource {
    fn distributions(&self) -> FixtureResult<Vec<Distribution>> {
        Ok(self.distributions.clone())
    }
}

/// Scans a directory for distribution manifests (one JSON file per
/// installed distribution).
#[derive(Debug, Clone)]
pub struct DirectoryScan {
    root: PathBuf,
}

impl DirectoryScan {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PluginSource for DirectoryScan {
    fn distributions(&self) -> FixtureResult<Vec<Distribution>> {
        let mut found = Vec::new();
        if !self.root.exists() {
            return Ok(found);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let raw = fs::read_to_string(&path)?;
            let dist: Distribution = serde_json::from_str(&raw).map_err(|e| {
                FixtureError::config(format!(
                    "invalid distribution manifest {}: {}",
                    path.display(),
                    e
                ))
            })?;
            found.push(dist);
        }
        Ok(found)
    }
}

/// Overlay: the wrapped source's distributions plus one synthetic
/// distribution.
struct OverlaySource {
    base: Arc<dyn PluginSource>,
    synthetic: Distribution,
}

impl PluginSource for OverlaySource {
    fn distributions(&self) -> FixtureResult<Vec<Distribution>> {
        let mut all = self.base.distributions()?;
        all.push(self.synthetic.clone());
        Ok(all)
    }
}

/// Swappable plugin-discovery registry.
///
/// The application builder enumerates entry points through this
/// registry; tests overlay synthetic distributions via
/// [`install`](Self::install).
pub struct PluginRegistry {
    source: Mutex<Arc<dyn PluginSource>>,
}

impl PluginRegistry {
    pub fn new(source: Arc<dyn PluginSource>) -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(source),
        })
    }

    fn current_source(&self) -> Arc<dyn PluginSource> {
        match self.source.lock() {
            Ok(guard) => Arc::clone(&*guard),
            // A panic while holding the lock cannot leave the source
            // half-swapped; recover the value rather than poisoning
            // every later file group.
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    fn swap_source(&self, source: Arc<dyn PluginSource>) -> Arc<dyn PluginSource> {
        let mut guard = match self.source.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, source)
    }

    /// Enumerate all currently visible distributions.
    pub fn distributions(&self) -> FixtureResult<Vec<Distribution>> {
        self.current_source().distributions()
    }

    /// Enumerate the entry points of `group` across all distributions.
    pub fn entry_points(&self, group: &str) -> FixtureResult<Vec<EntryPoint>> {
        Ok(self
            .distributions()?
            .into_iter()
            .flat_map(|dist| dist.entry_points)
            .filter(|ep| ep.group == group)
            .collect())
    }

    /// Install a synthetic distribution exposing `extra` entry points.
    ///
    /// The returned token restores the previous source when
    /// uninstalled, or on drop — the restore runs even if the test
    /// body panicked.
    pub fn install(self: &Arc<Self>, extra: Vec<EntryPoint>) -> InjectionToken {
        let synthetic = Distribution {
            name: SYNTHETIC_DIST_NAME.to_string(),
            version: "0.0.0".to_string(),
            entry_points: extra,
        };

        let previous = self.current_source();
        let overlay = Arc::new(OverlaySource {
            base: Arc::clone(&previous),
            synthetic,
        });
        self.swap_source(overlay);
        tracing::debug!("synthetic distribution installed");

        InjectionToken {
            registry: Arc::clone(self),
            previous: Some(previous),
        }
    }
}

/// Proof of an installed synthetic distribution; restores the original
/// discovery source exactly once.
pub struct InjectionToken {
    registry: Arc<PluginRegistry>,
    previous: Option<Arc<dyn PluginSource>>,
}

impl InjectionToken {
    /// Restore the pre-injection source explicitly.
    pub fn uninstall(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.registry.swap_source(previous);
            tracing::debug!("synthetic distribution removed");
        }
    }
}

impl Drop for InjectionToken {
    fn drop(&mut self) {
        self.restore();
    }
}
