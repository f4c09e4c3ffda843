//! Shared test support: in-memory doubles for the storage and search
//! seams, so the isolation controllers can be exercised without a
//! running Postgres or Elasticsearch.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use testkit::db::{StorageConnection, StorageEngine};
use testkit::search::{IndexSpec, SearchEngine};
use testkit::{FixtureError, FixtureResult};

pub fn init_test_tracing() {
    testkit_common::logging::init_test_logging();
}

// ============================================================================
// In-memory storage engine
// ============================================================================

type Tables = HashMap<String, Vec<String>>;

#[derive(Default)]
struct MemoryState {
    databases: HashMap<String, Tables>,
}

/// In-memory storage engine with snapshot-based savepoints.
///
/// Understands just enough statement shapes for fixture tests:
/// `CREATE TABLE [IF NOT EXISTS]`, `DROP TABLE [IF EXISTS]`,
/// `INSERT INTO`, `DELETE FROM` and `SELECT COUNT(*) FROM`.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct table row count, bypassing any connection (used to
    /// assert on committed state).
    pub fn committed_rows(&self, uri: &str, table: &str) -> usize {
        self.state
            .lock()
            .expect("memory storage lock")
            .databases
            .get(uri)
            .and_then(|tables| tables.get(table))
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    /// Table names present in the database.
    pub fn table_names(&self, uri: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("memory storage lock")
            .databases
            .get(uri)
            .map(|tables| {
                let mut names: Vec<String> = tables.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    async fn exists(&self, uri: &str) -> FixtureResult<bool> {
        Ok(self
            .state
            .lock()
            .expect("memory storage lock")
            .databases
            .contains_key(uri))
    }

    async fn create(&self, uri: &str) -> FixtureResult<()> {
        let mut state = self.state.lock().expect("memory storage lock");
        if state.databases.contains_key(uri) {
            return Err(FixtureError::storage(format!("database '{uri}' already exists")));
        }
        state.databases.insert(uri.to_string(), Tables::new());
        Ok(())
    }

    async fn connect(&self, uri: &str) -> FixtureResult<Box<dyn StorageConnection>> {
        if !self.exists(uri).await? {
            return Err(FixtureError::storage(format!("database '{uri}' does not exist")));
        }
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            uri: uri.to_string(),
            begin_snapshot: None,
            savepoints: Vec::new(),
        }))
    }
}

pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    uri: String,
    begin_snapshot: Option<Tables>,
    savepoints: Vec<(String, Tables)>,
}

impl MemoryConnection {
    fn tables<'a>(
        guard: &'a mut MutexGuard<'_, MemoryState>,
        uri: &str,
    ) -> FixtureResult<&'a mut Tables> {
        guard
            .databases
            .get_mut(uri)
            .ok_or_else(|| FixtureError::storage(format!("database '{uri}' does not exist")))
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory storage lock")
    }
}

fn table_token(token: Option<&&str>) -> FixtureResult<String> {
    token
        .map(|t| t.trim_matches(|c| c == '(' || c == ';').to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FixtureError::storage("statement names no table"))
}

fn starts_with(upper: &[String], words: &[&str]) -> bool {
    words.len() <= upper.len() && upper.iter().zip(words).all(|(a, b)| a == b)
}

#[async_trait]
impl StorageConnection for MemoryConnection {
    async fn execute(&mut self, sql: &str) -> FixtureResult<u64> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_uppercase()).collect();
        let mut guard = self.lock();
        let tables = Self::tables(&mut guard, &self.uri)?;

        if starts_with(&upper, &["CREATE", "TABLE", "IF", "NOT", "EXISTS"]) {
            let name = table_token(tokens.get(5))?;
            tables.entry(name).or_default();
            Ok(0)
        } else if starts_with(&upper, &["CREATE", "TABLE"]) {
            let name = table_token(tokens.get(2))?;
            tables.entry(name).or_default();
            Ok(0)
        } else if starts_with(&upper, &["DROP", "TABLE", "IF", "EXISTS"]) {
            let name = table_token(tokens.get(4))?;
            tables.remove(&name);
            Ok(0)
        } else if starts_with(&upper, &["DROP", "TABLE"]) {
            let name = table_token(tokens.get(2))?;
            tables.remove(&name);
            Ok(0)
        } else if starts_with(&upper, &["INSERT", "INTO"]) {
            let name = table_token(tokens.get(2))?;
            let rows = tables
                .get_mut(&name)
                .ok_or_else(|| FixtureError::storage(format!("table '{name}' does not exist")))?;
            rows.push(sql.to_string());
            Ok(1)
        } else if starts_with(&upper, &["DELETE", "FROM"]) {
            let name = table_token(tokens.get(2))?;
            let rows = tables
                .get_mut(&name)
                .ok_or_else(|| FixtureError::storage(format!("table '{name}' does not exist")))?;
            let removed = rows.len() as u64;
            rows.clear();
            Ok(removed)
        } else {
            Err(FixtureError::storage(format!("unsupported statement: {sql}")))
        }
    }

    async fn fetch_i64(&mut self, sql: &str) -> FixtureResult<i64> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_uppercase()).collect();
        let mut guard = self.lock();
        let tables = Self::tables(&mut guard, &self.uri)?;

        if starts_with(&upper, &["SELECT", "COUNT(*)", "FROM"]) {
            let name = table_token(tokens.get(3))?;
            let rows = tables
                .get(&name)
                .ok_or_else(|| FixtureError::storage(format!("table '{name}' does not exist")))?;
            Ok(rows.len() as i64)
        } else {
            Err(FixtureError::storage(format!("unsupported query: {sql}")))
        }
    }

    async fn begin(&mut self) -> FixtureResult<()> {
        if self.begin_snapshot.is_some() {
            return Err(FixtureError::storage("transaction already open"));
        }
        let tables = {
            let mut guard = self.lock();
            Self::tables(&mut guard, &self.uri)?.clone()
        };
        self.begin_snapshot = Some(tables);
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> FixtureResult<()> {
        if self.begin_snapshot.is_none() {
            return Err(FixtureError::storage("savepoint outside of a transaction"));
        }
        let tables = {
            let mut guard = self.lock();
            Self::tables(&mut guard, &self.uri)?.clone()
        };
        self.savepoints.push((name.to_string(), tables));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> FixtureResult<()> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| FixtureError::storage(format!("unknown savepoint '{name}'")))?;
        // Releasing a savepoint also releases everything nested in it.
        self.savepoints.truncate(position);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> FixtureResult<()> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| FixtureError::storage(format!("unknown savepoint '{name}'")))?;
        let snapshot = self.savepoints[position].1.clone();
        {
            let mut guard = self.lock();
            let tables = Self::tables(&mut guard, &self.uri)?;
            *tables = snapshot;
        }
        // The savepoint itself survives a rollback-to.
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    async fn rollback(&mut self) -> FixtureResult<()> {
        let snapshot = self
            .begin_snapshot
            .take()
            .ok_or_else(|| FixtureError::storage("rollback outside of a transaction"))?;
        self.savepoints.clear();
        let mut guard = self.lock();
        let tables = Self::tables(&mut guard, &self.uri)?;
        *tables = snapshot;
        Ok(())
    }

    async fn close(self: Box<Self>) -> FixtureResult<()> {
        Ok(())
    }
}

// ============================================================================
// In-memory search engine
// ============================================================================

struct MemoryIndex {
    mapping: Value,
    docs: HashMap<String, Value>,
}

/// In-memory search engine with explicit document accessors for tests
/// that simulate application-side indexing.
#[derive(Default)]
pub struct MemorySearch {
    indices: Mutex<HashMap<String, MemoryIndex>>,
}

impl MemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_doc(&self, index: &str, id: &str, doc: Value) -> FixtureResult<()> {
        let mut indices = self.indices.lock().expect("memory search lock");
        let entry = indices
            .get_mut(index)
            .ok_or_else(|| FixtureError::search(format!("index '{index}' does not exist")))?;
        entry.docs.insert(id.to_string(), doc);
        Ok(())
    }

    pub fn get_doc(&self, index: &str, id: &str) -> FixtureResult<Option<Value>> {
        let indices = self.indices.lock().expect("memory search lock");
        let entry = indices
            .get(index)
            .ok_or_else(|| FixtureError::search(format!("index '{index}' does not exist")))?;
        Ok(entry.docs.get(id).cloned())
    }
}

#[async_trait]
impl SearchEngine for MemorySearch {
    async fn create_index(&self, spec: &IndexSpec) -> FixtureResult<()> {
        let mut indices = self.indices.lock().expect("memory search lock");
        if indices.contains_key(&spec.name) {
            return Err(FixtureError::IndexConflict(format!(
                "index '{}' already exists",
                spec.name
            )));
        }
        indices.insert(
            spec.name.clone(),
            MemoryIndex {
                mapping: spec.mapping.clone(),
                docs: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, name: &str, ignore_missing: bool) -> FixtureResult<()> {
        let removed = self
            .indices
            .lock()
            .expect("memory search lock")
            .remove(name)
            .is_some();
        if removed || ignore_missing {
            Ok(())
        } else {
            Err(FixtureError::search(format!("index '{name}' does not exist")))
        }
    }

    async fn refresh(&self, name: &str) -> FixtureResult<()> {
        let indices = self.indices.lock().expect("memory search lock");
        if indices.contains_key(name) {
            Ok(())
        } else {
            Err(FixtureError::search(format!("index '{name}' does not exist")))
        }
    }

    async fn index_exists(&self, name: &str) -> FixtureResult<bool> {
        Ok(self
            .indices
            .lock()
            .expect("memory search lock")
            .contains_key(name))
    }
}
