//! Storage-engine seams and the Postgres implementation.
//!
//! The isolation controller only ever talks to the narrow
//! [`StorageEngine`] / [`StorageConnection`] traits: verify or create
//! a database, connect, and drive transactions and savepoints on the
//! connection. The production implementation is Postgres through sqlx;
//! integration tests substitute an in-memory double.

pub mod isolation;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection, Executor, PgConnection, Row};
use url::Url;

use crate::error::{FixtureError, FixtureResult};

// ============================================================================
// Seams
// ============================================================================

/// One open connection to the storage engine.
///
/// Transaction control is explicit rather than SQL-string based so
/// non-SQL test doubles can implement the same choreography.
#[async_trait]
pub trait StorageConnection: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> FixtureResult<u64>;

    /// Fetch a single integer value (e.g. a `COUNT(*)`).
    async fn fetch_i64(&mut self, sql: &str) -> FixtureResult<i64>;

    /// Begin the outer transaction.
    async fn begin(&mut self) -> FixtureResult<()>;

    /// Open a named savepoint inside the current transaction.
    async fn savepoint(&mut self, name: &str) -> FixtureResult<()>;

    /// Release (commit) a named savepoint into the enclosing transaction.
    async fn release_savepoint(&mut self, name: &str) -> FixtureResult<()>;

    /// Roll back to a named savepoint, discarding writes made since.
    async fn rollback_to_savepoint(&mut self, name: &str) -> FixtureResult<()>;

    /// Roll back the outer transaction.
    async fn rollback(&mut self) -> FixtureResult<()>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> FixtureResult<()>;
}

/// Factory seam for database lifecycles.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Whether the database addressed by `uri` exists.
    async fn exists(&self, uri: &str) -> FixtureResult<bool>;

    /// Create the database addressed by `uri`.
    async fn create(&self, uri: &str) -> FixtureResult<()>;

    /// Open a connection to the database addressed by `uri`.
    async fn connect(&self, uri: &str) -> FixtureResult<Box<dyn StorageConnection>>;
}

/// DDL needed to bring a database from empty to schema-ready and back.
///
/// Create statements should be idempotent (`CREATE TABLE IF NOT
/// EXISTS`) so a fixed external URI can be reused across file groups
/// without duplicate-table errors.
#[async_trait]
pub trait Schema: Send + Sync {
    async fn create(&self, conn: &mut dyn StorageConnection) -> FixtureResult<()>;
    async fn drop(&self, conn: &mut dyn StorageConnection) -> FixtureResult<()>;
}

/// Plain-SQL schema: ordered DDL statement lists.
#[derive(Debug, Clone, Default)]
pub struct SqlSchema {
    pub create_sql: Vec<String>,
    pub drop_sql: Vec<String>,
}

impl SqlSchema {
    pub fn new(
        create_sql: impl IntoIterator<Item = impl Into<String>>,
        drop_sql: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            create_sql: create_sql.into_iter().map(Into::into).collect(),
            drop_sql: drop_sql.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Schema for SqlSchema {
    async fn create(&self, conn: &mut dyn StorageConnection) -> FixtureResult<()> {
        for statement in &self.create_sql {
            conn.execute(statement).await?;
        }
        Ok(())
    }

    async fn drop(&self, conn: &mut dyn StorageConnection) -> FixtureResult<()> {
        for statement in &self.drop_sql {
            conn.execute(statement).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Postgres Implementation
// ============================================================================

/// Postgres storage engine backed by sqlx.
#[derive(Debug, Clone, Default)]
pub struct PgStorage;

impl PgStorage {
    pub fn new() -> Self {
        Self
    }

    /// Split a database URI into the maintenance URI (same server,
    /// `postgres` database) and the target database name.
    fn admin_split(uri: &str) -> FixtureResult<(String, String)> {
        let mut url = Url::parse(uri)
            .map_err(|e| FixtureError::config(format!("invalid storage URI '{}': {}", uri, e)))?;

        let database = url.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(FixtureError::config(format!(
                "storage URI '{}' does not name a database",
                uri
            )));
        }

        url.set_path("/postgres");
        Ok((url.to_string(), database))
    }

    async fn admin_connection(uri: &str) -> FixtureResult<(PgConnection, String)> {
        let (admin_uri, database) = Self::admin_split(uri)?;
        let options: PgConnectOptions = admin_uri
            .parse()
            .map_err(|e| FixtureError::config(format!("invalid storage URI: {}", e)))?;
        let conn = options.connect().await?;
        Ok((conn, database))
    }
}

#[async_trait]
impl StorageEngine for PgStorage {
    async fn exists(&self, uri: &str) -> FixtureResult<bool> {
        let (mut conn, database) = Self::admin_connection(uri).await?;
        let row = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(&database)
            .fetch_optional(&mut conn)
            .await?;
        conn.close().await?;
        Ok(row.is_some())
    }

    async fn create(&self, uri: &str) -> FixtureResult<()> {
        let (mut conn, database) = Self::admin_connection(uri).await?;
        // Identifiers cannot be bound as parameters; the name comes
        // from harness configuration, not user input.
        let result = conn
            .execute(format!(r#"CREATE DATABASE "{}""#, database).as_str())
            .await;
        conn.close().await?;
        result?;
        tracing::info!(database = %database, "test database created");
        Ok(())
    }

    async fn connect(&self, uri: &str) -> FixtureResult<Box<dyn StorageConnection>> {
        let options: PgConnectOptions = uri
            .parse()
            .map_err(|e| FixtureError::config(format!("invalid storage URI: {}", e)))?;
        let conn = options.connect().await?;
        Ok(Box::new(PgStorageConnection { conn }))
    }
}

/// A single Postgres connection implementing the transaction seam.
pub struct PgStorageConnection {
    conn: PgConnection,
}

#[async_trait]
impl StorageConnection for PgStorageConnection {
    async fn execute(&mut self, sql: &str) -> FixtureResult<u64> {
        let result = self.conn.execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_i64(&mut self, sql: &str) -> FixtureResult<i64> {
        let row = sqlx::query(sql).fetch_one(&mut self.conn).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn begin(&mut self) -> FixtureResult<()> {
        self.conn.execute("BEGIN").await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> FixtureResult<()> {
        self.conn.execute(format!("SAVEPOINT {}", name).as_str()).await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> FixtureResult<()> {
        self.conn
            .execute(format!("RELEASE SAVEPOINT {}", name).as_str())
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> FixtureResult<()> {
        self.conn
            .execute(format!("ROLLBACK TO SAVEPOINT {}", name).as_str())
            .await?;
        Ok(())
    }

    async fn rollback(&mut self) -> FixtureResult<()> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> FixtureResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}
