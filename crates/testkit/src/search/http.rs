//! HTTP search-engine client.
//!
//! Speaks the REST index API of Elasticsearch-compatible servers:
//! `PUT /{index}` with the mapping body, `DELETE /{index}`,
//! `POST /{index}/_refresh` and `HEAD /{index}`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::error::{FixtureError, FixtureResult};
use crate::search::{IndexSpec, SearchEngine};

/// Search engine reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSearchEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchEngine {
    /// Connect to the first of the configured hosts.
    ///
    /// Multiple hosts are accepted for config compatibility; requests
    /// always go to the first one.
    pub fn new(hosts: &[String]) -> FixtureResult<Self> {
        let base_url = hosts
            .first()
            .ok_or_else(|| FixtureError::config("no search hosts configured"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn create_index(&self, spec: &IndexSpec) -> FixtureResult<()> {
        let response = self
            .client
            .put(self.index_url(&spec.name))
            .json(&json!({ "mappings": spec.mapping }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => {
                // Elasticsearch reports an existing index as a 400 with
                // `resource_already_exists_exception`; any other 400 on
                // create also means the definition clashes with server
                // state, so both trigger the recreate recovery.
                let body = response.text().await.unwrap_or_default();
                Err(FixtureError::IndexConflict(format!(
                    "index '{}': {}",
                    spec.name, body
                )))
            }
            status => Err(FixtureError::search(format!(
                "creating index '{}' failed with status {}",
                spec.name, status
            ))),
        }
    }

    async fn delete_index(&self, name: &str, ignore_missing: bool) -> FixtureResult<()> {
        let response = self.client.delete(self.index_url(name)).send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND if ignore_missing => Ok(()),
            status => Err(FixtureError::search(format!(
                "deleting index '{}' failed with status {}",
                name, status
            ))),
        }
    }

    async fn refresh(&self, name: &str) -> FixtureResult<()> {
        let response = self
            .client
            .post(format!("{}/_refresh", self.index_url(name)))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(FixtureError::search(format!(
                "refreshing index '{}' failed with status {}",
                name,
                response.status()
            )))
        }
    }

    async fn index_exists(&self, name: &str) -> FixtureResult<bool> {
        let response = self.client.head(self.index_url(name)).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(FixtureError::search(format!(
                "checking index '{}' failed with status {}",
                name, status
            ))),
        }
    }
}
