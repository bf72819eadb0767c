//! Collaborator contracts consumed by the engine.
//!
//! The physical store, the search/index engine, and the identity generator
//! live behind these traits; the engine only ever talks to them here. All
//! implementations must be safe for concurrent use by multiple simultaneous
//! transactions.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use funke_keys::Key;

use crate::{entry::Entry, Result};

/// Mints identities that are unique within the store's namespace.
#[async_trait]
pub trait IdentityGenerator: Send + Sync {
    async fn next_resource_id(&self, resource_type: &str) -> Result<String>;

    async fn next_version_id(
        &self,
        resource_type: &str,
        resource_id: &str,
        current_version: Option<&str>,
    ) -> Result<String>;
}

/// Production generator: v4 uuids for resource ids, numeric version bumps.
#[derive(Debug, Default)]
pub struct UuidGenerator;

#[async_trait]
impl IdentityGenerator for UuidGenerator {
    async fn next_resource_id(&self, _resource_type: &str) -> Result<String> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn next_version_id(
        &self,
        _resource_type: &str,
        _resource_id: &str,
        current_version: Option<&str>,
    ) -> Result<String> {
        let next = current_version
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v + 1)
            .unwrap_or(1);
        Ok(next.to_string())
    }
}

/// Deterministic generator for tests and the CLI: `Patient.1`, `Patient.2`, ...
#[derive(Debug, Default)]
pub struct SequentialGenerator {
    counter: AtomicU64,
}

#[async_trait]
impl IdentityGenerator for SequentialGenerator {
    async fn next_resource_id(&self, resource_type: &str) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}.{}", resource_type, n))
    }

    async fn next_version_id(
        &self,
        _resource_type: &str,
        _resource_id: &str,
        current_version: Option<&str>,
    ) -> Result<String> {
        let next = current_version
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v + 1)
            .unwrap_or(1);
        Ok(next.to_string())
    }
}

/// Result set of a conditional search, with the diagnostics a client needs
/// when its criteria turn out not to be selective enough.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Matched identities as `Type/id` strings, in search order.
    pub matches: Vec<String>,
    pub used_parameters: Vec<String>,
    pub unused_parameters: Vec<String>,
}

impl SearchResults {
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

/// Resolves conditional criteria to candidate identities. Used only for
/// conditional-operation resolution; the search grammar itself is out of
/// scope.
#[async_trait]
pub trait ConditionalSearch: Send + Sync {
    async fn get_search_results(
        &self,
        resource_type: &str,
        criteria: &str,
    ) -> Result<SearchResults>;
}

/// What the interaction handler reports back for one dispatched entry.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub status: StatusCode,
    pub key: Option<Key>,
    pub resource: Option<JsonValue>,
}

impl EngineResponse {
    pub fn new(status: StatusCode) -> EngineResponse {
        EngineResponse {
            status,
            key: None,
            resource: None,
        }
    }

    pub fn with_key(mut self, key: Key) -> EngineResponse {
        self.key = Some(key);
        self
    }

    pub fn with_resource(mut self, resource: JsonValue) -> EngineResponse {
        self.resource = Some(resource);
        self
    }

    /// Terminal success per the transaction rules: any status up to and
    /// including 300.
    pub fn is_terminal_success(&self) -> bool {
        self.status.as_u16() <= 300
    }
}

/// The single dispatch point for every internalized entry. Actual storage
/// and validation happen behind this trait.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn handle_interaction(&self, entry: &Entry) -> Result<EngineResponse>;
}
