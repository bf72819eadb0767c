//! In-memory collaborators.
//!
//! A minimal store for the CLI and integration tests: handles the
//! interaction verbs over a hash map and resolves conditional criteria by
//! naive field matching. Deliberately not a search-grammar or storage
//! engine implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value as JsonValue;

use crate::{
    entry::{Entry, Method},
    interfaces::{ConditionalSearch, EngineResponse, InteractionHandler, SearchResults},
    Error, Result,
};

#[derive(Default)]
pub struct MemoryStore {
    resources: Mutex<HashMap<(String, String), JsonValue>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Seed a resource directly, bypassing the pipeline.
    pub fn insert(&self, resource_type: &str, id: &str, resource: JsonValue) {
        if let Ok(mut map) = self.resources.lock() {
            map.insert((resource_type.to_string(), id.to_string()), resource);
        }
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<JsonValue> {
        self.resources
            .lock()
            .ok()?
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InteractionHandler for MemoryStore {
    async fn handle_interaction(&self, entry: &Entry) -> Result<EngineResponse> {
        let key = entry
            .key()
            .ok_or_else(|| Error::Internal("cannot dispatch an entry without a key".to_string()))?
            .clone();
        let resource_id = key
            .resource_id()
            .ok_or_else(|| Error::Internal(format!("cannot dispatch collection key '{}'", key)))?
            .to_string();
        let slot = (key.type_name().to_string(), resource_id);

        let mut map = self
            .resources
            .lock()
            .map_err(|_| Error::Storage("memory store poisoned".to_string()))?;

        match entry.method() {
            Method::Post | Method::Put => {
                let resource = entry.resource().cloned().ok_or_else(|| {
                    Error::Internal(format!("{} without resource", entry.method()))
                })?;
                let existed = map.insert(slot, resource.clone()).is_some();
                let status = if existed {
                    StatusCode::OK
                } else {
                    StatusCode::CREATED
                };
                Ok(EngineResponse::new(status)
                    .with_key(key)
                    .with_resource(resource))
            }
            // Patch application is the storage layer's concern; the naive
            // store just acknowledges against the current version.
            Method::Patch => match map.get(&slot) {
                Some(current) => Ok(EngineResponse::new(StatusCode::OK)
                    .with_key(key)
                    .with_resource(current.clone())),
                None => Ok(EngineResponse::new(StatusCode::NOT_FOUND)),
            },
            Method::Delete => {
                map.remove(&slot);
                Ok(EngineResponse::new(StatusCode::NO_CONTENT))
            }
            Method::Get => match map.get(&slot) {
                Some(resource) => Ok(EngineResponse::new(StatusCode::OK)
                    .with_key(key)
                    .with_resource(resource.clone())),
                None => Ok(EngineResponse::new(StatusCode::NOT_FOUND)),
            },
        }
    }
}

#[async_trait]
impl ConditionalSearch for MemoryStore {
    async fn get_search_results(
        &self,
        resource_type: &str,
        criteria: &str,
    ) -> Result<SearchResults> {
        let params = parse_criteria(criteria)?;
        let map = self
            .resources
            .lock()
            .map_err(|_| Error::Storage("memory store poisoned".to_string()))?;

        let mut used = Vec::new();
        let mut unused = Vec::new();
        for (name, _) in &params {
            if is_supported_parameter(name) {
                used.push(name.clone());
            } else {
                unused.push(name.clone());
            }
        }

        let mut matches: Vec<String> = map
            .iter()
            .filter(|((t, _), _)| t == resource_type)
            .filter(|((_, id), resource)| {
                params
                    .iter()
                    .filter(|(name, _)| is_supported_parameter(name))
                    .all(|(name, value)| matches_parameter(id, resource, name, value))
            })
            .map(|((t, id), _)| format!("{}/{}", t, id))
            .collect();
        matches.sort();

        Ok(SearchResults {
            matches,
            used_parameters: used,
            unused_parameters: unused,
        })
    }
}

fn is_supported_parameter(name: &str) -> bool {
    !name.starts_with('_') || name == "_id"
}

fn matches_parameter(id: &str, resource: &JsonValue, name: &str, value: &str) -> bool {
    match name {
        "_id" => id == value,
        "identifier" => {
            // Token syntax: "system|value" or bare "value".
            let expected = value.rsplit('|').next().unwrap_or(value);
            resource
                .get("identifier")
                .and_then(|v| v.as_array())
                .is_some_and(|ids| {
                    ids.iter().any(|i| {
                        i.get("value").and_then(|v| v.as_str()) == Some(expected)
                    })
                })
        }
        _ => match resource.get(name) {
            Some(JsonValue::String(s)) => s == value,
            Some(JsonValue::Bool(b)) => b.to_string() == value,
            Some(JsonValue::Number(n)) => n.to_string() == value,
            Some(JsonValue::Array(items)) => items
                .iter()
                .any(|i| i.as_str().is_some_and(|s| s == value)),
            _ => false,
        },
    }
}

fn parse_criteria(criteria: &str) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    for pair in criteria.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            Error::Search(format!("malformed search parameter '{}'", pair))
        })?;
        let name = urlencoding::decode(name)
            .map_err(|e| Error::Search(format!("invalid encoding in '{}': {}", pair, e)))?;
        let value = urlencoding::decode(value)
            .map_err(|e| Error::Search(format!("invalid encoding in '{}': {}", pair, e)))?;
        params.push((name.into_owned(), value.into_owned()));
    }
    Ok(params)
}
