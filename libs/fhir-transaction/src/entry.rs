//! One request/response unit of a transaction.

use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use funke_keys::Key;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Delete,
    Post,
    Put,
    Patch,
    Get,
}

impl Method {
    pub fn parse(raw: &str) -> Result<Method> {
        match raw.to_uppercase().as_str() {
            "DELETE" => Ok(Method::Delete),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "GET" | "HEAD" => Ok(Method::Get),
            other => Err(Error::InvalidEntry(format!(
                "Unsupported HTTP method in transaction: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Get => "GET",
        }
    }

    /// Whether this verb replaces an existing identity rather than minting
    /// a new one.
    pub fn is_update_family(&self) -> bool {
        matches!(self, Method::Put | Method::Patch | Method::Delete)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer state of an entry as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Received, not yet processed.
    #[default]
    Undefined,
    /// Identities resolved to storage form.
    Internal,
    /// Identities resolved to transfer form.
    External,
}

/// One request/response unit: a key, an optional resource payload, a verb,
/// a timestamp, and a transfer state.
///
/// When a payload is present the key is mirrored into its self-identifying
/// fields (`id`, `meta.versionId`) on every assignment. PATCH entries are
/// the exception: their payload is a parameter document rather than the
/// target resource, so the key is held independently.
#[derive(Debug, Clone)]
pub struct Entry {
    key: Option<Key>,
    resource: Option<JsonValue>,
    method: Method,
    when: DateTime<Utc>,
    state: TransferState,
}

impl Entry {
    pub fn new(method: Method, key: Key) -> Entry {
        Entry {
            key: Some(key),
            resource: None,
            method,
            when: Utc::now(),
            state: TransferState::Undefined,
        }
    }

    pub fn with_resource(method: Method, key: Key, resource: JsonValue) -> Entry {
        let when = resource
            .get("meta")
            .and_then(|m| m.get("lastUpdated"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut entry = Entry {
            key: None,
            resource: Some(resource),
            method,
            when,
            state: TransferState::Undefined,
        };
        entry.set_key(key);
        entry
    }

    pub fn delete(key: Key) -> Entry {
        Entry::new(Method::Delete, key)
    }

    pub fn read(key: Key) -> Entry {
        Entry::new(Method::Get, key)
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Assign a key, mirroring it into the payload's self-identifying
    /// fields (except for PATCH parameter documents).
    pub fn set_key(&mut self, key: Key) {
        if self.method != Method::Patch {
            if let Some(obj) = self.resource.as_mut().and_then(|r| r.as_object_mut()) {
                if let Some(id) = key.resource_id() {
                    obj.insert("id".to_string(), json!(id));
                }
                if let Some(vid) = key.version_id() {
                    let meta = obj.entry("meta".to_string()).or_insert_with(|| json!({}));
                    if let Some(meta_obj) = meta.as_object_mut() {
                        meta_obj.insert("versionId".to_string(), json!(vid));
                    }
                }
            }
        }
        self.key = Some(key);
    }

    pub fn resource(&self) -> Option<&JsonValue> {
        self.resource.as_ref()
    }

    pub fn resource_mut(&mut self) -> Option<&mut JsonValue> {
        self.resource.as_mut()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn when(&self) -> DateTime<Utc> {
        self.when
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// `Undefined -> Internal`; already-internal entries are not
    /// reprocessed.
    pub(crate) fn mark_internal(&mut self) {
        if self.state == TransferState::Undefined {
            self.state = TransferState::Internal;
        }
    }

    pub(crate) fn mark_external(&mut self) {
        self.state = TransferState::External;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_mirrors_identity_into_payload() {
        let resource = json!({ "resourceType": "Patient", "active": true });
        let mut entry = Entry::with_resource(Method::Put, Key::local("Patient", "1"), resource);

        entry.set_key(Key::new(
            None,
            "Patient",
            Some("abc".into()),
            Some("2".into()),
        ));

        let payload = entry.resource().unwrap();
        assert_eq!(payload["id"], "abc");
        assert_eq!(payload["meta"]["versionId"], "2");
    }

    #[test]
    fn patch_payload_is_not_touched() {
        let params = json!({ "resourceType": "Parameters", "parameter": [] });
        let mut entry = Entry::with_resource(Method::Patch, Key::local("Patient", "1"), params);
        entry.set_key(Key::local("Patient", "abc"));

        assert!(entry.resource().unwrap().get("id").is_none());
        assert_eq!(entry.key().unwrap().resource_id(), Some("abc"));
    }

    #[test]
    fn when_prefers_payload_metadata() {
        let resource = json!({
            "resourceType": "Patient",
            "meta": { "lastUpdated": "2020-01-01T00:00:00Z" }
        });
        let entry = Entry::with_resource(Method::Put, Key::local("Patient", "1"), resource);
        assert_eq!(entry.when().to_rfc3339(), "2020-01-01T00:00:00+00:00");
    }
}
