//! Canonical resource identity.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Canonical identity of a resource: origin authority (`base`), resource
/// type, resource id, and version id.
///
/// Two keys are equal iff their relative paths (`type/id/_history/vid`,
/// absent segments omitted) are equal; the base does not participate in
/// equality or hashing. A key without a resource id denotes the type
/// collection, the target of an unconditional create.
///
/// Keys are immutable once built; derived forms are produced by copy
/// ([`Key::without_version`], [`Key::without_base`], [`Key::with_base`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    base: Option<String>,
    type_name: String,
    resource_id: Option<String>,
    version_id: Option<String>,
}

impl Key {
    pub fn new(
        base: Option<String>,
        type_name: impl Into<String>,
        resource_id: Option<String>,
        version_id: Option<String>,
    ) -> Self {
        Self {
            base,
            type_name: type_name.into(),
            resource_id,
            version_id,
        }
    }

    /// Key for a concrete resource without origin or version.
    pub fn local(type_name: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(None, type_name, Some(resource_id.into()), None)
    }

    /// Key for the type collection (no resource id).
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self::new(None, type_name, None, None)
    }

    /// Parse a relative or absolute operation path into a key.
    ///
    /// A trailing query string is stripped. An absolute path contributes its
    /// scheme, host, and any leading service segments to the base; the tail
    /// is read as `type/id/_history/vid`. A relative path must be exactly
    /// `type`, `type/id`, or `type/id/_history/vid`.
    pub fn parse_operation_path(raw: &str) -> Result<Key> {
        let path = raw.split_once('?').map_or(raw, |(p, _)| p).trim();
        if path.is_empty() {
            return Err(Error::InvalidPath(raw.to_string()));
        }

        let (origin, tail) = match path.find("://") {
            Some(idx) => {
                let after = &path[idx + 3..];
                match after.find('/') {
                    Some(slash) => (Some(&path[..idx + 3 + slash]), &after[slash + 1..]),
                    None => (Some(path), ""),
                }
            }
            None => (None, path),
        };

        let mut segments: Vec<&str> = tail.split('/').filter(|s| !s.is_empty()).collect();

        let version_id = match segments.iter().position(|s| *s == "_history") {
            Some(pos) => {
                if pos + 2 != segments.len() {
                    return Err(Error::InvalidPath(raw.to_string()));
                }
                let vid = segments[pos + 1].to_string();
                segments.truncate(pos);
                Some(vid)
            }
            None => None,
        };

        if segments.is_empty() {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        if version_id.is_some() && segments.len() < 2 {
            return Err(Error::InvalidPath(raw.to_string()));
        }

        let (leading, identity) = if segments.len() >= 2 {
            let split = segments.len() - 2;
            (&segments[..split], &segments[split..])
        } else {
            (&segments[..0], &segments[..])
        };

        // Leading segments only make sense as part of an absolute base
        // (e.g. "http://example.org/fhir/Patient/1").
        let base = match origin {
            Some(origin) if !leading.is_empty() => {
                Some(format!("{}/{}", origin, leading.join("/")))
            }
            Some(origin) => Some(origin.to_string()),
            None if !leading.is_empty() => return Err(Error::InvalidPath(raw.to_string())),
            None => None,
        };

        let (type_name, resource_id) = match identity {
            [t, id] => (t.to_string(), Some(id.to_string())),
            [t] => (t.to_string(), None),
            _ => return Err(Error::InvalidPath(raw.to_string())),
        };

        Ok(Key {
            base,
            type_name,
            resource_id,
            version_id,
        })
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }

    pub fn has_version(&self) -> bool {
        self.version_id.is_some()
    }

    /// Canonical `type/id/_history/vid` path, omitting absent segments.
    pub fn relative_path(&self) -> String {
        let mut path = self.type_name.clone();
        if let Some(id) = &self.resource_id {
            path.push('/');
            path.push_str(id);
        }
        if let Some(vid) = &self.version_id {
            path.push_str("/_history/");
            path.push_str(vid);
        }
        path
    }

    pub fn without_version(&self) -> Key {
        Key {
            version_id: None,
            ..self.clone()
        }
    }

    pub fn without_base(&self) -> Key {
        Key {
            base: None,
            ..self.clone()
        }
    }

    pub fn with_base(&self, base: impl Into<String>) -> Key {
        Key {
            base: Some(base.into()),
            ..self.clone()
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path() == other.relative_path()
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path().hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            Some(base) => write!(f, "{}/{}", base.trim_end_matches('/'), self.relative_path()),
            None => write!(f, "{}", self.relative_path()),
        }
    }
}
