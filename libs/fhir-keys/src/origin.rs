//! Local-origin authority.
//!
//! Exposes the server's externally visible base address and a same-origin
//! test. Key classification and the internalize/externalize passes both
//! depend on it.

use url::Url;

use crate::{key::Key, Error, Result};

pub trait LocalOrigin: Send + Sync {
    /// The externally visible base address, without a trailing slash.
    fn base(&self) -> &str;

    /// Whether an absolute address lies under this origin (prefix match,
    /// trailing-slash insensitive).
    fn is_local_base(&self, base: &str) -> bool;

    fn is_local(&self, key: &Key) -> bool {
        key.base().is_some_and(|b| self.is_local_base(b))
    }
}

/// A single-endpoint origin authority.
pub struct SingleOrigin {
    base: String,
}

impl SingleOrigin {
    pub fn new(base: &str) -> Result<Self> {
        let url = Url::parse(base).map_err(|e| Error::InvalidOrigin(format!("{}: {}", base, e)))?;
        if !url.has_host() {
            return Err(Error::InvalidOrigin(format!("{}: missing host", base)));
        }
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

impl LocalOrigin for SingleOrigin {
    fn base(&self) -> &str {
        &self.base
    }

    fn is_local_base(&self, base: &str) -> bool {
        let candidate = base.trim_end_matches('/');
        match candidate.strip_prefix(&self.base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching_is_slash_insensitive() {
        let origin = SingleOrigin::new("http://localhost:8080/fhir/").unwrap();
        assert_eq!(origin.base(), "http://localhost:8080/fhir");
        assert!(origin.is_local_base("http://localhost:8080/fhir"));
        assert!(origin.is_local_base("http://localhost:8080/fhir/"));
        assert!(!origin.is_local_base("http://localhost:8080/fhirpath"));
        assert!(!origin.is_local_base("http://example.org/fhir"));
    }

    #[test]
    fn rejects_relative_bases() {
        assert!(SingleOrigin::new("fhir").is_err());
    }
}
