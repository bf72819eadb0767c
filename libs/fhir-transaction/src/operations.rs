//! Conditional-operation resolution.
//!
//! Turns one declarative bundle entry (a verb, a target key, an optional
//! payload, and the result set of an optional conditional search) into the
//! concrete list of entries the operation actually requires.

use serde_json::Value as JsonValue;

use funke_keys::Key;

use crate::{
    entry::{Entry, Method},
    interfaces::SearchResults,
    Error, Result,
};

/// A resolved manipulation of one resource (or one conditional target set).
///
/// The entry list is computed exactly once, at construction; everything
/// after that is a pure read.
#[derive(Debug)]
pub struct ResourceOperation {
    method: Method,
    key: Key,
    resource: Option<JsonValue>,
    search: Option<SearchResults>,
    entries: Vec<Entry>,
}

impl ResourceOperation {
    /// Resolve `(method, key, resource, search)` into concrete entries.
    ///
    /// - POST: unconditional (or zero matches) creates; exactly one match
    ///   degrades to a read of the match (idempotent find-or-create).
    /// - PUT/PATCH: one match retargets the update at the match; zero
    ///   matches upserts at the requested key; unconditional updates as-is.
    /// - DELETE/GET: one entry per match, or one for the requested key.
    /// - More than one match is never acted on: the criteria were not
    ///   selective enough.
    pub fn resolve(
        method: Method,
        key: Key,
        resource: Option<JsonValue>,
        search: Option<SearchResults>,
    ) -> Result<ResourceOperation> {
        let entries = compute_entries(method, &key, &resource, &search)?;
        Ok(ResourceOperation {
            method,
            key,
            resource,
            search,
            entries,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn resource(&self) -> Option<&JsonValue> {
        self.resource.as_ref()
    }

    pub fn search(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

fn compute_entries(
    method: Method,
    key: &Key,
    resource: &Option<JsonValue>,
    search: &Option<SearchResults>,
) -> Result<Vec<Entry>> {
    match method {
        Method::Post => {
            let resource = require_resource(method, key, resource)?;
            match search {
                Some(results) if results.match_count() > 1 => Err(ambiguous_criteria(results)),
                // Idempotent find-or-create: the resource already exists,
                // read it instead of creating a duplicate.
                Some(results) if results.match_count() == 1 => Ok(vec![Entry::read(
                    Key::parse_operation_path(&results.matches[0])?,
                )]),
                _ => Ok(vec![Entry::with_resource(
                    Method::Post,
                    key.clone(),
                    resource.clone(),
                )]),
            }
        }

        Method::Put | Method::Patch => {
            let resource = require_resource(method, key, resource)?;
            match search {
                Some(results) if results.match_count() > 1 => Err(ambiguous_criteria(results)),
                // Retarget at the resource the criteria actually selected.
                Some(results) if results.match_count() == 1 => Ok(vec![Entry::with_resource(
                    method,
                    Key::parse_operation_path(&results.matches[0])?,
                    resource.clone(),
                )]),
                // Upsert-by-search: nothing matched, create at the
                // requested key.
                Some(_) => Ok(vec![Entry::with_resource(
                    Method::Post,
                    key.clone(),
                    resource.clone(),
                )]),
                None => Ok(vec![Entry::with_resource(
                    method,
                    key.clone(),
                    resource.clone(),
                )]),
            }
        }

        Method::Delete => match search {
            Some(results) => results
                .matches
                .iter()
                .map(|m| Ok(Entry::delete(Key::parse_operation_path(m)?)))
                .collect(),
            None => Ok(vec![Entry::delete(key.clone())]),
        },

        Method::Get => match search {
            Some(results) => results
                .matches
                .iter()
                .map(|m| Ok(Entry::read(Key::parse_operation_path(m)?)))
                .collect(),
            None => Ok(vec![Entry::read(key.clone())]),
        },
    }
}

fn require_resource<'a>(
    method: Method,
    key: &Key,
    resource: &'a Option<JsonValue>,
) -> Result<&'a JsonValue> {
    resource.as_ref().ok_or_else(|| {
        Error::InvalidEntry(format!("{} {} requires a resource payload", method, key))
    })
}

fn ambiguous_criteria(results: &SearchResults) -> Error {
    Error::PreconditionFailed {
        matches: results.match_count(),
        used: results.used_parameters.clone(),
        unused: results.unused_parameters.clone(),
    }
}
