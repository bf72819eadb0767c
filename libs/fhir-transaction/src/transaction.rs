//! Transaction orchestration.
//!
//! Drives a bundle through the pipeline: verb ordering, per-entry operation
//! resolution, bundle-wide mapping accumulation, internalize + dispatch
//! (strictly sequential, since a later entry's internalization can depend
//! on a mapping recorded by an earlier one), and externalization of each
//! produced entry. No in-memory state crosses transaction boundaries: the
//! mapper is constructed fresh per bundle.

use std::collections::HashSet;
use std::sync::Arc;

use funke_keys::{kind::is_temporary_value, Key, KeyKind, LocalOrigin, Mapper};

use crate::{
    bundle::{Bundle, BundleEntry, BundleType},
    entry::{Entry, Method},
    export::{Export, ExportSettings},
    import::{mapping_key, Import},
    interfaces::{ConditionalSearch, EngineResponse, IdentityGenerator, InteractionHandler},
    operations::ResourceOperation,
    Error, Result,
};

/// Protocol-mandated processing order. PATCH entries are processed in the
/// PUT phase.
const PHASES: [Method; 4] = [Method::Delete, Method::Post, Method::Put, Method::Get];

pub struct TransactionProcessor {
    origin: Arc<dyn LocalOrigin>,
    generator: Arc<dyn IdentityGenerator>,
    search: Arc<dyn ConditionalSearch>,
    export_settings: ExportSettings,
}

struct PendingEntry<'a> {
    entry: &'a BundleEntry,
    key: Key,
    method: Method,
}

impl TransactionProcessor {
    pub fn new(
        origin: Arc<dyn LocalOrigin>,
        generator: Arc<dyn IdentityGenerator>,
        search: Arc<dyn ConditionalSearch>,
    ) -> TransactionProcessor {
        TransactionProcessor {
            origin,
            generator,
            search,
            export_settings: ExportSettings::default(),
        }
    }

    pub fn with_export_settings(mut self, settings: ExportSettings) -> TransactionProcessor {
        self.export_settings = settings;
        self
    }

    /// Process a transaction bundle against the injected handler, yielding
    /// one `(entry, response)` pair per effective operation entry.
    ///
    /// Any handler response past terminal success aborts the remaining
    /// entries; atomicity of already-dispatched writes is the storage
    /// collaborator's responsibility.
    pub async fn process_bundle(
        &self,
        bundle: &Bundle,
        handler: &dyn InteractionHandler,
    ) -> Result<Vec<(Entry, EngineResponse)>> {
        if bundle.bundle_type != BundleType::Transaction {
            return Err(Error::InvalidBundle(format!(
                "unsupported Bundle type {:?}, expected 'transaction'",
                bundle.bundle_type
            )));
        }

        validate_bundle(&bundle.entry)?;
        let ordered = self.order_entries(&bundle.entry)?;
        tracing::debug!(entries = ordered.len(), "transaction ordered");

        let mut operations = Vec::with_capacity(ordered.len());
        for pending in ordered {
            operations.push(self.resolve_entry(pending).await?);
        }

        let mut mapper = self.accumulate_mappings(&operations)?;
        self.run(operations, &mut mapper, handler).await
    }

    /// Single-operation variant: expand one already-resolved operation,
    /// dispatch its entries, and merge the per-entry responses into one.
    pub async fn handle_operation(
        &self,
        operation: ResourceOperation,
        handler: &dyn InteractionHandler,
    ) -> Result<EngineResponse> {
        let mut mapper = Mapper::new();
        let results = self.run(vec![operation], &mut mapper, handler).await?;
        merge_responses(results.into_iter().map(|(_, r)| r).collect())
    }

    async fn run(
        &self,
        operations: Vec<ResourceOperation>,
        mapper: &mut Mapper,
        handler: &dyn InteractionHandler,
    ) -> Result<Vec<(Entry, EngineResponse)>> {
        let import = Import::new(self.origin.clone(), self.generator.clone());
        let export = Export::new(self.origin.clone(), self.export_settings.clone());

        let mut results = Vec::new();
        for operation in operations {
            for mut entry in operation.into_entries() {
                import.internalize(&mut entry, mapper).await?;

                let response = handler.handle_interaction(&entry).await?;
                if !response.is_terminal_success() {
                    tracing::debug!(status = %response.status, "handler aborted transaction");
                    return Err(Error::Aborted {
                        status: response.status,
                    });
                }

                export.externalize(&mut entry)?;
                results.push((entry, response));
            }
        }
        Ok(results)
    }

    /// Stable partition into the `DELETE, POST, PUT, GET` processing
    /// sequence; bundle order is preserved within each phase.
    fn order_entries<'a>(&self, entries: &'a [BundleEntry]) -> Result<Vec<PendingEntry<'a>>> {
        let mut tagged = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = self.target_key(entry)?;
            let method = self.entry_method(entry, &key)?;
            tagged.push(PendingEntry { entry, key, method });
        }

        let mut ordered = Vec::with_capacity(tagged.len());
        for phase in PHASES {
            let mut remaining = Vec::new();
            for pending in tagged {
                let slot = match pending.method {
                    Method::Patch => Method::Put,
                    other => other,
                };
                if slot == phase {
                    ordered.push(pending);
                } else {
                    remaining.push(pending);
                }
            }
            tagged = remaining;
        }
        Ok(ordered)
    }

    /// The verb: explicit on the request, else inferred from the target
    /// key's classification (placeholder/foreign identities create, known
    /// ones update).
    fn entry_method(&self, entry: &BundleEntry, key: &Key) -> Result<Method> {
        if let Some(request) = &entry.request {
            return Method::parse(&request.method);
        }
        Ok(
            match KeyKind::classify(key, self.origin.as_ref()) {
                KeyKind::Foreign | KeyKind::Temporary => Method::Post,
                KeyKind::Local | KeyKind::Internal => Method::Put,
            },
        )
    }

    /// The target key as requested: from the request url when present,
    /// else from the payload's self-identifying fields. A temporary
    /// `fullUrl` becomes the resource id so placeholder references to this
    /// entry resolve.
    fn target_key(&self, entry: &BundleEntry) -> Result<Key> {
        if let Some(request) = &entry.request {
            let mut key = Key::parse_operation_path(&request.url)?;
            if key.resource_id().is_none() {
                if let Some(full_url) = entry.full_url.as_deref() {
                    if is_temporary_value(full_url) {
                        key = Key::new(
                            None,
                            key.type_name(),
                            Some(full_url.to_string()),
                            None,
                        );
                    }
                }
            }
            return Ok(key);
        }

        let resource = entry.resource.as_ref().ok_or_else(|| {
            Error::InvalidEntry("entry carries neither a request nor a resource".to_string())
        })?;
        let type_name = resource
            .get("resourceType")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidEntry("resource is missing resourceType".to_string()))?;
        let resource_id = resource
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                entry
                    .full_url
                    .as_deref()
                    .filter(|u| is_temporary_value(u))
                    .map(str::to_string)
            });
        let version_id = resource
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Key::new(None, type_name, resource_id, version_id))
    }

    async fn resolve_entry(&self, pending: PendingEntry<'_>) -> Result<ResourceOperation> {
        let PendingEntry { entry, key, method } = pending;

        let criteria = conditional_criteria(entry, method);
        let search = match criteria {
            Some(criteria) if !criteria.is_empty() => {
                let results = self
                    .search
                    .get_search_results(key.type_name(), criteria)
                    .await?;
                tracing::debug!(
                    resource_type = key.type_name(),
                    criteria,
                    matches = results.match_count(),
                    "conditional search resolved"
                );
                Some(results)
            }
            _ => None,
        };

        ResourceOperation::resolve(method, key, entry.resource.clone(), search)
    }

    /// Record, into the bundle-wide mapper, every operation whose single
    /// resolved entry ended up keyed differently than requested, so a
    /// later bundle entry referencing the original target resolves to the
    /// actual chosen one.
    fn accumulate_mappings(&self, operations: &[ResourceOperation]) -> Result<Mapper> {
        let mut mapper = Mapper::new();
        for operation in operations {
            let [entry] = operation.entries() else {
                continue;
            };
            let Some(actual) = entry.key() else {
                continue;
            };
            if actual == operation.key() {
                continue;
            }
            if let Some(old_id) = mapping_key(operation.key(), self.origin.as_ref()) {
                mapper.remap(old_id, actual.without_version())?;
            }
        }
        Ok(mapper)
    }
}

/// The conditional criteria appropriate to the verb: `ifNoneExist` for
/// creates, the request url's query string for everything else.
fn conditional_criteria(entry: &BundleEntry, method: Method) -> Option<&str> {
    let request = entry.request.as_ref()?;
    match method {
        Method::Post => request
            .if_none_exist
            .as_deref()
            .map(|q| q.trim().trim_start_matches('?')),
        _ => request.url.split_once('?').map(|(_, q)| q),
    }
}

fn validate_bundle(entries: &[BundleEntry]) -> Result<()> {
    let mut seen_full_urls = HashSet::new();

    for (i, entry) in entries.iter().enumerate() {
        if let Some(request) = &entry.request {
            let method = Method::parse(&request.method)?;
            if matches!(method, Method::Post | Method::Put | Method::Patch)
                && entry.resource.is_none()
            {
                return Err(Error::InvalidBundle(format!(
                    "entry {} with method {} is missing a resource",
                    i, method
                )));
            }
        }

        if let Some(full_url) = &entry.full_url {
            if !seen_full_urls.insert(full_url.clone()) {
                return Err(Error::InvalidBundle(format!(
                    "duplicate fullUrl at entry {}: {}",
                    i, full_url
                )));
            }
        }
    }

    Ok(())
}

/// Merge the per-entry responses of one expanded operation. All must share
/// one status code and either all or none may carry a key.
fn merge_responses(responses: Vec<EngineResponse>) -> Result<EngineResponse> {
    let count = responses.len();
    let mut iter = responses.into_iter();
    let mut merged = iter
        .next()
        .ok_or_else(|| Error::IncompatibleResponses("no responses to merge".to_string()))?;

    for response in iter {
        if response.status != merged.status {
            return Err(Error::IncompatibleResponses(format!(
                "mixed status codes {} and {}",
                merged.status, response.status
            )));
        }
        if response.key.is_some() != merged.key.is_some() {
            return Err(Error::IncompatibleResponses(
                "inconsistent key presence".to_string(),
            ));
        }
    }

    if count > 1 {
        // Many entries have no single representation.
        merged.resource = None;
    }
    Ok(merged)
}
