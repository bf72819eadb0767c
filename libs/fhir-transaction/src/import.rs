//! Internalization: transfer form -> storage form.
//!
//! Resolves every identity occurring in an entry, both the entry's own key
//! and every reference inside its payload, into the server's internal
//! (base-less, versioned) form, minting fresh identities for placeholders
//! and recording each assignment in the transaction-scoped mapper.

use std::sync::Arc;

use funke_keys::{kind::is_temporary_value, Key, KeyKind, LocalOrigin, Mapper};

use crate::{
    entry::{Entry, Method, TransferState},
    interfaces::IdentityGenerator,
    references::visit_references,
    Error, Result,
};

pub struct Import {
    origin: Arc<dyn LocalOrigin>,
    generator: Arc<dyn IdentityGenerator>,
}

impl Import {
    pub fn new(origin: Arc<dyn LocalOrigin>, generator: Arc<dyn IdentityGenerator>) -> Import {
        Import { origin, generator }
    }

    /// Internalize one entry against the shared mapper.
    ///
    /// Idempotent on transfer state: an entry that already left `Undefined`
    /// gets its key resolved but its payload is not rewritten again.
    pub async fn internalize(&self, entry: &mut Entry, mapper: &mut Mapper) -> Result<()> {
        if let Some(key) = entry.key().cloned() {
            let internal = self.internalize_key(&key, entry.method(), mapper).await?;
            tracing::debug!(from = %key, to = %internal, "internalized entry key");
            entry.set_key(internal);
        }

        if entry.state() == TransferState::Undefined {
            self.internalize_references(entry, mapper)?;
        }

        entry.mark_internal();
        Ok(())
    }

    async fn internalize_key(
        &self,
        key: &Key,
        method: Method,
        mapper: &mut Mapper,
    ) -> Result<Key> {
        match KeyKind::classify(key, self.origin.as_ref()) {
            // Placeholder or another server's identity: this store has never
            // seen it, mint a brand-new one.
            KeyKind::Foreign | KeyKind::Temporary => self.fresh_identity(key, mapper).await,

            KeyKind::Local | KeyKind::Internal if method.is_update_family() => {
                let resource_id = key
                    .resource_id()
                    .ok_or_else(|| Error::UnexpectedKey(key.to_string()))?;
                let version = self
                    .generator
                    .next_version_id(key.type_name(), resource_id, key.version_id())
                    .await?;
                let internal = Key::new(
                    None,
                    key.type_name(),
                    Some(resource_id.to_string()),
                    Some(version),
                );
                record_mapping(key, &internal, self.origin.as_ref(), mapper)?;
                Ok(internal)
            }

            KeyKind::Local | KeyKind::Internal if method == Method::Post => {
                self.fresh_identity(key, mapper).await
            }

            // Reads carry no identity work: stored form is simply base-less.
            KeyKind::Local | KeyKind::Internal if method == Method::Get => {
                Ok(key.without_base())
            }

            _ => Err(Error::UnexpectedKey(key.to_string())),
        }
    }

    async fn fresh_identity(&self, key: &Key, mapper: &mut Mapper) -> Result<Key> {
        let resource_id = self.generator.next_resource_id(key.type_name()).await?;
        let version = self
            .generator
            .next_version_id(key.type_name(), &resource_id, None)
            .await?;
        let internal = Key::new(None, key.type_name(), Some(resource_id), Some(version));
        record_mapping(key, &internal, self.origin.as_ref(), mapper)?;
        Ok(internal)
    }

    fn internalize_references(&self, entry: &mut Entry, mapper: &Mapper) -> Result<()> {
        let origin = self.origin.clone();
        let Some(resource) = entry.resource_mut() else {
            return Ok(());
        };
        visit_references(resource, &mut |_, reference| {
            internalize_reference(origin.as_ref(), mapper, reference)
        })
    }
}

/// The string a payload reference would use to name `key`; this is the
/// mapper's lookup key. `None` for keys nothing can refer to (a bare type
/// collection).
pub(crate) fn mapping_key(key: &Key, origin: &dyn LocalOrigin) -> Option<String> {
    match KeyKind::classify(key, origin) {
        // The placeholder itself, e.g. "urn:uuid:...".
        KeyKind::Temporary => key
            .resource_id()
            .map(str::to_string)
            .or_else(|| key.base().map(str::to_string)),
        // Foreign identities are named by their full canonical string.
        KeyKind::Foreign => Some(key.without_version().to_string()),
        KeyKind::Local | KeyKind::Internal => key
            .resource_id()
            .map(|_| key.without_base().without_version().relative_path()),
    }
}

fn record_mapping(
    old: &Key,
    new: &Key,
    origin: &dyn LocalOrigin,
    mapper: &mut Mapper,
) -> Result<()> {
    if let Some(old_id) = mapping_key(old, origin) {
        mapper.remap(old_id, new.without_version())?;
    }
    Ok(())
}

/// Rewrite a single reference occurrence to internal form.
///
/// Fragments (contained sub-resources) stay untouched. Temporary and
/// local-origin references resolve through the mapper to a fixed point;
/// unmapped local ones are merely stripped of their base. Absolute
/// references to other servers pass through unchanged unless this bundle
/// remapped that exact identity; internalization deliberately leaves
/// foreign cross-server links alone.
fn internalize_reference(
    origin: &dyn LocalOrigin,
    mapper: &Mapper,
    reference: &str,
) -> Result<Option<String>> {
    if reference.contains('#') {
        return Ok(None);
    }

    if is_temporary_value(reference) {
        return Ok(mapper.resolve(reference).map(render_internal));
    }

    let Ok(key) = Key::parse_operation_path(reference) else {
        return Ok(None);
    };

    let (lookup, localize_unmapped) = match KeyKind::classify(&key, origin) {
        KeyKind::Temporary => (reference.to_string(), false),
        KeyKind::Local => (key.without_base().without_version().relative_path(), true),
        KeyKind::Internal => (key.without_base().without_version().relative_path(), false),
        KeyKind::Foreign => (key.without_version().to_string(), false),
    };

    if let Some(resolved) = mapper.resolve(&lookup) {
        // A resolution chain must never land on another server's identity.
        if KeyKind::classify(&resolved, origin) == KeyKind::Foreign {
            return Err(Error::ForeignReference(reference.to_string()));
        }
        return Ok(Some(render_internal(resolved)));
    }

    if localize_unmapped {
        return Ok(Some(key.without_base().to_string()));
    }

    Ok(None)
}

fn render_internal(key: Key) -> String {
    key.without_base().to_string()
}
