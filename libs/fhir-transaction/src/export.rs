//! Externalization: storage form -> transfer form.
//!
//! The mirror of [`Import`](crate::Import): base-less identities get the
//! server's externally visible origin prefixed so responses are addressable
//! from outside. Never fails on payload content.

use std::sync::Arc;

use funke_keys::{kind::is_temporary_value, LocalOrigin};

use crate::{entry::Entry, references::visit_references, Result};

#[derive(Debug, Clone, Default)]
pub struct ExportSettings {
    /// Rewrite relative payload references to absolute ones against the
    /// default origin.
    pub absolute_references: bool,
}

pub struct Export {
    origin: Arc<dyn LocalOrigin>,
    settings: ExportSettings,
}

impl Export {
    pub fn new(origin: Arc<dyn LocalOrigin>, settings: ExportSettings) -> Export {
        Export { origin, settings }
    }

    pub fn externalize(&self, entry: &mut Entry) -> Result<()> {
        if let Some(key) = entry.key().cloned() {
            if key.base().is_none() {
                entry.set_key(key.with_base(self.origin.base()));
            }
        }

        if self.settings.absolute_references {
            let base = self.origin.base().to_string();
            if let Some(resource) = entry.resource_mut() {
                visit_references(resource, &mut |_, reference| {
                    Ok(absolutize(&base, reference))
                })?;
            }
        }

        entry.mark_external();
        Ok(())
    }
}

/// Resolve a relative `Type/id` reference against the origin. Fragments,
/// placeholders, and already-absolute addresses are left alone.
fn absolutize(base: &str, reference: &str) -> Option<String> {
    if reference.is_empty()
        || reference.starts_with('#')
        || reference.contains("://")
        || is_temporary_value(reference)
        || reference.contains(':')
    {
        return None;
    }
    Some(format!("{}/{}", base, reference))
}
