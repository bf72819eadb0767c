//! Key classification relative to the local origin.

use crate::{key::Key, origin::LocalOrigin};

/// Recognized placeholder schemes for client-supplied temporary identities.
const TEMPORARY_SCHEMES: [&str; 3] = ["urn:uuid:", "urn:guid:", "cid:"];

/// Classification of a [`Key`] relative to the server's own origin.
///
/// Every branch of the internalize/externalize logic is driven by this.
/// Classification is pure: the same key always classifies the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Absolute origin different from the local one.
    Foreign,
    /// URN-style placeholder, not a real address.
    Temporary,
    /// Absolute origin equal to the local one.
    Local,
    /// Relative, no origin.
    Internal,
}

impl KeyKind {
    pub fn classify(key: &Key, origin: &dyn LocalOrigin) -> KeyKind {
        if key.resource_id().is_some_and(is_temporary_value)
            || key.base().is_some_and(is_temporary_value)
        {
            return KeyKind::Temporary;
        }

        match key.base() {
            Some(base) if origin.is_local_base(base) => KeyKind::Local,
            Some(_) => KeyKind::Foreign,
            // No origin and no placeholder scheme is always internal,
            // regardless of id presence.
            None => KeyKind::Internal,
        }
    }
}

/// Whether a raw value carries one of the recognized placeholder schemes.
pub fn is_temporary_value(value: &str) -> bool {
    TEMPORARY_SCHEMES.iter().any(|scheme| {
        value.len() >= scheme.len()
            && value.as_bytes()[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::SingleOrigin;

    fn origin() -> SingleOrigin {
        SingleOrigin::new("http://localhost:8080/fhir").unwrap()
    }

    #[test]
    fn classifies_each_kind() {
        let origin = origin();

        let temporary = Key::local("Patient", "urn:uuid:1c5b2fb1");
        assert_eq!(KeyKind::classify(&temporary, &origin), KeyKind::Temporary);

        let local = Key::parse_operation_path("http://localhost:8080/fhir/Patient/1").unwrap();
        assert_eq!(KeyKind::classify(&local, &origin), KeyKind::Local);

        let foreign = Key::parse_operation_path("http://example.org/fhir/Patient/1").unwrap();
        assert_eq!(KeyKind::classify(&foreign, &origin), KeyKind::Foreign);

        let internal = Key::local("Patient", "1");
        assert_eq!(KeyKind::classify(&internal, &origin), KeyKind::Internal);
    }

    #[test]
    fn classification_is_idempotent() {
        let origin = origin();
        for raw in [
            "Patient",
            "Patient/1",
            "http://example.org/fhir/Patient/1",
            "http://localhost:8080/fhir/Patient/1/_history/2",
        ] {
            let key = Key::parse_operation_path(raw).unwrap();
            assert_eq!(
                KeyKind::classify(&key, &origin),
                KeyKind::classify(&key, &origin)
            );
        }
    }

    #[test]
    fn placeholder_schemes_are_case_insensitive() {
        assert!(is_temporary_value("urn:uuid:abc"));
        assert!(is_temporary_value("URN:GUID:abc"));
        assert!(is_temporary_value("cid:12345"));
        assert!(!is_temporary_value("urn:oid:1.2.3"));
        assert!(!is_temporary_value("Patient/1"));
    }
}
