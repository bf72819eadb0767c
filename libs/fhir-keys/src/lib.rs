//! FHIR resource identity model.
//!
//! A [`Key`] is the canonical identity of a resource: origin authority,
//! resource type, resource id, and version id. Keys are classified relative
//! to the server's own origin ([`KeyKind`]) and remembered across a single
//! transaction through the append-only [`Mapper`], so that every entry in a
//! bundle resolves a placeholder identity to the same generated key.

pub mod key;
pub mod kind;
pub mod mapper;
pub mod origin;

mod error;

pub use error::{Error, Result};
pub use key::Key;
pub use kind::KeyKind;
pub use mapper::Mapper;
pub use origin::{LocalOrigin, SingleOrigin};
