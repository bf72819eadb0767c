//! Transaction orchestration and reference-resolution engine.
//!
//! Accepts atomic, multi-operation bundles against a versioned,
//! reference-linked resource store and guarantees that every identity in
//! the request (temporary placeholders, foreign identities, conditional
//! criteria) resolves to a single stable key, and that cross-references
//! inside one bundle stay mutually consistent even when their targets did
//! not exist before the transaction started.
//!
//! The pipeline per bundle: verb ordering, per-entry operation resolution
//! (possibly via the search collaborator), internalization through a shared
//! [`Mapper`](funke_keys::Mapper), sequential dispatch to the injected
//! [`InteractionHandler`](interfaces::InteractionHandler), and
//! externalization of each produced entry.

pub mod bundle;
pub mod entry;
pub mod export;
pub mod import;
pub mod interfaces;
pub mod memory;
pub mod operations;
pub mod references;
pub mod transaction;

mod error;

pub use bundle::{Bundle, BundleEntry, BundleRequest, BundleType};
pub use entry::{Entry, Method, TransferState};
pub use error::{Error, Result};
pub use export::{Export, ExportSettings};
pub use import::Import;
pub use interfaces::{
    ConditionalSearch, EngineResponse, IdentityGenerator, InteractionHandler, SearchResults,
    SequentialGenerator, UuidGenerator,
};
pub use memory::MemoryStore;
pub use operations::ResourceOperation;
pub use transaction::TransactionProcessor;
