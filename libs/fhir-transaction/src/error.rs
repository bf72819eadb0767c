use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid Bundle: {0}")]
    InvalidBundle(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Conditional criteria matched more than one resource. Carries the
    /// diagnostics a client needs to narrow its criteria.
    #[error(
        "Conditional criteria matched {matches} resources; criteria are not selective enough \
         (used parameters: [{}], unused parameters: [{}])",
        used.join(", "),
        unused.join(", ")
    )]
    PreconditionFailed {
        matches: usize,
        used: Vec<String>,
        unused: Vec<String>,
    },

    /// The interaction handler reported a non-terminal-success status;
    /// remaining entries of the operation/bundle are not processed.
    #[error("Operation aborted: handler returned status {status}")]
    Aborted { status: StatusCode },

    #[error("Cannot internalize reference to another server: '{0}'")]
    ForeignReference(String),

    #[error("Unexpected key for resource: '{0}'")]
    UnexpectedKey(String),

    #[error("Incompatible responses: {0}")]
    IncompatibleResponses(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Keys(#[from] funke_keys::Error),
}
