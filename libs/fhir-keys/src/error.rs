use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid operation path: '{0}'")]
    InvalidPath(String),

    #[error("Invalid origin base url: {0}")]
    InvalidOrigin(String),

    #[error("Conflicting remap for '{id}': already mapped to '{existing}', refusing '{incoming}'")]
    MappingConflict {
        id: String,
        existing: String,
        incoming: String,
    },
}
