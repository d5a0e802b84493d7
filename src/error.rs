//! Error types for the versioned object index.

use thiserror::Error;

use crate::merkle::diff::Differences;

/// Missing-record errors, distinguished by source.
///
/// Every variant represents "the thing you asked for is not there"; callers
/// that only care about the class match on [`IndexError::NotFound`] or use
/// [`IndexError::is_not_found`].
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("repository not found")]
    Repo,

    #[error("branch not found: {0}")]
    Branch(String),

    #[error("commit not found: {0}")]
    Commit(String),

    #[error("object not found: {0}")]
    Object(String),

    #[error("tree node not found: {0}")]
    Tree(String),

    #[error("path not found: {0}")]
    Path(String),

    #[error("reference not found: {0}")]
    Ref(String),
}

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Codec(String),
}

/// The index error taxonomy.
///
/// Validation errors are raised before any transaction is opened. Within a
/// transaction the first unrecoverable error aborts it; no partial state
/// reaches the store.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),

    #[error("invalid reference: {0}")]
    InvalidRef(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid commit id: {0}")]
    InvalidCommitId(String),

    #[error("commit message must not be empty")]
    EmptyCommitMessage,

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    #[error("repository already exists: {0}")]
    RepoExists(String),

    #[error("destination branch has uncommitted changes")]
    DestinationNotCommitted,

    #[error("no common merge base")]
    NoMergeBase,

    /// Carries the computed merge operations, conflicts included, so callers
    /// can display exactly which paths diverged.
    #[error("merge conflict in {} path(s)", .0.len())]
    MergeConflict(Differences),

    #[error("failed applying merge operations")]
    MergeUpdateFailed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl IndexError {
    /// True for every missing-record variant, regardless of source.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
