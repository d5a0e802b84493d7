//! Transactional store contract consumed by the index.
//!
//! Four narrow capability traits cover the four transaction scopes: global
//! read-only, global read-write, repository read-only, repository
//! read-write. The index picks the least-privileged scope per operation.
//! Implementations must provide serializable isolation per transaction and
//! guarantee that a failed transaction leaves no partial state behind.
//!
//! Missing records surface as [`crate::error::NotFoundError`] variants so
//! the index can perform its case analyses; all listings are ordered by key
//! and paginated with an `after` cursor and a `has_more` flag. An `amount`
//! of 0 means unlimited.

pub mod persistence;

use crate::error::Result;
use crate::model::{Branch, Commit, Entry, Object, Repo, WorkspaceEntry};

/// Read-only operations over the whole client keyspace.
pub trait ClientReadOps {
    fn read_repo(&self, repo_id: &str) -> Result<Repo>;
    fn list_repos(&self, amount: usize, after: Option<&str>) -> Result<(Vec<Repo>, bool)>;
}

/// Read-write operations over the whole client keyspace.
pub trait ClientOps: ClientReadOps {
    /// Removes the repository record and everything scoped under it.
    fn delete_repo(&mut self, repo_id: &str) -> Result<()>;
}

/// Read-only operations scoped to a single repository.
pub trait RepoReadOps {
    fn read_repo(&self) -> Result<Repo>;

    fn read_branch(&self, name: &str) -> Result<Branch>;
    fn list_branches(
        &self,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> Result<(Vec<Branch>, bool)>;

    fn read_commit(&self, address: &str) -> Result<Commit>;
    fn read_object(&self, address: &str) -> Result<Object>;
    /// Child entries of the tree node at `address`, sorted by name.
    fn read_tree(&self, address: &str) -> Result<Vec<Entry>>;

    fn read_from_workspace(&self, branch: &str, path: &str) -> Result<WorkspaceEntry>;
    /// All staged entries for `branch`, ordered by path.
    fn list_workspace(&self, branch: &str) -> Result<Vec<WorkspaceEntry>>;
}

/// Read-write operations scoped to a single repository.
pub trait RepoOps: RepoReadOps {
    fn write_repo(&mut self, repo: &Repo) -> Result<()>;

    fn write_branch(&mut self, name: &str, branch: &Branch) -> Result<()>;
    fn delete_branch(&mut self, name: &str) -> Result<()>;

    fn write_commit(&mut self, address: &str, commit: &Commit) -> Result<()>;
    fn write_object(&mut self, address: &str, object: &Object) -> Result<()>;
    fn write_tree(&mut self, address: &str, entries: &[Entry]) -> Result<()>;

    fn write_to_workspace(
        &mut self,
        branch: &str,
        path: &str,
        entry: &WorkspaceEntry,
    ) -> Result<()>;
    fn delete_workspace_path(&mut self, branch: &str, path: &str) -> Result<()>;
    fn clear_workspace(&mut self, branch: &str) -> Result<()>;
}

/// The store itself: opens transactions and runs a closure inside each.
///
/// A write transaction commits only if the closure returns `Ok`; an `Err`
/// return aborts it and discards every staged mutation.
pub trait Store {
    type ClientRead<'a>: ClientReadOps
    where
        Self: 'a;
    type ClientWrite<'a>: ClientOps
    where
        Self: 'a;
    type RepoRead<'a>: RepoReadOps
    where
        Self: 'a;
    type RepoWrite<'a>: RepoOps
    where
        Self: 'a;

    fn read_transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self::ClientRead<'_>) -> Result<T>;

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::ClientWrite<'_>) -> Result<T>;

    fn repo_read_transact<T, F>(&self, repo_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Self::RepoRead<'_>) -> Result<T>;

    fn repo_transact<T, F>(&self, repo_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::RepoWrite<'_>) -> Result<T>;
}
