//! Index orchestration: the public operations over repositories, branches,
//! commits, objects, diffs and merges.
//!
//! Every operation follows the same shape: validate arguments, open the
//! least-privileged transaction scope, read the repository record, resolve
//! references, perform Merkle and workspace work, write back branch
//! pointers. Mutations stage workspace entries and roll a Bernoulli trial
//! to decide whether to fold the workspace into the tree immediately;
//! operations that traverse the tree (list, diff, commit, revert) fold it
//! synchronously first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::dag;
use crate::error::{IndexError, NotFoundError, Result};
use crate::ident;
use crate::merkle::diff::{DiffDirection, DiffKind, Differences};
use crate::merkle::{self, Merkle};
use crate::model::{Branch, Commit, Entry, EntryKind, Object, Repo, Root, WorkspaceEntry};
use crate::path::Path;
use crate::store::{ClientOps, ClientReadOps, RepoOps, RepoReadOps, Store};
use crate::validate;

/// Ratio of writes that trigger an immediate partial commit, for newly
/// created repositories.
pub const DEFAULT_PARTIAL_COMMIT_RATIO: f32 = 1.0;

/// Branch created automatically when a repository is born.
pub const DEFAULT_BRANCH: &str = "main";

/// Injectable timestamp source (Unix seconds), for deterministic tests.
pub type TimeGenerator = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Cooperative cancellation flag bound to an index handle.
///
/// Cloning shares the flag; re-binding a handle replaces its token rather
/// than mutating the old one. Cancellation is observed at operation entry.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A resolved reference: always a commit, plus the branch when the
/// reference named one.
struct Reference {
    commit: Commit,
    branch: Option<Branch>,
}

/// Resolve `r` to a commit or a branch + commit pair. Read-only. Hashes are
/// tried as commit addresses first; anything else (or a hash with no
/// commit) is treated as a branch name.
fn resolve_ref<T: RepoReadOps>(tx: &T, r: &str) -> Result<Reference> {
    if ident::is_hash(r) {
        match tx.read_commit(r) {
            Ok(commit) => {
                return Ok(Reference {
                    commit,
                    branch: None,
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    let branch = match tx.read_branch(r) {
        Ok(branch) => branch,
        Err(e) if e.is_not_found() => {
            return Err(NotFoundError::Ref(r.to_string()).into());
        }
        Err(e) => return Err(e),
    };
    let commit = tx.read_commit(&branch.commit)?;
    Ok(Reference {
        commit,
        branch: Some(branch),
    })
}

fn should_partially_commit(repo: &Repo) -> bool {
    rand::random::<f32>() < repo.partial_commit_ratio
}

/// Fold all staged workspace entries of `branch` into its Merkle tree,
/// producing a new `workspace_root`. A no-op on an empty workspace or a
/// vanished branch; must run inside the caller's transaction.
fn partial_commit<T: RepoOps>(tx: &mut T, branch: &str) -> Result<()> {
    let ws_entries = tx.list_workspace(branch)?;
    if ws_entries.is_empty() {
        return Ok(());
    }

    let branch_record = match tx.read_branch(branch) {
        Ok(record) => record,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e),
    };

    let tree = Merkle::new(branch_record.workspace_root.clone());
    let tree = tree.update(tx, &ws_entries)?;

    tx.clear_workspace(branch)?;
    tx.write_branch(
        branch,
        &Branch {
            name: branch_record.name,
            commit: branch_record.commit,
            commit_root: branch_record.commit_root,
            workspace_root: tree.root().to_string(),
        },
    )?;
    Ok(())
}

/// Stage one workspace entry, then roll the partial-commit die.
fn write_entry_to_workspace<T: RepoOps>(
    tx: &mut T,
    repo: &Repo,
    branch: &str,
    path: &str,
    entry: &WorkspaceEntry,
) -> Result<()> {
    tx.write_to_workspace(branch, path, entry)?;
    if should_partially_commit(repo) {
        partial_commit(tx, branch)?;
    }
    Ok(())
}

/// Write a commit over the branch's current `workspace_root` and advance
/// the branch to it.
fn do_commit_updates<T: RepoOps>(
    tx: &mut T,
    branch: &mut Branch,
    committer: &str,
    message: &str,
    parents: Vec<String>,
    metadata: BTreeMap<String, String>,
    timestamp: i64,
) -> Result<Commit> {
    let mut commit = Commit {
        address: String::new(),
        tree: branch.workspace_root.clone(),
        parents,
        committer: committer.to_string(),
        message: message.to_string(),
        timestamp,
        metadata,
    };
    commit.address = ident::hash_commit(&commit);
    tx.write_commit(&commit.address, &commit)?;

    branch.commit = commit.address.clone();
    branch.commit_root = commit.tree.clone();
    branch.workspace_root = commit.tree.clone();
    let name = branch.name.clone();
    tx.write_branch(&name, branch)?;
    Ok(commit)
}

/// Intent point: the tree rooted at `address` just became unreferenced.
/// Reclamation is deferred to a store-level sweep; nothing is freed here.
fn gc<T: RepoOps>(_tx: &mut T, address: &str) {
    trace!(address, "tree root discarded");
}

fn read_entry<T: RepoReadOps>(tx: &T, r: &str, path: &str, kind: EntryKind) -> Result<Entry> {
    tx.read_repo()?;
    let reference = resolve_ref(tx, r)?;
    let mut root = reference.commit.tree;
    if let Some(branch) = reference.branch {
        match tx.read_from_workspace(&branch.name, path) {
            Ok(ws_entry) => {
                if ws_entry.tombstone {
                    return Err(NotFoundError::Path(path.to_string()).into());
                }
                return Ok(ws_entry.entry);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        root = branch.workspace_root;
    }
    Merkle::new(root).get_entry(tx, path, kind)
}

/// The versioned object index over a transactional store.
///
/// Stateless apart from its timestamp source and cancellation token; safe
/// to share across callers.
pub struct KvIndex<S: Store> {
    store: S,
    ts_generator: TimeGenerator,
    cancel: CancellationToken,
}

impl<S: Store> KvIndex<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ts_generator: Arc::new(|| chrono::Utc::now().timestamp()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the timestamp source. Used for deterministic tests.
    pub fn with_time_generator(mut self, generator: TimeGenerator) -> Self {
        self.ts_generator = generator;
        self
    }

    /// Bind a cancellation token, replacing the previous one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        Ok(())
    }

    fn now(&self) -> i64 {
        (self.ts_generator)()
    }

    // ------------------------------------------------------------------
    // Repositories

    /// Create a repository with an initial empty commit and its default
    /// branch pointing at the empty tree.
    pub fn create_repo(&self, repo_id: &str, bucket: &str, default_branch: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(default_branch)?;
        self.checkpoint()?;

        let creation_date = self.now();
        let repo = Repo {
            repo_id: repo_id.to_string(),
            bucket: bucket.to_string(),
            creation_date,
            default_branch: default_branch.to_string(),
            partial_commit_ratio: DEFAULT_PARTIAL_COMMIT_RATIO,
        };

        self.store.repo_transact(repo_id, |tx| {
            match tx.read_repo() {
                Ok(_) => return Err(IndexError::RepoExists(repo_id.to_string())),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(repo_id, error = %e, "could not read repo");
                    return Err(e);
                }
            }
            tx.write_repo(&repo)?;

            let empty_tree = ident::empty_tree_address();
            tx.write_tree(&empty_tree, &[])?;

            let mut commit = Commit {
                address: String::new(),
                tree: empty_tree,
                parents: Vec::new(),
                committer: String::new(),
                message: String::new(),
                timestamp: creation_date,
                metadata: BTreeMap::new(),
            };
            commit.address = ident::hash_commit(&commit);
            tx.write_commit(&commit.address, &commit)?;

            tx.write_branch(
                &repo.default_branch,
                &Branch {
                    name: repo.default_branch.clone(),
                    commit: commit.address.clone(),
                    commit_root: commit.tree.clone(),
                    workspace_root: commit.tree.clone(),
                },
            )
        })
    }

    pub fn get_repo(&self, repo_id: &str) -> Result<Repo> {
        validate::repo_id(repo_id)?;
        self.checkpoint()?;
        self.store.read_transact(|tx| tx.read_repo(repo_id))
    }

    pub fn list_repos(&self, amount: usize, after: Option<&str>) -> Result<(Vec<Repo>, bool)> {
        self.checkpoint()?;
        self.store.read_transact(|tx| tx.list_repos(amount, after))
    }

    pub fn delete_repo(&self, repo_id: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        self.checkpoint()?;
        self.store.transact(|tx| {
            tx.read_repo(repo_id)?;
            tx.delete_repo(repo_id)
        })
    }

    // ------------------------------------------------------------------
    // Branches

    pub fn create_branch(&self, repo_id: &str, branch: &str, r: &str) -> Result<Branch> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::reference(r)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            tx.read_repo()?;
            match tx.read_branch(branch) {
                Ok(_) => return Err(IndexError::BranchAlreadyExists(branch.to_string())),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(branch, error = %e, "could not read branch");
                    return Err(e);
                }
            }
            let reference = resolve_ref(tx, r)?;
            let record = Branch {
                name: branch.to_string(),
                commit: reference.commit.address.clone(),
                commit_root: reference.commit.tree.clone(),
                workspace_root: reference.commit.tree.clone(),
            };
            tx.write_branch(branch, &record)?;
            Ok(record)
        })
    }

    pub fn get_branch(&self, repo_id: &str, branch: &str) -> Result<Branch> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| tx.read_branch(branch))
    }

    pub fn list_branches_by_prefix(
        &self,
        repo_id: &str,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> Result<(Vec<Branch>, bool)> {
        validate::repo_id(repo_id)?;
        self.checkpoint()?;
        self.store.repo_read_transact(repo_id, |tx| {
            tx.read_repo()?;
            tx.list_branches(prefix, amount, after)
        })
    }

    /// Delete a branch, discarding its workspace and workspace root.
    pub fn delete_branch(&self, repo_id: &str, branch: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        self.checkpoint()?;
        self.store.repo_transact(repo_id, |tx| {
            let record = tx.read_branch(branch)?;
            tx.clear_workspace(branch)?;
            gc(tx, &record.workspace_root);
            tx.delete_branch(branch)
        })
    }

    /// Drop all uncommitted work: clear the workspace and point
    /// `workspace_root` back at `commit_root`.
    pub fn reset_branch(&self, repo_id: &str, branch: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        self.checkpoint()?;
        self.store.repo_transact(repo_id, |tx| {
            tx.clear_workspace(branch)?;
            let mut record = tx.read_branch(branch)?;
            gc(tx, &record.workspace_root);
            record.workspace_root = record.commit_root.clone();
            tx.write_branch(branch, &record)
        })
    }

    // ------------------------------------------------------------------
    // Reads

    pub fn read_object(&self, repo_id: &str, r: &str, path: &str) -> Result<Object> {
        validate::repo_id(repo_id)?;
        validate::reference(r)?;
        validate::path(path)?;
        self.checkpoint()?;

        self.store.repo_read_transact(repo_id, |tx| {
            tx.read_repo()?;
            let reference = resolve_ref(tx, r)?;
            if let Some(branch) = reference.branch {
                return match tx.read_from_workspace(&branch.name, path) {
                    Ok(ws_entry) => {
                        if ws_entry.tombstone {
                            return Err(NotFoundError::Path(path.to_string()).into());
                        }
                        tx.read_object(&ws_entry.entry.address)
                    }
                    Err(e) if e.is_not_found() => {
                        Merkle::new(branch.workspace_root).get_object(tx, path)
                    }
                    Err(e) => {
                        error!(branch = %branch.name, path, error = %e, "could not read from workspace");
                        Err(e)
                    }
                };
            }
            Merkle::new(reference.commit.tree).get_object(tx, path)
        })
    }

    /// Read the object-kind entry at `path`.
    pub fn read_entry_object(&self, repo_id: &str, r: &str, path: &str) -> Result<Entry> {
        validate::repo_id(repo_id)?;
        validate::reference(r)?;
        validate::path(path)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| read_entry(tx, r, path, EntryKind::Object))
    }

    /// Read the tree-kind entry at `path`.
    pub fn read_entry_tree(&self, repo_id: &str, r: &str, path: &str) -> Result<Entry> {
        validate::repo_id(repo_id)?;
        validate::reference(r)?;
        validate::path(path)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| read_entry(tx, r, path, EntryKind::Tree))
    }

    /// Read the root tree node of a reference: `workspace_root` for a
    /// branch, the commit tree for a commit.
    pub fn read_root_object(&self, repo_id: &str, r: &str) -> Result<Root> {
        validate::repo_id(repo_id)?;
        validate::reference(r)?;
        self.checkpoint()?;
        self.store.repo_read_transact(repo_id, |tx| {
            tx.read_repo()?;
            let reference = resolve_ref(tx, r)?;
            let address = match &reference.branch {
                Some(branch) => branch.workspace_root.clone(),
                None => reference.commit.tree,
            };
            let entries = tx.read_tree(&address)?;
            Ok(Root { address, entries })
        })
    }

    /// Paginated listing under `prefix`. For a branch reference the
    /// workspace is folded first so the scan sees all pending writes.
    pub fn list_objects_by_prefix(
        &self,
        repo_id: &str,
        r: &str,
        prefix: &str,
        from: Option<&str>,
        amount: usize,
        descend: bool,
    ) -> Result<(Vec<Entry>, bool)> {
        validate::repo_id(repo_id)?;
        validate::reference(r)?;
        validate::prefix(prefix)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            tx.read_repo()?;
            let reference = resolve_ref(tx, r)?;
            let root = match reference.branch {
                Some(branch) => {
                    // fold now: the scan traverses the tree immediately after
                    partial_commit(tx, &branch.name)?;
                    tx.read_branch(&branch.name)?.workspace_root
                }
                None => reference.commit.tree,
            };
            let tree = Merkle::new(root);
            let (entries, has_more) = tree.prefix_scan(tx, prefix, from, amount, descend)?;
            debug!(prefix, descend, results = entries.len(), has_more, "prefix scan");
            Ok((entries, has_more))
        })
    }

    // ------------------------------------------------------------------
    // Writes

    /// Persist an object record under its content address and stage a
    /// workspace entry describing it at `path`.
    pub fn write_object(&self, repo_id: &str, branch: &str, path: &str, object: &Object) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;

        let timestamp = self.now();
        self.store.repo_transact(repo_id, |tx| {
            let address = ident::hash_object(object);
            tx.write_object(&address, object)?;
            let repo = tx.read_repo()?;
            let p = Path::new(path);
            write_entry_to_workspace(
                tx,
                &repo,
                branch,
                p.as_str(),
                &WorkspaceEntry::upsert(
                    p.as_str(),
                    Entry {
                        name: p.basename().to_string(),
                        address,
                        kind: EntryKind::Object,
                        size: object.size,
                        checksum: object.checksum.clone(),
                        timestamp,
                    },
                ),
            )
        })
    }

    /// Stage a caller-supplied entry with no object write. Used when the
    /// object record was written out-of-band.
    pub fn write_entry(&self, repo_id: &str, branch: &str, path: &str, entry: Entry) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            let repo = tx.read_repo()?;
            write_entry_to_workspace(
                tx,
                &repo,
                branch,
                path,
                &WorkspaceEntry::upsert(path, entry),
            )
        })
    }

    /// Persist an object record and stage the caller-supplied entry for it.
    /// Covers uploads whose entry is not derivable from the object alone.
    pub fn write_file(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        entry: Entry,
        object: &Object,
    ) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            tx.write_object(&ident::hash_object(object), object)?;
            let repo = tx.read_repo()?;
            write_entry_to_workspace(
                tx,
                &repo,
                branch,
                path,
                &WorkspaceEntry::upsert(path, entry),
            )
        })
    }

    /// Delete the object at `path` on `branch`.
    ///
    /// Case analysis over (workspace, tree) presence: absent in both is an
    /// error; a workspace-only write is undone; a tree-only entry gets a
    /// tombstone; both means undo the write and tombstone the tree entry.
    /// An existing tombstone reports not-found.
    pub fn delete_object(&self, repo_id: &str, branch: &str, path: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;

        let timestamp = self.now();
        self.store.repo_transact(repo_id, |tx| {
            let repo = tx.read_repo()?;

            let ws_entry = match tx.read_from_workspace(branch, path) {
                Ok(entry) => Some(entry),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };

            let branch_record = tx.read_branch(branch)?;
            let tree = Merkle::new(branch_record.workspace_root);
            let tree_entry = match tree.get_entry(tx, path, EntryKind::Object) {
                Ok(entry) => Some(entry),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };

            if ws_entry.is_none() && tree_entry.is_none() {
                return Err(NotFoundError::Path(path.to_string()).into());
            }
            if let Some(ws_entry) = ws_entry {
                if ws_entry.tombstone {
                    return Err(NotFoundError::Path(path.to_string()).into());
                }
                tx.delete_workspace_path(branch, path)?;
            }
            if tree_entry.is_some() {
                let p = Path::new(path);
                write_entry_to_workspace(
                    tx,
                    &repo,
                    branch,
                    path,
                    &WorkspaceEntry::tombstone(
                        path,
                        Entry {
                            name: p.basename().to_string(),
                            address: String::new(),
                            kind: EntryKind::Object,
                            size: 0,
                            checksum: String::new(),
                            timestamp,
                        },
                    ),
                )?;
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Commits

    /// Fold the workspace, then write a commit over the folded tree and
    /// advance the branch.
    pub fn commit(
        &self,
        repo_id: &str,
        branch: &str,
        message: &str,
        committer: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Commit> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::commit_message(message)?;
        self.checkpoint()?;

        let timestamp = self.now();
        self.store.repo_transact(repo_id, |tx| {
            partial_commit(tx, branch)?;
            let mut record = tx.read_branch(branch)?;
            let parents = vec![record.commit.clone()];
            do_commit_updates(tx, &mut record, committer, message, parents, metadata, timestamp)
        })
    }

    pub fn get_commit(&self, repo_id: &str, commit_id: &str) -> Result<Commit> {
        validate::repo_id(repo_id)?;
        validate::commit_id(commit_id)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| tx.read_commit(commit_id))
    }

    /// Paginated BFS log over the parent graph starting at `from`.
    pub fn get_commit_log(
        &self,
        repo_id: &str,
        from: &str,
        amount: usize,
        after: Option<&str>,
    ) -> Result<(Vec<Commit>, bool)> {
        validate::repo_id(repo_id)?;
        validate::commit_id(from)?;
        validate::commit_id_opt(after)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| dag::bfs_scan(tx, from, amount, after))
    }

    // ------------------------------------------------------------------
    // Diffs

    /// Three-way diff of two references against their merge base. A branch
    /// on the left side contributes its `workspace_root`, so uncommitted
    /// changes are visible.
    pub fn diff(&self, repo_id: &str, left: &str, right: &str) -> Result<Differences> {
        validate::repo_id(repo_id)?;
        validate::reference(left)?;
        validate::reference(right)?;
        self.checkpoint()?;
        self.store
            .repo_read_transact(repo_id, |tx| do_diff(tx, left, right, false))
    }

    /// Fold the workspace, then diff it against the committed tree.
    pub fn diff_workspace(&self, repo_id: &str, branch: &str) -> Result<Differences> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            partial_commit(tx, branch)?;
            let record = tx.read_branch(branch)?;
            merkle::diff::diff(
                tx,
                &Merkle::new(record.workspace_root),
                &Merkle::new(record.commit_root.clone()),
                &Merkle::new(record.commit_root),
            )
        })
    }

    // ------------------------------------------------------------------
    // Reverts

    /// Point the branch at an existing commit, dropping the workspace and
    /// any folded-but-uncommitted work.
    pub fn revert_commit(&self, repo_id: &str, branch: &str, commit_id: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::commit_id(commit_id)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            tx.clear_workspace(branch)?;
            let commit = tx.read_commit(commit_id)?;
            let mut record = tx.read_branch(branch)?;
            gc(tx, &record.workspace_root);
            record.commit = commit.address.clone();
            record.commit_root = commit.tree.clone();
            record.workspace_root = commit.tree;
            tx.write_branch(branch, &record)
        })
    }

    /// Restore the committed state under `path` (tree entry).
    pub fn revert_path(&self, repo_id: &str, branch: &str, path: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;
        self.revert_path_inner(repo_id, branch, path, EntryKind::Tree)
    }

    /// Restore the committed state of the object at `path`.
    pub fn revert_object(&self, repo_id: &str, branch: &str, path: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        validate::path(path)?;
        self.checkpoint()?;
        self.revert_path_inner(repo_id, branch, path, EntryKind::Object)
    }

    fn revert_path_inner(
        &self,
        repo_id: &str,
        branch: &str,
        path: &str,
        kind: EntryKind,
    ) -> Result<()> {
        self.store.repo_transact(repo_id, |tx| {
            let p = Path::new(path);
            if p.is_root() {
                // reverting the root is a full reset
                tx.clear_workspace(branch)?;
                let mut record = tx.read_branch(branch)?;
                gc(tx, &record.workspace_root);
                record.workspace_root = record.commit_root.clone();
                return tx.write_branch(branch, &record);
            }

            partial_commit(tx, branch)?;
            let record = tx.read_branch(branch)?;
            let workspace_tree = Merkle::new(record.workspace_root.clone());
            let commit_tree = Merkle::new(record.commit_root.clone());

            let ws_entry = match commit_tree.get_entry(tx, path, kind) {
                Ok(entry) => WorkspaceEntry::upsert(path, entry),
                Err(e) if e.is_not_found() => {
                    // added since the commit: drop everything under the path
                    let entry = workspace_tree.get_entry(tx, path, kind)?;
                    WorkspaceEntry::tombstone(path, entry)
                }
                Err(e) => {
                    error!(branch, path, error = %e, "could not get entry");
                    return Err(e);
                }
            };

            let workspace_tree = workspace_tree.update(tx, &[ws_entry])?;
            tx.write_branch(
                branch,
                &Branch {
                    name: record.name,
                    commit: record.commit,
                    commit_root: record.commit_root,
                    workspace_root: workspace_tree.root().to_string(),
                },
            )
        })
    }

    // ------------------------------------------------------------------
    // Merge

    /// Merge `source` into `destination`.
    ///
    /// The destination must have no uncommitted work. Returns the merge
    /// operations applied; a conflict aborts with the divergent paths
    /// attached to the error.
    pub fn merge(
        &self,
        repo_id: &str,
        source: &str,
        destination: &str,
        committer: &str,
    ) -> Result<Differences> {
        validate::repo_id(repo_id)?;
        validate::reference(source)?;
        validate::reference(destination)?;
        self.checkpoint()?;

        let timestamp = self.now();
        self.store.repo_transact(repo_id, |tx| {
            let mut destination_branch = match tx.read_branch(destination) {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    return Err(NotFoundError::Branch(destination.to_string()).into());
                }
                Err(e) => return Err(e),
            };
            let staged = tx.list_workspace(destination)?;
            if destination_branch.commit_root != destination_branch.workspace_root
                || !staged.is_empty()
            {
                return Err(IndexError::DestinationNotCommitted);
            }

            let differences = do_diff(tx, source, destination, true)?;
            let mut conflict = false;
            let mut merge_ops = Differences::new();
            for difference in differences {
                if difference.direction == DiffDirection::Conflict {
                    conflict = true;
                }
                if difference.direction != DiffDirection::Right {
                    merge_ops.push(difference);
                }
            }
            if conflict {
                return Err(IndexError::MergeConflict(merge_ops));
            }

            let source_branch = tx.read_branch(source)?;
            let source_tree = Merkle::new(source_branch.workspace_root.clone());
            let mut ws_entries = Vec::with_capacity(merge_ops.len());
            for op in &merge_ops {
                if op.kind == DiffKind::Removed {
                    let p = Path::new(&op.path);
                    ws_entries.push(WorkspaceEntry::tombstone(
                        op.path.clone(),
                        Entry {
                            name: p.basename().to_string(),
                            address: String::new(),
                            kind: op.path_type,
                            size: 0,
                            checksum: String::new(),
                            timestamp,
                        },
                    ));
                } else {
                    let entry = source_tree.get_entry(tx, &op.path, op.path_type)?;
                    ws_entries.push(WorkspaceEntry::upsert(op.path.clone(), entry));
                }
            }

            let destination_tree = Merkle::new(destination_branch.commit_root.clone());
            let new_root = match destination_tree.update(tx, &ws_entries) {
                Ok(tree) => tree,
                Err(e) => {
                    error!(source, destination, error = %e, "failed updating merge destination");
                    return Err(IndexError::MergeUpdateFailed);
                }
            };
            destination_branch.commit_root = new_root.root().to_string();
            destination_branch.workspace_root = new_root.root().to_string();

            let parents = vec![
                destination_branch.commit.clone(),
                source_branch.commit.clone(),
            ];
            let message = format!("Merge branch {} into {}", source, destination);
            do_commit_updates(
                tx,
                &mut destination_branch,
                committer,
                &message,
                parents,
                BTreeMap::new(),
                timestamp,
            )?;
            Ok(merge_ops)
        })
    }

    // ------------------------------------------------------------------
    // Diagnostics

    /// Fold the workspace and walk the branch's whole tree, logging every
    /// entry.
    pub fn walk(&self, repo_id: &str, branch: &str) -> Result<()> {
        validate::repo_id(repo_id)?;
        validate::reference(branch)?;
        self.checkpoint()?;

        self.store.repo_transact(repo_id, |tx| {
            partial_commit(tx, branch)?;
            tx.read_repo()?;
            let record = tx.read_branch(branch)?;
            Merkle::new(record.workspace_root).walk_all(tx)
        })
    }
}

/// Resolve both references, find their merge base, and run the three-way
/// tree diff. For a merge, both sides contribute committed trees; otherwise
/// a branch on the left contributes its `workspace_root`.
fn do_diff<T: RepoReadOps>(
    tx: &T,
    left: &str,
    right: &str,
    is_merge: bool,
) -> Result<Differences> {
    let left_ref = resolve_ref(tx, left).map_err(|e| {
        error!(r = left, error = %e, "could not resolve left ref");
        ref_not_found(e, left)
    })?;
    let right_ref = resolve_ref(tx, right).map_err(|e| {
        error!(r = right, error = %e, "could not resolve right ref");
        ref_not_found(e, right)
    })?;

    let base = match dag::find_lowest_common_ancestor(
        tx,
        &left_ref.commit.address,
        &right_ref.commit.address,
    )? {
        Some(commit) => commit,
        None => {
            error!(left, right, "no common merge base found");
            return Err(IndexError::NoMergeBase);
        }
    };

    let left_tree = match (&left_ref.branch, is_merge) {
        (Some(branch), false) => branch.workspace_root.clone(),
        _ => left_ref.commit.tree.clone(),
    };
    let right_tree = right_ref.commit.tree;

    merkle::diff::diff(
        tx,
        &Merkle::new(left_tree),
        &Merkle::new(right_tree),
        &Merkle::new(base.tree),
    )
}

fn ref_not_found(e: IndexError, r: &str) -> IndexError {
    if e.is_not_found() {
        NotFoundError::Ref(r.to_string()).into()
    } else {
        e
    }
}
