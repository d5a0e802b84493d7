//! Sled-backed reference implementation of the store contract.
//!
//! Records are bincode-encoded under prefixed keys:
//!
//! ```text
//! repo:<repo_id>
//! branch:<repo_id>:<name>
//! commit:<repo_id>:<address>
//! tree:<repo_id>:<address>
//! obj:<repo_id>:<address>
//! ws:<repo_id>:<branch>:<path>
//! ```
//!
//! Identifier validation excludes `:`, so prefix scans never bleed across
//! record kinds. Serializable isolation comes from a single reader-writer
//! lock: writers are exclusive, readers share. Write transactions stage
//! every mutation in an overlay buffer that reads observe, and apply the
//! buffer as one `sled::Batch` when the transaction closure succeeds; an
//! aborted transaction therefore leaves the database untouched.

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{NotFoundError, Result, StoreError};
use crate::model::{Branch, Commit, Entry, Object, Repo, WorkspaceEntry};
use crate::store::{ClientOps, ClientReadOps, RepoOps, RepoReadOps, Store};

const REPO_PREFIX: &str = "repo:";

fn repo_key(repo_id: &str) -> Vec<u8> {
    format!("{}{}", REPO_PREFIX, repo_id).into_bytes()
}

fn branch_key(repo_id: &str, name: &str) -> Vec<u8> {
    format!("branch:{}:{}", repo_id, name).into_bytes()
}

fn branch_prefix(repo_id: &str, name_prefix: &str) -> Vec<u8> {
    format!("branch:{}:{}", repo_id, name_prefix).into_bytes()
}

fn commit_key(repo_id: &str, address: &str) -> Vec<u8> {
    format!("commit:{}:{}", repo_id, address).into_bytes()
}

fn tree_key(repo_id: &str, address: &str) -> Vec<u8> {
    format!("tree:{}:{}", repo_id, address).into_bytes()
}

fn object_key(repo_id: &str, address: &str) -> Vec<u8> {
    format!("obj:{}:{}", repo_id, address).into_bytes()
}

fn workspace_key(repo_id: &str, branch: &str, path: &str) -> Vec<u8> {
    format!("ws:{}:{}:{}", repo_id, branch, path).into_bytes()
}

fn workspace_prefix(repo_id: &str, branch: &str) -> Vec<u8> {
    format!("ws:{}:{}:", repo_id, branch).into_bytes()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Codec(e.to_string()).into())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()).into())
}

/// Staged mutations of one write transaction. `None` marks a deletion.
#[derive(Default)]
struct WriteBuffer {
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBuffer {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key, None);
    }
}

fn fetch(db: &sled::Db, buffer: Option<&WriteBuffer>, key: &[u8]) -> Result<Option<Vec<u8>>> {
    if let Some(buffer) = buffer {
        if let Some(staged) = buffer.staged.get(key) {
            return Ok(staged.clone());
        }
    }
    let value = db.get(key).map_err(StoreError::Backend)?;
    Ok(value.map(|v| v.to_vec()))
}

/// Prefix scan over the database merged with the overlay, sorted by key.
fn scan(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    prefix: &[u8],
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for item in db.scan_prefix(prefix) {
        let (key, value) = item.map_err(StoreError::Backend)?;
        merged.insert(key.to_vec(), value.to_vec());
    }
    if let Some(buffer) = buffer {
        for (key, value) in buffer.staged.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
    }
    Ok(merged.into_iter().collect())
}

fn get_record<T: DeserializeOwned>(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    key: &[u8],
) -> Result<Option<T>> {
    match fetch(db, buffer, key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Key-ordered listing with cursor pagination. `amount` 0 means unlimited.
fn paginate<T>(items: Vec<(Vec<u8>, T)>, amount: usize, after: Option<&[u8]>) -> (Vec<T>, bool) {
    let mut results = Vec::new();
    let mut has_more = false;
    for (key, value) in items {
        if let Some(after) = after {
            if key.as_slice() <= after {
                continue;
            }
        }
        if amount > 0 && results.len() == amount {
            has_more = true;
            break;
        }
        results.push(value);
    }
    (results, has_more)
}

fn read_repo_record(db: &sled::Db, buffer: Option<&WriteBuffer>, repo_id: &str) -> Result<Repo> {
    get_record(db, buffer, &repo_key(repo_id))?.ok_or_else(|| NotFoundError::Repo.into())
}

fn list_repo_records(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    amount: usize,
    after: Option<&str>,
) -> Result<(Vec<Repo>, bool)> {
    let mut items = Vec::new();
    for (key, bytes) in scan(db, buffer, REPO_PREFIX.as_bytes())? {
        items.push((key, decode::<Repo>(&bytes)?));
    }
    let after = after.map(repo_key);
    Ok(paginate(items, amount, after.as_deref()))
}

fn read_branch_record(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    name: &str,
) -> Result<Branch> {
    get_record(db, buffer, &branch_key(repo_id, name))?
        .ok_or_else(|| NotFoundError::Branch(name.to_string()).into())
}

fn list_branch_records(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    prefix: &str,
    amount: usize,
    after: Option<&str>,
) -> Result<(Vec<Branch>, bool)> {
    let mut items = Vec::new();
    for (key, bytes) in scan(db, buffer, &branch_prefix(repo_id, prefix))? {
        items.push((key, decode::<Branch>(&bytes)?));
    }
    let after = after.map(|name| branch_key(repo_id, name));
    Ok(paginate(items, amount, after.as_deref()))
}

fn read_commit_record(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    address: &str,
) -> Result<Commit> {
    get_record(db, buffer, &commit_key(repo_id, address))?
        .ok_or_else(|| NotFoundError::Commit(address.to_string()).into())
}

fn read_object_record(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    address: &str,
) -> Result<Object> {
    get_record(db, buffer, &object_key(repo_id, address))?
        .ok_or_else(|| NotFoundError::Object(address.to_string()).into())
}

fn read_tree_record(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    address: &str,
) -> Result<Vec<Entry>> {
    get_record(db, buffer, &tree_key(repo_id, address))?
        .ok_or_else(|| NotFoundError::Tree(address.to_string()).into())
}

fn read_workspace_record(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    branch: &str,
    path: &str,
) -> Result<WorkspaceEntry> {
    get_record(db, buffer, &workspace_key(repo_id, branch, path))?
        .ok_or_else(|| NotFoundError::Path(path.to_string()).into())
}

fn list_workspace_records(
    db: &sled::Db,
    buffer: Option<&WriteBuffer>,
    repo_id: &str,
    branch: &str,
) -> Result<Vec<WorkspaceEntry>> {
    let mut entries = Vec::new();
    for (_, bytes) in scan(db, buffer, &workspace_prefix(repo_id, branch))? {
        entries.push(decode::<WorkspaceEntry>(&bytes)?);
    }
    Ok(entries)
}

/// Sled-backed store implementing all four transaction scopes.
pub struct SledStore {
    db: sled::Db,
    lock: RwLock<()>,
}

impl SledStore {
    /// Open (or create) a store at the given filesystem path.
    pub fn open<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(StoreError::Backend)?;
        Ok(Self::from_db(db))
    }

    /// Wrap an existing sled database handle.
    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            lock: RwLock::new(()),
        }
    }
}

pub struct ClientReadTx<'a> {
    db: &'a sled::Db,
    _guard: RwLockReadGuard<'a, ()>,
}

pub struct ClientWriteTx<'a> {
    db: &'a sled::Db,
    buffer: WriteBuffer,
    _guard: RwLockWriteGuard<'a, ()>,
}

pub struct RepoReadTx<'a> {
    db: &'a sled::Db,
    repo_id: String,
    _guard: RwLockReadGuard<'a, ()>,
}

pub struct RepoWriteTx<'a> {
    db: &'a sled::Db,
    repo_id: String,
    buffer: WriteBuffer,
    _guard: RwLockWriteGuard<'a, ()>,
}

fn apply(db: &sled::Db, buffer: WriteBuffer) -> Result<()> {
    let mut batch = sled::Batch::default();
    for (key, value) in buffer.staged {
        match value {
            Some(value) => batch.insert(key, value),
            None => batch.remove(key),
        }
    }
    db.apply_batch(batch).map_err(StoreError::Backend)?;
    Ok(())
}

impl ClientReadOps for ClientReadTx<'_> {
    fn read_repo(&self, repo_id: &str) -> Result<Repo> {
        read_repo_record(self.db, None, repo_id)
    }

    fn list_repos(&self, amount: usize, after: Option<&str>) -> Result<(Vec<Repo>, bool)> {
        list_repo_records(self.db, None, amount, after)
    }
}

impl ClientReadOps for ClientWriteTx<'_> {
    fn read_repo(&self, repo_id: &str) -> Result<Repo> {
        read_repo_record(self.db, Some(&self.buffer), repo_id)
    }

    fn list_repos(&self, amount: usize, after: Option<&str>) -> Result<(Vec<Repo>, bool)> {
        list_repo_records(self.db, Some(&self.buffer), amount, after)
    }
}

impl ClientOps for ClientWriteTx<'_> {
    fn delete_repo(&mut self, repo_id: &str) -> Result<()> {
        // The repository record plus every record scoped under it.
        let prefixes = [
            repo_key(repo_id),
            format!("branch:{}:", repo_id).into_bytes(),
            format!("commit:{}:", repo_id).into_bytes(),
            format!("tree:{}:", repo_id).into_bytes(),
            format!("obj:{}:", repo_id).into_bytes(),
            format!("ws:{}:", repo_id).into_bytes(),
        ];
        for prefix in prefixes {
            for (key, _) in scan(self.db, Some(&self.buffer), &prefix)? {
                self.buffer.delete(key);
            }
        }
        Ok(())
    }
}

impl RepoReadOps for RepoReadTx<'_> {
    fn read_repo(&self) -> Result<Repo> {
        read_repo_record(self.db, None, &self.repo_id)
    }

    fn read_branch(&self, name: &str) -> Result<Branch> {
        read_branch_record(self.db, None, &self.repo_id, name)
    }

    fn list_branches(
        &self,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> Result<(Vec<Branch>, bool)> {
        list_branch_records(self.db, None, &self.repo_id, prefix, amount, after)
    }

    fn read_commit(&self, address: &str) -> Result<Commit> {
        read_commit_record(self.db, None, &self.repo_id, address)
    }

    fn read_object(&self, address: &str) -> Result<Object> {
        read_object_record(self.db, None, &self.repo_id, address)
    }

    fn read_tree(&self, address: &str) -> Result<Vec<Entry>> {
        read_tree_record(self.db, None, &self.repo_id, address)
    }

    fn read_from_workspace(&self, branch: &str, path: &str) -> Result<WorkspaceEntry> {
        read_workspace_record(self.db, None, &self.repo_id, branch, path)
    }

    fn list_workspace(&self, branch: &str) -> Result<Vec<WorkspaceEntry>> {
        list_workspace_records(self.db, None, &self.repo_id, branch)
    }
}

impl RepoReadOps for RepoWriteTx<'_> {
    fn read_repo(&self) -> Result<Repo> {
        read_repo_record(self.db, Some(&self.buffer), &self.repo_id)
    }

    fn read_branch(&self, name: &str) -> Result<Branch> {
        read_branch_record(self.db, Some(&self.buffer), &self.repo_id, name)
    }

    fn list_branches(
        &self,
        prefix: &str,
        amount: usize,
        after: Option<&str>,
    ) -> Result<(Vec<Branch>, bool)> {
        list_branch_records(
            self.db,
            Some(&self.buffer),
            &self.repo_id,
            prefix,
            amount,
            after,
        )
    }

    fn read_commit(&self, address: &str) -> Result<Commit> {
        read_commit_record(self.db, Some(&self.buffer), &self.repo_id, address)
    }

    fn read_object(&self, address: &str) -> Result<Object> {
        read_object_record(self.db, Some(&self.buffer), &self.repo_id, address)
    }

    fn read_tree(&self, address: &str) -> Result<Vec<Entry>> {
        read_tree_record(self.db, Some(&self.buffer), &self.repo_id, address)
    }

    fn read_from_workspace(&self, branch: &str, path: &str) -> Result<WorkspaceEntry> {
        read_workspace_record(self.db, Some(&self.buffer), &self.repo_id, branch, path)
    }

    fn list_workspace(&self, branch: &str) -> Result<Vec<WorkspaceEntry>> {
        list_workspace_records(self.db, Some(&self.buffer), &self.repo_id, branch)
    }
}

impl RepoOps for RepoWriteTx<'_> {
    fn write_repo(&mut self, repo: &Repo) -> Result<()> {
        let bytes = encode(repo)?;
        self.buffer.put(repo_key(&self.repo_id), bytes);
        Ok(())
    }

    fn write_branch(&mut self, name: &str, branch: &Branch) -> Result<()> {
        let bytes = encode(branch)?;
        self.buffer.put(branch_key(&self.repo_id, name), bytes);
        Ok(())
    }

    fn delete_branch(&mut self, name: &str) -> Result<()> {
        self.buffer.delete(branch_key(&self.repo_id, name));
        Ok(())
    }

    fn write_commit(&mut self, address: &str, commit: &Commit) -> Result<()> {
        let bytes = encode(commit)?;
        self.buffer.put(commit_key(&self.repo_id, address), bytes);
        Ok(())
    }

    fn write_object(&mut self, address: &str, object: &Object) -> Result<()> {
        let bytes = encode(object)?;
        self.buffer.put(object_key(&self.repo_id, address), bytes);
        Ok(())
    }

    fn write_tree(&mut self, address: &str, entries: &[Entry]) -> Result<()> {
        let bytes = encode(&entries)?;
        self.buffer.put(tree_key(&self.repo_id, address), bytes);
        Ok(())
    }

    fn write_to_workspace(
        &mut self,
        branch: &str,
        path: &str,
        entry: &WorkspaceEntry,
    ) -> Result<()> {
        let bytes = encode(entry)?;
        self.buffer
            .put(workspace_key(&self.repo_id, branch, path), bytes);
        Ok(())
    }

    fn delete_workspace_path(&mut self, branch: &str, path: &str) -> Result<()> {
        self.buffer
            .delete(workspace_key(&self.repo_id, branch, path));
        Ok(())
    }

    fn clear_workspace(&mut self, branch: &str) -> Result<()> {
        let prefix = workspace_prefix(&self.repo_id, branch);
        for (key, _) in scan(self.db, Some(&self.buffer), &prefix)? {
            self.buffer.delete(key);
        }
        Ok(())
    }
}

impl Store for SledStore {
    type ClientRead<'a> = ClientReadTx<'a> where Self: 'a;
    type ClientWrite<'a> = ClientWriteTx<'a> where Self: 'a;
    type RepoRead<'a> = RepoReadTx<'a> where Self: 'a;
    type RepoWrite<'a> = RepoWriteTx<'a> where Self: 'a;

    fn read_transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self::ClientRead<'_>) -> Result<T>,
    {
        let tx = ClientReadTx {
            db: &self.db,
            _guard: self.lock.read(),
        };
        f(&tx)
    }

    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::ClientWrite<'_>) -> Result<T>,
    {
        let mut tx = ClientWriteTx {
            db: &self.db,
            buffer: WriteBuffer::default(),
            _guard: self.lock.write(),
        };
        let out = f(&mut tx)?;
        apply(&self.db, tx.buffer)?;
        Ok(out)
    }

    fn repo_read_transact<T, F>(&self, repo_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Self::RepoRead<'_>) -> Result<T>,
    {
        let tx = RepoReadTx {
            db: &self.db,
            repo_id: repo_id.to_string(),
            _guard: self.lock.read(),
        };
        f(&tx)
    }

    fn repo_transact<T, F>(&self, repo_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::RepoWrite<'_>) -> Result<T>,
    {
        let mut tx = RepoWriteTx {
            db: &self.db,
            repo_id: repo_id.to_string(),
            buffer: WriteBuffer::default(),
            _guard: self.lock.write(),
        };
        let out = f(&mut tx)?;
        apply(&self.db, tx.buffer)?;
        Ok(out)
    }
}
