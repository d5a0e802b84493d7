//! Immutable content-addressed Merkle tree.
//!
//! A tree is represented by its root address; nodes are lists of child
//! entries sorted by name, stored by content address. Updates never mutate
//! existing nodes: affected directories are rewritten bottom-up and a new
//! root address is returned, so identical subtrees are shared between any
//! number of roots for free.

pub mod diff;

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::error::{IndexError, NotFoundError, Result};
use crate::ident;
use crate::model::{Entry, EntryKind, Object, WorkspaceEntry};
use crate::path::{self, Path};
use crate::store::{RepoOps, RepoReadOps};

/// Handle to one immutable tree, identified by its root address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merkle {
    root: String,
}

impl Merkle {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Child entries of the directory at `dir`, read from this root.
    /// Fails with a path not-found when any segment is missing.
    fn read_dir<T: RepoReadOps>(&self, tx: &T, dir: &Path) -> Result<Vec<Entry>> {
        let mut entries = tx.read_tree(&self.root)?;
        for segment in dir.split() {
            let entry = entries
                .iter()
                .find(|e| e.name == segment && e.kind == EntryKind::Tree)
                .ok_or_else(|| NotFoundError::Path(dir.as_str().to_string()))?;
            entries = tx.read_tree(&entry.address)?;
        }
        Ok(entries)
    }

    /// Look up the entry at `path` with the expected kind. The root path
    /// resolves to a synthetic tree entry for the root node itself.
    pub fn get_entry<T: RepoReadOps>(&self, tx: &T, path: &str, kind: EntryKind) -> Result<Entry> {
        let p = Path::new(path);
        if p.is_root() {
            if kind == EntryKind::Tree {
                return Ok(Entry {
                    name: String::new(),
                    address: self.root.clone(),
                    kind: EntryKind::Tree,
                    size: 0,
                    checksum: self.root.clone(),
                    timestamp: 0,
                });
            }
            return Err(NotFoundError::Path(path.to_string()).into());
        }
        let entries = self.read_dir(tx, &p.parent()).map_err(|e| {
            if e.is_not_found() {
                NotFoundError::Path(path.to_string()).into()
            } else {
                e
            }
        })?;
        entries
            .into_iter()
            .find(|e| e.name == p.basename() && e.kind == kind)
            .ok_or_else(|| NotFoundError::Path(path.to_string()).into())
    }

    /// Resolve the object entry at `path` and read its object record.
    pub fn get_object<T: RepoReadOps>(&self, tx: &T, path: &str) -> Result<Object> {
        let entry = self.get_entry(tx, path, EntryKind::Object)?;
        tx.read_object(&entry.address)
    }

    /// Apply a batch of workspace entries and return the new tree.
    ///
    /// Entries are grouped by containing directory and directories are
    /// rewritten deepest-first; each rewritten directory propagates a
    /// replacement entry into its parent. Tombstones remove entries, and a
    /// directory left empty is removed from its parent. The root node is
    /// always rewritten, so an unchanged batch still yields a valid (and
    /// identical) address.
    pub fn update<T: RepoOps>(&self, tx: &mut T, entries: &[WorkspaceEntry]) -> Result<Merkle> {
        type DirChanges = BTreeMap<String, Option<Entry>>;
        let mut pending: BTreeMap<usize, BTreeMap<String, DirChanges>> = BTreeMap::new();

        for ws in entries {
            let p = Path::new(&ws.path);
            let dir = p.parent();
            let name = p.basename().to_string();
            let change = if ws.tombstone {
                None
            } else {
                let mut entry = ws.entry.clone();
                entry.name = name.clone();
                Some(entry)
            };
            pending
                .entry(dir.depth())
                .or_default()
                .entry(dir.as_str().to_string())
                .or_default()
                .insert(name, change);
        }
        if pending.is_empty() {
            return Ok(self.clone());
        }
        // Directories above the deepest change are rewritten too, down to
        // the root, even when only a child's address changed.
        pending.entry(0).or_default().entry(String::new()).or_default();

        let mut new_root = self.root.clone();
        while let Some((depth, dirs)) = pending.pop_last() {
            for (dir, changes) in dirs {
                let dir_path = Path::new(&dir);
                let current = match self.read_dir(tx, &dir_path) {
                    Ok(entries) => entries,
                    Err(IndexError::NotFound(NotFoundError::Path(_))) => Vec::new(),
                    Err(e) => return Err(e),
                };
                let mut merged: BTreeMap<String, Entry> = current
                    .into_iter()
                    .map(|e| (e.name.clone(), e))
                    .collect();
                for (name, change) in changes {
                    match change {
                        Some(entry) => {
                            merged.insert(name, entry);
                        }
                        None => {
                            merged.remove(&name);
                        }
                    }
                }
                let node: Vec<Entry> = merged.into_values().collect();

                if depth == 0 {
                    let address = ident::hash_tree(&node);
                    tx.write_tree(&address, &node)?;
                    new_root = address;
                    continue;
                }

                let slot = pending
                    .entry(depth - 1)
                    .or_default()
                    .entry(dir_path.parent().as_str().to_string())
                    .or_default();
                let name = dir_path.basename().to_string();
                if node.is_empty() {
                    slot.insert(name, None);
                } else {
                    let address = ident::hash_tree(&node);
                    tx.write_tree(&address, &node)?;
                    let size = node.iter().map(|e| e.size).sum();
                    let timestamp = node.iter().map(|e| e.timestamp).max().unwrap_or(0);
                    slot.insert(
                        name.clone(),
                        Some(Entry {
                            name,
                            checksum: address.clone(),
                            address,
                            kind: EntryKind::Tree,
                            size,
                            timestamp,
                        }),
                    );
                }
            }
        }
        debug!(old_root = %self.root, new_root = %new_root, entries = entries.len(), "tree updated");
        Ok(Merkle::new(new_root))
    }

    /// Paginated listing under `prefix`.
    ///
    /// A prefix naming a directory scans that directory; otherwise the final
    /// segment filters names inside the parent directory. Results carry
    /// their full repository path in `name` and start strictly after `from`.
    /// With `descend` the whole subtree is listed depth-first (objects
    /// only); without it only direct children are returned. `amount` 0 means
    /// unlimited.
    pub fn prefix_scan<T: RepoReadOps>(
        &self,
        tx: &T,
        prefix: &str,
        from: Option<&str>,
        amount: usize,
        descend: bool,
    ) -> Result<(Vec<Entry>, bool)> {
        let prefix_path = Path::new(prefix);
        let (dir, filter) = if prefix_path.is_root() {
            (Path::root(), String::new())
        } else {
            match self.get_entry(tx, prefix_path.as_str(), EntryKind::Tree) {
                Ok(_) => (prefix_path.clone(), String::new()),
                Err(e) if e.is_not_found() => (
                    prefix_path.parent(),
                    prefix_path.basename().to_string(),
                ),
                Err(e) => return Err(e),
            }
        };
        let entries = match self.read_dir(tx, &dir) {
            Ok(entries) => entries,
            Err(IndexError::NotFound(NotFoundError::Path(_))) => return Ok((Vec::new(), false)),
            Err(e) => return Err(e),
        };

        let limit = if amount == 0 { usize::MAX } else { amount };
        let mut scan = Scan {
            from,
            limit,
            results: Vec::new(),
            has_more: false,
        };
        if descend {
            self.scan_subtree(tx, &entries, dir.as_str(), &filter, &mut scan)?;
        } else {
            for entry in entries {
                if !entry.name.starts_with(filter.as_str()) {
                    continue;
                }
                let full = path::join(dir.as_str(), &entry.name);
                if scan.skip(&full) {
                    continue;
                }
                if scan.full() {
                    break;
                }
                scan.results.push(Entry { name: full, ..entry });
            }
        }
        Ok((scan.results, scan.has_more))
    }

    fn scan_subtree<T: RepoReadOps>(
        &self,
        tx: &T,
        entries: &[Entry],
        dir: &str,
        filter: &str,
        scan: &mut Scan<'_>,
    ) -> Result<()> {
        for entry in entries {
            if scan.has_more {
                return Ok(());
            }
            if !filter.is_empty() && !entry.name.starts_with(filter) {
                continue;
            }
            let full = path::join(dir, &entry.name);
            match entry.kind {
                EntryKind::Tree => {
                    // A subtree entirely before the cursor cannot contribute.
                    if let Some(from) = scan.from {
                        let subtree = format!("{}{}", full, path::SEPARATOR);
                        if !from.starts_with(&subtree) && from > subtree.as_str() {
                            continue;
                        }
                    }
                    let children = tx.read_tree(&entry.address)?;
                    self.scan_subtree(tx, &children, &full, "", scan)?;
                }
                EntryKind::Object => {
                    if scan.skip(&full) {
                        continue;
                    }
                    if scan.full() {
                        return Ok(());
                    }
                    scan.results.push(Entry {
                        name: full,
                        ..entry.clone()
                    });
                }
            }
        }
        Ok(())
    }

    /// Visit every node reachable from the root, logging each entry. Used
    /// for diagnostic listings.
    pub fn walk_all<T: RepoReadOps>(&self, tx: &T) -> Result<()> {
        let mut queue = VecDeque::from([(String::new(), self.root.clone())]);
        let mut nodes = 0usize;
        while let Some((dir, address)) = queue.pop_front() {
            let entries = tx.read_tree(&address)?;
            nodes += 1;
            for entry in entries {
                let full = path::join(&dir, &entry.name);
                debug!(path = %full, address = %entry.address, kind = entry.kind.tag(), "tree entry");
                if entry.kind == EntryKind::Tree {
                    queue.push_back((full, entry.address));
                }
            }
        }
        debug!(nodes, root = %self.root, "tree walk complete");
        Ok(())
    }
}

struct Scan<'a> {
    from: Option<&'a str>,
    limit: usize,
    results: Vec<Entry>,
    has_more: bool,
}

impl Scan<'_> {
    fn skip(&self, full_path: &str) -> bool {
        self.from.map_or(false, |from| full_path <= from)
    }

    fn full(&mut self) -> bool {
        if self.results.len() == self.limit {
            self.has_more = true;
        }
        self.has_more
    }
}
