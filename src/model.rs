//! Data model: repositories, branches, commits, tree entries, objects and
//! workspace entries.
//!
//! Commits, tree nodes and objects are immutable once written and addressed
//! by the content hash of their canonical form (see [`crate::ident`]).
//! Branches are the only mutable records; they hold addresses, never the
//! values themselves, so identical subtrees are shared between branches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level namespace, one per logical dataset, bound to a blockstore
/// bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub repo_id: String,
    pub bucket: String,
    /// Creation timestamp, Unix seconds.
    pub creation_date: i64,
    pub default_branch: String,
    /// Probability in [0, 1] that a single write folds the workspace into
    /// the Merkle tree immediately.
    pub partial_commit_ratio: f32,
}

/// Named mutable pointer to a commit plus a pending workspace.
///
/// `workspace_root` equals `commit_root` exactly when the workspace has been
/// fully folded and no staged entries remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// Address of the commit this branch points at.
    pub commit: String,
    /// Root address of that commit's tree.
    pub commit_root: String,
    /// Root address of the tree including folded-but-uncommitted changes.
    pub workspace_root: String,
}

/// Immutable content-addressed snapshot: tree root, parents and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Content address of this commit; equals the canonical hash of the
    /// remaining fields and is excluded from that hash.
    pub address: String,
    /// Root address of the committed tree.
    pub tree: String,
    /// Parent commit addresses, ordered. Empty for the initial commit,
    /// two entries for a merge commit.
    pub parents: Vec<String>,
    pub committer: String,
    pub message: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub metadata: BTreeMap<String, String>,
}

/// Kind of a tree child entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Object,
    Tree,
}

impl EntryKind {
    /// Stable discriminator used in canonical hashing.
    pub fn tag(&self) -> &'static str {
        match self {
            EntryKind::Object => "object",
            EntryKind::Tree => "tree",
        }
    }
}

/// A child of a tree node: an object or a subtree, with its metadata.
///
/// Within a node, entries are unique by name and sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    /// Content address of the object record or subtree node.
    pub address: String,
    pub kind: EntryKind,
    pub size: u64,
    pub checksum: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// A resolved root tree node: its address plus its child entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    pub address: String,
    pub entries: Vec<Entry>,
}

/// Metadata record for a stored blob. The index never holds object bytes;
/// `physical_address` points into the blockstore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub physical_address: String,
    pub size: u64,
    pub checksum: String,
    pub metadata: BTreeMap<String, String>,
}

/// A staged, not-yet-folded change on a branch: an insert/update carrying an
/// entry, or a tombstone marking the path for deletion on the next partial
/// commit. Tombstone entries carry only name, kind and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub path: String,
    pub entry: Entry,
    pub tombstone: bool,
}

impl WorkspaceEntry {
    pub fn upsert(path: impl Into<String>, entry: Entry) -> Self {
        Self {
            path: path.into(),
            entry,
            tombstone: false,
        }
    }

    pub fn tombstone(path: impl Into<String>, entry: Entry) -> Self {
        Self {
            path: path.into(),
            entry,
            tombstone: true,
        }
    }
}
