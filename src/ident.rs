//! Content addressing using BLAKE3.
//!
//! Addresses are lowercase hex digests of a canonical, field-by-field
//! serialization: a type discriminator, then each field with a label and a
//! big-endian length prefix. Map metadata is hashed in key order. This form
//! is independent of the storage encoding and must stay stable across
//! versions for existing data to remain addressable.

use blake3::Hasher;

use crate::model::{Commit, Entry, Object};

/// Length of a hex-encoded address.
pub const ADDRESS_LENGTH: usize = 64;

/// Whether `s` is syntactically a content address: exactly
/// [`ADDRESS_LENGTH`] lowercase hex characters. Case-sensitive.
pub fn is_hash(s: &str) -> bool {
    s.len() == ADDRESS_LENGTH
        && s.bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn update_field(hasher: &mut Hasher, label: &[u8], value: &[u8]) {
    hasher.update(label);
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
}

fn update_metadata(
    hasher: &mut Hasher,
    metadata: &std::collections::BTreeMap<String, String>,
) {
    hasher.update(&(metadata.len() as u64).to_be_bytes());
    for (key, value) in metadata {
        update_field(hasher, b"key:", key.as_bytes());
        update_field(hasher, b"value:", value.as_bytes());
    }
}

fn update_entry(hasher: &mut Hasher, entry: &Entry) {
    update_field(hasher, b"name:", entry.name.as_bytes());
    update_field(hasher, b"address:", entry.address.as_bytes());
    update_field(hasher, b"kind:", entry.kind.tag().as_bytes());
    hasher.update(&entry.size.to_be_bytes());
    update_field(hasher, b"checksum:", entry.checksum.as_bytes());
    hasher.update(&entry.timestamp.to_be_bytes());
}

/// Address of a commit. The `address` field itself is excluded: it is this
/// hash.
pub fn hash_commit(commit: &Commit) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"commit");
    update_field(&mut hasher, b"tree:", commit.tree.as_bytes());
    hasher.update(&(commit.parents.len() as u64).to_be_bytes());
    for parent in &commit.parents {
        update_field(&mut hasher, b"parent:", parent.as_bytes());
    }
    update_field(&mut hasher, b"committer:", commit.committer.as_bytes());
    update_field(&mut hasher, b"message:", commit.message.as_bytes());
    hasher.update(&commit.timestamp.to_be_bytes());
    update_metadata(&mut hasher, &commit.metadata);
    hex::encode(hasher.finalize().as_bytes())
}

/// Address of a tree node. Entries must already be sorted by name; the
/// Merkle engine guarantees this for every node it writes.
pub fn hash_tree(entries: &[Entry]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"treenode");
    hasher.update(&(entries.len() as u64).to_be_bytes());
    for entry in entries {
        update_entry(&mut hasher, entry);
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Address of an object metadata record.
pub fn hash_object(object: &Object) -> String {
    let mut hasher = Hasher::new();
    hasher.update(b"object");
    update_field(
        &mut hasher,
        b"physical:",
        object.physical_address.as_bytes(),
    );
    hasher.update(&object.size.to_be_bytes());
    update_field(&mut hasher, b"checksum:", object.checksum.as_bytes());
    update_metadata(&mut hasher, &object.metadata);
    hex::encode(hasher.finalize().as_bytes())
}

/// The well-known address of the tree node with no entries.
pub fn empty_tree_address() -> String {
    hash_tree(&[])
}
