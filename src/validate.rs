//! Input validation, enforced before any transaction is opened.
//!
//! The rules are conservative on purpose: any value accepted here is stored
//! verbatim (keys embed it unescaped) and must round-trip through every
//! operation. `:` is the store's key separator, which is why identifiers
//! exclude it.

use crate::error::{IndexError, Result};
use crate::ident;

const MAX_REPO_ID_LENGTH: usize = 63;
const MIN_REPO_ID_LENGTH: usize = 3;
const MAX_REF_LENGTH: usize = 256;
const MAX_PATH_LENGTH: usize = 1024;

/// Repository ids follow bucket-name rules: 3-63 chars, lowercase
/// alphanumeric plus `-`, starting with a letter or digit.
pub fn repo_id(id: &str) -> Result<()> {
    if id.len() < MIN_REPO_ID_LENGTH || id.len() > MAX_REPO_ID_LENGTH {
        return Err(IndexError::InvalidRepoId(id.to_string()));
    }
    let mut bytes = id.bytes();
    match bytes.next() {
        Some(b'a'..=b'z') | Some(b'0'..=b'9') => {}
        _ => return Err(IndexError::InvalidRepoId(id.to_string())),
    }
    if !bytes.all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-')) {
        return Err(IndexError::InvalidRepoId(id.to_string()));
    }
    Ok(())
}

fn valid_branch_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_REF_LENGTH {
        return false;
    }
    if !name
        .bytes()
        .all(|b| matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' | b'/'))
    {
        return false;
    }
    if name.starts_with('/') || name.ends_with('/') {
        return false;
    }
    name.split('/').all(|seg| !seg.is_empty() && seg != "..")
}

/// References are either a branch name or a commit address; hashes are
/// recognized by syntax alone.
pub fn reference(r: &str) -> Result<()> {
    if ident::is_hash(r) || valid_branch_name(r) {
        Ok(())
    } else {
        Err(IndexError::InvalidRef(r.to_string()))
    }
}

/// Paths are non-empty UTF-8 keys: no NUL, no leading separator, no empty
/// segment.
pub fn path(p: &str) -> Result<()> {
    if p.is_empty()
        || p.len() > MAX_PATH_LENGTH
        || p.contains('\0')
        || p.starts_with('/')
        || p.contains("//")
    {
        return Err(IndexError::InvalidPath(p.to_string()));
    }
    Ok(())
}

/// Listing prefixes may additionally be empty (the repository root).
pub fn prefix(p: &str) -> Result<()> {
    if p.is_empty() {
        Ok(())
    } else {
        path(p)
    }
}

pub fn commit_id(id: &str) -> Result<()> {
    if ident::is_hash(id) {
        Ok(())
    } else {
        Err(IndexError::InvalidCommitId(id.to_string()))
    }
}

/// Validates `after`-style cursors that are absent on the first page.
pub fn commit_id_opt(id: Option<&str>) -> Result<()> {
    match id {
        Some(id) => commit_id(id),
        None => Ok(()),
    }
}

pub fn commit_message(message: &str) -> Result<()> {
    if message.is_empty() {
        Err(IndexError::EmptyCommitMessage)
    } else {
        Ok(())
    }
}
