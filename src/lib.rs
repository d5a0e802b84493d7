//! Basin: a versioned object index.
//!
//! Git-like semantics (branches, commits, diffs, merges) over a
//! transactional key-value store. Each branch carries a content-addressed
//! Merkle tree plus a staging workspace for uncommitted writes; diffs and
//! merges compare trees three-way against the lowest common ancestor
//! commit. The index stores metadata and content addresses only; object
//! bytes live in an external blockstore.

pub mod config;
pub mod dag;
pub mod error;
pub mod ident;
pub mod index;
pub mod logging;
pub mod merkle;
pub mod model;
pub mod path;
pub mod store;
pub mod validate;
