//! The basic write → commit → read flow, through branches and commit
//! addresses.

use std::collections::BTreeMap;

use basin::ident;
use basin::model::EntryKind;

use super::test_utils::{create_repo, entry_for, fixture, object};

#[test]
fn test_create_write_commit_read() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);

    let obj = object("x");
    f.index
        .write_object("my-repo", "main", "a/b.txt", &obj)
        .unwrap();
    let commit = f
        .index
        .commit("my-repo", "main", "msg", "tester", BTreeMap::new())
        .unwrap();
    assert!(ident::is_hash(&commit.address));
    assert_eq!(commit.committer, "tester");
    assert_eq!(commit.message, "msg");

    // readable through the branch
    let read = f.index.read_object("my-repo", "main", "a/b.txt").unwrap();
    assert_eq!(read, obj);

    // and through the commit address
    let read = f
        .index
        .read_object("my-repo", &commit.address, "a/b.txt")
        .unwrap();
    assert_eq!(read, obj);
}

#[test]
fn test_read_from_staged_workspace() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0); // keep writes staged

    let obj = object("x");
    f.index
        .write_object("my-repo", "main", "a/b.txt", &obj)
        .unwrap();

    // workspace is consulted before the tree
    let read = f.index.read_object("my-repo", "main", "a/b.txt").unwrap();
    assert_eq!(read, obj);

    let branch = f.index.get_branch("my-repo", "main").unwrap();
    assert_eq!(branch.workspace_root, branch.commit_root); // nothing folded yet
}

#[test]
fn test_read_entry_object_and_tree() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    f.index
        .write_object("my-repo", "main", "a/b.txt", &object("x"))
        .unwrap();

    let entry = f
        .index
        .read_entry_object("my-repo", "main", "a/b.txt")
        .unwrap();
    assert_eq!(entry.name, "b.txt");
    assert_eq!(entry.kind, EntryKind::Object);
    assert_eq!(entry.size, 3);

    let dir = f.index.read_entry_tree("my-repo", "main", "a").unwrap();
    assert_eq!(dir.name, "a");
    assert_eq!(dir.kind, EntryKind::Tree);

    // kind mismatch is a missing path
    assert!(f
        .index
        .read_entry_object("my-repo", "main", "a")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_read_root_object_tracks_workspace_root() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    f.index
        .write_object("my-repo", "main", "a.txt", &object("x"))
        .unwrap();

    let branch = f.index.get_branch("my-repo", "main").unwrap();
    let root = f.index.read_root_object("my-repo", "main").unwrap();
    assert_eq!(root.address, branch.workspace_root);
    assert_eq!(root.entries.len(), 1);
    assert_eq!(root.entries[0].name, "a.txt");
}

#[test]
fn test_write_entry_and_write_file() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);

    // write_file: object persisted plus caller-supplied entry
    let obj = object("uploaded");
    f.index
        .write_file(
            "my-repo",
            "main",
            "up.bin",
            entry_for("up.bin", &obj),
            &obj,
        )
        .unwrap();
    assert_eq!(f.index.read_object("my-repo", "main", "up.bin").unwrap(), obj);

    // write_entry: stages an entry for an already-persisted object
    f.index
        .write_entry("my-repo", "main", "alias.bin", entry_for("alias.bin", &obj))
        .unwrap();
    assert_eq!(
        f.index.read_object("my-repo", "main", "alias.bin").unwrap(),
        obj
    );
}

#[test]
fn test_identical_content_deduplicates_commits_across_repos() {
    let f = fixture();
    create_repo(&f, "repo-one", 1.0);
    create_repo(&f, "repo-two", 1.0);

    for repo in ["repo-one", "repo-two"] {
        f.index
            .write_object(repo, "main", "a.txt", &object("same"))
            .unwrap();
    }
    let one = f
        .index
        .commit("repo-one", "main", "msg", "tester", BTreeMap::new())
        .unwrap();
    let two = f
        .index
        .commit("repo-two", "main", "msg", "tester", BTreeMap::new())
        .unwrap();

    // same content, same parents, same clock: same address
    assert_eq!(one.address, two.address);
}
