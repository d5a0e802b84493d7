//! Delete semantics: tombstones shadow committed entries, workspace-only
//! writes are undone in place.

use std::collections::BTreeMap;

use super::test_utils::{create_repo, fixture, object};

#[test]
fn test_delete_hides_committed_object_from_branch_only() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);

    let obj = object("x");
    f.index
        .write_object("my-repo", "main", "a/b.txt", &obj)
        .unwrap();
    let c1 = f
        .index
        .commit("my-repo", "main", "msg", "tester", BTreeMap::new())
        .unwrap();

    f.index.delete_object("my-repo", "main", "a/b.txt").unwrap();

    // gone from the branch
    assert!(f
        .index
        .read_object("my-repo", "main", "a/b.txt")
        .unwrap_err()
        .is_not_found());
    // still present in the commit
    assert_eq!(
        f.index
            .read_object("my-repo", &c1.address, "a/b.txt")
            .unwrap(),
        obj
    );

    // committing the deletion keeps the branch view empty
    let c2 = f
        .index
        .commit("my-repo", "main", "delete", "tester", BTreeMap::new())
        .unwrap();
    assert_eq!(c2.parents, vec![c1.address.clone()]);
    assert!(f
        .index
        .read_object("my-repo", "main", "a/b.txt")
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        f.index
            .read_object("my-repo", &c1.address, "a/b.txt")
            .unwrap(),
        obj
    );
}

#[test]
fn test_delete_of_staged_write_undoes_it() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0); // keep the write in the workspace

    f.index
        .write_object("my-repo", "main", "a.txt", &object("x"))
        .unwrap();
    f.index.delete_object("my-repo", "main", "a.txt").unwrap();

    assert!(f
        .index
        .read_object("my-repo", "main", "a.txt")
        .unwrap_err()
        .is_not_found());

    // no tombstone remains: the workspace is simply empty again
    use basin::store::{RepoReadOps, Store};
    let staged = f
        .store
        .repo_read_transact("my-repo", |tx| tx.list_workspace("main"))
        .unwrap();
    assert!(staged.is_empty());
}

#[test]
fn test_delete_missing_object_fails() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    assert!(f
        .index
        .delete_object("my-repo", "main", "ghost.txt")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_double_delete_fails() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0); // keep the tombstone staged

    f.index
        .write_object("my-repo", "main", "a.txt", &object("x"))
        .unwrap();
    f.index
        .commit("my-repo", "main", "msg", "tester", BTreeMap::new())
        .unwrap();

    f.index.delete_object("my-repo", "main", "a.txt").unwrap();
    assert!(f
        .index
        .delete_object("my-repo", "main", "a.txt")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_delete_of_staged_overwrite_tombstones_committed_entry() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0);

    f.index
        .write_object("my-repo", "main", "a.txt", &object("v1"))
        .unwrap();
    f.index
        .commit("my-repo", "main", "msg", "tester", BTreeMap::new())
        .unwrap();

    // overwrite staged in the workspace on top of the committed entry
    f.index
        .write_object("my-repo", "main", "a.txt", &object("v2"))
        .unwrap();
    f.index.delete_object("my-repo", "main", "a.txt").unwrap();

    // both the staged write and the committed entry are hidden
    assert!(f
        .index
        .read_object("my-repo", "main", "a.txt")
        .unwrap_err()
        .is_not_found());
}
