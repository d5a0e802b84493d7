//! Branch lifecycle and cross-branch diffs.

use std::collections::BTreeMap;

use basin::error::IndexError;
use basin::merkle::diff::{DiffDirection, DiffKind};

use super::test_utils::{create_repo, fixture, object};

#[test]
fn test_create_branch_from_commit_and_diverge() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    f.index
        .write_object("my-repo", "main", "a/b.txt", &object("v1"))
        .unwrap();
    let c1 = f
        .index
        .commit("my-repo", "main", "base", "tester", BTreeMap::new())
        .unwrap();

    let dev = f.index.create_branch("my-repo", "dev", &c1.address).unwrap();
    assert_eq!(dev.commit, c1.address);
    assert_eq!(dev.commit_root, c1.tree);
    assert_eq!(dev.workspace_root, c1.tree);

    f.index
        .write_object("my-repo", "dev", "a/b.txt", &object("v2"))
        .unwrap();
    f.index
        .commit("my-repo", "dev", "change", "tester", BTreeMap::new())
        .unwrap();

    let differences = f.index.diff("my-repo", "main", "dev").unwrap();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].path, "a/b.txt");
    assert_eq!(differences[0].kind, DiffKind::Changed);
    assert_eq!(differences[0].direction, DiffDirection::Right);
}

#[test]
fn test_create_branch_from_branch_name() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    let main = f.index.get_branch("my-repo", "main").unwrap();
    let dev = f.index.create_branch("my-repo", "dev", "main").unwrap();
    assert_eq!(dev.commit, main.commit);
}

#[test]
fn test_create_existing_branch_fails() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    let err = f
        .index
        .create_branch("my-repo", "main", "main")
        .unwrap_err();
    assert!(matches!(err, IndexError::BranchAlreadyExists(_)));
}

#[test]
fn test_create_branch_from_unknown_ref_fails() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    assert!(f
        .index
        .create_branch("my-repo", "dev", "no-such-branch")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_list_branches_by_prefix() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    for name in ["dev", "release/one", "release/two"] {
        f.index.create_branch("my-repo", name, "main").unwrap();
    }

    let (all, _) = f
        .index
        .list_branches_by_prefix("my-repo", "", 0, None)
        .unwrap();
    assert_eq!(all.len(), 4);

    let (releases, has_more) = f
        .index
        .list_branches_by_prefix("my-repo", "release/", 1, None)
        .unwrap();
    assert_eq!(releases[0].name, "release/one");
    assert!(has_more);

    let (rest, has_more) = f
        .index
        .list_branches_by_prefix("my-repo", "release/", 1, Some("release/one"))
        .unwrap();
    assert_eq!(rest[0].name, "release/two");
    assert!(!has_more);
}

#[test]
fn test_reset_branch_is_left_inverse_of_writes() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0);
    f.index
        .write_object("my-repo", "main", "committed.txt", &object("keep"))
        .unwrap();
    f.index
        .commit("my-repo", "main", "base", "tester", BTreeMap::new())
        .unwrap();

    // a staged write and a folded write, then reset
    f.index
        .write_object("my-repo", "main", "staged.txt", &object("drop"))
        .unwrap();
    f.index.diff_workspace("my-repo", "main").unwrap(); // folds staged.txt
    f.index
        .write_object("my-repo", "main", "staged2.txt", &object("drop"))
        .unwrap();

    f.index.reset_branch("my-repo", "main").unwrap();

    let branch = f.index.get_branch("my-repo", "main").unwrap();
    assert_eq!(branch.workspace_root, branch.commit_root);

    use basin::store::{RepoReadOps, Store};
    let staged = f
        .store
        .repo_read_transact("my-repo", |tx| tx.list_workspace("main"))
        .unwrap();
    assert!(staged.is_empty());

    assert!(f
        .index
        .read_object("my-repo", "main", "staged.txt")
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        f.index
            .read_object("my-repo", "main", "committed.txt")
            .unwrap(),
        object("keep")
    );
}

#[test]
fn test_delete_branch_clears_workspace() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0);
    f.index.create_branch("my-repo", "dev", "main").unwrap();
    f.index
        .write_object("my-repo", "dev", "a.txt", &object("x"))
        .unwrap();

    f.index.delete_branch("my-repo", "dev").unwrap();
    assert!(f
        .index
        .get_branch("my-repo", "dev")
        .unwrap_err()
        .is_not_found());

    use basin::store::{RepoReadOps, Store};
    let staged = f
        .store
        .repo_read_transact("my-repo", |tx| tx.list_workspace("dev"))
        .unwrap();
    assert!(staged.is_empty());
}

#[test]
fn test_diff_sees_uncommitted_left_side() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    f.index.create_branch("my-repo", "dev", "main").unwrap();

    // staged-and-folded but uncommitted write on main
    f.index
        .write_object("my-repo", "main", "wip.txt", &object("x"))
        .unwrap();

    let differences = f.index.diff("my-repo", "main", "dev").unwrap();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].path, "wip.txt");
    assert_eq!(differences[0].direction, DiffDirection::Left);
    assert_eq!(differences[0].kind, DiffKind::Added);
}

#[test]
fn test_diff_workspace_shows_pending_changes() {
    let f = fixture();
    create_repo(&f, "my-repo", 0.0);
    f.index
        .write_object("my-repo", "main", "new.txt", &object("x"))
        .unwrap();

    let differences = f.index.diff_workspace("my-repo", "main").unwrap();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].path, "new.txt");
    assert_eq!(differences[0].kind, DiffKind::Added);
    assert_eq!(differences[0].direction, DiffDirection::Left);

    // folding happened inside the diff; a second diff is unchanged
    let again = f.index.diff_workspace("my-repo", "main").unwrap();
    assert_eq!(differences, again);
}
