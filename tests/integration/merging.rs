//! Merge flows: fast merges, conflicts, uncommitted destinations.

use std::collections::BTreeMap;

use basin::error::IndexError;
use basin::merkle::diff::{DiffDirection, DiffKind};

use super::test_utils::{create_repo, fixture, object};

/// Repo with `a/b.txt` committed on main and a `dev` branch at that commit.
/// Returns the base commit address.
fn diverge_setup(f: &super::test_utils::Fixture) -> String {
    create_repo(f, "my-repo", 1.0);
    f.index
        .write_object("my-repo", "main", "a/b.txt", &object("v1"))
        .unwrap();
    let c1 = f
        .index
        .commit("my-repo", "main", "base", "tester", BTreeMap::new())
        .unwrap();
    f.index.create_branch("my-repo", "dev", &c1.address).unwrap();
    c1.address
}

#[test]
fn test_fast_merge_advances_destination() {
    let f = fixture();
    let c1 = diverge_setup(&f);

    f.index
        .write_object("my-repo", "dev", "a/b.txt", &object("v2"))
        .unwrap();
    let c2 = f
        .index
        .commit("my-repo", "dev", "change", "tester", BTreeMap::new())
        .unwrap();

    let operations = f.index.merge("my-repo", "dev", "main", "tester").unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].path, "a/b.txt");
    assert_eq!(operations[0].direction, DiffDirection::Left);

    let main = f.index.get_branch("my-repo", "main").unwrap();
    let merge_commit = f.index.get_commit("my-repo", &main.commit).unwrap();
    assert_eq!(merge_commit.parents, vec![c1, c2.address]);
    assert_eq!(merge_commit.message, "Merge branch dev into main");

    // destination now sees the source content
    assert_eq!(
        f.index.read_object("my-repo", "main", "a/b.txt").unwrap(),
        object("v2")
    );
    // and is fully committed
    assert_eq!(main.commit_root, main.workspace_root);
}

#[test]
fn test_merge_carries_removals() {
    let f = fixture();
    diverge_setup(&f);

    f.index.delete_object("my-repo", "dev", "a/b.txt").unwrap();
    f.index
        .write_object("my-repo", "dev", "kept.txt", &object("k"))
        .unwrap();
    f.index
        .commit("my-repo", "dev", "rework", "tester", BTreeMap::new())
        .unwrap();

    let operations = f.index.merge("my-repo", "dev", "main", "tester").unwrap();
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].path, "a/b.txt");
    assert_eq!(operations[0].kind, DiffKind::Removed);
    assert_eq!(operations[1].path, "kept.txt");
    assert_eq!(operations[1].kind, DiffKind::Added);

    assert!(f
        .index
        .read_object("my-repo", "main", "a/b.txt")
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        f.index.read_object("my-repo", "main", "kept.txt").unwrap(),
        object("k")
    );
}

#[test]
fn test_merge_conflict_reports_divergent_paths() {
    let f = fixture();
    diverge_setup(&f);

    f.index
        .write_object("my-repo", "main", "a/b.txt", &object("main-side"))
        .unwrap();
    f.index
        .commit("my-repo", "main", "main change", "tester", BTreeMap::new())
        .unwrap();

    f.index
        .write_object("my-repo", "dev", "a/b.txt", &object("dev-side"))
        .unwrap();
    f.index
        .commit("my-repo", "dev", "dev change", "tester", BTreeMap::new())
        .unwrap();

    let err = f
        .index
        .merge("my-repo", "dev", "main", "tester")
        .unwrap_err();
    match err {
        IndexError::MergeConflict(differences) => {
            assert_eq!(differences.len(), 1);
            assert_eq!(differences[0].path, "a/b.txt");
            assert_eq!(differences[0].direction, DiffDirection::Conflict);
        }
        other => panic!("expected merge conflict, got {other:?}"),
    }

    // the failed merge left the destination untouched
    assert_eq!(
        f.index.read_object("my-repo", "main", "a/b.txt").unwrap(),
        object("main-side")
    );
}

#[test]
fn test_merge_into_uncommitted_destination_fails() {
    let f = fixture();
    diverge_setup(&f);

    f.index
        .write_object("my-repo", "dev", "other.txt", &object("d"))
        .unwrap();
    f.index
        .commit("my-repo", "dev", "change", "tester", BTreeMap::new())
        .unwrap();

    // stage work on the destination without committing
    f.index
        .write_object("my-repo", "main", "pending.txt", &object("p"))
        .unwrap();

    let err = f
        .index
        .merge("my-repo", "dev", "main", "tester")
        .unwrap_err();
    assert!(matches!(err, IndexError::DestinationNotCommitted));
}

#[test]
fn test_merge_identical_changes_is_clean() {
    let f = fixture();
    diverge_setup(&f);

    // both sides converge on the same content
    for branch in ["main", "dev"] {
        f.index
            .write_object("my-repo", branch, "a/b.txt", &object("same"))
            .unwrap();
        f.index
            .commit("my-repo", branch, "same change", "tester", BTreeMap::new())
            .unwrap();
    }

    let operations = f.index.merge("my-repo", "dev", "main", "tester").unwrap();
    assert!(operations.is_empty());
}
