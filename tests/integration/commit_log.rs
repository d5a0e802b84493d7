//! Commit log paging over the parent DAG.

use std::collections::BTreeMap;

use super::test_utils::{create_repo, fixture, object};

fn commit_chain(f: &super::test_utils::Fixture, count: usize) -> Vec<String> {
    create_repo(f, "my-repo", 1.0);
    let mut addresses = Vec::new();
    for i in 0..count {
        f.index
            .write_object("my-repo", "main", "a.txt", &object(&format!("v{i}")))
            .unwrap();
        let commit = f
            .index
            .commit("my-repo", "main", &format!("commit {i}"), "tester", BTreeMap::new())
            .unwrap();
        addresses.push(commit.address);
    }
    addresses
}

#[test]
fn test_log_walks_back_to_initial_commit() {
    let f = fixture();
    let chain = commit_chain(&f, 3);

    let (log, has_more) = f
        .index
        .get_commit_log("my-repo", chain.last().unwrap(), 0, None)
        .unwrap();
    assert!(!has_more);
    // three commits plus the repository's initial commit
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].message, "commit 2");
    assert_eq!(log[1].message, "commit 1");
    assert_eq!(log[2].message, "commit 0");
    assert!(log[3].parents.is_empty());
}

#[test]
fn test_log_paginates_with_after_cursor() {
    let f = fixture();
    let chain = commit_chain(&f, 3);
    let head = chain.last().unwrap();

    let (first, has_more) = f.index.get_commit_log("my-repo", head, 2, None).unwrap();
    assert!(has_more);
    assert_eq!(first.len(), 2);

    let cursor = first.last().unwrap().address.clone();
    let (second, has_more) = f
        .index
        .get_commit_log("my-repo", head, 2, Some(&cursor))
        .unwrap();
    assert!(!has_more);
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].message, "commit 0");
}

#[test]
fn test_log_includes_both_merge_parents() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    f.index
        .write_object("my-repo", "main", "base.txt", &object("b"))
        .unwrap();
    let base = f
        .index
        .commit("my-repo", "main", "base", "tester", BTreeMap::new())
        .unwrap();

    f.index
        .create_branch("my-repo", "dev", &base.address)
        .unwrap();
    f.index
        .write_object("my-repo", "dev", "dev.txt", &object("d"))
        .unwrap();
    let dev_tip = f
        .index
        .commit("my-repo", "dev", "dev work", "tester", BTreeMap::new())
        .unwrap();

    f.index.merge("my-repo", "dev", "main", "tester").unwrap();
    let main = f.index.get_branch("my-repo", "main").unwrap();

    let (log, _) = f
        .index
        .get_commit_log("my-repo", &main.commit, 0, None)
        .unwrap();
    let messages: Vec<_> = log.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages[0], "Merge branch dev into main");
    assert!(messages.contains(&"base"));
    assert!(messages.contains(&"dev work"));

    let merge_commit = &log[0];
    assert_eq!(merge_commit.parents, vec![base.address, dev_tip.address]);
}

#[test]
fn test_log_rejects_invalid_commit_id() {
    let f = fixture();
    create_repo(&f, "my-repo", 1.0);
    assert!(f.index.get_commit_log("my-repo", "main", 0, None).is_err());
}
