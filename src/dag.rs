//! Commit DAG traversal: breadth-first log paging and lowest common
//! ancestor discovery.

use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::model::Commit;
use crate::store::RepoReadOps;

/// Breadth-first scan of the parent graph starting at `from`.
///
/// Siblings are visited in parent order. When `after` is given, commits are
/// skipped through and including that address before `amount` results are
/// collected. `amount` 0 means unlimited. `has_more` reports a truncated
/// page.
pub fn bfs_scan<T: RepoReadOps>(
    tx: &T,
    from: &str,
    amount: usize,
    after: Option<&str>,
) -> Result<(Vec<Commit>, bool)> {
    let mut queue = VecDeque::from([from.to_string()]);
    let mut discovered: HashSet<String> = HashSet::from([from.to_string()]);
    let mut results = Vec::new();
    let mut skipping = after.is_some();
    let mut has_more = false;

    while let Some(address) = queue.pop_front() {
        let commit = tx.read_commit(&address)?;
        for parent in &commit.parents {
            if discovered.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
        if skipping {
            if after == Some(address.as_str()) {
                skipping = false;
            }
            continue;
        }
        if amount > 0 && results.len() == amount {
            has_more = true;
            break;
        }
        results.push(commit);
    }
    Ok((results, has_more))
}

/// Two-frontier BFS over the parent graphs of `a` and `b`; the first commit
/// discovered from both sides is the merge base. Returns `None` when the
/// histories are disjoint.
pub fn find_lowest_common_ancestor<T: RepoReadOps>(
    tx: &T,
    a: &str,
    b: &str,
) -> Result<Option<Commit>> {
    let mut queue_a = VecDeque::from([a.to_string()]);
    let mut queue_b = VecDeque::from([b.to_string()]);
    let mut seen_a: HashSet<String> = HashSet::from([a.to_string()]);
    let mut seen_b: HashSet<String> = HashSet::from([b.to_string()]);

    while !queue_a.is_empty() || !queue_b.is_empty() {
        if let Some(address) = queue_a.pop_front() {
            if seen_b.contains(&address) {
                return Ok(Some(tx.read_commit(&address)?));
            }
            let commit = tx.read_commit(&address)?;
            for parent in &commit.parents {
                if seen_a.insert(parent.clone()) {
                    queue_a.push_back(parent.clone());
                }
            }
        }
        if let Some(address) = queue_b.pop_front() {
            if seen_a.contains(&address) {
                return Ok(Some(tx.read_commit(&address)?));
            }
            let commit = tx.read_commit(&address)?;
            for parent in &commit.parents {
                if seen_b.insert(parent.clone()) {
                    queue_b.push_back(parent.clone());
                }
            }
        }
    }
    Ok(None)
}
