//! Three-way structural diff over tree roots.
//!
//! Differences are computed against a common base (the merge base for
//! cross-branch diffs). Directory-level divergence recurses; results are
//! emitted at object granularity. A path changed on both sides in different
//! ways is a conflict; otherwise the direction names the side that moved
//! away from the base.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::merkle::Merkle;
use crate::model::{Entry, EntryKind};
use crate::path;
use crate::store::RepoReadOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffDirection {
    Left,
    Right,
    Conflict,
}

/// One divergent path in a three-way comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    pub path: String,
    pub path_type: EntryKind,
    pub direction: DiffDirection,
    pub kind: DiffKind,
}

pub type Differences = Vec<Difference>;

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiffKind::Added => "added",
            DiffKind::Changed => "changed",
            DiffKind::Removed => "removed",
        };
        let direction = match self.direction {
            DiffDirection::Left => "left",
            DiffDirection::Right => "right",
            DiffDirection::Conflict => "conflict",
        };
        write!(f, "{} {} {}", kind, direction, self.path)
    }
}

fn same(a: Option<&Entry>, b: Option<&Entry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.address == b.address && a.kind == b.kind,
        _ => false,
    }
}

fn is_tree_or_absent(entry: Option<&Entry>) -> bool {
    entry.map_or(true, |e| e.kind == EntryKind::Tree)
}

fn read_node<T: RepoReadOps>(tx: &T, address: Option<&str>) -> Result<Vec<Entry>> {
    match address {
        Some(address) => tx.read_tree(address),
        None => Ok(Vec::new()),
    }
}

#[derive(Default)]
struct Sides {
    left: Option<Entry>,
    right: Option<Entry>,
    base: Option<Entry>,
}

fn diff_nodes<T: RepoReadOps>(
    tx: &T,
    left: Option<&str>,
    right: Option<&str>,
    base: Option<&str>,
    dir: &str,
    out: &mut Differences,
) -> Result<()> {
    let mut names: BTreeMap<String, Sides> = BTreeMap::new();
    for entry in read_node(tx, left)? {
        let name = entry.name.clone();
        names.entry(name).or_default().left = Some(entry);
    }
    for entry in read_node(tx, right)? {
        let name = entry.name.clone();
        names.entry(name).or_default().right = Some(entry);
    }
    for entry in read_node(tx, base)? {
        let name = entry.name.clone();
        names.entry(name).or_default().base = Some(entry);
    }

    for (name, sides) in names {
        let (l, r, b) = (
            sides.left.as_ref(),
            sides.right.as_ref(),
            sides.base.as_ref(),
        );
        // both sides identical: nothing diverged here, whatever the base says
        if same(l, r) {
            continue;
        }
        let full = path::join(dir, &name);

        if is_tree_or_absent(l) && is_tree_or_absent(r) && is_tree_or_absent(b) {
            diff_nodes(
                tx,
                l.map(|e| e.address.as_str()),
                r.map(|e| e.address.as_str()),
                b.map(|e| e.address.as_str()),
                &full,
                out,
            )?;
            continue;
        }

        let left_changed = !same(l, b);
        let right_changed = !same(r, b);
        let direction = if left_changed && right_changed {
            DiffDirection::Conflict
        } else if right_changed {
            DiffDirection::Right
        } else {
            DiffDirection::Left
        };
        let changed = match direction {
            DiffDirection::Right => r,
            _ => l,
        };
        let kind = match (changed, b) {
            (Some(_), Some(_)) => DiffKind::Changed,
            (Some(_), None) => DiffKind::Added,
            (None, Some(_)) => DiffKind::Removed,
            (None, None) => continue,
        };
        let path_type = changed.or(b).map(|e| e.kind).unwrap_or(EntryKind::Object);
        out.push(Difference {
            path: full,
            path_type,
            direction,
            kind,
        });
    }
    Ok(())
}

/// Three-way diff of `left` and `right` against `base`.
pub fn diff<T: RepoReadOps>(
    tx: &T,
    left: &Merkle,
    right: &Merkle,
    base: &Merkle,
) -> Result<Differences> {
    let mut out = Differences::new();
    diff_nodes(
        tx,
        Some(left.root()),
        Some(right.root()),
        Some(base.root()),
        "",
        &mut out,
    )?;
    Ok(out)
}
