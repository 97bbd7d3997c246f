//! Transitive closure over implication / inheritance edges.
//!
//! Closure runs to a fixpoint: every pass merges the current closed value of each edge's target
//! into its source, until a whole pass changes nothing. Two variants share that loop: the role
//! set variant (what a role implies) and the privilege map variant (everything a node is
//! entitled to).
//!
//! A monotone fixpoint converges even on a cyclic graph, so cycles are found up front with a
//! depth-first walk. The pass count is still bounded by the node count; exceeding it means the
//! merge operator is broken.

use crate::privilege::{PrivilegeMap, PrivilegeValue};
use std::collections::{BTreeMap, BTreeSet};

/// Node -> [Node]. Self-loops are allowed and ignored.
pub type Edges<K> = BTreeMap<K, BTreeSet<K>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureError<K> {
    /// The nodes of a cycle, first node repeated at the end.
    Cycle(Vec<K>),
    /// No fixpoint after this many passes.
    NoConvergence(usize),
}

/// Depth-first search for a cycle, ignoring self-loops.
pub fn find_cycle<K: Ord + Copy>(edges: &Edges<K>) -> Option<Vec<K>> {
    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    for &node in edges.keys() {
        if !marks.contains_key(&node) {
            if let Some(cycle) = visit(node, edges, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

fn visit<K: Ord + Copy>(
    node: K,
    edges: &Edges<K>,
    marks: &mut BTreeMap<K, Mark>,
    stack: &mut Vec<K>,
) -> Option<Vec<K>> {
    marks.insert(node, Mark::OnStack);
    stack.push(node);

    for &next in edges.get(&node).into_iter().flatten() {
        if next == node {
            continue;
        }
        match marks.get(&next) {
            Some(Mark::OnStack) => {
                let start = stack.iter().position(|n| *n == next).unwrap_or_default();
                let mut cycle = stack[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(next, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

/// Would adding `from -> to` close a cycle? Returns the cycle it would close.
pub fn cycle_through<K: Ord + Copy>(edges: &Edges<K>, from: K, to: K) -> Option<Vec<K>> {
    if from == to {
        return None;
    }
    // a path to -> .. -> from plus the new edge
    let mut parents = BTreeMap::new();
    let mut queue = std::collections::VecDeque::from([to]);
    while let Some(node) = queue.pop_front() {
        if node == from {
            let mut path = vec![from];
            let mut cursor = from;
            while let Some(&parent) = parents.get(&cursor) {
                path.push(parent);
                cursor = parent;
            }
            path.reverse();
            let mut cycle = vec![from];
            cycle.extend(path);
            return Some(cycle);
        }
        for &next in edges.get(&node).into_iter().flatten() {
            if next != to && !parents.contains_key(&next) {
                parents.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

/// Run `absorb(closed[from], to, closed[to])` over every edge until a pass changes nothing.
///
/// `closed` must hold an initial value for every node.
pub fn fixpoint<K, S, F>(
    edges: &Edges<K>,
    mut closed: BTreeMap<K, S>,
    mut absorb: F,
) -> Result<BTreeMap<K, S>, ClosureError<K>>
where
    K: Ord + Copy,
    S: Clone + Default,
    F: FnMut(&mut S, K, &S) -> bool,
{
    if let Some(cycle) = find_cycle(edges) {
        return Err(ClosureError::Cycle(cycle));
    }

    for (&from, targets) in edges {
        closed.entry(from).or_default();
        for &to in targets {
            closed.entry(to).or_default();
        }
    }

    let limit = closed.len().max(1);
    let mut passes = 0;
    loop {
        passes += 1;
        if passes > limit {
            return Err(ClosureError::NoConvergence(limit));
        }

        let mut changed = false;
        for (&from, targets) in edges {
            for &to in targets {
                if from == to {
                    continue;
                }
                let source = closed.get(&to).cloned().unwrap_or_default();
                if let Some(entry) = closed.get_mut(&from) {
                    changed |= absorb(entry, to, &source);
                }
            }
        }

        if !changed {
            return Ok(closed);
        }
    }
}

/// Set variant: for every node, all nodes it reaches through one or more edges.
pub fn implied_sets<K: Ord + Copy>(
    nodes: impl IntoIterator<Item = K>,
    edges: &Edges<K>,
) -> Result<BTreeMap<K, BTreeSet<K>>, ClosureError<K>> {
    let initial = nodes.into_iter().map(|n| (n, BTreeSet::new())).collect();
    fixpoint(edges, initial, |closed: &mut BTreeSet<K>, to, reached| {
        let mut changed = closed.insert(to);
        for &node in reached {
            changed |= closed.insert(node);
        }
        changed
    })
}

/// Privilege map variant: every node's own map merged with the maps of all nodes it reaches.
pub fn merged_privileges<K, T, V>(
    own: BTreeMap<K, PrivilegeMap<T, V>>,
    edges: &Edges<K>,
) -> Result<BTreeMap<K, PrivilegeMap<T, V>>, ClosureError<K>>
where
    K: Ord + Copy,
    T: Ord + Copy,
    V: PrivilegeValue,
{
    fixpoint(edges, own, |closed: &mut PrivilegeMap<T, V>, _, reached| {
        closed.merge_from(reached)
    })
}
