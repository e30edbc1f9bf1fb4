//! Strongly connected components.
//!
//! Iterative Tarjan over a dense adjacency list. Components come out in
//! reverse topological order: every component is emitted after all
//! components reachable from it, so callees precede callers when the
//! edges run caller to callee.

use std::cmp::min;

const UNVISITED: usize = usize::MAX;

/// Summary of a decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SccStats {
    pub total_nodes: usize,
    pub scc_count: usize,
    pub largest_scc: usize,
    /// Components that contain a cycle, including single-node self loops.
    pub cyclic_sccs: usize,
}

/// Strongly connected components of a graph with nodes `0..adj.len()`.
///
/// Edges to out-of-range nodes are ignored.
pub fn tarjan_scc(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs = Vec::new();

    // (node, position of the next successor to visit)
    let mut call_stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        call_stack.push((root, 0));
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = call_stack.last_mut() {
            let v = frame.0;
            if let Some(&w) = adj[v].get(frame.1) {
                frame.1 += 1;
                if w >= n {
                    continue;
                }
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call_stack.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = min(lowlink[v], index[w]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = min(lowlink[parent], lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                scc.reverse();
                sccs.push(scc);
            }
        }
    }
    sccs
}

/// Returns true if the component contains a cycle.
pub fn is_cyclic(adj: &[Vec<usize>], scc: &[usize]) -> bool {
    match scc {
        [single] => adj.get(*single).is_some_and(|succ| succ.contains(single)),
        _ => scc.len() > 1,
    }
}

/// Statistics over a decomposition.
pub fn scc_stats(adj: &[Vec<usize>], sccs: &[Vec<usize>]) -> SccStats {
    SccStats {
        total_nodes: adj.len(),
        scc_count: sccs.len(),
        largest_scc: sccs.iter().map(Vec::len).max().unwrap_or(0),
        cyclic_sccs: sccs.iter().filter(|scc| is_cyclic(adj, scc)).count(),
    }
}
