//! Reachability over typed requirement relationships
//!
//! Each relationship type forms its own directed graph. Adding `a → b` is only
//! legal when `a` is not already reachable from `b` along edges of that type.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;

/// Depth-first search from `start`, following `neighbors`, looking for `goal`.
///
/// `neighbors` is fallible so callers can fetch edges lazily from storage.
pub fn reaches<N, F, E>(start: N, goal: &N, mut neighbors: F) -> Result<bool, E>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> Result<Vec<N>, E>,
{
    if &start == goal {
        return Ok(true);
    }
    let mut visited: HashSet<N> = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        for next in neighbors(&node)? {
            if &next == goal {
                return Ok(true);
            }
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }
    Ok(false)
}

/// Whether adding `source → target` would close a cycle
pub fn would_create_cycle<N, F, E>(source: &N, target: &N, neighbors: F) -> Result<bool, E>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> Result<Vec<N>, E>,
{
    reaches(target.clone(), source, neighbors)
}

/// Find every cycle-participating strongly connected component in an edge list.
///
/// Returns one sorted node list per component with more than one node (self
/// loops are rejected at insert time and never stored).
pub fn find_cycles<N>(edges: &[(N, N)]) -> Vec<Vec<N>>
where
    N: Clone + Ord,
{
    let mut adjacency: BTreeMap<N, Vec<N>> = BTreeMap::new();
    for (from, to) in edges {
        adjacency.entry(from.clone()).or_default().push(to.clone());
        adjacency.entry(to.clone()).or_default();
    }

    // Iterative Tarjan
    let nodes: Vec<N> = adjacency.keys().cloned().collect();
    let index_of: BTreeMap<N, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i))
        .collect();
    let succ: Vec<Vec<usize>> = nodes
        .iter()
        .map(|n| adjacency[n].iter().map(|m| index_of[m]).collect())
        .collect();

    let count = nodes.len();
    let mut index = vec![usize::MAX; count];
    let mut lowlink = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for root in 0..count {
        if index[root] != usize::MAX {
            continue;
        }
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(&(v, child)) = call.last() {
            if child < succ[v].len() {
                if let Some(top) = call.last_mut() {
                    top.1 += 1;
                }
                let w = succ[v][child];
                if index[w] == usize::MAX {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = BTreeSet::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.insert(nodes[w].clone());
                        if w == v {
                            break;
                        }
                    }
                    if component.len() > 1 {
                        components.push(component.into_iter().collect());
                    }
                }
            }
        }
    }
    components.sort();
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::convert::Infallible;

    fn graph(edges: &[(&'static str, &'static str)]) -> HashMap<&'static str, Vec<&'static str>> {
        let mut g: HashMap<&str, Vec<&str>> = HashMap::new();
        for &(a, b) in edges {
            g.entry(a).or_default().push(b);
        }
        g
    }

    fn lookup<'a>(
        g: &'a HashMap<&'static str, Vec<&'static str>>,
    ) -> impl FnMut(&&'static str) -> Result<Vec<&'static str>, Infallible> + 'a {
        move |n| Ok(g.get(n).cloned().unwrap_or_default())
    }

    #[test]
    fn test_chain_closing_edge_is_a_cycle() {
        let g = graph(&[("A", "B"), ("B", "C")]);
        assert!(would_create_cycle(&"C", &"A", lookup(&g)).unwrap());
    }

    #[test]
    fn test_parallel_edge_is_not_a_cycle() {
        let g = graph(&[("A", "B"), ("B", "C")]);
        assert!(!would_create_cycle(&"A", &"C", lookup(&g)).unwrap());
    }

    #[test]
    fn test_reaches_handles_diamonds_without_looping() {
        let g = graph(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("D", "B")]);
        assert!(reaches("A", &"D", lookup(&g)).unwrap());
        assert!(!reaches("D", &"A", lookup(&g)).unwrap());
    }

    #[test]
    fn test_neighbor_errors_propagate() {
        let r: Result<bool, &str> = reaches("A", &"B", |_| Err("db down"));
        assert_eq!(r, Err("db down"));
    }

    #[test]
    fn test_find_cycles() {
        let edges = vec![("A", "B"), ("B", "C"), ("C", "A"), ("C", "D"), ("E", "F")];
        assert_eq!(find_cycles(&edges), vec![vec!["A", "B", "C"]]);
        assert!(find_cycles(&[("A", "B"), ("B", "C")]).is_empty());
    }
}
