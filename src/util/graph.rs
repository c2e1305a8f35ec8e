//! Deterministic dependency graphs.
//!
//! Feature requirements, module dependencies and generated artifacts are all
//! ordered through [`DependencyGraph`]. An edge `a -> b` means "a depends on
//! b", so topological order places `b` first.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// A directed dependency graph keyed by `K`.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    graph: DiGraph<K, ()>,
    index: BTreeMap<K, NodeIndex>,
}

impl<K: Ord + Clone> DependencyGraph<K> {
    pub fn new() -> Self {
        DependencyGraph {
            graph: DiGraph::new(),
            index: BTreeMap::new(),
        }
    }

    /// Add a node. Adding the same key twice is a no-op.
    pub fn add_node(&mut self, key: K) -> NodeIndex {
        if let Some(&node) = self.index.get(&key) {
            return node;
        }
        let node = self.graph.add_node(key.clone());
        self.index.insert(key, node);
        node
    }

    /// Record that `node` depends on `dependency`, adding either if needed.
    pub fn add_dependency(&mut self, node: K, dependency: K) {
        let from = self.add_node(node);
        let to = self.add_node(dependency);
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Direct dependencies of `key`, sorted.
    pub fn dependencies(&self, key: &K) -> Vec<K> {
        self.sorted_neighbors(key, Direction::Outgoing)
    }

    /// Nodes that directly depend on `key`, sorted.
    pub fn dependents(&self, key: &K) -> Vec<K> {
        self.sorted_neighbors(key, Direction::Incoming)
    }

    fn sorted_neighbors(&self, key: &K, direction: Direction) -> Vec<K> {
        let Some(&node) = self.index.get(key) else {
            return Vec::new();
        };
        let mut out: Vec<K> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Every cycle in the graph, one representative path per strongly
    /// connected component. Each path starts at the smallest key of its
    /// component and lists nodes in dependency order, without repeating the
    /// first node at the end.
    pub fn cycles(&self) -> Vec<Vec<K>> {
        let mut cycles = Vec::new();
        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.contains_edge(n, n));
            if !is_cycle {
                continue;
            }
            let members: BTreeSet<K> = component.iter().map(|&n| self.graph[n].clone()).collect();
            if let Some(path) = self.cycle_through(&members) {
                cycles.push(path);
            }
        }
        cycles.sort();
        cycles
    }

    /// Shortest path from the smallest member back to itself, staying
    /// inside the component. Breadth-first over sorted neighbors keeps the
    /// result stable.
    fn cycle_through(&self, members: &BTreeSet<K>) -> Option<Vec<K>> {
        let start = members.iter().next()?.clone();
        let mut parent: BTreeMap<K, K> = BTreeMap::new();
        let mut queue = VecDeque::from([start.clone()]);
        let mut seen = BTreeSet::from([start.clone()]);

        while let Some(current) = queue.pop_front() {
            for next in self.dependencies(&current) {
                if !members.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![current.clone()];
                    let mut cursor = current.clone();
                    while let Some(p) = parent.get(&cursor) {
                        path.push(p.clone());
                        cursor = p.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                if seen.insert(next.clone()) {
                    parent.insert(next.clone(), current.clone());
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Topological order, dependencies first. Among nodes that are ready at
    /// the same time, the one with the smallest `priority` goes first.
    ///
    /// Returns the graph's cycles when no order exists.
    pub fn topological_order_by<P, F>(&self, priority: F) -> Result<Vec<K>, Vec<Vec<K>>>
    where
        P: Ord,
        F: Fn(&K) -> P,
    {
        let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: BTreeSet<(P, K)> = BTreeSet::new();

        for (key, &node) in &self.index {
            let deps = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect::<BTreeSet<_>>()
                .len();
            if deps == 0 {
                ready.insert((priority(key), key.clone()));
            } else {
                pending.insert(node, deps);
            }
        }

        let mut order = Vec::with_capacity(self.index.len());
        while let Some((_, key)) = ready.pop_first() {
            let node = self.index[&key];
            let dependents: BTreeSet<NodeIndex> = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .collect();
            for dependent in dependents {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        pending.remove(&dependent);
                        let dep_key = self.graph[dependent].clone();
                        ready.insert((priority(&dep_key), dep_key));
                    }
                }
            }
            order.push(key);
        }

        if order.len() == self.index.len() {
            Ok(order)
        } else {
            Err(self.cycles())
        }
    }

    /// Topological order with ties broken by key.
    pub fn topological_order(&self) -> Result<Vec<K>, Vec<Vec<K>>> {
        self.topological_order_by(|k| k.clone())
    }
}

impl<K: Ord + Clone> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph<String> {
        let mut g = DependencyGraph::new();
        for (from, to) in edges {
            g.add_dependency(from.to_string(), to.to_string());
        }
        g
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(&[("ssl", "crypto"), ("default", "base"), ("base", "crypto")]);
        let order = g.topological_order().unwrap();
        let pos = |k: &str| order.iter().position(|x| x == k).unwrap();

        assert!(pos("crypto") < pos("ssl"));
        assert!(pos("crypto") < pos("base"));
        assert!(pos("base") < pos("default"));
        // Ties broken by key
        assert_eq!(order, vec!["crypto", "base", "default", "ssl"]);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let mut g: DependencyGraph<String> = DependencyGraph::new();
        g.add_node("z-meta".to_string());
        g.add_node("a-header".to_string());
        let order = g
            .topological_order_by(|k| (if k.ends_with("meta") { 0 } else { 1 }, k.clone()))
            .unwrap();
        assert_eq!(order, vec!["z-meta", "a-header"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(&[("a", "b"), ("b", "a"), ("c", "a")]);
        let cycles = g.topological_order().unwrap_err();
        assert_eq!(cycles, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_cycle_follows_edges() {
        let g = graph(&[("a", "c"), ("c", "b"), ("b", "a")]);
        let cycles = g.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "c", "b"]);
    }

    #[test]
    fn test_keys_need_only_ord() {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
        struct Key(u8);

        let mut g = DependencyGraph::new();
        g.add_dependency(Key(1), Key(2));
        g.add_dependency(Key(2), Key(1));
        assert_eq!(g.cycles(), vec![vec![Key(1), Key(2)]]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&[("a", "a")]);
        assert_eq!(g.cycles(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_neighbors() {
        let g = graph(&[("ssl", "crypto"), ("base", "crypto")]);
        assert_eq!(g.dependents(&"crypto".to_string()), vec!["base", "ssl"]);
        assert_eq!(g.dependencies(&"ssl".to_string()), vec!["crypto"]);
        assert!(g.dependencies(&"missing".to_string()).is_empty());
    }
}
