//! Adjacency-matrix causal graphs and the graph operations the ID algorithm
//! is built on: ancestor sets, induced subgraphs, c-components, interventions.
//!
//! # Representation
//!
//! `matrix[(i, j)] == 1` encodes a directed edge `i → j` (row = source,
//! column = target). A mutual pair (`matrix[(i, j)] == matrix[(j, i)] == 1`)
//! encodes a bidirected edge, i.e. latent confounding between `i` and `j`.
//!
//! The node↔index maps are owned by the graph and rebuilt whenever a new
//! graph is derived (induced subgraph, intervention), so callers never hold a
//! stale mapping.

use cf_core::{Error, OrderedSet, Result};
use nalgebra::DMatrix;

/// A causal DAG with optional bidirected (latent-confounding) edges.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalGraph {
    nodes: OrderedSet,
    matrix: DMatrix<u8>,
}

impl CausalGraph {
    /// Build a graph from an ordered node set and a 0/1 adjacency matrix.
    pub fn new(nodes: OrderedSet, matrix: DMatrix<u8>) -> Result<Self> {
        let n = nodes.len();
        if n == 0 {
            return Err(Error::Validation("graph must have at least one node".into()));
        }
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(Error::Validation(format!(
                "adjacency matrix is {}x{}, expected {n}x{n}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.iter().any(|&v| v > 1) {
            return Err(Error::Validation("adjacency matrix entries must be 0 or 1".into()));
        }
        Ok(Self { nodes, matrix })
    }

    /// Build a graph from edge lists. `directed` holds `(source, target)`
    /// pairs; `bidirected` pairs become mutual edges.
    pub fn from_edges(
        nodes: &[&str],
        directed: &[(&str, &str)],
        bidirected: &[(&str, &str)],
    ) -> Result<Self> {
        let node_set: OrderedSet = nodes.iter().copied().collect();
        if node_set.len() != nodes.len() {
            return Err(Error::Validation("duplicate node names".into()));
        }
        let n = node_set.len();
        let mut matrix = DMatrix::<u8>::zeros(n, n);
        let set_edge = |a: &str, b: &str, m: &mut DMatrix<u8>| -> Result<()> {
            let i = index_of(&node_set, a)?;
            let j = index_of(&node_set, b)?;
            m[(i, j)] = 1;
            Ok(())
        };
        for &(a, b) in directed {
            set_edge(a, b, &mut matrix)?;
        }
        for &(a, b) in bidirected {
            set_edge(a, b, &mut matrix)?;
            set_edge(b, a, &mut matrix)?;
        }
        Self::new(node_set, matrix)
    }

    /// The ordered node set.
    pub fn nodes(&self) -> &OrderedSet {
        &self.nodes
    }

    /// The adjacency matrix.
    pub fn matrix(&self) -> &DMatrix<u8> {
        &self.matrix
    }

    /// Index of a node name.
    pub fn node_index(&self, name: &str) -> Result<usize> {
        index_of(&self.nodes, name)
    }

    /// Ancestors of `node_set`, each node counting as its own ancestor.
    ///
    /// Iterative stack traversal over incoming edges; a node is pushed only
    /// when not already collected, so mutual (bidirected) edges cannot loop.
    pub fn ancestors_of(&self, node_set: &OrderedSet) -> Result<OrderedSet> {
        let n = self.nodes.len();
        let mut ancestors = OrderedSet::new();
        for name in node_set.iter() {
            let start = self.node_index(name)?;
            let mut stack = vec![start];
            while let Some(child) = stack.pop() {
                ancestors.insert(self.nodes.as_slice()[child].clone());
                for parent in 0..n {
                    if self.matrix[(parent, child)] == 1
                        && !ancestors.contains(&self.nodes.as_slice()[parent])
                    {
                        stack.push(parent);
                    }
                }
            }
        }
        Ok(ancestors)
    }

    /// The graph after intervening on `treatments`: all incoming edges of
    /// every treatment node are removed (including bidirected halves).
    pub fn do_x(&self, treatments: &OrderedSet) -> Result<CausalGraph> {
        let mut matrix = self.matrix.clone();
        for name in treatments.iter() {
            let j = self.node_index(name)?;
            for i in 0..self.nodes.len() {
                matrix[(i, j)] = 0;
            }
        }
        Ok(CausalGraph { nodes: self.nodes.clone(), matrix })
    }

    /// The subgraph induced by `node_set`.
    ///
    /// Retained indices are sorted by original position, so the induced
    /// node order follows the parent graph's order regardless of the
    /// insertion order of `node_set`.
    pub fn induced_subgraph(&self, node_set: &OrderedSet) -> Result<CausalGraph> {
        let mut indices: Vec<usize> =
            node_set.iter().map(|n| self.node_index(n)).collect::<Result<_>>()?;
        indices.sort_unstable();
        indices.dedup();
        let nodes: OrderedSet =
            indices.iter().map(|&i| self.nodes.as_slice()[i].clone()).collect();
        let k = indices.len();
        let mut matrix = DMatrix::<u8>::zeros(k, k);
        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate() {
                matrix[(a, b)] = self.matrix[(i, j)];
            }
        }
        CausalGraph::new(nodes, matrix)
    }

    /// Confounded components: connected components of the subgraph containing
    /// only mutual (bidirected) edges. Directed-only edges do not contribute.
    ///
    /// Every node lands in exactly one component; components are returned in
    /// order of their smallest node index.
    pub fn c_components(&self) -> Vec<OrderedSet> {
        let n = self.nodes.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for h in 0..n {
            for w in (h + 1)..n {
                if self.matrix[(h, w)] == 1 && self.matrix[(w, h)] == 1 {
                    adjacency[h].push(w);
                    adjacency[w].push(h);
                }
            }
        }

        let mut visited = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            let mut component = OrderedSet::new();
            let mut stack = vec![start];
            visited[start] = true;
            while let Some(idx) = stack.pop() {
                component.insert(self.nodes.as_slice()[idx].clone());
                for &next in &adjacency[idx] {
                    if !visited[next] {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Topological order over all edges (mutual halves included), or `None`
    /// when the graph has a cycle — any bidirected edge is such a cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for j in 0..n {
            for i in 0..n {
                if self.matrix[(i, j)] == 1 {
                    in_degree[j] += 1;
                }
            }
        }
        let mut queue: Vec<usize> = (0..n).filter(|&j| in_degree[j] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut head = 0;
        while head < queue.len() {
            let i = queue[head];
            head += 1;
            order.push(self.nodes.as_slice()[i].clone());
            for j in 0..n {
                if self.matrix[(i, j)] == 1 {
                    in_degree[j] -= 1;
                    if in_degree[j] == 0 {
                        queue.push(j);
                    }
                }
            }
        }
        if order.len() == n {
            Some(order)
        } else {
            None
        }
    }

    /// Render the graph in DOT format (bidirected pairs as `dir=both` edges).
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n");
        for name in self.nodes.iter() {
            out.push_str(&format!("  \"{name}\";\n"));
        }
        let n = self.nodes.len();
        for i in 0..n {
            for j in 0..n {
                if self.matrix[(i, j)] != 1 {
                    continue;
                }
                let a = &self.nodes.as_slice()[i];
                let b = &self.nodes.as_slice()[j];
                if self.matrix[(j, i)] == 1 {
                    if i < j {
                        out.push_str(&format!("  \"{a}\" -> \"{b}\" [dir=both];\n"));
                    }
                } else {
                    out.push_str(&format!("  \"{a}\" -> \"{b}\";\n"));
                }
            }
        }
        out.push('}');
        out
    }
}

fn index_of(nodes: &OrderedSet, name: &str) -> Result<usize> {
    nodes
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| Error::Validation(format!("unknown node '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// W0 → v0 → y, W0 → y, with latent confounding v0 ↔ y.
    fn confounded_triangle() -> CausalGraph {
        CausalGraph::from_edges(
            &["W0", "v0", "y"],
            &[("W0", "v0"), ("v0", "y"), ("W0", "y")],
            &[("v0", "y")],
        )
        .unwrap()
    }

    #[test]
    fn ancestors_include_self() {
        let g = confounded_triangle();
        for name in ["W0", "v0", "y"] {
            let anc = g.ancestors_of(&OrderedSet::singleton(name)).unwrap();
            assert!(anc.contains(name), "{name} missing from its own ancestor set");
        }
    }

    #[test]
    fn ancestors_follow_incoming_edges() {
        let g = CausalGraph::from_edges(&["a", "b", "c"], &[("a", "b"), ("b", "c")], &[]).unwrap();
        let anc = g.ancestors_of(&OrderedSet::singleton("c")).unwrap();
        assert_eq!(anc, ["c", "b", "a"].into_iter().collect());
        let anc_a = g.ancestors_of(&OrderedSet::singleton("a")).unwrap();
        assert_eq!(anc_a, OrderedSet::singleton("a"));
    }

    #[test]
    fn ancestors_terminate_on_bidirected_cycle() {
        // v0 ↔ y is a 2-cycle in matrix form; traversal must not spin.
        let g = confounded_triangle();
        let anc = g.ancestors_of(&OrderedSet::singleton("y")).unwrap();
        assert_eq!(anc.len(), 3);
    }

    #[test]
    fn c_components_partition_nodes() {
        let g = confounded_triangle();
        let comps = g.c_components();
        // Partition invariant: disjoint, exhaustive.
        let mut seen = OrderedSet::new();
        for comp in &comps {
            for node in comp.iter() {
                assert!(seen.insert(node.clone()), "node {node} in two components");
            }
        }
        assert_eq!(seen, *g.nodes());
        // Only v0 ↔ y is mutual.
        assert_eq!(comps.len(), 2);
        assert!(comps.iter().any(|c| *c == ["v0", "y"].into_iter().collect()));
        assert!(comps.iter().any(|c| *c == OrderedSet::singleton("W0")));
    }

    #[test]
    fn directed_only_edges_do_not_confound() {
        let g = CausalGraph::from_edges(&["a", "b"], &[("a", "b")], &[]).unwrap();
        assert_eq!(g.c_components().len(), 2);
    }

    #[test]
    fn induced_subgraph_keeps_original_index_order() {
        let g = confounded_triangle();
        // Request out of order; induced nodes must follow original order.
        let sub = g
            .induced_subgraph(&["y", "W0"].into_iter().collect())
            .unwrap();
        assert_eq!(sub.nodes().as_slice(), &["W0".to_string(), "y".to_string()]);
        // W0 → y survives, v0 edges are gone.
        assert_eq!(sub.matrix()[(0, 1)], 1);
        assert_eq!(sub.matrix()[(1, 0)], 0);
    }

    #[test]
    fn do_x_removes_incoming_edges_only() {
        let g = confounded_triangle();
        let cut = g.do_x(&OrderedSet::singleton("v0")).unwrap();
        let w0 = cut.node_index("W0").unwrap();
        let v0 = cut.node_index("v0").unwrap();
        let y = cut.node_index("y").unwrap();
        assert_eq!(cut.matrix()[(w0, v0)], 0, "W0 -> v0 should be cut");
        assert_eq!(cut.matrix()[(y, v0)], 0, "y -> v0 (bidirected half) should be cut");
        assert_eq!(cut.matrix()[(v0, y)], 1, "v0 -> y must survive");
    }

    #[test]
    fn topological_order_on_dag() {
        let g =
            CausalGraph::from_edges(&["y", "x", "z"], &[("x", "z"), ("z", "y")], &[]).unwrap();
        let order = g.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
        assert!(pos("x") < pos("z"));
        assert!(pos("z") < pos("y"));
    }

    #[test]
    fn no_topological_order_with_bidirected_edges() {
        assert!(confounded_triangle().topological_order().is_none());
    }

    #[test]
    fn dot_rendering() {
        let g = confounded_triangle();
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"W0\" -> \"v0\";"));
        assert!(dot.contains("[dir=both]"));
    }

    #[test]
    fn rejects_non_square_matrix() {
        let nodes: OrderedSet = ["a", "b"].into_iter().collect();
        let err = CausalGraph::new(nodes, DMatrix::<u8>::zeros(2, 3)).unwrap_err();
        assert!(err.to_string().contains("expected 2x2"));
    }
}
