//! The ID algorithm for causal-effect identification.
//!
//! Given a causal graph with latent (bidirected) edges, decides whether
//! `P(outcome | do(treatment))` is expressible in terms of the observed joint
//! distribution, and if so produces the formula as a sum of products of
//! conditional factors.
//!
//! # References
//!
//! - Tian & Pearl (2002), "A general identification condition for causal
//!   effects."
//! - Shpitser & Pearl (2006), "Identification of joint interventional
//!   distributions in recursive semi-Markovian causal models."

use cf_core::{Error, OrderedSet, Result};
use serde::{Deserialize, Serialize};

use crate::graph::CausalGraph;

/// A conditional distribution factor `P(outcome_vars | condition_vars)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalFactor {
    /// Variables on the left of the conditioning bar.
    pub outcome_vars: OrderedSet,
    /// Variables conditioned on.
    pub condition_vars: OrderedSet,
}

/// One multiplicand of an [`IdExpression`] product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdTerm {
    /// A leaf conditional factor.
    Factor(ConditionalFactor),
    /// A nested sub-expression (from a c-component split).
    Expression(IdExpression),
}

/// A marginalized product: `Σ_{sum_over} Π product`.
///
/// Each expression produced by the identifier is a fully reduced summand; the
/// identified effect is the product of its terms summed over `sum_over`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdExpression {
    /// Ordered multiplicands.
    pub product: Vec<IdTerm>,
    /// Variables marginalized out.
    pub sum_over: OrderedSet,
}

impl std::fmt::Display for ConditionalFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome: Vec<&str> = self.outcome_vars.iter().map(String::as_str).collect();
        if self.condition_vars.is_empty() {
            write!(f, "P({})", outcome.join(","))
        } else {
            let cond: Vec<&str> = self.condition_vars.iter().map(String::as_str).collect();
            write!(f, "P({}|{})", outcome.join(","), cond.join(","))
        }
    }
}

impl std::fmt::Display for IdExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.sum_over.is_empty() {
            write!(f, "Σ_{}", self.sum_over)?;
        }
        write!(f, "[")?;
        for (i, term) in self.product.iter().enumerate() {
            if i > 0 {
                write!(f, "·")?;
            }
            match term {
                IdTerm::Factor(factor) => write!(f, "{factor}")?,
                IdTerm::Expression(expr) => write!(f, "{expr}")?,
            }
        }
        write!(f, "]")
    }
}

/// Outcome of an identification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdentifyResult {
    /// The effect is identified; the formula is the sum of these expressions.
    Identified(Vec<IdExpression>),
    /// The effect cannot be computed from observational data on this graph.
    Unidentifiable,
}

impl IdentifyResult {
    /// Whether identification succeeded.
    pub fn is_identified(&self) -> bool {
        matches!(self, IdentifyResult::Identified(_))
    }
}

/// Recursive ID-algorithm identifier over a fixed graph snapshot.
///
/// The graph, treatment and outcome sets are captured at construction; the
/// topological order needed by the truncated-factorization case is computed
/// once here. Graphs whose bidirected edges preclude a topological order are
/// accepted (with a logged warning) — only identification attempts that reach
/// that case will fail.
#[derive(Debug, Clone)]
pub struct IdIdentifier {
    treatment: OrderedSet,
    outcome: OrderedSet,
    graph: CausalGraph,
    topological_order: Option<Vec<String>>,
}

impl IdIdentifier {
    /// Create an identifier for `P(outcome | do(treatment))` on `graph`.
    pub fn new(treatment: OrderedSet, outcome: OrderedSet, graph: CausalGraph) -> Result<Self> {
        if outcome.is_empty() {
            return Err(Error::Validation("outcome set must be non-empty".into()));
        }
        for name in treatment.iter().chain(outcome.iter()) {
            if !graph.nodes().contains(name) {
                return Err(Error::Validation(format!("'{name}' is not a node of the graph")));
            }
        }
        if !treatment.intersection(&outcome).is_empty() {
            return Err(Error::Validation("treatment and outcome sets must be disjoint".into()));
        }
        let topological_order = graph.topological_order();
        if topological_order.is_none() {
            log::warn!("cannot find topological order; truncated factorization will be unavailable");
        }
        Ok(Self { treatment, outcome, graph, topological_order })
    }

    /// Run the ID algorithm on the stored treatment/outcome/graph.
    pub fn identify_effect(&self) -> Result<IdentifyResult> {
        self.identify(self.treatment.clone(), self.outcome.clone(), self.graph.clone())
    }

    /// Run the ID algorithm with explicit arguments (used by the recursive
    /// c-component split; callers normally use [`identify_effect`]).
    ///
    /// The seven cases run in strict order. The self-recursive cases (ancestor
    /// pruning, do-graph enlargement, enclosing-component restriction) are a
    /// state-update loop; only the c-component product split recurses, and its
    /// depth is bounded by the node count since every sub-problem is a strict
    /// subset of the current component structure.
    ///
    /// [`identify_effect`]: IdIdentifier::identify_effect
    pub fn identify(
        &self,
        treatment: OrderedSet,
        outcome: OrderedSet,
        graph: CausalGraph,
    ) -> Result<IdentifyResult> {
        let mut treatment = treatment;
        let mut graph = graph;
        loop {
            let nodes = graph.nodes().clone();

            // Line 1: nothing to intervene on; marginalize everything else.
            if treatment.is_empty() {
                let expr = IdExpression {
                    product: vec![IdTerm::Factor(ConditionalFactor {
                        outcome_vars: outcome.clone(),
                        condition_vars: OrderedSet::new(),
                    })],
                    sum_over: nodes.difference(&outcome),
                };
                return Ok(IdentifyResult::Identified(vec![expr]));
            }

            // Line 2: restrict to ancestors of the outcome.
            let ancestors = graph.ancestors_of(&outcome)?;
            if !nodes.difference(&ancestors).is_empty() {
                treatment = treatment.intersection(&ancestors);
                graph = graph.induced_subgraph(&ancestors)?;
                continue;
            }

            // Line 3: nodes that are neither treatment nor ancestors of the
            // outcome once treatment is intervened on must be treated too.
            let do_graph = graph.do_x(&treatment)?;
            let do_ancestors = do_graph.ancestors_of(&outcome)?;
            let w = nodes.difference(&treatment).difference(&do_ancestors);
            if !w.is_empty() {
                treatment = treatment.union(&w);
                continue;
            }

            // Line 4: c-component split of G − X.
            let remainder = nodes.difference(&treatment);
            let components = graph.induced_subgraph(&remainder)?.c_components();
            if components.len() > 1 {
                let sum_over = nodes.difference(&outcome.union(&treatment));
                let mut product = Vec::new();
                for component in &components {
                    match self.identify(
                        nodes.difference(component),
                        component.clone(),
                        graph.clone(),
                    )? {
                        IdentifyResult::Identified(exprs) => {
                            product.extend(exprs.into_iter().map(IdTerm::Expression));
                        }
                        IdentifyResult::Unidentifiable => {
                            return Ok(IdentifyResult::Unidentifiable);
                        }
                    }
                }
                return Ok(IdentifyResult::Identified(vec![IdExpression { product, sum_over }]));
            }
            let s = components
                .into_iter()
                .next()
                .ok_or_else(|| Error::Computation("empty c-component split".into()))?;

            // Line 5: a single confounded component covering every node means
            // no conditioning strategy exists — a hedge.
            let full_components = graph.c_components();
            if full_components.len() == 1 && full_components[0] == nodes {
                return Ok(IdentifyResult::Unidentifiable);
            }

            // Line 6: S is a c-component of the full graph — truncated
            // factorization over the topological order.
            if full_components.iter().any(|c| *c == s) {
                let order = self.topological_order.as_ref().ok_or_else(|| {
                    Error::Computation(
                        "truncated factorization requires a topological order, \
                         but the graph has none"
                            .to_string(),
                    )
                })?;
                let sum_over = s.difference(&outcome);
                let mut product = Vec::new();
                let mut predecessors: Vec<String> = Vec::new();
                for node in order {
                    if s.contains(node) {
                        product.push(IdTerm::Factor(ConditionalFactor {
                            outcome_vars: OrderedSet::singleton(node.clone()),
                            condition_vars: predecessors.iter().cloned().collect(),
                        }));
                    }
                    predecessors.push(node.clone());
                }
                return Ok(IdentifyResult::Identified(vec![IdExpression { product, sum_over }]));
            }

            // Line 7: restrict to the confounded component enclosing S.
            match full_components.iter().find(|c| s.is_subset(c)) {
                Some(component) => {
                    treatment = treatment.intersection(component);
                    graph = graph.induced_subgraph(component)?;
                }
                None => {
                    return Err(Error::Computation(
                        "inconsistent c-component structure: no component encloses S".into(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> OrderedSet {
        names.iter().copied().collect()
    }

    fn expressions(result: IdentifyResult) -> Vec<IdExpression> {
        match result {
            IdentifyResult::Identified(exprs) => exprs,
            IdentifyResult::Unidentifiable => panic!("expected identification to succeed"),
        }
    }

    #[test]
    fn rejects_unknown_and_overlapping_variables() {
        let g = CausalGraph::from_edges(&["x", "y"], &[("x", "y")], &[]).unwrap();
        assert!(IdIdentifier::new(set(&["q"]), set(&["y"]), g.clone()).is_err());
        assert!(IdIdentifier::new(set(&["x"]), set(&["x", "y"]), g.clone()).is_err());
        assert!(IdIdentifier::new(set(&["x"]), OrderedSet::new(), g).is_err());
    }

    #[test]
    fn empty_treatment_is_marginalization() {
        let g = CausalGraph::from_edges(&["x", "z", "y"], &[("x", "z"), ("z", "y")], &[]).unwrap();
        let ident = IdIdentifier::new(OrderedSet::new(), set(&["y"]), g).unwrap();
        let exprs = expressions(ident.identify_effect().unwrap());

        assert_eq!(exprs.len(), 1);
        assert_eq!(exprs[0].sum_over, set(&["x", "z"]));
        assert_eq!(exprs[0].product.len(), 1);
        match &exprs[0].product[0] {
            IdTerm::Factor(factor) => {
                assert_eq!(factor.outcome_vars, set(&["y"]));
                assert!(factor.condition_vars.is_empty());
            }
            other => panic!("expected a leaf factor, got {other:?}"),
        }
    }

    #[test]
    fn simple_edge_identifies_as_conditional() {
        // x → y with no confounding: P(y | do(x)) = P(y | x).
        let g = CausalGraph::from_edges(&["x", "y"], &[("x", "y")], &[]).unwrap();
        let ident = IdIdentifier::new(set(&["x"]), set(&["y"]), g).unwrap();
        let exprs = expressions(ident.identify_effect().unwrap());

        assert_eq!(exprs.len(), 1);
        assert!(exprs[0].sum_over.is_empty());
        assert_eq!(exprs[0].product.len(), 1);
        match &exprs[0].product[0] {
            IdTerm::Factor(factor) => {
                assert_eq!(factor.outcome_vars, set(&["y"]));
                assert_eq!(factor.condition_vars, set(&["x"]));
            }
            other => panic!("expected a leaf factor, got {other:?}"),
        }
    }

    #[test]
    fn chain_yields_truncated_factorization() {
        // x → z → y: P(y | do(x)) = Σ_z P(z | x) · P(y | x, z).
        let g = CausalGraph::from_edges(&["x", "z", "y"], &[("x", "z"), ("z", "y")], &[]).unwrap();
        let ident = IdIdentifier::new(set(&["x"]), set(&["y"]), g).unwrap();
        let exprs = expressions(ident.identify_effect().unwrap());

        assert_eq!(exprs.len(), 1);
        let top = &exprs[0];
        assert_eq!(top.sum_over, set(&["z"]));
        assert_eq!(top.product.len(), 2, "one sub-expression per c-component");

        // Collect the leaf factors of the two nested sub-expressions.
        let mut factors = Vec::new();
        for term in &top.product {
            match term {
                IdTerm::Expression(expr) => {
                    assert!(expr.sum_over.is_empty());
                    for inner in &expr.product {
                        match inner {
                            IdTerm::Factor(factor) => factors.push(factor.clone()),
                            other => panic!("unexpected nesting: {other:?}"),
                        }
                    }
                }
                other => panic!("expected nested expressions, got {other:?}"),
            }
        }
        assert!(factors
            .iter()
            .any(|f| f.outcome_vars == set(&["z"]) && f.condition_vars == set(&["x"])));
        assert!(factors
            .iter()
            .any(|f| f.outcome_vars == set(&["y"]) && f.condition_vars == set(&["x", "z"])));
    }

    #[test]
    fn bow_arc_graph_is_unidentifiable() {
        // x → y with x ↔ y: the classic bow arc, a single c-component.
        let g = CausalGraph::from_edges(&["x", "y"], &[("x", "y")], &[("x", "y")]).unwrap();
        let ident = IdIdentifier::new(set(&["x"]), set(&["y"]), g).unwrap();
        assert_eq!(ident.identify_effect().unwrap(), IdentifyResult::Unidentifiable);
    }

    #[test]
    fn observed_confounder_prunes_to_ancestors() {
        // w → x → y, w → y, plus a dangling descendant d of y.
        // Line 2 must prune d before anything else.
        let g = CausalGraph::from_edges(
            &["w", "x", "y", "d"],
            &[("w", "x"), ("x", "y"), ("w", "y"), ("y", "d")],
            &[],
        )
        .unwrap();
        let ident = IdIdentifier::new(set(&["x"]), set(&["y"]), g).unwrap();
        let exprs = expressions(ident.identify_effect().unwrap());
        // d must not appear anywhere in the result.
        for expr in &exprs {
            assert!(!expr.sum_over.contains("d"));
        }
    }

    #[test]
    fn enclosing_component_restriction_runs() {
        // Two treatments; z ↔ y confounded with x1, x2 unconfounded.
        // S = {z, y} sits strictly inside the full component {x1, z, y},
        // so line 7 restricts to it and the inner problem is a hedge.
        let g = CausalGraph::from_edges(
            &["x1", "x2", "z", "y"],
            &[("x1", "z"), ("x2", "z"), ("z", "y")],
            &[("x1", "z"), ("z", "y")],
        )
        .unwrap();
        let ident = IdIdentifier::new(set(&["x1", "x2"]), set(&["y"]), g).unwrap();
        assert_eq!(ident.identify_effect().unwrap(), IdentifyResult::Unidentifiable);
    }

    #[test]
    fn truncated_factorization_needs_topological_order() {
        // w ↔ x (no order exists), and the recursion reaches line 6 via the
        // c-component split. Identification must fail with a computation
        // error rather than guess an order.
        let g = CausalGraph::from_edges(
            &["w", "x", "y"],
            &[("w", "x"), ("x", "y")],
            &[("w", "x")],
        )
        .unwrap();
        let ident = IdIdentifier::new(set(&["x"]), set(&["y"]), g).unwrap();
        let err = ident.identify_effect().unwrap_err();
        assert!(err.to_string().contains("topological order"), "got: {err}");
    }

    #[test]
    fn expression_display_is_readable() {
        let expr = IdExpression {
            product: vec![IdTerm::Factor(ConditionalFactor {
                outcome_vars: set(&["y"]),
                condition_vars: set(&["x", "z"]),
            })],
            sum_over: set(&["z"]),
        };
        assert_eq!(format!("{expr}"), "Σ_{z}[P(y|x,z)]");
    }
}
