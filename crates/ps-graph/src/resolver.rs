//! Dependency resolution: graph derivation, ordering, cycle and circuit analysis.

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

use crate::error::{CycleReport, GraphError, GraphResult, ValidationError, ValidationResult};
use crate::store::{Connection, endpoint};

/// Derived producer map: instance -> instances whose outputs feed it.
///
/// Nodes keep declaration order, which is the tie-break for sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    producers: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Node names in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn producers(&self, node: &str) -> Option<&IndexSet<String>> {
        self.producers.get(node)
    }

    /// Distinct (producer, consumer) pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.producers.iter().flat_map(|(consumer, producers)| {
            producers.iter().map(move |p| (p.as_str(), consumer.as_str()))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.producers.values().map(IndexSet::len).sum()
    }

    fn index_of(&self, node: &str) -> Option<usize> {
        self.producers.get_index_of(node)
    }

    /// Consumers of each node, indexed by declaration position and sorted.
    fn consumer_lists(&self) -> Vec<Vec<usize>> {
        let mut consumers = vec![Vec::new(); self.producers.len()];
        for (ci, (_, producers)) in self.producers.iter().enumerate() {
            for p in producers {
                if let Some(pi) = self.index_of(p) {
                    consumers[pi].push(ci);
                }
            }
        }
        for list in &mut consumers {
            list.sort_unstable();
        }
        consumers
    }
}

/// Either a computed topological order or a caller-supplied permutation.
///
/// A manual order is how closed loops run: any edge whose producer is
/// placed after its consumer carries the previous cycle's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOrder {
    Automatic(Vec<String>),
    Manual(Vec<String>),
}

impl ExecutionOrder {
    pub fn as_slice(&self) -> &[String] {
        match self {
            ExecutionOrder::Automatic(order) | ExecutionOrder::Manual(order) => order,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, ExecutionOrder::Manual(_))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.as_slice().iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Build the dependency graph from the instance set and connections.
///
/// Strict: a connection naming an instance outside `instances` fails the
/// whole build. Repeated producer/consumer pairs collapse into one edge.
pub fn build_graph<'a>(
    instances: impl IntoIterator<Item = &'a str>,
    connections: &[Connection],
) -> ValidationResult<DependencyGraph> {
    let mut producers: IndexMap<String, IndexSet<String>> = instances
        .into_iter()
        .map(|name| (name.to_string(), IndexSet::new()))
        .collect();

    for conn in connections {
        let source = endpoint(&conn.from)?;
        let target = endpoint(&conn.to)?;
        for inst in [source.instance(), target.instance()] {
            if !producers.contains_key(inst) {
                return Err(ValidationError::DanglingReference {
                    from: conn.from.clone(),
                    to: conn.to.clone(),
                    missing: inst.to_string(),
                });
            }
        }
        if let Some(set) = producers.get_mut(target.instance()) {
            set.insert(source.instance().to_string());
        }
    }

    Ok(DependencyGraph { producers })
}

/// Kahn's algorithm with a declaration-ordered FIFO.
///
/// Returns the full order, or a [`CycleReport`] naming the unresolved
/// remainder and the distinct cycles inside it.
pub fn topological_sort(graph: &DependencyGraph) -> Result<Vec<String>, CycleReport> {
    let names: Vec<&str> = graph.nodes().collect();
    let consumers = graph.consumer_lists();
    let mut in_degree: Vec<usize> = graph.producers.values().map(IndexSet::len).collect();

    let mut queue: VecDeque<usize> = (0..names.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(names.len());

    while let Some(i) = queue.pop_front() {
        order.push(names[i].to_string());
        for &c in &consumers[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                queue.push_back(c);
            }
        }
    }

    if order.len() == names.len() {
        return Ok(order);
    }

    let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
    let unresolved = names
        .iter()
        .filter(|n| !placed.contains(*n))
        .map(|n| n.to_string())
        .collect();
    Err(CycleReport {
        unresolved,
        cycles: find_cycles(graph),
    })
}

/// Strongly connected components that loop (size > 1, or a self-edge),
/// members and components both in declaration order.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let names: Vec<&str> = graph.nodes().collect();
    let mut g: DiGraph<usize, ()> = DiGraph::with_capacity(names.len(), graph.edge_count());
    let idx: Vec<NodeIndex> = (0..names.len()).map(|i| g.add_node(i)).collect();
    for (producer, consumer) in graph.edges() {
        if let (Some(p), Some(c)) = (graph.index_of(producer), graph.index_of(consumer)) {
            g.add_edge(idx[p], idx[c], ());
        }
    }

    let mut cycles: Vec<Vec<usize>> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || g.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut members: Vec<usize> = scc.into_iter().map(|n| g[n]).collect();
            members.sort_unstable();
            members
        })
        .collect();
    cycles.sort_unstable_by_key(|members| members[0]);

    cycles
        .into_iter()
        .map(|members| members.into_iter().map(|i| names[i].to_string()).collect())
        .collect()
}

/// Check that `order` is exactly a permutation of the graph's nodes.
pub fn validate_permutation(graph: &DependencyGraph, order: &[String]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(order.len());
    for name in order {
        if graph.index_of(name).is_none() {
            return Err(ValidationError::InvalidOrder {
                reason: format!("'{name}' is not a configured instance"),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::InvalidOrder {
                reason: format!("'{name}' appears more than once"),
            });
        }
    }
    if let Some(missing) = graph.nodes().find(|n| !seen.contains(n)) {
        return Err(ValidationError::InvalidOrder {
            reason: format!("'{missing}' is missing"),
        });
    }
    Ok(())
}

/// Pick the execution order for `graph`.
///
/// A valid manual order is taken verbatim. An invalid one is ignored in
/// favour of automatic sorting.
pub fn resolve(graph: &DependencyGraph, manual: Option<&[String]>) -> GraphResult<ExecutionOrder> {
    if let Some(order) = manual {
        match validate_permutation(graph, order) {
            Ok(()) => return Ok(ExecutionOrder::Manual(order.to_vec())),
            Err(e) => warn!(error = %e, "manual execution order rejected, sorting automatically"),
        }
    }
    topological_sort(graph)
        .map(ExecutionOrder::Automatic)
        .map_err(GraphError::Cyclic)
}

/// Weakly connected group of instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    /// First-declared member.
    pub name: String,
    pub members: Vec<String>,
}

/// Partition the graph into circuits (undirected connected components).
pub fn circuits(graph: &DependencyGraph) -> Vec<Circuit> {
    let names: Vec<&str> = graph.nodes().collect();
    let mut uf = UnionFind::<usize>::new(names.len());
    for (producer, consumer) in graph.edges() {
        if let (Some(p), Some(c)) = (graph.index_of(producer), graph.index_of(consumer)) {
            uf.union(p, c);
        }
    }

    let mut groups: IndexMap<usize, Vec<String>> = IndexMap::new();
    for (i, name) in names.iter().enumerate() {
        groups
            .entry(uf.find(i))
            .or_default()
            .push(name.to_string());
    }
    groups
        .into_values()
        .map(|members| Circuit {
            name: members[0].clone(),
            members,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conns(pairs: &[(&str, &str)]) -> Vec<Connection> {
        pairs.iter().map(|(f, t)| Connection::new(*f, *t)).collect()
    }

    #[test]
    fn chain_sorts_in_dependency_order() {
        let g = build_graph(["c", "b", "a"], &conns(&[("a.o", "b.i"), ("b.o", "c.i")])).unwrap();
        assert_eq!(topological_sort(&g).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let g = build_graph(["x", "y", "z"], &[]).unwrap();
        assert_eq!(topological_sort(&g).unwrap(), ["x", "y", "z"]);

        // z and y both unblock when x is dequeued; y was declared first.
        let g = build_graph(["x", "y", "z"], &conns(&[("x.o", "z.i"), ("x.o", "y.i")])).unwrap();
        assert_eq!(topological_sort(&g).unwrap(), ["x", "y", "z"]);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let g = build_graph(
            ["a", "b"],
            &conns(&[("a.o1", "b.i1"), ("a.o2", "b.i2"), ("a.o1", "b.i3")]),
        )
        .unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.producers("b").unwrap().len(), 1);
    }

    #[test]
    fn dangling_reference_fails_build() {
        let err = build_graph(["a"], &conns(&[("a.o", "ghost.i")])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DanglingReference {
                from: "a.o".into(),
                to: "ghost.i".into(),
                missing: "ghost".into(),
            }
        );
    }

    #[test]
    fn malformed_key_fails_build() {
        let err = build_graph(["a"], &conns(&[("a", "a.i")])).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedKey { .. }));
    }

    #[test]
    fn cycle_reports_remainder_and_members() {
        // src -> a -> b -> a, b -> tail
        let g = build_graph(
            ["src", "a", "b", "tail"],
            &conns(&[("src.o", "a.i"), ("a.o", "b.i"), ("b.o", "a.j"), ("b.o", "tail.i")]),
        )
        .unwrap();
        let report = topological_sort(&g).unwrap_err();
        assert_eq!(report.unresolved, ["a", "b", "tail"]);
        assert_eq!(report.cycles, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = build_graph(["acc"], &conns(&[("acc.sum", "acc.prev")])).unwrap();
        let report = topological_sort(&g).unwrap_err();
        assert_eq!(report.cycles, vec![vec!["acc".to_string()]]);
    }

    #[test]
    fn manual_order_must_be_permutation() {
        let g = build_graph(["a", "b"], &conns(&[("a.o", "b.i"), ("b.o", "a.i")])).unwrap();
        let ok = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            resolve(&g, Some(&ok)).unwrap(),
            ExecutionOrder::Manual(ok.clone())
        );

        for bad in [vec!["a"], vec!["a", "a"], vec!["a", "b", "c"]] {
            let bad: Vec<String> = bad.into_iter().map(String::from).collect();
            assert!(validate_permutation(&g, &bad).is_err());
            assert!(matches!(resolve(&g, Some(&bad)), Err(GraphError::Cyclic(_))));
        }
    }

    #[test]
    fn invalid_manual_falls_back_to_automatic() {
        let g = build_graph(["a", "b"], &conns(&[("a.o", "b.i")])).unwrap();
        let stale = vec!["a".to_string(), "gone".to_string()];
        assert_eq!(
            resolve(&g, Some(&stale)).unwrap(),
            ExecutionOrder::Automatic(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn circuits_group_connected_instances() {
        let g = build_graph(
            ["pid1", "lone", "valve1", "tank1"],
            &conns(&[("pid1.mv", "valve1.t"), ("tank1.level", "pid1.pv")]),
        )
        .unwrap();
        let found = circuits(&g);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "pid1");
        assert_eq!(found[0].members, ["pid1", "valve1", "tank1"]);
        assert_eq!(found[1].members, ["lone"]);
    }
}
