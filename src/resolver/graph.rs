//! Cyclic-set computation over the module dependency graph.
//!
//! Dependency references, module-level and extension-level alike, are the
//! directed edges of a graph over the candidate module set. Every module in a
//! strongly connected component of size greater than one (or with a
//! self-reference) is part of a dependency cycle; all members of a component
//! share the same cyclic set, so pruning can remove the whole set in one step
//! instead of reprocessing it member by member.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::catalog::Module;
use crate::core::ModuleId;

/// Compute the cyclic set for every candidate module that is part of one.
///
/// Edges only exist between modules present in `candidates`; a reference to
/// an id outside the set is a missing dependency, not a graph edge. The
/// returned map is empty when the candidate graph is acyclic.
pub fn cyclic_sets(candidates: &[Arc<Module>]) -> HashMap<ModuleId, BTreeSet<ModuleId>> {
    let mut graph: DiGraph<ModuleId, ()> = DiGraph::new();
    let mut nodes: HashMap<&ModuleId, NodeIndex> = HashMap::with_capacity(candidates.len());

    for module in candidates {
        let index = graph.add_node(module.id().clone());
        nodes.insert(module.id(), index);
    }
    for module in candidates {
        let from = nodes[module.id()];
        for target in module.descriptor().all_dependency_targets() {
            if let Some(&to) = nodes.get(target)
                && !graph.contains_edge(from, to)
            {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut sets = HashMap::new();
    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component.first().is_some_and(|&n| graph.contains_edge(n, n));
        if !is_cycle {
            continue;
        }
        let members: BTreeSet<ModuleId> =
            component.iter().map(|&n| graph[n].clone()).collect();
        for member in &members {
            sets.insert(member.clone(), members.clone());
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ArchiveFileName, MetadataDocument, ModuleDescriptor, Status};

    fn module(id: &str, deps: &[&str]) -> Arc<Module> {
        let toml = if deps.is_empty() {
            String::new()
        } else {
            let entries: Vec<String> =
                deps.iter().map(|d| format!("[[dependencies.addons]]\nid = \"{d}\"\n")).collect();
            entries.join("\n")
        };
        let doc = MetadataDocument::parse_toml(&toml, "test.sap").unwrap();
        let descriptor = ModuleDescriptor::from_metadata(
            ArchiveFileName {
                id: ModuleId::new(id),
                status: Status::Release,
                package_version: 1,
            },
            &doc,
            "test.sap",
        )
        .unwrap();
        Arc::new(Module::available(descriptor, 0, None, None))
    }

    #[test]
    fn acyclic_graph_has_no_sets() {
        let candidates = vec![module("a", &["b"]), module("b", &["c"]), module("c", &[])];
        assert!(cyclic_sets(&candidates).is_empty());
    }

    #[test]
    fn three_cycle_reports_identical_sets_for_all_members() {
        let candidates = vec![module("a", &["b"]), module("b", &["c"]), module("c", &["a"])];
        let sets = cyclic_sets(&candidates);
        assert_eq!(sets.len(), 3);
        let expected: BTreeSet<ModuleId> =
            ["a", "b", "c"].iter().map(|s| ModuleId::new(*s)).collect();
        for id in ["a", "b", "c"] {
            assert_eq!(sets[&ModuleId::new(id)], expected);
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let candidates = vec![module("selfish", &["selfish"])];
        let sets = cyclic_sets(&candidates);
        assert_eq!(sets.len(), 1);
        assert!(sets[&ModuleId::new("selfish")].contains("selfish"));
    }

    #[test]
    fn edge_to_absent_module_is_not_a_cycle() {
        // "a" references "ghost" which is not in the candidate set.
        let candidates = vec![module("a", &["ghost"])];
        assert!(cyclic_sets(&candidates).is_empty());
    }

    #[test]
    fn modules_outside_the_component_are_unaffected() {
        let candidates = vec![
            module("a", &["b"]),
            module("b", &["a"]),
            module("bystander", &["a"]),
        ];
        let sets = cyclic_sets(&candidates);
        assert_eq!(sets.len(), 2);
        assert!(!sets.contains_key(&ModuleId::new("bystander")));
    }
}
