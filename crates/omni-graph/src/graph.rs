use std::collections::{BTreeMap, BTreeSet, HashSet};

use omni_types::AgentMetadata;

use crate::error::{DependencyInfo, DependencyStatus, GraphError};

/// Dependency graph over registered agent metadata. Agents are added by
/// metadata alone (the graph never holds live agent instances) so it can be
/// built once at bootstrap and reused for visualization and diagnostics.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, Vec<String>>,
    provides: BTreeMap<String, Vec<String>>,
    names: BTreeMap<String, String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&mut self, metadata: &AgentMetadata) {
        self.dependencies
            .insert(metadata.id.clone(), metadata.dependencies.clone());
        self.provides
            .insert(metadata.id.clone(), metadata.provides.clone());
        self.names.insert(metadata.id.clone(), metadata.name.clone());
    }

    pub fn get_dependencies(&self, agent_id: &str) -> &[String] {
        self.dependencies
            .get(agent_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_dependents(&self, agent_id: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == agent_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn get_provides(&self, agent_id: &str) -> &[String] {
        self.provides
            .get(agent_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns validation errors (missing dependencies, cycles). Empty
    /// means the graph is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let all: HashSet<&str> = self.dependencies.keys().map(String::as_str).collect();

        for (agent_id, deps) in &self.dependencies {
            for dep in deps {
                if !all.contains(dep.as_str()) {
                    errors.push(format!(
                        "agent '{agent_id}' depends on '{dep}' which is not registered"
                    ));
                }
            }
        }

        if let Err(GraphError::CircularDependency { cycle }) = self.topological_sort_checked() {
            errors.push(GraphError::CircularDependency { cycle }.to_string());
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<(), GraphError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Validation { errors })
        }
    }

    pub fn find_missing_dependencies(&self, agent_id: &str) -> Vec<String> {
        let all: HashSet<&str> = self.dependencies.keys().map(String::as_str).collect();
        self.get_dependencies(agent_id)
            .iter()
            .filter(|d| !all.contains(d.as_str()))
            .cloned()
            .collect()
    }

    /// DFS with tri-color marking; returns the offending cycle (closing
    /// edge first) if one exists.
    pub fn detect_cycles(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: BTreeMap<&str, Color> = self
            .dependencies
            .keys()
            .map(|k| (k.as_str(), Color::White))
            .collect();
        let mut parent: BTreeMap<&str, Option<&str>> =
            self.dependencies.keys().map(|k| (k.as_str(), None)).collect();

        fn dfs<'a>(
            node: &'a str,
            deps: &'a BTreeMap<String, Vec<String>>,
            color: &mut BTreeMap<&'a str, Color>,
            parent: &mut BTreeMap<&'a str, Option<&'a str>>,
        ) -> Option<Vec<String>> {
            color.insert(node, Color::Gray);
            if let Some(neighbors) = deps.get(node) {
                for neighbor in neighbors {
                    let neighbor = neighbor.as_str();
                    let Some(&state) = color.get(neighbor) else {
                        continue;
                    };
                    match state {
                        Color::Gray => {
                            let mut cycle = vec![neighbor.to_string()];
                            let mut curr = node;
                            while curr != neighbor {
                                cycle.push(curr.to_string());
                                match parent.get(curr).copied().flatten() {
                                    Some(p) => curr = p,
                                    None => break,
                                }
                            }
                            cycle.reverse();
                            return Some(cycle);
                        }
                        Color::White => {
                            parent.insert(neighbor, Some(node));
                            if let Some(found) = dfs(neighbor, deps, color, parent) {
                                return Some(found);
                            }
                        }
                        Color::Black => {}
                    }
                }
            }
            color.insert(node, Color::Black);
            None
        }

        for agent_id in self.dependencies.keys() {
            if color.get(agent_id.as_str()) == Some(&Color::White) {
                if let Some(cycle) = dfs(agent_id, &self.dependencies, &mut color, &mut parent) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn topological_sort_checked(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for (id, deps) in &self.dependencies {
            let count = deps
                .iter()
                .filter(|d| self.dependencies.contains_key(d.as_str()))
                .count();
            in_degree.insert(id.as_str(), count);
        }

        // Tie-break by agent id (lexical ascending) once in-degree is
        // equal: see DESIGN.md's open-question decision on ordering.
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut result = Vec::new();
        while let Some(&node) = ready.iter().next() {
            ready.remove(node);
            result.push(node.to_string());

            for dependent in self.get_dependents(node) {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(self.dependencies.get_key_value(&dependent).unwrap().0);
                    }
                }
            }
        }

        if result.len() != self.dependencies.len() {
            if let Some(cycle) = self.detect_cycles() {
                return Err(GraphError::CircularDependency { cycle });
            }
            let remaining: Vec<String> = self
                .dependencies
                .keys()
                .filter(|id| !result.contains(id))
                .cloned()
                .collect();
            return Err(GraphError::CircularDependency { cycle: remaining });
        }

        Ok(result)
    }

    /// Kahn's algorithm on effective in-degree, tie-broken by agent id.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        self.topological_sort_checked()
    }

    pub fn get_initialization_order(&self) -> Result<Vec<String>, GraphError> {
        self.topological_sort()
    }

    pub fn get_all_transitive_dependencies(&self, agent_id: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<String> = self.get_dependencies(agent_id).to_vec();
        while let Some(dep) = stack.pop() {
            if visited.insert(dep.clone()) {
                stack.extend(self.get_dependencies(&dep).iter().cloned());
            }
        }
        visited
    }

    pub fn dependency_info(&self) -> BTreeMap<String, Vec<DependencyInfo>> {
        let all: HashSet<&str> = self.dependencies.keys().map(String::as_str).collect();
        let mut result = BTreeMap::new();
        for (agent_id, deps) in &self.dependencies {
            let mut infos = Vec::new();
            for dep in deps {
                let (status, provided) = if all.contains(dep.as_str()) {
                    (DependencyStatus::Satisfied, self.get_provides(dep).to_vec())
                } else {
                    (DependencyStatus::Missing, Vec::new())
                };
                infos.push(DependencyInfo {
                    agent_id: dep.clone(),
                    required_by: agent_id.clone(),
                    status,
                    provided_resources: provided,
                });
            }
            result.insert(agent_id.clone(), infos);
        }
        result
    }

    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["graph TD".to_string()];
        for (agent_id, name) in &self.names {
            let provides = self.get_provides(agent_id);
            let suffix = if provides.is_empty() {
                String::new()
            } else {
                format!("<br/>Provides: {}", provides.join(", "))
            };
            lines.push(format!("    {agent_id}[\"{name}{suffix}\"]"));
        }
        for (agent_id, deps) in &self.dependencies {
            for dep in deps {
                lines.push(format!("    {dep} --> {agent_id}"));
            }
        }
        lines.join("\n")
    }

    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            "digraph DependencyGraph {".to_string(),
            "    rankdir=TB;".to_string(),
            "    node [shape=box];".to_string(),
        ];
        for (agent_id, name) in &self.names {
            let label = name.replace('"', "\\\"");
            lines.push(format!("    \"{agent_id}\" [label=\"{label}\"];"));
        }
        for (agent_id, deps) in &self.dependencies {
            for dep in deps {
                lines.push(format!("    \"{dep}\" -> \"{agent_id}\";"));
            }
        }
        lines.push("}".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, deps: &[&str]) -> AgentMetadata {
        AgentMetadata {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            capabilities: vec![],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            provides: vec![],
            tags: vec![],
        }
    }

    #[test]
    fn detects_missing_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_agent(&meta("coding", &["context"]));
        let errors = graph.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("context"));
    }

    #[test]
    fn detects_cycle_between_two_agents() {
        let mut graph = DependencyGraph::new();
        graph.add_agent(&meta("a", &["b"]));
        graph.add_agent(&meta("b", &["a"]));
        let cycle = graph.detect_cycles().expect("cycle expected");
        let set: HashSet<_> = cycle.into_iter().collect();
        assert_eq!(set, HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(matches!(
            graph.topological_sort(),
            Err(GraphError::CircularDependency { .. })
        ));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_agent(&meta("context", &[]));
        graph.add_agent(&meta("rag", &[]));
        graph.add_agent(&meta("security", &["context", "rag"]));
        graph.add_agent(&meta("compliance", &["context", "rag"]));
        graph.add_agent(&meta("coding", &["context", "rag", "security"]));

        let order = graph.topological_sort().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

        assert!(pos("context") < pos("security"));
        assert!(pos("rag") < pos("security"));
        assert!(pos("context") < pos("compliance"));
        assert!(pos("security") < pos("coding"));
    }

    #[test]
    fn transitive_dependencies_include_indirect() {
        let mut graph = DependencyGraph::new();
        graph.add_agent(&meta("context", &[]));
        graph.add_agent(&meta("security", &["context"]));
        graph.add_agent(&meta("coding", &["security"]));

        let deps = graph.get_all_transitive_dependencies("coding");
        assert!(deps.contains("security"));
        assert!(deps.contains("context"));
    }

    /// Builds a DAG over `n` agents named `a0..an-1` where agent `i` may
    /// depend on any subset of `0..i` (chosen by `edge_bits`), guaranteeing
    /// acyclicity by construction.
    fn dag_from_bits(n: usize, edge_bits: &[bool]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let mut bit = 0;
        let mut deps_of: Vec<Vec<&str>> = vec![Vec::new(); n];
        let ids: Vec<String> = (0..n).map(|i| format!("a{i}")).collect();
        for i in 0..n {
            for j in 0..i {
                if edge_bits.get(bit).copied().unwrap_or(false) {
                    deps_of[i].push(ids[j].as_str());
                }
                bit += 1;
            }
        }
        for (i, id) in ids.iter().enumerate() {
            graph.add_agent(&meta(id, &deps_of[i]));
        }
        graph
    }

    proptest::proptest! {
        /// For every pair (a, b) where b depends on a, topological order
        /// places a strictly before b, for any acyclic dependency graph.
        #[test]
        fn topological_order_respects_every_edge(n in 2usize..8, seed in proptest::collection::vec(proptest::bool::ANY, 0..28)) {
            let graph = dag_from_bits(n, &seed);
            let order = graph.topological_sort().expect("dag_from_bits is acyclic by construction");
            let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

            for i in 0..n {
                let id = format!("a{i}");
                for dep in graph.get_dependencies(&id) {
                    prop_assert!(pos(dep) < pos(&id));
                }
            }
            prop_assert_eq!(order.len(), n);
        }
    }
}
