use std::collections::{HashMap, HashSet, VecDeque};

/// A name-based DAG over declarations. Edges point from a declaration to the
/// declarations it depends on (`depends_on`, `derives_from`, free identifiers in
/// branch conditions and impact formulas). Cross-references are names, not
/// pointers, so the calibrator can hand back a shallow-copied AST cheaply.
#[derive(Debug, Clone, Default)]
pub struct CausalGraph {
    edges: HashMap<String, Vec<String>>,
}

impl CausalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        let entry = self.edges.entry(from.to_string()).or_default();
        if !entry.iter().any(|n| n == to) {
            entry.push(to.to_string());
        }
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Kahn's algorithm. On success returns nodes in dependency-first (topological)
    /// order; on a cycle returns the names of the nodes still unresolved, which are
    /// exactly the cycle's members (plus anything only reachable through the cycle).
    pub fn topological_sort(&self) -> Result<Vec<String>, Vec<String>> {
        // Edges run from dependent -> dependency, so we want nodes with zero
        // *outgoing unresolved* dependencies first: run Kahn's over the reverse
        // adjacency (dependency -> dependents).
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut remaining_deps: HashMap<&str, usize> = HashMap::new();
        for (name, deps) in &self.edges {
            remaining_deps.insert(name.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }
        for name in self.edges.keys() {
            remaining_deps.entry(name.as_str()).or_insert(0);
        }

        // Deterministic order regardless of HashMap iteration order.
        let mut initial: Vec<&str> = remaining_deps
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&name, _)| name)
            .collect();
        initial.sort_unstable();
        let mut queue: VecDeque<&str> = initial.into();

        let mut order = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }
            order.push(name.to_string());
            if let Some(deps) = dependents.get(name) {
                let mut newly_ready = Vec::new();
                for &dependent in deps {
                    if let Some(count) = remaining_deps.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            newly_ready.push(dependent);
                        }
                    }
                }
                newly_ready.sort_unstable();
                for n in newly_ready {
                    queue.push_back(n);
                }
            }
        }

        if order.len() == self.edges.len() {
            Ok(order)
        } else {
            let unresolved: Vec<String> =
                self.edges.keys().filter(|n| !visited.contains(n.as_str())).cloned().collect();
            Err(unresolved)
        }
    }
}
