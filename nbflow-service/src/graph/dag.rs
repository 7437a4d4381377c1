// Step DAG
// Dependency graph of the steps declared in a notebook

use crate::graph::maintainer::cell_step;
use crate::notebook::{CellId, NotebookHost};

use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Circular dependency detected between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub name: String,
    pub cell: CellId,
    pub dependencies: Vec<String>,
}

#[derive(Debug)]
pub struct DependencyGraph<T> {
    nodes: Vec<T>,
    adjacency: HashMap<usize, Vec<usize>>,
}

impl<T> DependencyGraph<T> {
    pub fn new(nodes: Vec<T>) -> Self {
        Self {
            nodes,
            adjacency: HashMap::new(),
        }
    }

    pub fn add_dependency(&mut self, from: usize, to: usize) {
        self.adjacency.entry(from).or_default().push(to);
    }

    fn in_degrees(&self) -> Vec<usize> {
        let mut in_degree = vec![0; self.nodes.len()];
        for deps in self.adjacency.values() {
            for &dep in deps {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree += 1;
                }
            }
        }
        in_degree
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// On a cycle, returns the indices of the nodes that could not be ordered.
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = self.in_degrees();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        let mut result = Vec::new();
        while let Some(node) = queue.pop_front() {
            result.push(node);
            if let Some(deps) = self.adjacency.get(&node) {
                for &dep in deps {
                    in_degree[dep] -= 1;
                    if in_degree[dep] == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let ordered: HashSet<usize> = result.into_iter().collect();
            return Err((0..self.nodes.len())
                .filter(|i| !ordered.contains(i))
                .collect());
        }

        Ok(result)
    }

    /// Nodes grouped by the level at which all their dependencies are met
    pub fn get_execution_levels(&self) -> Result<Vec<Vec<usize>>, Vec<usize>> {
        let mut in_degree = self.in_degrees();
        let mut levels = Vec::new();
        let mut processed = HashSet::new();

        while processed.len() < self.nodes.len() {
            let current_level: Vec<usize> = (0..self.nodes.len())
                .filter(|i| !processed.contains(i) && in_degree[*i] == 0)
                .collect();

            if current_level.is_empty() {
                return Err((0..self.nodes.len())
                    .filter(|i| !processed.contains(i))
                    .collect());
            }

            for &node in &current_level {
                processed.insert(node);
                if let Some(deps) = self.adjacency.get(&node) {
                    for &dep in deps {
                        in_degree[dep] -= 1;
                    }
                }
            }

            levels.push(current_level);
        }

        Ok(levels)
    }

    pub fn get_node(&self, index: usize) -> Option<&T> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Graph of real steps; reserved and merged cells are not nodes
#[derive(Debug)]
pub struct StepDag {
    graph: DependencyGraph<StepNode>,
}

impl StepDag {
    /// Build the graph from a notebook
    ///
    /// The first cell declaring a name owns it. Edges to names that no
    /// cell declares are ignored.
    pub fn from_host<H: NotebookHost + ?Sized>(host: &H) -> Self {
        let mut nodes: Vec<StepNode> = Vec::new();
        let mut indices: HashMap<String, usize> = HashMap::new();

        for cell in host.cell_ids() {
            let Some(step) = cell_step(host, cell) else {
                continue;
            };
            if !step.is_step() || indices.contains_key(&step.step_name) {
                continue;
            }
            indices.insert(step.step_name.clone(), nodes.len());
            nodes.push(StepNode {
                name: step.step_name,
                cell,
                dependencies: step.dependencies,
            });
        }

        let mut graph = DependencyGraph::new(nodes.clone());
        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&dep_index) = indices.get(dep) {
                    graph.add_dependency(dep_index, i);
                }
            }
        }

        Self { graph }
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Step names in an order that respects every dependency
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.graph
            .topological_sort()
            .map(|order| self.names(&order))
            .map_err(|stuck| GraphError::Cycle(self.names(&stuck)))
    }

    /// Step names grouped into levels that could run in parallel
    pub fn execution_levels(&self) -> Result<Vec<Vec<String>>, GraphError> {
        self.graph
            .get_execution_levels()
            .map(|levels| levels.iter().map(|level| self.names(level)).collect())
            .map_err(|stuck| GraphError::Cycle(self.names(&stuck)))
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&i| self.graph.get_node(i))
            .map(|node| node.name.clone())
            .collect()
    }
}
