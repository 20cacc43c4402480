//! Dependency graph over a period's tasks.
//!
//! Nodes live in an arena indexed by position; an id→index map gives O(1)
//! lookups and both edge directions are kept as index lists.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use closeman_core::{CloseError, Task, TaskCategory, TaskId};
use tracing::{debug, warn};

/// One task as seen by the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Task id
    pub id: TaskId,
    /// Task name
    pub name: String,
    /// Category tag
    pub category: TaskCategory,
    /// Template day offset
    pub day: u32,
    /// Ids this task depends on
    pub dependencies: Vec<TaskId>,
}

impl GraphNode {
    /// Project a task onto its graph node.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            category: task.category,
            day: task.scheduled_day,
            dependencies: task.dependencies.clone(),
        }
    }
}

/// Directed acyclic graph of task dependencies.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<TaskId, usize>,
    /// node -> [dependencies]
    predecessors: Vec<Vec<usize>>,
    /// node -> [dependents]
    successors: Vec<Vec<usize>>,
    /// (task, missing dependency) pairs dropped while building
    dangling: Vec<(TaskId, TaskId)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Build the graph, rejecting duplicate ids and dependency cycles.
    ///
    /// Dependencies on ids outside the node set are dropped and reported by
    /// [`DependencyGraph::dangling_edges`].
    pub fn build(nodes: Vec<GraphNode>) -> Result<Self, CloseError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id, i).is_some() {
                return Err(CloseError::validation(format!(
                    "Duplicate task id {} ('{}')",
                    node.id, node.name
                )));
            }
        }

        let mut predecessors = vec![Vec::new(); nodes.len()];
        let mut successors = vec![Vec::new(); nodes.len()];
        let mut dangling = Vec::new();

        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                let Some(&d) = index.get(dep) else {
                    warn!(task = %node.name, dependency = %dep, "Dropping edge to unknown task");
                    dangling.push((node.id, *dep));
                    continue;
                };
                if !predecessors[i].contains(&d) {
                    predecessors[i].push(d);
                    successors[d].push(i);
                }
            }
        }

        let graph = Self {
            nodes,
            index,
            predecessors,
            successors,
            dangling,
        };

        if let Some(cycle) = graph.find_cycle() {
            return Err(CloseError::CycleDetected { path: cycle });
        }

        debug!(nodes = graph.nodes.len(), "Built dependency graph");
        Ok(graph)
    }

    /// Build the graph over a period's tasks.
    pub fn from_tasks(tasks: &[Task]) -> Result<Self, CloseError> {
        Self::build(tasks.iter().map(GraphNode::from_task).collect())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Node at an arena index.
    pub fn node(&self, idx: usize) -> &GraphNode {
        &self.nodes[idx]
    }

    /// Arena index of a task id.
    pub fn index_of(&self, id: TaskId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Node for a task id.
    pub fn get(&self, id: TaskId) -> Option<&GraphNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Direct dependencies of a task.
    pub fn predecessors(&self, id: TaskId) -> Vec<&GraphNode> {
        self.index_of(id)
            .map(|i| self.predecessors[i].iter().map(|&p| &self.nodes[p]).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a task.
    pub fn successors(&self, id: TaskId) -> Vec<&GraphNode> {
        self.index_of(id)
            .map(|i| self.successors[i].iter().map(|&s| &self.nodes[s]).collect())
            .unwrap_or_default()
    }

    /// Direct dependency indices of the node at `idx`.
    pub fn predecessor_indices(&self, idx: usize) -> &[usize] {
        &self.predecessors[idx]
    }

    /// Direct dependent indices of the node at `idx`.
    pub fn successor_indices(&self, idx: usize) -> &[usize] {
        &self.successors[idx]
    }

    /// Edges dropped because the dependency was not part of the node set.
    pub fn dangling_edges(&self) -> &[(TaskId, TaskId)] {
        &self.dangling
    }

    /// Every direct or transitive dependency of the node at `idx`, each
    /// listed once.
    pub fn ancestors(&self, idx: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self.predecessors[idx].clone();
        let mut out = Vec::new();

        while let Some(p) = stack.pop() {
            if std::mem::replace(&mut seen[p], true) {
                continue;
            }
            out.push(p);
            stack.extend(self.predecessors[p].iter().copied().filter(|&q| !seen[q]));
        }
        out
    }

    /// Deterministic tie-break key: scheduled day, then name.
    pub fn order_key(&self, idx: usize) -> (u32, &str) {
        let node = &self.nodes[idx];
        (node.day, node.name.as_str())
    }

    /// Arena indices in dependency order (Kahn's algorithm).
    ///
    /// Among tasks that are ready at the same time the one with the smaller
    /// scheduled day goes first, then the lexically smaller name.
    pub fn topological_indices(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(u32, &str, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| {
                let (day, name) = self.order_key(i);
                Reverse((day, name, i))
            })
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, i))) = ready.pop() {
            order.push(i);
            for &s in &self.successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    let (day, name) = self.order_key(s);
                    ready.push(Reverse((day, name, s)));
                }
            }
        }
        order
    }

    /// Task ids in dependency order.
    pub fn topological_order(&self) -> Vec<TaskId> {
        self.topological_indices()
            .into_iter()
            .map(|i| self.nodes[i].id)
            .collect()
    }

    /// Check that no task is scheduled on an earlier day than one of its
    /// dependencies.
    pub fn verify_day_order(&self) -> Result<(), CloseError> {
        for (i, node) in self.nodes.iter().enumerate() {
            for &p in &self.predecessors[i] {
                let dep = &self.nodes[p];
                if dep.day > node.day {
                    return Err(CloseError::Template(format!(
                        "'{}' (T+{}) is scheduled before its dependency '{}' (T+{})",
                        node.name, node.day, dep.name, dep.day
                    )));
                }
            }
        }
        Ok(())
    }

    /// Depth-first search for a back edge; returns the cycle as task names
    /// with the first name repeated at the end.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<String>> {
        marks[node] = Mark::OnStack;
        path.push(node);

        for &dep in &self.predecessors[node] {
            match marks[dep] {
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::OnStack => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&n| self.nodes[n].name.clone())
                        .collect();
                    cycle.push(self.nodes[dep].name.clone());
                    return Some(cycle);
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, day: u32, deps: &[TaskId]) -> GraphNode {
        GraphNode {
            id: TaskId::new(),
            name: name.to_string(),
            category: TaskCategory::Reconciliation,
            day,
            dependencies: deps.to_vec(),
        }
    }

    fn names(graph: &DependencyGraph, ids: &[TaskId]) -> Vec<String> {
        ids.iter().map(|id| graph.get(*id).unwrap().name.clone()).collect()
    }

    #[test]
    fn test_topological_order_respects_edges_and_tie_breaks() {
        let cash = node("Record cash", 1, &[]);
        let accruals = node("Run AP accruals", 1, &[]);
        let bank = node("Bank rec", 2, &[cash.id]);
        let ap = node("AP rec", 2, &[accruals.id]);
        let bs = node("Balance sheet recs", 3, &[bank.id, ap.id]);
        let equity = node("Equity roll-forward", 4, &[]);

        let graph = DependencyGraph::build(vec![
            bs.clone(),
            equity,
            bank,
            ap,
            cash,
            accruals,
        ])
        .unwrap();

        let order = names(&graph, &graph.topological_order());
        assert_eq!(
            order,
            vec![
                "Record cash",
                "Run AP accruals",
                "AP rec",
                "Bank rec",
                "Balance sheet recs",
                "Equity roll-forward",
            ]
        );
    }

    #[test]
    fn test_predecessors_and_successors() {
        let a = node("A", 1, &[]);
        let b = node("B", 2, &[a.id]);
        let c = node("C", 2, &[a.id]);
        let graph = DependencyGraph::build(vec![a.clone(), b.clone(), c.clone()]).unwrap();

        let succ: Vec<_> = graph.successors(a.id).iter().map(|n| n.name.clone()).collect();
        assert_eq!(succ, vec!["B", "C"]);
        assert_eq!(graph.predecessors(b.id)[0].id, a.id);
        assert!(graph.predecessors(a.id).is_empty());
        assert!(graph.predecessors(TaskId::new()).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut a = node("A", 1, &[]);
        let b = node("B", 1, &[a.id]);
        let c = node("C", 1, &[b.id]);
        a.dependencies.push(c.id);

        let err = DependencyGraph::build(vec![a, b, c]).unwrap_err();
        match err {
            CloseError::CycleDetected { path } => {
                assert_eq!(path.len(), 4);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut a = node("A", 1, &[]);
        a.dependencies.push(a.id);
        let err = DependencyGraph::build(vec![a]).unwrap_err();
        assert_eq!(
            err,
            CloseError::CycleDetected {
                path: vec!["A".to_string(), "A".to_string()]
            }
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = node("A", 1, &[]);
        let mut b = node("B", 1, &[]);
        b.id = a.id;
        let err = DependencyGraph::build(vec![a, b]).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_dangling_edges_are_dropped() {
        let ghost = TaskId::new();
        let a = node("A", 1, &[ghost]);
        let graph = DependencyGraph::build(vec![a.clone()]).unwrap();
        assert_eq!(graph.dangling_edges(), &[(a.id, ghost)]);
        assert!(graph.predecessors(a.id).is_empty());
    }

    #[test]
    fn test_ancestors_are_transitive_and_unique() {
        let a = node("A", 1, &[]);
        let b = node("B", 2, &[a.id]);
        let c = node("C", 2, &[a.id]);
        let d = node("D", 3, &[b.id, c.id]);
        let graph = DependencyGraph::build(vec![a, b, c, d.clone()]).unwrap();

        let mut ancestors: Vec<_> = graph
            .ancestors(graph.index_of(d.id).unwrap())
            .into_iter()
            .map(|i| graph.node(i).name.clone())
            .collect();
        ancestors.sort();
        assert_eq!(ancestors, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_verify_day_order() {
        let a = node("A", 3, &[]);
        let b = node("B", 2, &[a.id]);
        let graph = DependencyGraph::build(vec![a, b]).unwrap();
        let err = graph.verify_day_order().unwrap_err();
        assert_eq!(err.kind(), "TemplateError");
        assert!(err.to_string().contains("'B' (T+2)"));
    }
}
