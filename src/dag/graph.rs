// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::task_info::{TaskId, TaskSpec};
use crate::errors::{Result, TrigdagError};
use crate::pool::ResourcePools;

/// Internal node structure: the task plus immediate dependents.
#[derive(Debug, Clone)]
struct DagNode {
    spec: TaskSpec,
    /// Direct dependents: tasks that list this one in their `deps`.
    dependents: Vec<TaskId>,
}

/// Explicit, validated task graph.
///
/// Construction checks the structure without running any task logic, so a
/// malformed pipeline is rejected before anything is fetched.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Insertion order; used wherever iteration order must be deterministic.
    order: Vec<TaskId>,
    nodes: HashMap<TaskId, DagNode>,
    /// Alternative -> the race it belongs to.
    race_of: HashMap<TaskId, TaskId>,
}

impl TaskGraph {
    pub fn new(specs: Vec<TaskSpec>) -> Result<Self> {
        let mut order = Vec::with_capacity(specs.len());
        let mut nodes: HashMap<TaskId, DagNode> = HashMap::new();
        let mut outputs = HashMap::new();

        for spec in specs {
            if nodes.contains_key(&spec.id) {
                return Err(invalid(format!("duplicate task id '{}'", spec.id)));
            }
            if let Some(other) = outputs.insert(spec.output.clone(), spec.id.clone()) {
                return Err(invalid(format!(
                    "tasks '{other}' and '{}' both produce {}",
                    spec.id, spec.output
                )));
            }
            order.push(spec.id.clone());
            nodes.insert(
                spec.id.clone(),
                DagNode {
                    spec,
                    dependents: Vec::new(),
                },
            );
        }

        for id in order.iter() {
            let deps: Vec<TaskId> = nodes[id].spec.deps.values().cloned().collect();
            for dep in deps {
                if &dep == id {
                    return Err(invalid(format!("task '{id}' depends on itself")));
                }
                match nodes.get_mut(&dep) {
                    Some(node) => node.dependents.push(id.clone()),
                    None => {
                        return Err(invalid(format!(
                            "task '{id}' depends on unknown task '{dep}'"
                        )));
                    }
                }
            }
        }

        let race_of = validate_races(&order, &nodes)?;
        validate_acyclic(&order, &nodes)?;

        Ok(Self {
            order,
            nodes,
            race_of,
        })
    }

    /// Check that every pool named by a task exists.
    pub fn validate_pools(&self, pools: &ResourcePools) -> Result<()> {
        for spec in self.tasks() {
            if let Some(pool) = &spec.pool {
                if !pools.contains(pool) {
                    return Err(invalid(format!(
                        "task '{}' refers to unknown pool '{pool}'",
                        spec.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// All tasks, in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.order.iter().filter_map(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&TaskSpec> {
        self.nodes.get(id).map(|n| &n.spec)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &TaskId> {
        self.get(id).into_iter().flat_map(|s| s.deps.values())
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn alternatives_of(&self, id: &str) -> &[TaskId] {
        self.get(id)
            .map(|s| s.alternatives.as_slice())
            .unwrap_or(&[])
    }

    /// The race `id` is an alternative of, if any.
    pub fn race_of(&self, id: &str) -> Option<&TaskId> {
        self.race_of.get(id)
    }

    /// Roots plus everything they transitively need: dependencies and race
    /// alternatives. Returned in insertion order.
    pub fn closure(&self, roots: &[TaskId]) -> Result<Vec<TaskId>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for root in roots {
            if !self.nodes.contains_key(root) {
                return Err(TrigdagError::TaskNotFound(root.clone()));
            }
            stack.push(root.as_str());
        }

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.dependencies_of(id).map(String::as_str));
            stack.extend(self.alternatives_of(id).iter().map(String::as_str));
        }

        Ok(self
            .order
            .iter()
            .filter(|id| seen.contains(id.as_str()))
            .cloned()
            .collect())
    }

    /// Tasks nothing else depends on and that are not race alternatives.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.dependents_of(id).is_empty() && !self.race_of.contains_key(*id))
            .cloned()
            .collect()
    }
}

fn invalid(msg: String) -> TrigdagError {
    TrigdagError::InvalidGraph(msg)
}

fn validate_races(
    order: &[TaskId],
    nodes: &HashMap<TaskId, DagNode>,
) -> Result<HashMap<TaskId, TaskId>> {
    let mut race_of: HashMap<TaskId, TaskId> = HashMap::new();

    for id in order {
        let spec = &nodes[id].spec;
        if !spec.is_race() {
            continue;
        }
        if spec.pool.is_some() {
            return Err(invalid(format!("race '{id}' must not take a pool")));
        }
        for alt in spec.alternatives.iter() {
            let Some(alt_node) = nodes.get(alt) else {
                return Err(invalid(format!(
                    "race '{id}' lists unknown alternative '{alt}'"
                )));
            };
            if alt == id {
                return Err(invalid(format!("race '{id}' lists itself as an alternative")));
            }
            if alt_node.spec.is_race() {
                return Err(invalid(format!(
                    "race '{id}' lists race '{alt}' as an alternative"
                )));
            }
            if let Some(other) = race_of.insert(alt.clone(), id.clone()) {
                return Err(invalid(format!(
                    "task '{alt}' is an alternative of both '{other}' and '{id}'"
                )));
            }
        }
    }

    Ok(race_of)
}

fn validate_acyclic(order: &[TaskId], nodes: &HashMap<TaskId, DagNode>) -> Result<()> {
    // Edge direction: dep -> task. A race also waits on its alternatives'
    // outputs, so those add alt -> race.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in order {
        graph.add_node(id.as_str());
    }

    for id in order {
        let spec = &nodes[id].spec;
        for dep in spec.deps.values() {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
        for alt in spec.alternatives.iter() {
            graph.add_edge(alt.as_str(), id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(TrigdagError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
