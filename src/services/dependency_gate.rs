use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::task::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// First dependency (in list order) that is not done, or is unknown.
    Blocked { dependency_id: String },
}

/// Decides whether a task's prerequisites are complete.
///
/// Statuses are snapshotted at construction: a task finishing later in the same
/// run does not unblock its dependents.
pub struct DependencyGate {
    statuses: HashMap<String, TaskStatus>,
}

impl DependencyGate {
    /// `known` covers tasks outside the batch; batch entries win on conflict.
    pub fn new(tasks: &[Task], known: &HashMap<String, TaskStatus>) -> Self {
        let mut statuses = known.clone();
        for task in tasks {
            statuses.insert(task.id.clone(), task.status);
        }
        Self { statuses }
    }

    pub fn check(&self, task: &Task) -> Eligibility {
        for dep_id in &task.dependencies {
            match self.statuses.get(dep_id) {
                Some(TaskStatus::Done) => continue,
                Some(status) => {
                    debug!(
                        target: "app::dependency",
                        task_id = %task.id,
                        dependency_id = %dep_id,
                        status = %status,
                        "dependency not done"
                    );
                    return Eligibility::Blocked {
                        dependency_id: dep_id.clone(),
                    };
                }
                None => {
                    debug!(
                        target: "app::dependency",
                        task_id = %task.id,
                        dependency_id = %dep_id,
                        "unknown dependency treated as unmet"
                    );
                    return Eligibility::Blocked {
                        dependency_id: dep_id.clone(),
                    };
                }
            }
        }
        Eligibility::Eligible
    }

    pub fn is_eligible(&self, task: &Task) -> bool {
        self.check(task) == Eligibility::Eligible
    }

    /// Fails with `CircularDependency` when the batch's dependency edges form a cycle.
    pub fn ensure_acyclic(tasks: &[Task]) -> AppResult<()> {
        match Self::find_cycle(tasks) {
            Some(cycle) => Err(AppError::circular_dependency(cycle)),
            None => Ok(()),
        }
    }

    /// Returns the first cycle found as a closed path (`a -> b -> a`).
    pub fn find_cycle(tasks: &[Task]) -> Option<Vec<String>> {
        let in_batch: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        // Edge dependency -> dependent, restricted to the batch.
        let mut adj_list: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in tasks {
            adj_list.entry(task.id.as_str()).or_default();
            for dep_id in &task.dependencies {
                if in_batch.contains(dep_id.as_str()) {
                    adj_list
                        .entry(dep_id.as_str())
                        .or_default()
                        .push(task.id.as_str());
                }
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task in tasks {
            let node = task.id.as_str();
            if !visited.contains(node) {
                if let Some(cycle) =
                    Self::dfs(node, &adj_list, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs<'a>(
        node: &'a str,
        adj_list: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(neighbors) = adj_list.get(node) {
            for &neighbor in neighbors {
                if !visited.contains(neighbor) {
                    if let Some(cycle) = Self::dfs(neighbor, adj_list, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(neighbor) {
                    let start = path.iter().position(|id| *id == neighbor).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|id| id.to_string()).collect();
                    cycle.push(neighbor.to_string());
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dependencies_is_always_eligible() {
        let task = Task::new("a", "A");
        let gate = DependencyGate::new(std::slice::from_ref(&task), &HashMap::new());
        assert!(gate.is_eligible(&task));
    }

    #[test]
    fn blocked_until_every_dependency_is_done() {
        let a = Task::new("a", "A").with_status(TaskStatus::Done);
        let b = Task::new("b", "B").with_status(TaskStatus::InProgress);
        let c = Task::new("c", "C").with_dependencies(["a", "b"]);
        let gate = DependencyGate::new(&[a, b, c.clone()], &HashMap::new());
        assert_eq!(
            gate.check(&c),
            Eligibility::Blocked {
                dependency_id: "b".to_string()
            }
        );
    }

    #[test]
    fn unknown_dependency_is_unmet() {
        let task = Task::new("a", "A").with_dependencies(["ghost"]);
        let gate = DependencyGate::new(std::slice::from_ref(&task), &HashMap::new());
        assert!(!gate.is_eligible(&task));
    }

    #[test]
    fn known_statuses_cover_tasks_outside_the_batch() {
        let task = Task::new("a", "A").with_dependencies(["external"]);
        let known = HashMap::from([("external".to_string(), TaskStatus::Done)]);
        let gate = DependencyGate::new(std::slice::from_ref(&task), &known);
        assert!(gate.is_eligible(&task));
    }

    #[test]
    fn detects_cycle_and_self_dependency() {
        let tasks = vec![
            Task::new("a", "A").with_dependencies(["c"]),
            Task::new("b", "B").with_dependencies(["a"]),
            Task::new("c", "C").with_dependencies(["b"]),
        ];
        let cycle = DependencyGate::find_cycle(&tasks).expect("cycle");
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);

        let selfish = vec![Task::new("x", "X").with_dependencies(["x"])];
        assert!(matches!(
            DependencyGate::ensure_acyclic(&selfish),
            Err(AppError::CircularDependency { .. })
        ));
    }

    #[test]
    fn chain_is_acyclic() {
        let tasks = vec![
            Task::new("a", "A"),
            Task::new("b", "B").with_dependencies(["a"]),
            Task::new("c", "C").with_dependencies(["a", "b", "outside"]),
        ];
        assert!(DependencyGate::ensure_acyclic(&tasks).is_ok());
    }
}
