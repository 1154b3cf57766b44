use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::model::{ElementId, ElementType, Endpoint};
use crate::store::Plan;

/// Why a requested connection was refused. Each variant carries a stable
/// machine-readable code for callers that key behavior off the reason; the
/// `Display` text is the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("an element cannot be connected to itself")]
    SelfConnection,
    #[error("only elements of the same type can be connected (task to task, stage to stage)")]
    TypeMismatch,
    #[error("tasks outside any stage cannot take part in connections")]
    UnassignedTask,
    #[error("connections between tasks in different stages are not allowed")]
    CrossStageConnection,
    #[error("generated elements cannot gain new predecessors")]
    UneditablePredecessor,
    #[error("this connection would create a circular dependency")]
    CycleDetected,
}

impl RejectReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::SelfConnection => "self_connection",
            Self::TypeMismatch => "type_mismatch",
            Self::UnassignedTask => "unassigned_task",
            Self::CrossStageConnection => "cross_stage_connection",
            Self::UneditablePredecessor => "uneditable_predecessor",
            Self::CycleDetected => "cycle_detected",
        }
    }
}

/// Gate a candidate connection `from -> to` against the committed graph.
/// Checks run in a fixed order and stop at the first violation; the
/// candidate edge itself is never part of the cycle search.
pub fn validate_connection(plan: &Plan, from: Endpoint, to: Endpoint) -> Result<(), RejectReason> {
    if from.element_id == to.element_id && from.element_type == to.element_type {
        return Err(RejectReason::SelfConnection);
    }
    if from.element_type != to.element_type {
        return Err(RejectReason::TypeMismatch);
    }

    match from.element_type {
        ElementType::Task => {
            let from_stage = plan
                .task(from.element_id)
                .and_then(|t| t.stage_id)
                .ok_or(RejectReason::UnassignedTask)?;
            let to_stage = plan
                .task(to.element_id)
                .and_then(|t| t.stage_id)
                .ok_or(RejectReason::UnassignedTask)?;
            if from_stage != to_stage {
                return Err(RejectReason::CrossStageConnection);
            }
            // A generated task keeps its predecessor set frozen; it may
            // still act as a predecessor of editable tasks.
            if plan.task(to.element_id).is_some_and(|t| !t.is_editable) {
                return Err(RejectReason::UneditablePredecessor);
            }
        }
        ElementType::Stage => {
            if plan.stage(to.element_id).is_some_and(|s| !s.is_editable) {
                return Err(RejectReason::UneditablePredecessor);
            }
        }
    }

    if has_path(
        &plan.adjacency(from.element_type),
        to.element_id,
        from.element_id,
    ) {
        return Err(RejectReason::CycleDetected);
    }
    Ok(())
}

/// Reachability over a successor map: is `target` reachable from `start`?
/// Iterative depth-first search with a visited set, O(V+E).
pub fn has_path(
    adjacency: &BTreeMap<ElementId, Vec<ElementId>>,
    start: ElementId,
    target: ElementId,
) -> bool {
    if start == target {
        return false;
    }
    let mut visited: BTreeSet<ElementId> = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(successors) = adjacency.get(&current) {
            for successor in successors {
                if !visited.contains(successor) {
                    stack.push(*successor);
                }
            }
        }
    }
    false
}

/// A simple cycle found by the bulk scan, as the id path that closes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub element_type: ElementType,
    pub path: Vec<ElementId>,
}

/// Full-graph cycle scan over the node-embedded successor arrays, one pass
/// per element type. Used for save-time diagnostics; connection gating
/// never relies on it.
pub fn detect_cycles(plan: &Plan) -> Vec<Cycle> {
    let mut cycles = Vec::new();

    let stage_adjacency: BTreeMap<ElementId, Vec<ElementId>> = plan
        .stages
        .iter()
        .map(|s| (s.id, s.successor_stages.clone()))
        .collect();
    for path in find_cycles(&stage_adjacency) {
        cycles.push(Cycle {
            element_type: ElementType::Stage,
            path,
        });
    }

    let task_adjacency: BTreeMap<ElementId, Vec<ElementId>> = plan
        .tasks()
        .map(|t| (t.id, t.successor_tasks.clone()))
        .collect();
    for path in find_cycles(&task_adjacency) {
        cycles.push(Cycle {
            element_type: ElementType::Task,
            path,
        });
    }

    cycles
}

fn find_cycles(adjacency: &BTreeMap<ElementId, Vec<ElementId>>) -> Vec<Vec<ElementId>> {
    let mut visited: BTreeSet<ElementId> = BTreeSet::new();
    let mut on_stack: BTreeSet<ElementId> = BTreeSet::new();
    let mut path: Vec<ElementId> = Vec::new();
    let mut cycles: Vec<Vec<ElementId>> = Vec::new();

    fn dfs(
        node: ElementId,
        adjacency: &BTreeMap<ElementId, Vec<ElementId>>,
        visited: &mut BTreeSet<ElementId>,
        on_stack: &mut BTreeSet<ElementId>,
        path: &mut Vec<ElementId>,
        cycles: &mut Vec<Vec<ElementId>>,
    ) {
        if on_stack.contains(&node) {
            if let Some(start) = path.iter().position(|id| *id == node) {
                cycles.push(path[start..].to_vec());
            }
            return;
        }
        if !visited.insert(node) {
            return;
        }
        on_stack.insert(node);
        path.push(node);
        if let Some(successors) = adjacency.get(&node) {
            for successor in successors {
                dfs(*successor, adjacency, visited, on_stack, path, cycles);
            }
        }
        path.pop();
        on_stack.remove(&node);
    }

    for node in adjacency.keys() {
        if !visited.contains(node) {
            dfs(
                *node,
                adjacency,
                &mut visited,
                &mut on_stack,
                &mut path,
                &mut cycles,
            );
        }
    }
    cycles
}
