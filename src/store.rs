use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::model::{Connection, ElementId, ElementType, Endpoint, Stage, Task};

/// Which side of a task lookup the task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHome {
    Stage(ElementId),
    Unassigned,
}

/// The authoritative mutable store: stages (owning their tasks), the
/// unassigned task pool, and the connection list. The connection list is
/// the single source of truth for edges; the predecessor/successor arrays
/// on stages and tasks are a derived view that is only ever touched through
/// `apply_relation_delta`, so the two representations cannot drift.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub project_id: Option<i64>,
    pub stages: Vec<Stage>,
    pub unassigned: Vec<Task>,
    pub connections: Vec<Connection>,
    connection_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationDelta {
    Attach,
    Detach,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- lookups -----------------------------------------------------

    pub fn stage(&self, id: ElementId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_mut(&mut self, id: ElementId) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    pub fn task(&self, id: ElementId) -> Option<&Task> {
        self.stages
            .iter()
            .flat_map(|s| s.tasks.iter())
            .chain(self.unassigned.iter())
            .find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: ElementId) -> Option<&mut Task> {
        self.stages
            .iter_mut()
            .flat_map(|s| s.tasks.iter_mut())
            .chain(self.unassigned.iter_mut())
            .find(|t| t.id == id)
    }

    /// Where the task currently lives. None when the id is unknown.
    pub fn task_home(&self, id: ElementId) -> Option<TaskHome> {
        for stage in &self.stages {
            if stage.tasks.iter().any(|t| t.id == id) {
                return Some(TaskHome::Stage(stage.id));
            }
        }
        if self.unassigned.iter().any(|t| t.id == id) {
            return Some(TaskHome::Unassigned);
        }
        None
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages
            .iter()
            .flat_map(|s| s.tasks.iter())
            .chain(self.unassigned.iter())
    }

    pub fn contains(&self, endpoint: Endpoint) -> bool {
        match endpoint.element_type {
            ElementType::Stage => self.stage(endpoint.element_id).is_some(),
            ElementType::Task => self.task(endpoint.element_id).is_some(),
        }
    }

    // ---- id allocation -----------------------------------------------

    /// Next transient (negative) id: one below the smallest id in use.
    pub fn next_transient_id(&self) -> ElementId {
        let mut min = 0;
        for stage in &self.stages {
            min = min.min(stage.id);
            for task in &stage.tasks {
                min = min.min(task.id);
            }
        }
        for task in &self.unassigned {
            min = min.min(task.id);
        }
        min - 1
    }

    fn next_connection_id(&mut self) -> String {
        self.connection_seq += 1;
        format!("conn-{}", self.connection_seq)
    }

    // ---- relation delta ----------------------------------------------

    /// The one mutation path for the node-embedded predecessor/successor
    /// arrays. Mixed-type endpoint pairs are ignored: a connection never
    /// joins different element types, and relation arrays hold same-type
    /// ids only.
    pub fn apply_relation_delta(&mut self, from: Endpoint, to: Endpoint, delta: RelationDelta) {
        if from.element_type != to.element_type {
            return;
        }
        match from.element_type {
            ElementType::Task => {
                if let Some(task) = self.task_mut(from.element_id) {
                    edit_relation(&mut task.successor_tasks, to.element_id, delta);
                }
                if let Some(task) = self.task_mut(to.element_id) {
                    edit_relation(&mut task.predecessor_tasks, from.element_id, delta);
                }
            }
            ElementType::Stage => {
                if let Some(stage) = self.stage_mut(from.element_id) {
                    edit_relation(&mut stage.successor_stages, to.element_id, delta);
                }
                if let Some(stage) = self.stage_mut(to.element_id) {
                    edit_relation(&mut stage.predecessor_stages, from.element_id, delta);
                }
            }
        }
    }

    // ---- connection store --------------------------------------------

    /// Insert a connection that has already passed validation and keep the
    /// relation arrays in sync. Returns the new connection id.
    pub fn add_connection(&mut self, from: Endpoint, to: Endpoint) -> String {
        let id = self.next_connection_id();
        self.connections.push(Connection { id: id.clone(), from, to });
        self.apply_relation_delta(from, to, RelationDelta::Attach);
        debug!(
            "connection {} added: {:?} {} -> {}",
            id,
            from.element_type,
            from.element_id,
            to.element_id
        );
        id
    }

    pub fn remove_connection(&mut self, connection_id: &str) -> bool {
        let Some(idx) = self.connections.iter().position(|c| c.id == connection_id) else {
            return false;
        };
        let connection = self.connections.remove(idx);
        self.apply_relation_delta(connection.from, connection.to, RelationDelta::Detach);
        true
    }

    pub fn find_connection(
        &self,
        from_id: ElementId,
        to_id: ElementId,
        ty: ElementType,
    ) -> Option<&Connection> {
        self.connections.iter().find(|c| {
            c.from.element_type == ty
                && c.to.element_type == ty
                && c.from.element_id == from_id
                && c.to.element_id == to_id
        })
    }

    /// Ids of every connection with the given element on either end.
    pub fn connections_touching(&self, element_id: ElementId, ty: ElementType) -> Vec<String> {
        self.connections
            .iter()
            .filter(|c| {
                (c.from.element_type == ty && c.from.element_id == element_id)
                    || (c.to.element_type == ty && c.to.element_id == element_id)
            })
            .map(|c| c.id.clone())
            .collect()
    }

    /// Remove every connection touching the task, cleaning the reciprocal
    /// relation entries on the surviving neighbors. Returns the number of
    /// connections removed.
    pub fn remove_all_task_connections(&mut self, task_id: ElementId) -> usize {
        let ids = self.connections_touching(task_id, ElementType::Task);
        let removed = ids.len();
        for id in ids {
            self.remove_connection(&id);
        }
        if let Some(task) = self.task_mut(task_id) {
            task.predecessor_tasks.clear();
            task.successor_tasks.clear();
        }
        removed
    }

    pub fn remove_all_stage_connections(&mut self, stage_id: ElementId) -> usize {
        let ids = self.connections_touching(stage_id, ElementType::Stage);
        let removed = ids.len();
        for id in ids {
            self.remove_connection(&id);
        }
        if let Some(stage) = self.stage_mut(stage_id) {
            stage.predecessor_stages.clear();
            stage.successor_stages.clear();
        }
        removed
    }

    /// Adjacency (successor map) derived from the committed connections of
    /// one element type.
    pub fn adjacency(&self, ty: ElementType) -> BTreeMap<ElementId, Vec<ElementId>> {
        let mut map: BTreeMap<ElementId, Vec<ElementId>> = BTreeMap::new();
        for connection in &self.connections {
            if connection.from.element_type != ty || connection.to.element_type != ty {
                continue;
            }
            let successors = map.entry(connection.from.element_id).or_default();
            if !successors.contains(&connection.to.element_id) {
                successors.push(connection.to.element_id);
            }
        }
        map
    }

    // ---- element lifecycle -------------------------------------------

    pub fn add_stage(&mut self, stage: Stage) -> ElementId {
        let id = stage.id;
        self.stages.push(stage);
        id
    }

    pub fn add_unassigned_task(&mut self, mut task: Task) -> ElementId {
        task.stage_id = None;
        task.is_valid_position = false;
        let id = task.id;
        self.unassigned.push(task);
        id
    }

    pub fn add_task_to_stage(&mut self, stage_id: ElementId, mut task: Task) -> Option<ElementId> {
        let stage = self.stage_mut(stage_id)?;
        task.stage_id = Some(stage_id);
        let id = task.id;
        stage.tasks.push(task);
        Some(id)
    }

    /// Detach a task from wherever it currently lives.
    fn take_task(&mut self, task_id: ElementId) -> Option<Task> {
        for stage in &mut self.stages {
            if let Some(idx) = stage.tasks.iter().position(|t| t.id == task_id) {
                return Some(stage.tasks.remove(idx));
            }
        }
        if let Some(idx) = self.unassigned.iter().position(|t| t.id == task_id) {
            return Some(self.unassigned.remove(idx));
        }
        None
    }

    /// Move a task into a stage's task list, maintaining the mutual
    /// exclusivity of stage membership and the unassigned pool.
    pub fn assign_task(&mut self, task_id: ElementId, stage_id: ElementId) -> bool {
        if self.stage(stage_id).is_none() {
            return false;
        }
        let Some(mut task) = self.take_task(task_id) else {
            return false;
        };
        task.stage_id = Some(stage_id);
        if let Some(stage) = self.stage_mut(stage_id) {
            stage.tasks.push(task);
            true
        } else {
            false
        }
    }

    /// Move a task into the unassigned pool.
    pub fn unassign_task(&mut self, task_id: ElementId) -> bool {
        let Some(mut task) = self.take_task(task_id) else {
            return false;
        };
        task.stage_id = None;
        task.is_valid_position = false;
        self.unassigned.push(task);
        true
    }

    /// Remove a task entirely, clearing every connection that touches it.
    pub fn remove_task(&mut self, task_id: ElementId) -> Option<Task> {
        self.remove_all_task_connections(task_id);
        self.take_task(task_id)
    }

    /// Remove a stage with full cascade: its tasks go away, every
    /// connection touching the stage or any of its tasks is removed, and
    /// reciprocal relation entries on survivors are cleaned.
    pub fn remove_stage(&mut self, stage_id: ElementId) -> Option<Stage> {
        let task_ids: Vec<ElementId> = self
            .stage(stage_id)?
            .tasks
            .iter()
            .map(|t| t.id)
            .collect();
        for task_id in task_ids {
            self.remove_all_task_connections(task_id);
        }
        self.remove_all_stage_connections(stage_id);
        let idx = self.stages.iter().position(|s| s.id == stage_id)?;
        let stage = self.stages.remove(idx);
        debug!("stage {} removed ({} tasks cascaded)", stage_id, stage.tasks.len());
        Some(stage)
    }

    // ---- saved-id migration ------------------------------------------

    /// Replace transient ids with backend-assigned ids across every
    /// reference: element ids, stage back-references, relation arrays, and
    /// connection endpoints. The whole graph moves in one pass.
    pub fn adopt_saved_ids(&mut self, assigned: &BTreeMap<ElementId, ElementId>) {
        if assigned.is_empty() {
            return;
        }
        let map = |id: ElementId| assigned.get(&id).copied().unwrap_or(id);
        for stage in &mut self.stages {
            stage.id = map(stage.id);
            for entry in stage
                .predecessor_stages
                .iter_mut()
                .chain(stage.successor_stages.iter_mut())
            {
                *entry = map(*entry);
            }
            for task in &mut stage.tasks {
                task.id = map(task.id);
                task.stage_id = task.stage_id.map(map);
                for entry in task
                    .predecessor_tasks
                    .iter_mut()
                    .chain(task.successor_tasks.iter_mut())
                {
                    *entry = map(*entry);
                }
            }
        }
        for task in &mut self.unassigned {
            task.id = map(task.id);
            for entry in task
                .predecessor_tasks
                .iter_mut()
                .chain(task.successor_tasks.iter_mut())
            {
                *entry = map(*entry);
            }
        }
        for connection in &mut self.connections {
            connection.from.element_id = map(connection.from.element_id);
            connection.to.element_id = map(connection.to.element_id);
        }
    }

    // ---- repair sweep ------------------------------------------------

    /// Best-effort repair: strip relation-array entries that reference the
    /// wrong element type or elements that no longer exist. Runs after
    /// structural operations; never fails, only corrects. Returns how many
    /// elements were touched.
    pub fn cleanup_invalid_relations(&mut self) -> usize {
        let stage_ids: BTreeSet<ElementId> = self.stages.iter().map(|s| s.id).collect();
        let task_ids: BTreeSet<ElementId> = self.tasks().map(|t| t.id).collect();
        let mut fixed = 0;

        let task_entry_ok = |id: &ElementId| task_ids.contains(id) && !stage_ids.contains(id);
        for stage in &mut self.stages {
            for task in &mut stage.tasks {
                let before =
                    task.predecessor_tasks.len() + task.successor_tasks.len();
                task.predecessor_tasks.retain(task_entry_ok);
                task.successor_tasks.retain(task_entry_ok);
                if task.predecessor_tasks.len() + task.successor_tasks.len() != before {
                    fixed += 1;
                }
            }
        }
        for task in &mut self.unassigned {
            let before = task.predecessor_tasks.len() + task.successor_tasks.len();
            task.predecessor_tasks.retain(task_entry_ok);
            task.successor_tasks.retain(task_entry_ok);
            if task.predecessor_tasks.len() + task.successor_tasks.len() != before {
                fixed += 1;
            }
        }

        let stage_entry_ok = |id: &ElementId| stage_ids.contains(id) && !task_ids.contains(id);
        for stage in &mut self.stages {
            let before = stage.predecessor_stages.len() + stage.successor_stages.len();
            stage.predecessor_stages.retain(stage_entry_ok);
            stage.successor_stages.retain(stage_entry_ok);
            if stage.predecessor_stages.len() + stage.successor_stages.len() != before {
                fixed += 1;
            }
        }
        if fixed > 0 {
            debug!("relation cleanup repaired {} elements", fixed);
        }
        fixed
    }
}

fn edit_relation(list: &mut Vec<ElementId>, id: ElementId, delta: RelationDelta) {
    match delta {
        RelationDelta::Attach => {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        RelationDelta::Detach => {
            list.retain(|entry| *entry != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Point;

    fn plan_with_stage_tasks() -> Plan {
        let mut plan = Plan::new();
        let mut stage = Stage::new(1, "S1");
        stage.tasks.push(Task::new(10, "T1", Some(1)));
        stage.tasks.push(Task::new(11, "T2", Some(1)));
        plan.add_stage(stage);
        plan
    }

    #[test]
    fn add_connection_keeps_relation_arrays_in_sync() {
        let mut plan = plan_with_stage_tasks();
        plan.add_connection(Endpoint::task(10), Endpoint::task(11));

        assert_eq!(plan.task(10).unwrap().successor_tasks, vec![11]);
        assert_eq!(plan.task(11).unwrap().predecessor_tasks, vec![10]);
        assert_eq!(plan.connections.len(), 1);
    }

    #[test]
    fn remove_connection_cleans_both_sides() {
        let mut plan = plan_with_stage_tasks();
        let id = plan.add_connection(Endpoint::task(10), Endpoint::task(11));
        assert!(plan.remove_connection(&id));

        assert!(plan.task(10).unwrap().successor_tasks.is_empty());
        assert!(plan.task(11).unwrap().predecessor_tasks.is_empty());
        assert!(plan.connections.is_empty());
    }

    #[test]
    fn duplicate_attach_does_not_duplicate_entries() {
        let mut plan = plan_with_stage_tasks();
        plan.add_connection(Endpoint::task(10), Endpoint::task(11));
        plan.apply_relation_delta(
            Endpoint::task(10),
            Endpoint::task(11),
            RelationDelta::Attach,
        );
        assert_eq!(plan.task(10).unwrap().successor_tasks, vec![11]);
    }

    #[test]
    fn remove_all_task_connections_clears_neighbor_references() {
        let mut plan = plan_with_stage_tasks();
        plan.stage_mut(1)
            .unwrap()
            .tasks
            .push(Task::new(12, "T3", Some(1)));
        plan.add_connection(Endpoint::task(10), Endpoint::task(11));
        plan.add_connection(Endpoint::task(11), Endpoint::task(12));

        let removed = plan.remove_all_task_connections(11);
        assert_eq!(removed, 2);
        assert!(plan.connections.is_empty());
        assert!(plan.task(10).unwrap().successor_tasks.is_empty());
        assert!(plan.task(12).unwrap().predecessor_tasks.is_empty());
    }

    #[test]
    fn stage_removal_cascades_to_tasks_and_connections() {
        let mut plan = plan_with_stage_tasks();
        let mut other = Stage::new(2, "S2");
        other.tasks.push(Task::new(20, "T4", Some(2)));
        plan.add_stage(other);
        plan.add_connection(Endpoint::task(10), Endpoint::task(11));
        plan.add_connection(Endpoint::stage(1), Endpoint::stage(2));

        let removed = plan.remove_stage(1);
        assert!(removed.is_some());
        assert!(plan.connections.is_empty());
        assert!(plan.stage(2).unwrap().predecessor_stages.is_empty());
        assert!(plan.task(10).is_none());
    }

    #[test]
    fn assign_and_unassign_keep_membership_exclusive() {
        let mut plan = plan_with_stage_tasks();
        plan.add_stage(Stage::new(2, "S2"));

        assert!(plan.assign_task(10, 2));
        assert_eq!(plan.task_home(10), Some(TaskHome::Stage(2)));
        assert_eq!(plan.stage(1).unwrap().tasks.len(), 1);

        assert!(plan.unassign_task(10));
        assert_eq!(plan.task_home(10), Some(TaskHome::Unassigned));
        assert_eq!(plan.task(10).unwrap().stage_id, None);
        assert!(!plan.task(10).unwrap().is_valid_position);
    }

    #[test]
    fn transient_ids_decrement_below_smallest() {
        let mut plan = plan_with_stage_tasks();
        assert_eq!(plan.next_transient_id(), -1);
        let mut task = Task::new(-5, "tmp", None);
        task.position = Point::new(0, 0);
        plan.add_unassigned_task(task);
        assert_eq!(plan.next_transient_id(), -6);
    }

    #[test]
    fn adopt_saved_ids_rewrites_every_reference() {
        let mut plan = Plan::new();
        let mut stage = Stage::new(-1, "S");
        stage.tasks.push(Task::new(-2, "A", Some(-1)));
        stage.tasks.push(Task::new(-3, "B", Some(-1)));
        plan.add_stage(stage);
        plan.add_connection(Endpoint::task(-2), Endpoint::task(-3));

        let mut assigned = BTreeMap::new();
        assigned.insert(-1, 100);
        assigned.insert(-2, 200);
        assigned.insert(-3, 300);
        plan.adopt_saved_ids(&assigned);

        assert!(plan.stage(100).is_some());
        let task = plan.task(200).unwrap();
        assert_eq!(task.stage_id, Some(100));
        assert_eq!(task.successor_tasks, vec![300]);
        assert_eq!(plan.connections[0].from.element_id, 200);
        assert_eq!(plan.connections[0].to.element_id, 300);
    }

    #[test]
    fn cleanup_strips_foreign_type_entries() {
        let mut plan = plan_with_stage_tasks();
        // A stage id left in a task's successor list.
        plan.task_mut(10).unwrap().successor_tasks.push(1);
        // A vanished task id in a predecessor list.
        plan.task_mut(11).unwrap().predecessor_tasks.push(999);

        let fixed = plan.cleanup_invalid_relations();
        assert_eq!(fixed, 2);
        assert!(plan.task(10).unwrap().successor_tasks.is_empty());
        assert!(plan.task(11).unwrap().predecessor_tasks.is_empty());
    }
}
