use std::collections::BTreeSet;

use log::debug;
use thiserror::Error;

use crate::config::Config;
use crate::geometry::{
    ResizeEdges, clamp_to_canvas, contain_task, find_overlap, resize_stage, stage_for_box,
    task_fits_in_stage,
};
use crate::grid::Grid;
use crate::model::{ElementId, ElementType, Endpoint, Point, PointF, Rect, Size, Stage, Task};
use crate::store::{Plan, TaskHome};
use crate::timing::refresh_time_flags_around;
use crate::validate::{RejectReason, validate_connection};

/// Transient gesture markers, kept outside the domain model and keyed by
/// element id. An element with a marker refuses a second concurrent
/// gesture; this covers the window between pointer-up and the user
/// answering a confirmation dialog.
#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    active: BTreeSet<ElementId>,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, id: ElementId) -> bool {
        self.active.contains(&id)
    }

    fn acquire(&mut self, id: ElementId) -> Result<(), GestureError> {
        if !self.active.insert(id) {
            return Err(GestureError::Busy);
        }
        Ok(())
    }

    fn release(&mut self, id: ElementId) {
        self.active.remove(&id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GestureError {
    #[error("element is already part of an active gesture")]
    Busy,
    #[error("element does not exist")]
    UnknownElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("a stage already occupies this area")]
    Overlap,
}

/// Coalesces pointer-move events to one position per animation frame. Each
/// `push` supersedes the previous one; `take` drains the latest.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveCoalescer {
    pending: Option<PointF>,
}

impl MoveCoalescer {
    pub fn push(&mut self, pointer: PointF) {
        self.pending = Some(pointer);
    }

    pub fn take(&mut self) -> Option<PointF> {
        self.pending.take()
    }
}

/// Everything needed to put a task back exactly as it was before the
/// gesture, including its slot in the owning container.
#[derive(Debug, Clone, PartialEq)]
struct TaskSnapshot {
    stage_id: Option<ElementId>,
    index: usize,
    position: Point,
    is_valid_position: bool,
}

fn capture_task_snapshot(plan: &Plan, task_id: ElementId) -> Option<TaskSnapshot> {
    let home = plan.task_home(task_id)?;
    let (stage_id, index) = match home {
        TaskHome::Stage(stage_id) => {
            let stage = plan.stage(stage_id)?;
            let index = stage.tasks.iter().position(|t| t.id == task_id)?;
            (Some(stage_id), index)
        }
        TaskHome::Unassigned => {
            let index = plan.unassigned.iter().position(|t| t.id == task_id)?;
            (None, index)
        }
    };
    let task = plan.task(task_id)?;
    Some(TaskSnapshot {
        stage_id,
        index,
        position: task.position,
        is_valid_position: task.is_valid_position,
    })
}

fn restore_task_snapshot(plan: &mut Plan, task_id: ElementId, snapshot: &TaskSnapshot) {
    let Some(mut task) = take_task_anywhere(plan, task_id) else {
        return;
    };
    task.position = snapshot.position;
    task.is_valid_position = snapshot.is_valid_position;
    task.stage_id = snapshot.stage_id;
    match snapshot.stage_id {
        Some(stage_id) => {
            if let Some(stage) = plan.stage_mut(stage_id) {
                let at = snapshot.index.min(stage.tasks.len());
                stage.tasks.insert(at, task);
            } else {
                plan.unassigned.push(task);
            }
        }
        None => {
            let at = snapshot.index.min(plan.unassigned.len());
            plan.unassigned.insert(at, task);
        }
    }
}

fn take_task_anywhere(plan: &mut Plan, task_id: ElementId) -> Option<Task> {
    for stage in &mut plan.stages {
        if let Some(idx) = stage.tasks.iter().position(|t| t.id == task_id) {
            return Some(stage.tasks.remove(idx));
        }
    }
    plan.unassigned
        .iter()
        .position(|t| t.id == task_id)
        .map(|idx| plan.unassigned.remove(idx))
}

/// One frame of drag preview, as reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewFrame {
    pub position: Point,
    pub target_stage: Option<ElementId>,
    /// True when the frame was rejected (uneditable task leaving its
    /// stage) and the position was left untouched.
    pub frozen: bool,
}

/// What a pointer-release produced.
#[derive(Debug)]
pub enum ReleaseOutcome {
    Committed(CommitSummary),
    /// The move needs the user's yes/no before it becomes real. The plan
    /// stays in the rolled-forward preview state until `resolve`.
    NeedsConfirmation(PendingMove),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub task_id: ElementId,
    pub stage_changed: bool,
    pub cleared_connections: usize,
}

/// An in-flight task drag: Idle -> Dragging -> (Committing | Cancelled).
/// Holds the rollback snapshot for the whole gesture.
#[derive(Debug)]
pub struct TaskDrag {
    task_id: ElementId,
    snapshot: TaskSnapshot,
    grab_offset: PointF,
    uneditable_home: Option<ElementId>,
}

impl TaskDrag {
    pub fn begin(
        plan: &Plan,
        state: &mut InteractionState,
        task_id: ElementId,
        pointer: PointF,
    ) -> Result<Self, GestureError> {
        let snapshot = capture_task_snapshot(plan, task_id).ok_or(GestureError::UnknownElement)?;
        state.acquire(task_id)?;
        let task = plan.task(task_id).ok_or(GestureError::UnknownElement)?;
        let uneditable_home = (!task.is_editable)
            .then_some(task.stage_id)
            .flatten();
        Ok(Self {
            task_id,
            grab_offset: PointF::new(
                pointer.x - task.position.x as f32,
                pointer.y - task.position.y as f32,
            ),
            snapshot,
            uneditable_home,
        })
    }

    pub fn task_id(&self) -> ElementId {
        self.task_id
    }

    /// Recompute the preview for the latest pointer position. Mutates
    /// positions and stage membership only; the connection store is never
    /// touched before commit.
    pub fn update(&mut self, plan: &mut Plan, pointer: PointF, config: &Config) -> PreviewFrame {
        let grid = Grid::from_config(&config.grid);
        let geom = &config.geometry;
        let candidate = PointF::new(pointer.x - self.grab_offset.x, pointer.y - self.grab_offset.y);
        let task_size = Size::new(geom.task_width, geom.task_height);

        let target_stage_id =
            stage_for_box(candidate, task_size, &plan.stages).map(|stage| stage.id);

        // A generated task is pinned to its stage: any frame that would
        // leave it is dropped and the gesture keeps tracking the pointer.
        if let Some(home) = self.uneditable_home
            && target_stage_id != Some(home)
        {
            let position = plan
                .task(self.task_id)
                .map(|t| t.position)
                .unwrap_or(self.snapshot.position);
            return PreviewFrame {
                position,
                target_stage: Some(home),
                frozen: true,
            };
        }

        let (position, valid) = match target_stage_id {
            Some(stage_id) => {
                let stage = plan.stage(stage_id).expect("target stage exists");
                let contained = contain_task(candidate, stage, geom, &grid);
                let valid = task_fits_in_stage(contained, stage, geom);
                (contained, valid)
            }
            None => (clamp_to_canvas(candidate, &grid), false),
        };

        let current_home = plan.task_home(self.task_id);
        match (current_home, target_stage_id) {
            (Some(TaskHome::Stage(current)), Some(target)) if current != target => {
                plan.assign_task(self.task_id, target);
            }
            (Some(TaskHome::Unassigned), Some(target)) => {
                plan.assign_task(self.task_id, target);
            }
            (Some(TaskHome::Stage(_)), None) => {
                plan.unassign_task(self.task_id);
            }
            _ => {}
        }
        if let Some(task) = plan.task_mut(self.task_id) {
            task.position = position;
            task.is_valid_position = valid;
        }

        PreviewFrame {
            position,
            target_stage: target_stage_id,
            frozen: false,
        }
    }

    /// Pointer released: either commit now, or hand back a pending move
    /// when the stage change needs the user's confirmation.
    pub fn release(self, plan: &mut Plan, state: &mut InteractionState) -> ReleaseOutcome {
        let home_now = plan.task_home(self.task_id);
        let stage_changed = match home_now {
            Some(TaskHome::Stage(stage_id)) => self.snapshot.stage_id != Some(stage_id),
            Some(TaskHome::Unassigned) | None => self.snapshot.stage_id.is_some(),
        };
        let connected = !plan
            .connections_touching(self.task_id, ElementType::Task)
            .is_empty();

        if stage_changed && connected {
            return ReleaseOutcome::NeedsConfirmation(PendingMove { drag: self });
        }

        let summary = commit_move(plan, self.task_id, stage_changed);
        state.release(self.task_id);
        ReleaseOutcome::Committed(summary)
    }

    /// Abort from any point of the gesture: the plan converges back to the
    /// pre-drag snapshot.
    pub fn cancel(self, plan: &mut Plan, state: &mut InteractionState) {
        restore_task_snapshot(plan, self.task_id, &self.snapshot);
        state.release(self.task_id);
    }
}

/// A released drag waiting on the confirmation dialog. The graph is in the
/// preview state; no second gesture can start on the element.
#[derive(Debug)]
pub struct PendingMove {
    drag: TaskDrag,
}

impl PendingMove {
    pub fn task_id(&self) -> ElementId {
        self.drag.task_id
    }

    /// Resolve the dialog. Declining rolls the task back to the pre-drag
    /// snapshot; accepting clears every connection touching the task (the
    /// same-stage invariant would otherwise break) and commits.
    pub fn resolve(
        self,
        plan: &mut Plan,
        state: &mut InteractionState,
        accepted: bool,
    ) -> Option<CommitSummary> {
        if !accepted {
            self.drag.cancel(plan, state);
            return None;
        }
        let task_id = self.drag.task_id;
        let summary = commit_move(plan, task_id, true);
        state.release(task_id);
        Some(summary)
    }
}

fn commit_move(plan: &mut Plan, task_id: ElementId, stage_changed: bool) -> CommitSummary {
    let cleared = if stage_changed {
        plan.remove_all_task_connections(task_id)
    } else {
        0
    };
    plan.cleanup_invalid_relations();
    refresh_time_flags_around(plan, task_id);
    debug!(
        "task {} drag committed (stage_changed: {}, cleared {} connections)",
        task_id, stage_changed, cleared
    );
    CommitSummary {
        task_id,
        stage_changed,
        cleared_connections: cleared,
    }
}

/// Stage drag: the stage and every contained task translate together,
/// clamped to the canvas origin.
#[derive(Debug)]
pub struct StageDrag {
    stage_id: ElementId,
    snapshot_position: Rect,
    snapshot_tasks: Vec<(ElementId, Point)>,
    grab_offset: PointF,
}

impl StageDrag {
    pub fn begin(
        plan: &Plan,
        state: &mut InteractionState,
        stage_id: ElementId,
        pointer: PointF,
    ) -> Result<Self, GestureError> {
        let stage = plan.stage(stage_id).ok_or(GestureError::UnknownElement)?;
        state.acquire(stage_id)?;
        Ok(Self {
            stage_id,
            snapshot_position: stage.position,
            snapshot_tasks: stage.tasks.iter().map(|t| (t.id, t.position)).collect(),
            grab_offset: PointF::new(
                pointer.x - stage.position.x as f32,
                pointer.y - stage.position.y as f32,
            ),
        })
    }

    pub fn update(&mut self, plan: &mut Plan, pointer: PointF, config: &Config) -> Point {
        let grid = Grid::from_config(&config.grid);
        let candidate = PointF::new(pointer.x - self.grab_offset.x, pointer.y - self.grab_offset.y);
        let clamped = clamp_to_canvas(candidate, &grid);
        let Some(stage) = plan.stage_mut(self.stage_id) else {
            return clamped;
        };
        let delta_x = clamped.x - stage.position.x;
        let delta_y = clamped.y - stage.position.y;
        stage.position.x = clamped.x;
        stage.position.y = clamped.y;
        for task in &mut stage.tasks {
            task.position.x += delta_x;
            task.position.y += delta_y;
        }
        clamped
    }

    pub fn release(self, _plan: &mut Plan, state: &mut InteractionState) {
        state.release(self.stage_id);
    }

    pub fn cancel(self, plan: &mut Plan, state: &mut InteractionState) {
        if let Some(stage) = plan.stage_mut(self.stage_id) {
            stage.position = self.snapshot_position;
            for (task_id, position) in &self.snapshot_tasks {
                if let Some(task) = stage.tasks.iter_mut().find(|t| t.id == *task_id) {
                    task.position = *position;
                }
            }
        }
        state.release(self.stage_id);
    }
}

/// Stage resize gesture over the geometry engine's clamped math.
#[derive(Debug)]
pub struct StageResize {
    stage_id: ElementId,
    edges: ResizeEdges,
    snapshot_position: Rect,
}

impl StageResize {
    pub fn begin(
        plan: &Plan,
        state: &mut InteractionState,
        stage_id: ElementId,
        edges: ResizeEdges,
    ) -> Result<Self, GestureError> {
        let stage = plan.stage(stage_id).ok_or(GestureError::UnknownElement)?;
        state.acquire(stage_id)?;
        Ok(Self {
            stage_id,
            edges,
            snapshot_position: stage.position,
        })
    }

    /// Preview for a pointer delta measured from the gesture start.
    pub fn update(&mut self, plan: &mut Plan, delta: PointF, config: &Config) -> Rect {
        let grid = Grid::from_config(&config.grid);
        let Some(stage) = plan.stage(self.stage_id) else {
            return self.snapshot_position;
        };
        // Deltas accumulate against the original rect, not the preview.
        let mut baseline = stage.clone();
        baseline.position = self.snapshot_position;
        let rect = resize_stage(&baseline, self.edges, delta, &config.geometry, &grid);
        if let Some(stage) = plan.stage_mut(self.stage_id) {
            stage.position = rect;
        }
        rect
    }

    pub fn release(self, _plan: &mut Plan, state: &mut InteractionState) {
        state.release(self.stage_id);
    }

    pub fn cancel(self, plan: &mut Plan, state: &mut InteractionState) {
        if let Some(stage) = plan.stage_mut(self.stage_id) {
            stage.position = self.snapshot_position;
        }
        state.release(self.stage_id);
    }
}

/// Create a stage at a dropped canvas position, refusing overlap with any
/// existing stage. Returns the transient id.
pub fn create_stage_at(
    plan: &mut Plan,
    position: PointF,
    config: &Config,
) -> Result<ElementId, PlacementError> {
    let grid = Grid::from_config(&config.grid);
    let origin = clamp_to_canvas(position, &grid);
    let candidate = Rect::new(
        origin.x,
        origin.y,
        config.geometry.min_stage_width,
        config.geometry.min_stage_height,
    );
    if find_overlap(candidate, &plan.stages).is_some() {
        return Err(PlacementError::Overlap);
    }
    let id = plan.next_transient_id();
    let mut stage = Stage::new(id, "New stage");
    stage.position = candidate;
    plan.add_stage(stage);
    Ok(id)
}

/// Create a task at a dropped canvas position. Inside a stage it is
/// contained and assigned; on open canvas it joins the unassigned pool.
pub fn create_task_at(plan: &mut Plan, position: PointF, config: &Config) -> ElementId {
    let grid = Grid::from_config(&config.grid);
    let geom = &config.geometry;
    let id = plan.next_transient_id();
    let target = stage_for_box(
        position,
        Size::new(geom.task_width, geom.task_height),
        &plan.stages,
    )
    .map(|s| s.id);

    let mut task = Task::new(id, "New task", target);
    match target {
        Some(stage_id) => {
            let stage = plan.stage(stage_id).expect("target stage exists");
            task.position = contain_task(position, stage, geom, &grid);
            task.is_valid_position = true;
            plan.add_task_to_stage(stage_id, task);
        }
        None => {
            task.position = clamp_to_canvas(position, &grid);
            plan.add_unassigned_task(task);
        }
    }
    id
}

/// Commit path for a new connection: resolve stage-to-task endpoint pairs
/// to the task's containing stage, gate through the validator, then insert
/// into the store. The store is only touched on success.
pub fn connect(plan: &mut Plan, from: Endpoint, to: Endpoint) -> Result<String, RejectReason> {
    let (from, to) = resolve_endpoints(plan, from, to);
    validate_connection(plan, from, to)?;
    let id = plan.add_connection(from, to);
    if from.element_type == ElementType::Task {
        refresh_time_flags_around(plan, from.element_id);
    }
    Ok(id)
}

/// Remove a single connection, refreshing the timing context around a
/// task-level edge.
pub fn disconnect(plan: &mut Plan, connection_id: &str) -> bool {
    let endpoint = plan
        .connections
        .iter()
        .find(|c| c.id == connection_id)
        .map(|c| c.from);
    if !plan.remove_connection(connection_id) {
        return false;
    }
    if let Some(endpoint) = endpoint
        && endpoint.element_type == ElementType::Task
    {
        refresh_time_flags_around(plan, endpoint.element_id);
    }
    true
}

/// Lift a task endpoint to its containing stage when the other end is a
/// stage. An unassigned task cannot be lifted and is left for the
/// validator to reject.
fn resolve_endpoints(plan: &Plan, from: Endpoint, to: Endpoint) -> (Endpoint, Endpoint) {
    if from.element_type == to.element_type {
        return (from, to);
    }
    let lift = |endpoint: Endpoint| -> Endpoint {
        if endpoint.element_type == ElementType::Task
            && let Some(stage_id) = plan.task(endpoint.element_id).and_then(|t| t.stage_id)
        {
            return Endpoint::stage(stage_id);
        }
        endpoint
    };
    (lift(from), lift(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Endpoint;

    fn config() -> Config {
        Config::default()
    }

    /// Two stages side by side, S1 holding a connected pair of tasks.
    fn arena() -> Plan {
        let mut plan = Plan::new();
        let mut s1 = Stage::new(1, "S1");
        s1.position = Rect::new(0, 0, 560, 400);
        let mut t1 = Task::new(10, "T1", Some(1));
        t1.position = Point::new(40, 104);
        let mut t2 = Task::new(11, "T2", Some(1));
        t2.position = Point::new(280, 104);
        s1.tasks.push(t1);
        s1.tasks.push(t2);
        plan.add_stage(s1);

        let mut s2 = Stage::new(2, "S2");
        s2.position = Rect::new(640, 0, 560, 400);
        plan.add_stage(s2);

        plan.add_connection(Endpoint::task(10), Endpoint::task(11));
        plan
    }

    #[test]
    fn same_stage_drag_commits_without_confirmation() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        drag.update(&mut plan, PointF::new(330.0, 180.0), &config);
        match drag.release(&mut plan, &mut state) {
            ReleaseOutcome::Committed(summary) => {
                assert!(!summary.stage_changed);
                assert_eq!(summary.cleared_connections, 0);
            }
            ReleaseOutcome::NeedsConfirmation(_) => panic!("no confirmation expected"),
        }
        // The connection survived and the task stayed in S1.
        assert_eq!(plan.connections.len(), 1);
        assert_eq!(plan.task_home(11), Some(TaskHome::Stage(1)));
        assert!(!state.is_active(11));
    }

    #[test]
    fn cross_stage_drag_of_connected_task_requires_confirmation() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        // Into S2.
        drag.update(&mut plan, PointF::new(740.0, 180.0), &config);
        let pending = match drag.release(&mut plan, &mut state) {
            ReleaseOutcome::NeedsConfirmation(pending) => pending,
            ReleaseOutcome::Committed(_) => panic!("confirmation expected"),
        };

        // Still locked while the dialog is open.
        assert!(state.is_active(11));
        assert!(TaskDrag::begin(&plan, &mut state, 11, PointF::default()).is_err());

        let summary = pending.resolve(&mut plan, &mut state, true).unwrap();
        assert!(summary.stage_changed);
        assert_eq!(summary.cleared_connections, 1);
        assert!(plan.connections.is_empty());
        assert_eq!(plan.task_home(11), Some(TaskHome::Stage(2)));
        assert!(plan.task(10).unwrap().successor_tasks.is_empty());
    }

    #[test]
    fn declined_confirmation_restores_the_exact_pre_drag_state() {
        let mut plan = arena();
        let reference = plan.clone();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        drag.update(&mut plan, PointF::new(740.0, 180.0), &config);
        let pending = match drag.release(&mut plan, &mut state) {
            ReleaseOutcome::NeedsConfirmation(pending) => pending,
            ReleaseOutcome::Committed(_) => panic!("confirmation expected"),
        };
        assert!(pending.resolve(&mut plan, &mut state, false).is_none());

        assert_eq!(plan, reference);
        assert!(!state.is_active(11));
    }

    #[test]
    fn cancelled_drag_restores_the_exact_pre_drag_state() {
        let mut plan = arena();
        let reference = plan.clone();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 10, PointF::new(50.0, 110.0)).unwrap();
        drag.update(&mut plan, PointF::new(900.0, 700.0), &config);
        drag.update(&mut plan, PointF::new(200.0, 200.0), &config);
        drag.cancel(&mut plan, &mut state);

        assert_eq!(plan, reference);
    }

    #[test]
    fn unassigning_a_connected_task_requires_confirmation_and_invalidates() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        // Open canvas, below both stages.
        drag.update(&mut plan, PointF::new(300.0, 800.0), &config);
        let pending = match drag.release(&mut plan, &mut state) {
            ReleaseOutcome::NeedsConfirmation(pending) => pending,
            ReleaseOutcome::Committed(_) => panic!("confirmation expected"),
        };
        let summary = pending.resolve(&mut plan, &mut state, true).unwrap();
        assert!(summary.stage_changed);
        assert_eq!(plan.task_home(11), Some(TaskHome::Unassigned));
        assert!(!plan.task(11).unwrap().is_valid_position);
        assert!(plan.connections.is_empty());
    }

    #[test]
    fn preview_never_touches_the_connection_store() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        drag.update(&mut plan, PointF::new(740.0, 180.0), &config);
        // Preview moved membership but the edge list is untouched.
        assert_eq!(plan.task_home(11), Some(TaskHome::Stage(2)));
        assert_eq!(plan.connections.len(), 1);
        drag.cancel(&mut plan, &mut state);
    }

    #[test]
    fn uneditable_task_freezes_outside_its_stage() {
        let mut plan = arena();
        plan.task_mut(11).unwrap().is_editable = false;
        let mut state = InteractionState::new();
        let config = config();

        let before = plan.task(11).unwrap().position;
        let mut drag = TaskDrag::begin(&plan, &mut state, 11, PointF::new(290.0, 110.0)).unwrap();
        let frame = drag.update(&mut plan, PointF::new(740.0, 180.0), &config);
        assert!(frame.frozen);
        assert_eq!(plan.task(11).unwrap().position, before);
        assert_eq!(plan.task_home(11), Some(TaskHome::Stage(1)));

        // Inside its own stage it still moves.
        let frame = drag.update(&mut plan, PointF::new(100.0, 200.0), &config);
        assert!(!frame.frozen);
        drag.cancel(&mut plan, &mut state);
    }

    #[test]
    fn preview_positions_are_contained_and_snapped() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = TaskDrag::begin(&plan, &mut state, 10, PointF::new(50.0, 110.0)).unwrap();
        // Pointer way past S1's right edge but the box center stays inside.
        let frame = drag.update(&mut plan, PointF::new(500.0, 120.0), &config);
        assert_eq!(frame.target_stage, Some(1));
        let stage = plan.stage(1).unwrap();
        assert!(task_fits_in_stage(frame.position, stage, &config.geometry));
        assert_eq!(frame.position.x % 8, 0);
        assert_eq!(frame.position.y % 8, 0);
        drag.cancel(&mut plan, &mut state);
    }

    #[test]
    fn stage_drag_carries_tasks_and_cancels_cleanly() {
        let mut plan = arena();
        let reference = plan.clone();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = StageDrag::begin(&plan, &mut state, 1, PointF::new(10.0, 10.0)).unwrap();
        drag.update(&mut plan, PointF::new(90.0, 90.0), &config);
        let stage = plan.stage(1).unwrap();
        assert_eq!(stage.position.origin(), Point::new(80, 80));
        assert_eq!(stage.task(10).unwrap().position, Point::new(120, 184));

        drag.cancel(&mut plan, &mut state);
        assert_eq!(plan, reference);
    }

    #[test]
    fn stage_drag_clamps_to_canvas() {
        let mut plan = arena();
        let mut state = InteractionState::new();
        let config = config();

        let mut drag = StageDrag::begin(&plan, &mut state, 1, PointF::new(10.0, 10.0)).unwrap();
        let pos = drag.update(&mut plan, PointF::new(-500.0, -500.0), &config);
        assert_eq!(pos, Point::new(0, 0));
        drag.release(&mut plan, &mut state);
    }

    #[test]
    fn resize_gesture_commits_clamped_rect_and_cancel_restores() {
        let mut plan = arena();
        let reference_rect = plan.stage(1).unwrap().position;
        let mut state = InteractionState::new();
        let config = config();

        let mut resize = StageResize::begin(&plan, &mut state, 1, ResizeEdges::EAST).unwrap();
        let rect = resize.update(&mut plan, PointF::new(200.0, 0.0), &config);
        assert_eq!(rect.width, 760);
        let rect = resize.update(&mut plan, PointF::new(-1000.0, 0.0), &config);
        // Clamped by the task bounding box (T2 right edge 476 + border).
        assert_eq!(rect.right(), 480);

        resize.cancel(&mut plan, &mut state);
        assert_eq!(plan.stage(1).unwrap().position, reference_rect);
    }

    #[test]
    fn stage_creation_refuses_overlap() {
        let mut plan = arena();
        let config = config();
        let err = create_stage_at(&mut plan, PointF::new(300.0, 100.0), &config).unwrap_err();
        assert_eq!(err, PlacementError::Overlap);

        let id = create_stage_at(&mut plan, PointF::new(0.0, 900.0), &config).unwrap();
        assert!(id < 0);
        let stage = plan.stage(id).unwrap();
        assert_eq!(stage.position.width, config.geometry.min_stage_width);
    }

    #[test]
    fn task_creation_lands_in_stage_or_pool() {
        let mut plan = arena();
        let config = config();

        let staged = create_task_at(&mut plan, PointF::new(700.0, 200.0), &config);
        assert_eq!(plan.task_home(staged), Some(TaskHome::Stage(2)));
        assert!(plan.task(staged).unwrap().is_valid_position);

        let loose = create_task_at(&mut plan, PointF::new(100.0, 900.0), &config);
        assert_eq!(plan.task_home(loose), Some(TaskHome::Unassigned));
        assert!(!plan.task(loose).unwrap().is_valid_position);
    }

    #[test]
    fn connect_resolves_stage_task_pairs_to_stage_level() {
        let mut plan = arena();
        let mut s2_task = Task::new(20, "T3", Some(2));
        s2_task.position = Point::new(680, 104);
        plan.add_task_to_stage(2, s2_task);

        // Stage S1 to a task in S2 becomes S1 -> S2.
        let id = connect(&mut plan, Endpoint::stage(1), Endpoint::task(20)).unwrap();
        let connection = plan.connections.iter().find(|c| c.id == id).unwrap();
        assert_eq!(connection.from, Endpoint::stage(1));
        assert_eq!(connection.to, Endpoint::stage(2));
        assert_eq!(plan.stage(1).unwrap().successor_stages, vec![2]);
    }

    #[test]
    fn connect_gates_through_the_validator() {
        let mut plan = arena();
        let err = connect(&mut plan, Endpoint::task(11), Endpoint::task(10)).unwrap_err();
        assert_eq!(err, RejectReason::CycleDetected);
        assert_eq!(plan.connections.len(), 1);
    }

    #[test]
    fn coalescer_keeps_only_the_latest_pointer() {
        let mut coalescer = MoveCoalescer::default();
        coalescer.push(PointF::new(1.0, 1.0));
        coalescer.push(PointF::new(2.0, 2.0));
        assert_eq!(coalescer.take(), Some(PointF::new(2.0, 2.0)));
        assert_eq!(coalescer.take(), None);
    }
}
