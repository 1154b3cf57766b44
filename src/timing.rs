use chrono::NaiveDate;

use crate::model::{ElementId, Stage};
use crate::store::Plan;

/// Derived date range of a stage: earliest task start, latest task end,
/// inclusive day count when both are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub days: Option<i64>,
}

pub fn stage_time_range(stage: &Stage) -> TimeRange {
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;
    for task in &stage.tasks {
        if let Some(s) = task.start_time {
            start = Some(start.map_or(s, |cur| cur.min(s)));
        }
        if let Some(e) = task.end_time {
            end = Some(end.map_or(e, |cur| cur.max(e)));
        }
    }
    let days = match (start, end) {
        (Some(s), Some(e)) => Some((e - s).num_days() + 1),
        _ => None,
    };
    TimeRange { start, end, days }
}

/// Write the derived range back onto the stage.
pub fn refresh_stage_time(stage: &mut Stage) {
    let range = stage_time_range(stage);
    stage.start_time = range.start;
    stage.end_time = range.end;
    stage.duration = range.days;
}

/// Whether a task's dates conflict with its own ordering or its direct
/// predecessors/successors. A task missing either date is never flagged
/// here; that is a missing-field condition, reported by the audit sweep.
///
/// The precedence rule leaves a full day of separation: a task must start
/// at least the day after its latest predecessor ends, and must end at
/// least the day before its earliest successor starts.
pub fn task_time_issue(plan: &Plan, task_id: ElementId) -> bool {
    let Some(task) = plan.task(task_id) else {
        return false;
    };
    let (Some(start), Some(end)) = (task.start_time, task.end_time) else {
        return false;
    };
    if start > end {
        return true;
    }

    let latest_predecessor_end = task
        .predecessor_tasks
        .iter()
        .filter_map(|id| plan.task(*id).and_then(|t| t.end_time))
        .max();
    if let Some(pred_end) = latest_predecessor_end {
        let min_start = pred_end.succ_opt().unwrap_or(pred_end);
        if start < min_start {
            return true;
        }
    }

    let earliest_successor_start = task
        .successor_tasks
        .iter()
        .filter_map(|id| plan.task(*id).and_then(|t| t.start_time))
        .min();
    if let Some(succ_start) = earliest_successor_start {
        let max_end = succ_start.pred_opt().unwrap_or(succ_start);
        if end > max_end {
            return true;
        }
    }

    false
}

/// Stage-level conflict over the derived ranges, same separation rule as
/// tasks.
pub fn stage_time_issue(plan: &Plan, stage_id: ElementId) -> bool {
    let Some(stage) = plan.stage(stage_id) else {
        return false;
    };
    let range = stage_time_range(stage);
    let (Some(start), Some(end)) = (range.start, range.end) else {
        return false;
    };
    if start > end {
        return true;
    }

    let latest_predecessor_end = stage
        .predecessor_stages
        .iter()
        .filter_map(|id| plan.stage(*id).map(stage_time_range))
        .filter_map(|r| r.end)
        .max();
    if let Some(pred_end) = latest_predecessor_end {
        let min_start = pred_end.succ_opt().unwrap_or(pred_end);
        if start < min_start {
            return true;
        }
    }

    let earliest_successor_start = stage
        .successor_stages
        .iter()
        .filter_map(|id| plan.stage(*id).map(stage_time_range))
        .filter_map(|r| r.start)
        .min();
    if let Some(succ_start) = earliest_successor_start {
        let max_end = succ_start.pred_opt().unwrap_or(succ_start);
        if end > max_end {
            return true;
        }
    }

    false
}

/// Recompute the conflict flag on one task and its direct neighbors, and
/// refresh the derived times and flag of every stage involved. Called after
/// any commit that changes a task's dates, membership, or relations.
pub fn refresh_time_flags_around(plan: &mut Plan, task_id: ElementId) {
    let mut task_ids = vec![task_id];
    if let Some(task) = plan.task(task_id) {
        task_ids.extend(task.predecessor_tasks.iter().copied());
        task_ids.extend(task.successor_tasks.iter().copied());
    }
    let mut stage_ids: Vec<ElementId> = Vec::new();
    for id in &task_ids {
        if let Some(stage_id) = plan.task(*id).and_then(|t| t.stage_id)
            && !stage_ids.contains(&stage_id)
        {
            stage_ids.push(stage_id);
        }
    }

    for id in task_ids {
        let issue = task_time_issue(plan, id);
        if let Some(task) = plan.task_mut(id) {
            task.has_time_issue = issue;
        }
    }
    for id in stage_ids {
        if let Some(stage) = plan.stage_mut(id) {
            refresh_stage_time(stage);
        }
        let issue = stage_time_issue(plan, id);
        if let Some(stage) = plan.stage_mut(id) {
            stage.has_time_issue = issue;
        }
    }
}

/// Recompute every derived time and conflict flag in the plan. Used after
/// loading and after bulk edits.
pub fn refresh_all_time_flags(plan: &mut Plan) {
    let task_ids: Vec<ElementId> = plan.tasks().map(|t| t.id).collect();
    for id in task_ids {
        let issue = task_time_issue(plan, id);
        if let Some(task) = plan.task_mut(id) {
            task.has_time_issue = issue;
        }
    }
    let stage_ids: Vec<ElementId> = plan.stages.iter().map(|s| s.id).collect();
    for id in stage_ids {
        if let Some(stage) = plan.stage_mut(id) {
            refresh_stage_time(stage);
        }
        let issue = stage_time_issue(plan, id);
        if let Some(stage) = plan.stage_mut(id) {
            stage.has_time_issue = issue;
        }
    }
}
