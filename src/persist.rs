use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::geometry::task_fits_in_stage;
use crate::model::{ApprovalType, ElementId, Endpoint, Point, Rect, Stage, Task};
use crate::store::Plan;
use crate::timing::refresh_all_time_flags;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Backend wire representation. Coordinates are integers; dates are
/// `YYYY-MM-DD`; a task nested in a stage stores its position relative to
/// the stage's origin, while unassigned tasks store absolute positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPlan {
    #[serde(default)]
    pub project_id: Option<i64>,
    pub stages: Vec<StoredStage>,
    #[serde(default)]
    pub unassigned_tasks: Vec<StoredTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStage {
    pub id: ElementId,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    pub position: StoredRect,
    #[serde(default)]
    pub predecessor_stages: Vec<ElementId>,
    #[serde(default)]
    pub successor_stages: Vec<ElementId>,
    #[serde(default)]
    pub tasks: Vec<StoredTask>,
    #[serde(default = "default_true")]
    pub is_editable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTask {
    pub id: ElementId,
    pub name: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub job_number: Option<String>,
    #[serde(default = "default_approval_type")]
    pub approval_type: String,
    #[serde(default)]
    pub approval_nodes: Vec<i64>,
    #[serde(default)]
    pub stage_id: Option<ElementId>,
    pub position: StoredPoint,
    #[serde(default)]
    pub predecessor_tasks: Vec<ElementId>,
    #[serde(default)]
    pub successor_tasks: Vec<ElementId>,
    #[serde(default = "default_true")]
    pub is_editable: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoredPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoredRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

fn default_true() -> bool {
    true
}

fn default_approval_type() -> String {
    ApprovalType::Sequential.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    BadDate(String),
    #[error("unknown approval type `{0}`")]
    UnknownApprovalType(String),
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn parse_date(raw: &Option<String>) -> Result<Option<NaiveDate>, PersistError> {
    match raw {
        None => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Some)
            .map_err(|_| PersistError::BadDate(text.clone())),
    }
}

/// Serialize a plan into the backend shape.
pub fn to_stored(plan: &Plan) -> StoredPlan {
    let stages = plan
        .stages
        .iter()
        .map(|stage| StoredStage {
            id: stage.id,
            name: stage.name.clone(),
            start_time: format_date(stage.start_time),
            end_time: format_date(stage.end_time),
            duration: stage.duration,
            position: StoredRect {
                x: stage.position.x,
                y: stage.position.y,
                width: stage.position.width,
                height: stage.position.height,
            },
            predecessor_stages: stage.predecessor_stages.clone(),
            successor_stages: stage.successor_stages.clone(),
            tasks: stage
                .tasks
                .iter()
                .map(|task| {
                    store_task(
                        task,
                        Point::new(
                            task.position.x - stage.position.x,
                            task.position.y - stage.position.y,
                        ),
                    )
                })
                .collect(),
            is_editable: stage.is_editable,
        })
        .collect();

    StoredPlan {
        project_id: plan.project_id,
        stages,
        unassigned_tasks: plan
            .unassigned
            .iter()
            .map(|task| store_task(task, task.position))
            .collect(),
    }
}

fn store_task(task: &Task, position: Point) -> StoredTask {
    StoredTask {
        id: task.id,
        name: task.name.clone(),
        start_time: format_date(task.start_time),
        end_time: format_date(task.end_time),
        duration: task.duration,
        job_number: task.job_number.clone(),
        approval_type: task.approval_type.as_str().to_string(),
        approval_nodes: task.approval_nodes.clone(),
        stage_id: task.stage_id,
        position: StoredPoint {
            x: position.x,
            y: position.y,
        },
        predecessor_tasks: task.predecessor_tasks.clone(),
        successor_tasks: task.successor_tasks.clone(),
        is_editable: task.is_editable,
    }
}

/// Reconstruct a plan from the backend shape: absolute task positions are
/// rebuilt from the stage-relative stored ones, the connection list is
/// derived from the relation arrays, and derived fields are refreshed.
pub fn from_stored(stored: &StoredPlan, config: &Config) -> Result<Plan, PersistError> {
    let mut plan = Plan::new();
    plan.project_id = stored.project_id;

    for stored_stage in &stored.stages {
        let mut stage = Stage::new(stored_stage.id, stored_stage.name.clone());
        stage.start_time = parse_date(&stored_stage.start_time)?;
        stage.end_time = parse_date(&stored_stage.end_time)?;
        stage.duration = stored_stage.duration;
        stage.position = Rect::new(
            stored_stage.position.x,
            stored_stage.position.y,
            stored_stage.position.width,
            stored_stage.position.height,
        );
        stage.predecessor_stages = stored_stage.predecessor_stages.clone();
        stage.successor_stages = stored_stage.successor_stages.clone();
        stage.is_editable = stored_stage.is_editable;

        for stored_task in &stored_stage.tasks {
            let mut task = load_task(stored_task)?;
            task.stage_id = Some(stored_stage.id);
            task.position = Point::new(
                stored_task.position.x + stage.position.x,
                stored_task.position.y + stage.position.y,
            );
            task.is_valid_position = task_fits_in_stage(task.position, &stage, &config.geometry);
            stage.tasks.push(task);
        }
        plan.stages.push(stage);
    }

    for stored_task in &stored.unassigned_tasks {
        let mut task = load_task(stored_task)?;
        task.stage_id = None;
        task.position = Point::new(stored_task.position.x, stored_task.position.y);
        task.is_valid_position = false;
        plan.unassigned.push(task);
    }

    rebuild_connections(&mut plan);
    plan.cleanup_invalid_relations();
    refresh_all_time_flags(&mut plan);
    Ok(plan)
}

fn load_task(stored: &StoredTask) -> Result<Task, PersistError> {
    let approval_type = ApprovalType::from_token(&stored.approval_type)
        .ok_or_else(|| PersistError::UnknownApprovalType(stored.approval_type.clone()))?;
    let mut task = Task::new(stored.id, stored.name.clone(), stored.stage_id);
    task.start_time = parse_date(&stored.start_time)?;
    task.end_time = parse_date(&stored.end_time)?;
    task.duration = stored.duration;
    task.job_number = stored.job_number.clone();
    task.approval_type = approval_type;
    task.approval_nodes = stored.approval_nodes.clone();
    task.predecessor_tasks = stored.predecessor_tasks.clone();
    task.successor_tasks = stored.successor_tasks.clone();
    task.is_editable = stored.is_editable;
    Ok(task)
}

/// Derive the connection list from the relation arrays, both directions
/// merged. The relation arrays themselves stay as loaded; the attach pass
/// only deduplicates.
fn rebuild_connections(plan: &mut Plan) {
    let mut edges: BTreeSet<(bool, ElementId, ElementId)> = BTreeSet::new();
    for stage in &plan.stages {
        for successor in &stage.successor_stages {
            edges.insert((true, stage.id, *successor));
        }
        for predecessor in &stage.predecessor_stages {
            edges.insert((true, *predecessor, stage.id));
        }
    }
    for task in plan.tasks() {
        for successor in &task.successor_tasks {
            edges.insert((false, task.id, *successor));
        }
        for predecessor in &task.predecessor_tasks {
            edges.insert((false, *predecessor, task.id));
        }
    }
    for (is_stage, from, to) in edges {
        let (from, to) = if is_stage {
            (Endpoint::stage(from), Endpoint::stage(to))
        } else {
            (Endpoint::task(from), Endpoint::task(to))
        };
        if plan.contains(from) && plan.contains(to) {
            plan.add_connection(from, to);
        }
    }
}

pub fn read_plan(path: &Path, config: &Config) -> anyhow::Result<Plan> {
    let raw = std::fs::read_to_string(path)?;
    let stored: StoredPlan = serde_json::from_str(&raw)?;
    Ok(from_stored(&stored, config)?)
}

pub fn write_plan(path: &Path, plan: &Plan) -> anyhow::Result<()> {
    let stored = to_stored(plan);
    let raw = serde_json::to_string_pretty(&stored)?;
    std::fs::write(path, raw)?;
    Ok(())
}
