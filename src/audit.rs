use crate::model::{ApprovalType, ElementId, ElementType};
use crate::store::Plan;
use crate::timing::{stage_time_issue, task_time_issue};

/// A required field a task is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    StartTime,
    EndTime,
    Assignee,
    ApprovalChain,
}

impl MissingField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartTime => "start time",
            Self::EndTime => "end time",
            Self::Assignee => "assignee",
            Self::ApprovalChain => "approval chain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbnormalReason {
    /// Task sits in the unassigned pool.
    Unassigned,
    /// Task is assigned but outside its stage's content rect.
    InvalidPosition,
    MissingInfo(Vec<MissingField>),
    TimeConflict,
}

/// Severity drives the caller's presentation: time conflicts alone are a
/// warning, anything else blocks generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Blocking,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub element_id: ElementId,
    pub element_type: ElementType,
    pub name: String,
    pub stage_id: Option<ElementId>,
    pub reasons: Vec<AbnormalReason>,
}

impl Finding {
    pub fn severity(&self) -> Severity {
        let only_time = self
            .reasons
            .iter()
            .all(|r| matches!(r, AbnormalReason::TimeConflict));
        if only_time {
            Severity::Warning
        } else {
            Severity::Blocking
        }
    }
}

fn missing_fields(
    start: bool,
    end: bool,
    assignee: bool,
    approval_type: ApprovalType,
    approval_nodes_empty: bool,
) -> Vec<MissingField> {
    let mut fields = Vec::new();
    if !start {
        fields.push(MissingField::StartTime);
    }
    if !end {
        fields.push(MissingField::EndTime);
    }
    if !assignee {
        fields.push(MissingField::Assignee);
    }
    if approval_type != ApprovalType::None && approval_nodes_empty {
        fields.push(MissingField::ApprovalChain);
    }
    fields
}

/// Sweep the whole plan for abnormal elements. Tasks are flagged for
/// missing assignment, invalid position, incomplete required fields, and
/// time conflicts; stages only ever carry time conflicts.
pub fn audit_plan(plan: &Plan) -> Vec<Finding> {
    let mut findings = Vec::new();

    let mut push_task = |task: &crate::model::Task, stage_id: Option<ElementId>| {
        let mut reasons = Vec::new();
        if stage_id.is_none() {
            reasons.push(AbnormalReason::Unassigned);
        } else if !task.is_valid_position {
            reasons.push(AbnormalReason::InvalidPosition);
        }
        let fields = missing_fields(
            task.start_time.is_some(),
            task.end_time.is_some(),
            task.job_number.is_some(),
            task.approval_type,
            task.approval_nodes.is_empty(),
        );
        if !fields.is_empty() {
            reasons.push(AbnormalReason::MissingInfo(fields));
        }
        if task_time_issue(plan, task.id) {
            reasons.push(AbnormalReason::TimeConflict);
        }
        if !reasons.is_empty() {
            findings.push(Finding {
                element_id: task.id,
                element_type: ElementType::Task,
                name: task.name.clone(),
                stage_id,
                reasons,
            });
        }
    };

    for stage in &plan.stages {
        for task in &stage.tasks {
            push_task(task, Some(stage.id));
        }
    }
    for task in &plan.unassigned {
        push_task(task, None);
    }

    for stage in &plan.stages {
        if stage_time_issue(plan, stage.id) {
            findings.push(Finding {
                element_id: stage.id,
                element_type: ElementType::Stage,
                name: stage.name.clone(),
                stage_id: None,
                reasons: vec![AbnormalReason::TimeConflict],
            });
        }
    }

    findings
}
