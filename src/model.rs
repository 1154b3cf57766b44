use chrono::NaiveDate;

/// Element ids are backend-assigned positive integers. Elements that have
/// not been saved yet carry a transient negative id; saving migrates every
/// reference to the backend id in one pass (see `Plan::adopt_saved_ids`).
pub type ElementId = i64;

pub fn is_transient(id: ElementId) -> bool {
    id < 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Stage,
    Task,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Task => "task",
        }
    }
}

/// A committed position in world coordinates. Committed values are always
/// grid-aligned; continuous pointer math lives in `PointF` until snapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn to_f32(self) -> PointF {
        PointF {
            x: self.x as f32,
            y: self.y as f32,
        }
    }
}

/// Unsnapped coordinates used mid-gesture and inside the viewport transform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalType {
    /// Approval walks the assignee's reporting chain level by level.
    Sequential,
    /// Approval goes to an explicitly configured list of roles.
    Specified,
    /// No approval required.
    None,
}

impl ApprovalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Specified => "specified",
            Self::None => "none",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "sequential" => Some(Self::Sequential),
            "specified" => Some(Self::Specified),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: ElementId,
    pub name: String,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    /// Authored duration in days.
    pub duration: Option<i64>,
    /// Assignee's job number.
    pub job_number: Option<String>,
    pub approval_type: ApprovalType,
    pub approval_nodes: Vec<i64>,
    /// None means the task sits in the unassigned pool.
    pub stage_id: Option<ElementId>,
    /// Always absolute world coordinates, even while inside a stage.
    pub position: Point,
    pub predecessor_tasks: Vec<ElementId>,
    pub successor_tasks: Vec<ElementId>,
    /// Derived: false when unassigned or outside the stage content rect.
    pub is_valid_position: bool,
    /// False once the task has been generated downstream; restricts which
    /// new edges may attach and pins the task to its stage.
    pub is_editable: bool,
    pub has_time_issue: bool,
}

impl Task {
    pub fn new(id: ElementId, name: impl Into<String>, stage_id: Option<ElementId>) -> Self {
        Self {
            id,
            name: name.into(),
            start_time: None,
            end_time: None,
            duration: Some(1),
            job_number: None,
            approval_type: ApprovalType::Sequential,
            approval_nodes: Vec::new(),
            stage_id,
            position: Point::default(),
            predecessor_tasks: Vec::new(),
            successor_tasks: Vec::new(),
            is_valid_position: stage_id.is_some(),
            is_editable: true,
            has_time_issue: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: ElementId,
    pub name: String,
    /// Derived from contained tasks, never authored directly.
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub duration: Option<i64>,
    pub position: Rect,
    pub predecessor_stages: Vec<ElementId>,
    pub successor_stages: Vec<ElementId>,
    pub tasks: Vec<Task>,
    pub is_editable: bool,
    pub has_time_issue: bool,
}

impl Stage {
    pub fn new(id: ElementId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            start_time: None,
            end_time: None,
            duration: None,
            position: Rect::new(0, 0, 300, 200),
            predecessor_stages: Vec::new(),
            successor_stages: Vec::new(),
            tasks: Vec::new(),
            is_editable: true,
            has_time_issue: false,
        }
    }

    pub fn task(&self, id: ElementId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: ElementId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }
}

/// One end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub element_id: ElementId,
    pub element_type: ElementType,
}

impl Endpoint {
    pub fn stage(id: ElementId) -> Self {
        Self {
            element_id: id,
            element_type: ElementType::Stage,
        }
    }

    pub fn task(id: ElementId) -> Self {
        Self {
            element_id: id,
            element_type: ElementType::Task,
        }
    }
}

/// A directed precedence edge between two same-type elements. The
/// connection list is the single source of truth for edges; the
/// predecessor/successor arrays on stages and tasks are a derived view
/// maintained through `Plan::apply_relation_delta`.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Locally generated, opaque.
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
}
