use crate::config::GeometryConfig;
use crate::grid::Grid;
use crate::model::{Point, PointF, Rect, Size, Stage};

/// Constraint math for drag and resize. Every function is total: the
/// result is always legal geometry, and callers detect an illegal request
/// by comparing it with what came back.

/// The stage rectangle a task box must stay inside: below the header, and
/// inset from the right/bottom by the stage border (border-box sizing).
pub fn stage_content_rect(stage: &Stage, geom: &GeometryConfig) -> Rect {
    let pos = stage.position;
    Rect::new(
        pos.x,
        pos.y + geom.header_height,
        pos.width - geom.stage_border,
        pos.height - geom.header_height - geom.stage_border,
    )
}

/// Clamp a task's absolute position so its box lies inside the stage
/// content rect, then snap. The left/top edges win over right/bottom when
/// the stage is too small to hold the task at all.
pub fn contain_task(pos: PointF, stage: &Stage, geom: &GeometryConfig, grid: &Grid) -> Point {
    let content = stage_content_rect(stage, geom);
    let max_x = (content.right() - geom.task_width) as f32;
    let max_y = (content.bottom() - geom.task_height) as f32;

    let mut x = pos.x;
    let mut y = pos.y;
    if x > max_x {
        x = max_x;
    }
    if x < content.x as f32 {
        x = content.x as f32;
    }
    if y > max_y {
        y = max_y;
    }
    if y < content.y as f32 {
        y = content.y as f32;
    }
    grid.snap_point(PointF::new(x, y))
}

/// Clamp to the canvas origin: x, y >= 0, snapped.
pub fn clamp_to_canvas(pos: PointF, grid: &Grid) -> Point {
    grid.snap_point(PointF::new(pos.x.max(0.0), pos.y.max(0.0)))
}

/// Whether a task box at `pos` lies fully within the stage content rect.
pub fn task_fits_in_stage(pos: Point, stage: &Stage, geom: &GeometryConfig) -> bool {
    let content = stage_content_rect(stage, geom);
    pos.x >= content.x
        && pos.y >= content.y
        && pos.x + geom.task_width <= content.right()
        && pos.y + geom.task_height <= content.bottom()
}

/// Point-in-stage test; first match wins. Includes the header band, so a
/// pointer over the title still targets the stage.
pub fn stage_at_point<'a>(point: PointF, stages: &'a [Stage]) -> Option<&'a Stage> {
    let x = point.x.round() as i32;
    let y = point.y.round() as i32;
    stages.iter().find(|s| s.position.contains_point(x, y))
}

/// Stage lookup for a dragged task box: matches when the box's top-left
/// corner or its center lies inside the stage rectangle.
pub fn stage_for_box<'a>(top_left: PointF, size: Size, stages: &'a [Stage]) -> Option<&'a Stage> {
    let corner = (top_left.x.round() as i32, top_left.y.round() as i32);
    let center = (
        (top_left.x + size.width as f32 / 2.0).round() as i32,
        (top_left.y + size.height as f32 / 2.0).round() as i32,
    );
    stages.iter().find(|s| {
        s.position.contains_point(corner.0, corner.1) || s.position.contains_point(center.0, center.1)
    })
}

/// Rectangle-intersection query used to refuse dropping a new stage on top
/// of an existing one.
pub fn find_overlap<'a>(candidate: Rect, stages: &'a [Stage]) -> Option<&'a Stage> {
    stages.iter().find(|s| s.position.intersects(&candidate))
}

/// Smallest rectangle covering every task box inside the stage, in world
/// coordinates. None when the stage is empty.
pub fn tasks_bounding_box(stage: &Stage, geom: &GeometryConfig) -> Option<Rect> {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for task in &stage.tasks {
        min_x = min_x.min(task.position.x);
        min_y = min_y.min(task.position.y);
        max_x = max_x.max(task.position.x + geom.task_width);
        max_y = max_y.max(task.position.y + geom.task_height);
    }
    if min_x == i32::MAX {
        return None;
    }
    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

/// Which stage edges a resize gesture is pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeEdges {
    pub north: bool,
    pub south: bool,
    pub east: bool,
    pub west: bool,
}

impl ResizeEdges {
    pub const NORTH: Self = Self {
        north: true,
        south: false,
        east: false,
        west: false,
    };
    pub const SOUTH: Self = Self {
        north: false,
        south: true,
        east: false,
        west: false,
    };
    pub const EAST: Self = Self {
        north: false,
        south: false,
        east: true,
        west: false,
    };
    pub const WEST: Self = Self {
        north: false,
        south: false,
        east: false,
        west: true,
    };

    pub fn and(self, other: Self) -> Self {
        Self {
            north: self.north || other.north,
            south: self.south || other.south,
            east: self.east || other.east,
            west: self.west || other.west,
        }
    }
}

/// Resize a stage by a pointer delta on the given edges. The opposite edge
/// stays fixed. The candidate is clamped, in order of priority, against the
/// bounding box of contained tasks (resize never hides a task), the
/// configured minimum size, and the canvas origin; the result is snapped.
pub fn resize_stage(
    stage: &Stage,
    edges: ResizeEdges,
    delta: PointF,
    geom: &GeometryConfig,
    grid: &Grid,
) -> Rect {
    let pos = stage.position;
    let mut left = pos.x as f32;
    let mut top = pos.y as f32;
    let mut right = pos.right() as f32;
    let mut bottom = pos.bottom() as f32;

    if edges.west {
        left += delta.x;
    }
    if edges.east {
        right += delta.x;
    }
    if edges.north {
        top += delta.y;
    }
    if edges.south {
        bottom += delta.y;
    }

    // Hard floor from the contained tasks: the content rect (which starts
    // below the header and is inset by the border) must keep covering the
    // bounding box of every task.
    if let Some(tasks_box) = tasks_bounding_box(stage, geom) {
        if edges.west {
            left = left.min(tasks_box.x as f32);
        }
        if edges.north {
            top = top.min((tasks_box.y - geom.header_height) as f32);
        }
        if edges.east {
            right = right.max((tasks_box.right() + geom.stage_border) as f32);
        }
        if edges.south {
            bottom = bottom.max((tasks_box.bottom() + geom.stage_border) as f32);
        }
    }

    // Minimum size, growing away from the fixed edge.
    if edges.west {
        left = left.min(right - geom.min_stage_width as f32);
    }
    if edges.east {
        right = right.max(left + geom.min_stage_width as f32);
    }
    if edges.north {
        top = top.min(bottom - geom.min_stage_height as f32);
    }
    if edges.south {
        bottom = bottom.max(top + geom.min_stage_height as f32);
    }

    // Canvas origin.
    if left < 0.0 {
        left = 0.0;
    }
    if top < 0.0 {
        top = 0.0;
    }

    // Moving edges snap outward so snapping can never undo a clamp.
    let snapped_left = if edges.west {
        grid.snap_floor(left).max(0)
    } else {
        pos.x
    };
    let snapped_top = if edges.north {
        grid.snap_floor(top).max(0)
    } else {
        pos.y
    };
    let snapped_right = if edges.east {
        grid.snap_ceil(right)
    } else {
        pos.right()
    };
    let snapped_bottom = if edges.south {
        grid.snap_ceil(bottom)
    } else {
        pos.bottom()
    };

    Rect::new(
        snapped_left,
        snapped_top,
        snapped_right - snapped_left,
        snapped_bottom - snapped_top,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;

    fn geom() -> GeometryConfig {
        GeometryConfig::default()
    }

    fn grid() -> Grid {
        Grid::new(8)
    }

    fn stage_at(x: i32, y: i32, w: i32, h: i32) -> Stage {
        let mut stage = Stage::new(1, "s");
        stage.position = Rect::new(x, y, w, h);
        stage
    }

    #[test]
    fn contain_task_clamps_each_edge() {
        let stage = stage_at(0, 0, 400, 400);
        let geom = geom();
        let grid = grid();

        // Past the right edge: 400 - 4 border - 196 = 200.
        let pos = contain_task(PointF::new(900.0, 100.0), &stage, &geom, &grid);
        assert_eq!(pos.x, 200);

        // Above the content area: clamped to below the header.
        let pos = contain_task(PointF::new(16.0, 0.0), &stage, &geom, &grid);
        assert_eq!(pos.y, 64); // header 60 snapped to 64

        // Legal positions pass through (modulo snapping).
        let pos = contain_task(PointF::new(16.0, 96.0), &stage, &geom, &grid);
        assert_eq!(pos, Point::new(16, 96));
    }

    #[test]
    fn contained_position_is_grid_aligned() {
        let stage = stage_at(8, 8, 504, 400);
        let pos = contain_task(PointF::new(123.4, 171.7), &stage, &geom(), &grid());
        assert_eq!(pos.x % 8, 0);
        assert_eq!(pos.y % 8, 0);
    }

    #[test]
    fn stage_at_point_includes_header_band() {
        let stages = vec![stage_at(80, 80, 400, 400)];
        // Inside the header.
        assert!(stage_at_point(PointF::new(100.0, 90.0), &stages).is_some());
        // Just outside the top edge.
        assert!(stage_at_point(PointF::new(100.0, 70.0), &stages).is_none());
    }

    #[test]
    fn stage_for_box_matches_corner_or_center() {
        let stages = vec![stage_at(0, 0, 400, 400)];
        let size = Size::new(196, 100);
        // Corner outside, center inside.
        let hit = stage_for_box(PointF::new(-90.0, 10.0), size, &stages);
        assert!(hit.is_some());
        // Both outside.
        let miss = stage_for_box(PointF::new(600.0, 600.0), size, &stages);
        assert!(miss.is_none());
    }

    #[test]
    fn find_overlap_reports_first_intersecting_stage() {
        let stages = vec![stage_at(0, 0, 400, 400), stage_at(480, 0, 400, 400)];
        assert_eq!(
            find_overlap(Rect::new(440, 0, 100, 100), &stages).map(|s| s.id),
            Some(1)
        );
        assert!(find_overlap(Rect::new(0, 480, 100, 100), &stages).is_none());
    }

    #[test]
    fn resize_respects_minimum_size() {
        let stage = stage_at(80, 80, 480, 320);
        let rect = resize_stage(&stage, ResizeEdges::EAST, PointF::new(-400.0, 0.0), &geom(), &grid());
        assert_eq!(rect.width, 400);
        assert_eq!(rect.x, 80); // west edge fixed
        assert_eq!(rect.y, 80);
        assert_eq!(rect.height, 320);
    }

    #[test]
    fn resize_never_hides_a_contained_task() {
        let mut stage = stage_at(0, 0, 800, 640);
        let mut task = Task::new(10, "t", Some(1));
        task.position = Point::new(400, 200);
        stage.tasks.push(task);

        let rect = resize_stage(&stage, ResizeEdges::EAST, PointF::new(-600.0, 0.0), &geom(), &grid());
        // Content right edge must still cover task right (400 + 196) plus
        // the stage border.
        assert!(rect.right() - 4 >= 596);

        let rect = resize_stage(&stage, ResizeEdges::NORTH, PointF::new(0.0, 500.0), &geom(), &grid());
        assert!(rect.y + 60 <= 200);
    }

    #[test]
    fn resize_clamps_to_canvas_origin() {
        let stage = stage_at(80, 80, 480, 320);
        let rect = resize_stage(
            &stage,
            ResizeEdges::WEST.and(ResizeEdges::NORTH),
            PointF::new(-500.0, -500.0),
            &geom(),
            &grid(),
        );
        assert!(rect.x >= 0);
        assert!(rect.y >= 0);
        assert_eq!(rect.right(), 560); // east edge fixed
        assert_eq!(rect.bottom(), 400); // south edge fixed
    }
}
