mod layering;

pub use layering::{LayerNode, assign_layers, kahn_order, merged_adjacency, order_with_fallback};

use std::collections::BTreeMap;

use log::debug;

use crate::config::Config;
use crate::geometry::task_fits_in_stage;
use crate::grid::Grid;
use crate::model::{ElementId, Point, PointF, Size, Stage};
use crate::store::Plan;

/// New positions for everything on the canvas, produced in one pass and
/// applied atomically. Pure with respect to the input plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutResult {
    pub task_positions: BTreeMap<ElementId, Point>,
    pub stage_positions: BTreeMap<ElementId, Point>,
    pub stage_sizes: BTreeMap<ElementId, Size>,
}

/// Task layout inside one stage, relative to the content origin (below the
/// header, inside the padding).
struct StageInterior {
    task_positions: BTreeMap<ElementId, Point>,
    width: i32,
    height: i32,
}

/// Re-arrange the whole graph: tasks are layered within each stage, stages
/// are layered across the canvas, unassigned tasks go in a final row below
/// everything. Layers stack along x, layer members stack along y centered
/// against the tallest layer. Output coordinates are all grid-snapped, and
/// the function is idempotent for a given graph.
pub fn organize(plan: &Plan, config: &Config) -> LayoutResult {
    let grid = Grid::from_config(&config.grid);
    let geom = &config.geometry;
    let layout = &config.layout;

    let mut interiors: BTreeMap<ElementId, StageInterior> = BTreeMap::new();
    for stage in &plan.stages {
        interiors.insert(stage.id, layout_stage_interior(stage, config, &grid));
    }

    let stage_positions = layout_stages(plan, &interiors, config, &grid);

    let mut result = LayoutResult::default();
    for stage in &plan.stages {
        let Some(stage_pos) = stage_positions.get(&stage.id) else {
            continue;
        };
        let interior = &interiors[&stage.id];
        result.stage_positions.insert(stage.id, *stage_pos);
        result
            .stage_sizes
            .insert(stage.id, Size::new(interior.width, interior.height));
        for (task_id, rel) in &interior.task_positions {
            let absolute = PointF::new(
                (stage_pos.x + layout.stage_padding + rel.x) as f32,
                (stage_pos.y + geom.header_height + layout.stage_padding + rel.y) as f32,
            );
            result.task_positions.insert(*task_id, grid.snap_point(absolute));
        }
    }

    // Unassigned tasks: one row under the arranged stages, left to right.
    let origin_x = grid.snap(layout.origin_x as f32);
    let origin_y = grid.snap(layout.origin_y as f32);
    let mut row_y = origin_y;
    if !plan.stages.is_empty() {
        let mut max_stage_y = 0;
        let mut max_stage_height = 0;
        for stage in &plan.stages {
            if let Some(pos) = result.stage_positions.get(&stage.id) {
                max_stage_y = max_stage_y.max(pos.y);
            }
            if let Some(size) = result.stage_sizes.get(&stage.id) {
                max_stage_height = max_stage_height.max(size.height);
            }
        }
        row_y = grid.snap((max_stage_y + max_stage_height + layout.stage_spacing * 2) as f32);
    }
    let mut cursor_x = origin_x;
    for task in &plan.unassigned {
        result
            .task_positions
            .insert(task.id, grid.snap_point(PointF::new(cursor_x as f32, row_y as f32)));
        cursor_x += geom.task_occupied_width() + layout.task_spacing;
    }

    debug!(
        "layout organized: {} stages, {} tasks",
        result.stage_positions.len(),
        result.task_positions.len()
    );
    result
}

/// Write a layout result back into the plan, refreshing position validity.
/// Bypasses the incremental drag constraints: the layout engine owns the
/// whole geometry when invoked.
pub fn apply(plan: &mut Plan, result: &LayoutResult, config: &Config) {
    for stage in &mut plan.stages {
        if let Some(pos) = result.stage_positions.get(&stage.id) {
            stage.position.x = pos.x;
            stage.position.y = pos.y;
        }
        if let Some(size) = result.stage_sizes.get(&stage.id) {
            stage.position.width = size.width;
            stage.position.height = size.height;
        }
    }
    for stage_idx in 0..plan.stages.len() {
        let stage_snapshot = plan.stages[stage_idx].clone();
        for task in &mut plan.stages[stage_idx].tasks {
            if let Some(pos) = result.task_positions.get(&task.id) {
                task.position = *pos;
                task.is_valid_position = task_fits_in_stage(*pos, &stage_snapshot, &config.geometry);
            }
        }
    }
    for task in &mut plan.unassigned {
        if let Some(pos) = result.task_positions.get(&task.id) {
            task.position = *pos;
            task.is_valid_position = false;
        }
    }
}

fn layout_stage_interior(stage: &Stage, config: &Config, grid: &Grid) -> StageInterior {
    let geom = &config.geometry;
    let layout = &config.layout;
    if stage.tasks.is_empty() {
        return StageInterior {
            task_positions: BTreeMap::new(),
            width: geom.default_stage_width,
            height: grid.snap_up(geom.header_height + layout.stage_padding * 2),
        };
    }

    let nodes: Vec<LayerNode> = stage
        .tasks
        .iter()
        .map(|t| LayerNode {
            id: t.id,
            predecessors: t.predecessor_tasks.clone(),
            successors: t.successor_tasks.clone(),
        })
        .collect();
    let input_order: Vec<ElementId> = stage.tasks.iter().map(|t| t.id).collect();
    let adjacency = merged_adjacency(&nodes);
    let order = order_with_fallback(&adjacency, &input_order);
    let layers = assign_layers(&adjacency, &order);

    let occupied_w = geom.task_occupied_width();
    let occupied_h = geom.task_occupied_height();
    let layer_count = layers.len() as i32;
    let layer_height = |members: usize| -> i32 {
        let n = members as i32;
        n * occupied_h + (n - 1) * layout.task_spacing
    };
    let total_width = layer_count * occupied_w + (layer_count - 1) * layout.task_spacing;
    let total_height = layers
        .values()
        .map(|members| layer_height(members.len()))
        .max()
        .unwrap_or(occupied_h)
        .max(occupied_h);

    let mut task_positions = BTreeMap::new();
    let mut cursor_x = 0;
    for members in layers.values() {
        let height = layer_height(members.len());
        let mut cursor_y = (total_height - height) / 2;
        for task_id in members {
            task_positions.insert(*task_id, Point::new(cursor_x, cursor_y));
            cursor_y += occupied_h + layout.task_spacing;
        }
        cursor_x += occupied_w + layout.task_spacing;
    }

    StageInterior {
        task_positions,
        width: grid.snap_up(total_width + layout.stage_padding * 2),
        height: grid.snap_up(geom.header_height + total_height + layout.stage_padding * 2),
    }
}

fn layout_stages(
    plan: &Plan,
    interiors: &BTreeMap<ElementId, StageInterior>,
    config: &Config,
    grid: &Grid,
) -> BTreeMap<ElementId, Point> {
    let layout = &config.layout;
    let mut positions = BTreeMap::new();
    if plan.stages.is_empty() {
        return positions;
    }

    let nodes: Vec<LayerNode> = plan
        .stages
        .iter()
        .map(|s| LayerNode {
            id: s.id,
            predecessors: s.predecessor_stages.clone(),
            successors: s.successor_stages.clone(),
        })
        .collect();
    let input_order: Vec<ElementId> = plan.stages.iter().map(|s| s.id).collect();
    let adjacency = merged_adjacency(&nodes);
    let order = order_with_fallback(&adjacency, &input_order);
    let layers = assign_layers(&adjacency, &order);

    let size_of = |id: ElementId| -> (i32, i32) {
        interiors
            .get(&id)
            .map(|i| (i.width, i.height))
            .unwrap_or((config.geometry.default_stage_width, config.geometry.default_stage_height))
    };

    let mut layer_max_width: BTreeMap<usize, i32> = BTreeMap::new();
    let mut tallest = 0;
    for (layer, members) in &layers {
        let mut max_w = 0;
        for id in members {
            let (w, h) = size_of(*id);
            max_w = max_w.max(w);
            tallest = tallest.max(h);
        }
        layer_max_width.insert(*layer, max_w);
    }

    let origin_x = grid.snap(layout.origin_x as f32);
    let origin_y = grid.snap(layout.origin_y as f32);
    let mut cursor_x = origin_x;
    for (layer, members) in &layers {
        if members.len() > 1 {
            let mut cursor_y = origin_y;
            for id in members {
                let (_, height) = size_of(*id);
                positions.insert(*id, Point::new(grid.snap(cursor_x as f32), grid.snap(cursor_y as f32)));
                cursor_y = grid.snap((cursor_y + height + layout.stage_spacing) as f32);
            }
        } else if let Some(id) = members.first() {
            // A lone stage in its layer centers against the tallest stage.
            let (_, height) = size_of(*id);
            let centered = origin_y + (tallest - height) / 2;
            let y = centered.max(origin_y);
            positions.insert(*id, Point::new(grid.snap(cursor_x as f32), grid.snap(y as f32)));
        }
        let max_w = layer_max_width.get(layer).copied().unwrap_or(0);
        cursor_x = grid.snap((cursor_x + max_w + layout.stage_spacing) as f32);
    }
    positions
}
