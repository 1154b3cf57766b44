use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Snapping increment for every committed position and size.
    pub unit: i32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Zoom delta applied per wheel notch.
    pub zoom_step: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            unit: 8,
            min_zoom: 0.2,
            max_zoom: 3.0,
            zoom_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub task_width: i32,
    pub task_height: i32,
    /// Task card border, each side. The occupied box is the content box
    /// plus twice this.
    pub task_border: i32,
    /// Stage header band; the content rect starts below it.
    pub header_height: i32,
    /// Stage card border (border-box: width/height include it).
    pub stage_border: i32,
    pub min_stage_width: i32,
    pub min_stage_height: i32,
    pub default_stage_width: i32,
    pub default_stage_height: i32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            task_width: 196,
            task_height: 100,
            task_border: 1,
            header_height: 60,
            stage_border: 4,
            min_stage_width: 400,
            min_stage_height: 250,
            default_stage_width: 300,
            default_stage_height: 200,
        }
    }
}

impl GeometryConfig {
    /// Footprint of a task card including its border.
    pub fn task_occupied_width(&self) -> i32 {
        self.task_width + self.task_border * 2
    }

    pub fn task_occupied_height(&self) -> i32 {
        self.task_height + self.task_border * 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Gap between task cards, both axes.
    pub task_spacing: i32,
    /// Gap between stages, both axes.
    pub stage_spacing: i32,
    /// Inset from the stage content border to the task extent.
    pub stage_padding: i32,
    /// Top-left anchor of the arranged graph.
    pub origin_x: i32,
    pub origin_y: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            task_spacing: 40,
            stage_spacing: 80,
            stage_padding: 40,
            origin_x: 400,
            origin_y: 400,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub geometry: GeometryConfig,
    pub layout: LayoutConfig,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&raw)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupied_box_includes_borders() {
        let geom = GeometryConfig::default();
        assert_eq!(geom.task_occupied_width(), 198);
        assert_eq!(geom.task_occupied_height(), 102);
    }

    #[test]
    fn partial_config_overlay_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"grid": {"unit": 16}}"#).unwrap();
        assert_eq!(config.grid.unit, 16);
        assert_eq!(config.geometry.task_width, 196);
        assert_eq!(config.layout.stage_spacing, 80);
    }
}
