use crate::config::GridConfig;
use crate::model::{Point, PointF, Rect, Size};

/// Snapping primitives. Every committed coordinate in the model is a
/// multiple of the grid unit; these are the only functions that produce
/// committed values from continuous ones.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    unit: i32,
}

impl Grid {
    pub fn new(unit: i32) -> Self {
        Self { unit: unit.max(1) }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.unit)
    }

    pub fn unit(&self) -> i32 {
        self.unit
    }

    /// Round to the nearest grid multiple.
    pub fn snap(&self, value: f32) -> i32 {
        let unit = self.unit as f32;
        (value / unit).round() as i32 * self.unit
    }

    /// Round an already-integral value to the nearest grid multiple.
    pub fn snap_i32(&self, value: i32) -> i32 {
        self.snap(value as f32)
    }

    /// Round up to the next grid multiple. Used for derived content sizes
    /// so the content never shrinks below its extent.
    pub fn snap_up(&self, value: i32) -> i32 {
        value.div_euclid(self.unit) * self.unit
            + if value.rem_euclid(self.unit) == 0 {
                0
            } else {
                self.unit
            }
    }

    /// Floor to a grid multiple.
    pub fn snap_floor(&self, value: f32) -> i32 {
        (value / self.unit as f32).floor() as i32 * self.unit
    }

    /// Ceil to a grid multiple.
    pub fn snap_ceil(&self, value: f32) -> i32 {
        (value / self.unit as f32).ceil() as i32 * self.unit
    }

    pub fn snap_point(&self, point: PointF) -> Point {
        Point::new(self.snap(point.x), self.snap(point.y))
    }

    pub fn snap_size(&self, size: Size) -> Size {
        Size::new(self.snap_i32(size.width), self.snap_i32(size.height))
    }

    pub fn snap_rect(&self, rect: Rect) -> Rect {
        Rect::new(
            self.snap_i32(rect.x),
            self.snap_i32(rect.y),
            self.snap_i32(rect.width),
            self.snap_i32(rect.height),
        )
    }

    pub fn is_aligned(&self, point: Point) -> bool {
        point.x % self.unit == 0 && point.y % self.unit == 0
    }
}

/// Pan/zoom state of the canvas. `screen = world * zoom - scroll`; all
/// methods are pure and return the next viewport for the caller to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_x: f32,
    pub scroll_y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            zoom: 1.0,
        }
    }
}

/// How `zoom_to` places the focused world point in the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusAlign {
    Center,
    TopLeft,
}

impl Viewport {
    pub fn screen_to_world(&self, screen: PointF) -> PointF {
        PointF::new(
            (screen.x + self.scroll_x) / self.zoom,
            (screen.y + self.scroll_y) / self.zoom,
        )
    }

    pub fn world_to_screen(&self, world: PointF) -> PointF {
        PointF::new(
            world.x * self.zoom - self.scroll_x,
            world.y * self.zoom - self.scroll_y,
        )
    }

    /// Zoom about a screen anchor, keeping the world point under the anchor
    /// stationary. The anchor's world coordinate must be computed against
    /// the old zoom and the scroll re-derived from it against the new one.
    pub fn zoom_at(&self, anchor: PointF, target_zoom: f32, config: &GridConfig) -> Viewport {
        let zoom = target_zoom.clamp(config.min_zoom, config.max_zoom);
        if zoom == self.zoom {
            return *self;
        }
        let world = self.screen_to_world(anchor);
        Viewport {
            scroll_x: world.x * zoom - anchor.x,
            scroll_y: world.y * zoom - anchor.y,
            zoom,
        }
    }

    /// One wheel notch toward or away from the anchor.
    pub fn wheel_zoom(&self, anchor: PointF, zoom_in: bool, config: &GridConfig) -> Viewport {
        let delta = if zoom_in {
            config.zoom_step
        } else {
            -config.zoom_step
        };
        self.zoom_at(anchor, self.zoom + delta, config)
    }

    /// Zoom to a target level with a world focus point aligned to the
    /// viewport center or top-left corner ("focus on element").
    pub fn zoom_to(
        &self,
        target_zoom: f32,
        focus: PointF,
        viewport_size: (f32, f32),
        align: FocusAlign,
        config: &GridConfig,
    ) -> Viewport {
        let zoom = target_zoom.clamp(config.min_zoom, config.max_zoom);
        let (view_w, view_h) = viewport_size;
        let (scroll_x, scroll_y) = match align {
            FocusAlign::TopLeft => (focus.x * zoom, focus.y * zoom),
            FocusAlign::Center => (focus.x * zoom - view_w / 2.0, focus.y * zoom - view_h / 2.0),
        };
        Viewport {
            scroll_x,
            scroll_y,
            zoom,
        }
    }

    /// Clamp scroll into the scrollable range of the zoomed content.
    pub fn clamp_scroll(&self, content_size: (f32, f32), viewport_size: (f32, f32)) -> Viewport {
        let max_x = (content_size.0 * self.zoom - viewport_size.0).max(0.0);
        let max_y = (content_size.1 * self.zoom - viewport_size.1).max(0.0);
        Viewport {
            scroll_x: self.scroll_x.clamp(0.0, max_x),
            scroll_y: self.scroll_y.clamp(0.0, max_y),
            zoom: self.zoom,
        }
    }
}
