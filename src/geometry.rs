//! Flat-top hexagon tiling for a surface of known size.
//!
//! Columns advance by `dx = 1.5 * hex_size`, rows by `dy = sqrt(3) * hex_size`,
//! and odd columns sit half a row lower than even ones. The tiling extends
//! `bleed_rows` above and below the visible area so a vertical scroll can wrap
//! around without exposing a gap.
use std::f64::consts::{FRAC_PI_3, PI};

use crate::config::{OUTER_SCALE_RANGE, clamp_param};

const SQRT_3: f64 = 1.732_050_807_568_877_2;
// Absorbs float noise so an exact fit (900 / 180) doesn't gain an extra bleed row.
const CEIL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub hex_size: f64,
    pub dx: f64,
    pub dy: f64,
    pub columns: usize,
    pub rows: usize,
    pub bleed_rows: usize,
    pub total_height: f64,
    pub start_y: f64,
}

impl Geometry {
    /// Lay out the grid for `surface`. Zero-sized surfaces are treated as 1px
    /// and out-of-range scales are clamped, so the result is never degenerate.
    pub fn compute(surface: SurfaceSize, outer_scale: f64, visible_rows: u32) -> Self {
        let width = f64::from(surface.width.max(1));
        let height = f64::from(surface.height.max(1));
        let outer_scale = clamp_param("outer-scale", outer_scale, OUTER_SCALE_RANGE);
        let visible_rows = visible_rows.max(1);

        let base_size = height / (f64::from(visible_rows) * SQRT_3);
        let hex_size = base_size * outer_scale;
        let dx = 1.5 * hex_size;
        let dy = SQRT_3 * hex_size;

        let bleed_rows = ceil_count(height / dy);
        let rows = visible_rows as usize + 2 * bleed_rows;
        let columns = ceil_count(width / dx) + 2;

        Self {
            hex_size,
            dx,
            dy,
            columns,
            rows,
            bleed_rows,
            total_height: rows as f64 * dy,
            start_y: -(bleed_rows as f64) * dy,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.columns * self.rows
    }

    /// Center of the cell at (`column`, `row`) before any scrolling.
    pub fn cell_origin(&self, column: usize, row: usize) -> (f64, f64) {
        let x = column as f64 * self.dx;
        let offset = 0.5 * self.dy * (column % 2) as f64;
        let y = self.start_y + row as f64 * self.dy + offset;
        (x, y)
    }

    /// Global scroll offset in `[0, total_height)` after `elapsed_secs`.
    pub fn scroll_offset(&self, speed: f64, elapsed_secs: f64) -> f64 {
        if !self.total_height.is_finite() || self.total_height <= 0.0 || !elapsed_secs.is_finite() {
            return 0.0;
        }
        (self.dy * speed * elapsed_secs).rem_euclid(self.total_height)
    }

    /// Scrolled position of a cell whose unscrolled center is `base_y`.
    pub fn wrap_y(&self, base_y: f64, scroll_offset: f64) -> f64 {
        let y = base_y + scroll_offset;
        if y > self.start_y + self.total_height {
            y - self.total_height
        } else {
            y
        }
    }
}

/// Six vertices of a flat-top hexagon, at angles k * 60 degrees.
pub fn hexagon_vertices(cx: f64, cy: f64, radius: f64) -> [(f64, f64); 6] {
    let mut vertices = [(0.0, 0.0); 6];
    for (k, vertex) in vertices.iter_mut().enumerate() {
        let angle = FRAC_PI_3 * k as f64;
        *vertex = (cx + radius * angle.cos(), cy + radius * angle.sin());
    }
    vertices
}

/// Whether `(px, py)` lies inside the flat-top hexagon centered at `(cx, cy)`.
pub fn hexagon_contains(cx: f64, cy: f64, radius: f64, px: f64, py: f64) -> bool {
    let dx = (px - cx).abs();
    let dy = (py - cy).abs();
    let half_height = radius * (PI / 3.0).sin();
    dy <= half_height && SQRT_3 * dx + dy <= SQRT_3 * radius
}

fn ceil_count(value: f64) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value - CEIL_EPSILON).ceil().max(0.0) as usize
}
