//! Draws one cell: hexagon clip, then the outgoing and incoming images.
use tiny_skia::{FillRule, FilterQuality, Paint, PathBuilder, Pattern, Pixmap, SpreadMode, Transform};

use crate::geometry::hexagon_vertices;
use crate::grid::Cell;

/// Scale and opacity of one image layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub scale: f32,
    pub opacity: f32,
}

impl Blend {
    pub const OPAQUE: Blend = Blend {
        scale: 1.0,
        opacity: 1.0,
    };
}

/// Progress in `[0, 1]` of a fade that started at `start`.
pub fn transition_progress(now: f64, start: f64, duration_ms: f64) -> f64 {
    if duration_ms.is_nan() || duration_ms <= 0.0 {
        return 1.0;
    }
    let p = (now - start) / duration_ms;
    if p.is_nan() { 1.0 } else { p.clamp(0.0, 1.0) }
}

/// Incoming image zooms from 2x to 1x while fading in.
pub fn incoming_blend(progress: f64) -> Blend {
    let p = progress.clamp(0.0, 1.0) as f32;
    Blend {
        scale: 2.0 - p,
        opacity: p,
    }
}

/// Outgoing image stays at 1x while fading out.
pub fn outgoing_blend(progress: f64) -> Blend {
    let p = progress.clamp(0.0, 1.0) as f32;
    Blend {
        scale: 1.0,
        opacity: 1.0 - p,
    }
}

/// Image layer to draw for a cell, back to front.
pub struct Layer<'a> {
    pub image: &'a Pixmap,
    pub blend: Blend,
}

/// Visible layers of `cell` at `now`, in draw order. Slots without a resolved
/// image contribute nothing.
pub fn cell_layers(cell: &Cell, now: f64, transition_ms: f64) -> Vec<Layer<'_>> {
    let mut layers = Vec::with_capacity(2);
    let current = cell.current_slot();

    let Some(previous) = cell.previous_slot() else {
        if let Some(image) = current.image.as_deref() {
            layers.push(Layer {
                image,
                blend: Blend::OPAQUE,
            });
        }
        return layers;
    };

    if let (Some(image), Some(retired_at)) = (previous.image.as_deref(), previous.fade_out_start) {
        let p_out = transition_progress(now, retired_at, transition_ms);
        if p_out < 1.0 {
            layers.push(Layer {
                image,
                blend: outgoing_blend(p_out),
            });
        }
    }

    if let Some(image) = current.image.as_deref() {
        let p_in = transition_progress(now, current.fade_in_start, transition_ms);
        layers.push(Layer {
            image,
            blend: incoming_blend(p_in),
        });
    }

    layers
}

/// Per-cell drawing parameters shared by every cell of a frame.
#[derive(Debug, Clone, Copy)]
pub struct CellStyle {
    pub hex_size: f32,
    pub inner_scale: f32,
    pub transition_ms: f64,
}

/// Draw `cell` centered at (`cx`, `cy`). Returns the number of layers drawn.
///
/// The hexagon and its images are contracted by `inner_scale` about the
/// center. Everything is expressed through the fill path and the pattern
/// transform, so nothing carries over to the next cell.
pub fn draw_cell(
    target: &mut Pixmap,
    cell: &Cell,
    (cx, cy): (f32, f32),
    style: &CellStyle,
    now: f64,
) -> usize {
    let layers = cell_layers(cell, now, style.transition_ms);
    if layers.is_empty() {
        return 0;
    }

    let contraction = Transform::from_translate(cx, cy)
        .pre_scale(style.inner_scale, style.inner_scale)
        .pre_translate(-cx, -cy);
    let Some(clip) = hexagon_path(cx, cy, style.hex_size).and_then(|p| p.transform(contraction))
    else {
        return 0;
    };

    let mut drawn = 0;
    for layer in layers {
        if layer.blend.opacity <= 0.0 {
            continue;
        }
        let (w, h) = (layer.image.width() as f32, layer.image.height() as f32);
        // Fill a 2 * hex_size * scale square centered on the cell.
        let side = 2.0 * style.hex_size * layer.blend.scale;
        let (sx, sy) = (side / w, side / h);
        let image_ts = contraction
            .pre_translate(cx, cy)
            .pre_scale(sx, sy)
            .pre_translate(-w / 2.0, -h / 2.0);

        let paint = Paint {
            shader: Pattern::new(
                layer.image.as_ref(),
                SpreadMode::Pad,
                FilterQuality::Bilinear,
                layer.blend.opacity.min(1.0),
                image_ts,
            ),
            anti_alias: true,
            ..Paint::default()
        };
        target.fill_path(&clip, &paint, FillRule::Winding, Transform::identity(), None);
        drawn += 1;
    }
    drawn
}

fn hexagon_path(cx: f32, cy: f32, radius: f32) -> Option<tiny_skia::Path> {
    let vertices = hexagon_vertices(f64::from(cx), f64::from(cy), f64::from(radius));
    let mut pb = PathBuilder::new();
    for (k, (x, y)) in vertices.into_iter().enumerate() {
        if k == 0 {
            pb.move_to(x as f32, y as f32);
        } else {
            pb.line_to(x as f32, y as f32);
        }
    }
    pb.close();
    pb.finish()
}
