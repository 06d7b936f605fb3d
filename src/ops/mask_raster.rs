// ============================================================================
// Mask object rasterization + compositing fill patterns
// ============================================================================

use egui::{Pos2, Rect};

use crate::canvas::{FillStyle, MaskObject, MaskTiles};

/// Spacing between pattern lines, in pixels.
pub const PATTERN_SPACING: u32 = 8;
/// Thickness of pattern lines, in pixels.
const PATTERN_LINE_WIDTH: u32 = 2;

/// Redraw every object into `tiles` (cleared first).  Objects are applied in
/// order: brush lines and rects add coverage, eraser lines remove it.
pub fn rasterize_objects(tiles: &mut MaskTiles, objects: &[MaskObject]) {
    tiles.clear();
    for object in objects {
        match object {
            MaskObject::BrushLine { stroke_width, points, clip, .. } => {
                draw_stroke(tiles, points, *stroke_width, *clip, false);
            }
            MaskObject::EraserLine { stroke_width, points, clip, .. } => {
                draw_stroke(tiles, points, *stroke_width, *clip, true);
            }
            MaskObject::Rect { rect, .. } => draw_rect(tiles, *rect),
        }
    }
}

/// Whether pixel (x, y) is painted by the fill pattern.
#[inline]
pub fn pattern_covers(style: FillStyle, x: u32, y: u32) -> bool {
    let s = PATTERN_SPACING;
    let w = PATTERN_LINE_WIDTH;
    match style {
        FillStyle::Solid => true,
        FillStyle::Grid => x % s < w || y % s < w,
        FillStyle::Crosshatch => {
            (x + y) % s < w || (x as i64 - y as i64).rem_euclid(s as i64) < w as i64
        }
        FillStyle::Diagonal => (x + y) % s < w,
        FillStyle::Horizontal => y % s < w,
        FillStyle::Vertical => x % s < w,
    }
}

fn draw_rect(tiles: &mut MaskTiles, rect: Rect) {
    let Some((min_x, min_y, max_x, max_y)) = pixel_span(tiles, rect) else { return };
    for y in min_y..max_y {
        for x in min_x..max_x {
            tiles.put(x, y, 255);
        }
    }
}

/// Stroke a polyline as a chain of anti-aliased capsules.
fn draw_stroke(tiles: &mut MaskTiles, points: &[Pos2], stroke_width: f32, clip: Option<Rect>, erase: bool) {
    let radius = stroke_width / 2.0;
    if points.is_empty() || radius <= 0.0 || !radius.is_finite() {
        return;
    }

    // A single point is a dot: treat it as a zero-length segment.
    let segments: Vec<(Pos2, Pos2)> = if points.len() == 1 {
        vec![(points[0], points[0])]
    } else {
        points.windows(2).map(|w| (w[0], w[1])).collect()
    };

    for (a, b) in segments {
        let mut bounds = Rect::from_two_pos(a, b).expand(radius + 1.0);
        if let Some(c) = clip {
            bounds = bounds.intersect(c);
        }
        let Some((min_x, min_y, max_x, max_y)) = pixel_span(tiles, bounds) else { continue };

        for y in min_y..max_y {
            for x in min_x..max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                if let Some(c) = clip
                    && !c.contains(egui::pos2(px, py))
                {
                    continue;
                }
                let dist = sdf_line_segment(px, py, a.x, a.y, b.x, b.y);
                let alpha = line_alpha(dist, radius);
                if alpha <= 0.0 {
                    continue;
                }
                let v = (alpha * 255.0 + 0.5) as u8;
                if erase {
                    tiles.stamp_erase(x, y, v);
                } else {
                    tiles.stamp_max(x, y, v);
                }
            }
        }
    }
}

/// Clamp a float rect to pixel rows/cols of `tiles` as `(min_x, min_y, max_x, max_y)`
/// with exclusive max.  `None` when the rect misses the buffer entirely.
fn pixel_span(tiles: &MaskTiles, rect: Rect) -> Option<(u32, u32, u32, u32)> {
    if !rect.is_finite() || rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }
    let min_x = rect.min.x.floor().max(0.0) as u32;
    let min_y = rect.min.y.floor().max(0.0) as u32;
    let max_x = (rect.max.x.ceil().max(0.0) as u32).min(tiles.width());
    let max_y = (rect.max.y.ceil().max(0.0) as u32).min(tiles.height());
    if min_x >= max_x || min_y >= max_y {
        return None;
    }
    Some((min_x, min_y, max_x, max_y))
}

/// Coverage for a pixel `dist` away from the stroke spine.
/// Solid inside the radius minus a 1px fade; smoothstep across the fade.
fn line_alpha(dist: f32, radius: f32) -> f32 {
    // Tiny strokes get extra AA range so they stay visible.
    let (effective_radius, fade_width) = if radius < 1.5 {
        (radius + 0.75, 1.5)
    } else {
        (radius + 0.5, 1.0)
    };
    let solid_radius = effective_radius - fade_width;

    if dist <= solid_radius {
        return 1.0;
    } else if dist >= effective_radius {
        return 0.0;
    }

    let t = (dist - solid_radius) / fade_width;
    let x = 1.0 - t.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

/// SDF for distance to a line segment (degenerates to a point).
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < 1e-6 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}
