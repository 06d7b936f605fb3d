// ============================================================================
// ENTITY RENDERER — trait boundary + CPU raster implementation
// ============================================================================

use egui::{Pos2, Rect};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{Fill, MaskObject, MaskTiles, check_stage_size};
use crate::error::CanvasError;
use crate::ops::mask_raster::{pattern_covers, rasterize_objects};

/// Attribute overrides applied only for one `get_canvas` call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderAttrs {
    pub opacity: Option<f32>,
}

/// Visual nodes for one entity.  Every update is idempotent: applying the
/// same value twice leaves the output unchanged.
pub trait EntityRenderer {
    fn update_is_enabled(&mut self, is_enabled: bool);
    fn update_is_locked(&mut self, is_locked: bool);
    fn update_objects(&mut self, objects: &[MaskObject]);
    fn update_position(&mut self, position: Pos2);
    fn update_opacity(&mut self, opacity: f32);
    fn update_compositing_rect_fill(&mut self, fill: &Fill);
    fn update_compositing_rect_size(&mut self);
    /// Rasterize the entity's objects inside `rect` (stage coordinates,
    /// whole stage when `None`).
    fn get_canvas(&self, rect: Option<Rect>, attrs: &RenderAttrs) -> RgbaImage;
    /// Release everything.  No further calls are made afterwards.
    fn destroy(&mut self);
}

// ---- CPU raster renderer ----------------------------------------------------

/// Software renderer for inpaint masks.  Objects are rasterized into an
/// entity-local coverage buffer the size of the stage; position, opacity and
/// fill are applied at composite time.
pub struct RasterMaskRenderer {
    stage_width: u32,
    stage_height: u32,
    is_enabled: bool,
    is_locked: bool,
    position: Pos2,
    opacity: f32,
    fill: Fill,
    coverage: MaskTiles,
    compositing_rect: Option<Rect>,
    /// Bumped each time objects are re-rasterized.
    objects_generation: u64,
    destroyed: bool,
}

impl RasterMaskRenderer {
    /// Renderer for a stage of the given size.  An out-of-range size yields a
    /// 1×1 stage; use [`RasterMaskRenderer::try_new`] to reject it instead.
    pub fn new(stage_width: u32, stage_height: u32) -> Self {
        let coverage = MaskTiles::new(stage_width, stage_height);
        Self {
            stage_width: coverage.width(),
            stage_height: coverage.height(),
            is_enabled: true,
            is_locked: false,
            position: Pos2::ZERO,
            opacity: 1.0,
            fill: Fill::default(),
            coverage,
            compositing_rect: None,
            objects_generation: 0,
            destroyed: false,
        }
    }

    pub fn try_new(stage_width: u32, stage_height: u32) -> Result<Self, CanvasError> {
        check_stage_size(stage_width, stage_height)?;
        Ok(Self::new(stage_width, stage_height))
    }

    pub fn stage_rect(&self) -> Rect {
        Rect::from_min_max(Pos2::ZERO, egui::pos2(self.stage_width as f32, self.stage_height as f32))
    }

    pub fn is_enabled(&self) -> bool { self.is_enabled }

    pub fn is_locked(&self) -> bool { self.is_locked }

    pub fn position(&self) -> Pos2 { self.position }

    pub fn opacity(&self) -> f32 { self.opacity }

    pub fn fill(&self) -> &Fill { &self.fill }

    pub fn compositing_rect(&self) -> Option<Rect> { self.compositing_rect }

    pub fn objects_generation(&self) -> u64 { self.objects_generation }

    pub fn is_destroyed(&self) -> bool { self.destroyed }

    /// Stage-space bounding box of the mask content (exclusive max).
    pub fn pixel_bbox(&self) -> Option<Rect> {
        let (x0, y0, x1, y1) = self.coverage.pixel_bbox()?;
        Some(Rect::from_min_max(
            egui::pos2(x0 as f32, y0 as f32) + self.position.to_vec2(),
            egui::pos2(x1 as f32 + 1.0, y1 as f32 + 1.0) + self.position.to_vec2(),
        ))
    }

    /// Coverage at a stage pixel, honouring the entity position.
    #[inline]
    fn coverage_at(&self, sx: i64, sy: i64) -> u8 {
        let lx = (sx as f32 - self.position.x).floor();
        let ly = (sy as f32 - self.position.y).floor();
        if lx < 0.0 || ly < 0.0 {
            return 0;
        }
        self.coverage.get(lx as u32, ly as u32)
    }

    /// On-screen appearance: the fill pattern clipped to the mask content and
    /// the compositing rect, at the configured opacity.  `None` while the
    /// entity is disabled or before the compositing rect has been sized.
    pub fn display_image(&self) -> Option<RgbaImage> {
        if !self.is_enabled || self.destroyed {
            return None;
        }
        let comp = self.compositing_rect?;
        let (w, h) = (self.stage_width, self.stage_height);
        let mut out = RgbaImage::new(w, h);
        let row_bytes = w as usize * 4;
        let color = self.fill.color;
        let style = self.fill.style;
        let opacity = self.opacity.clamp(0.0, 1.0);

        out
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..w as usize {
                    let center = egui::pos2(x as f32 + 0.5, y as f32 + 0.5);
                    if !comp.contains(center) || !pattern_covers(style, x as u32, y as u32) {
                        continue;
                    }
                    let cov = self.coverage_at(x as i64, y as i64);
                    if cov == 0 {
                        continue;
                    }
                    let a = (cov as f32 * opacity + 0.5) as u8;
                    row[x * 4..x * 4 + 4].copy_from_slice(&[color.r, color.g, color.b, a]);
                }
            });
        Some(out)
    }
}

impl EntityRenderer for RasterMaskRenderer {
    fn update_is_enabled(&mut self, is_enabled: bool) {
        self.is_enabled = is_enabled;
    }

    fn update_is_locked(&mut self, is_locked: bool) {
        self.is_locked = is_locked;
    }

    fn update_objects(&mut self, objects: &[MaskObject]) {
        rasterize_objects(&mut self.coverage, objects);
        self.objects_generation = self.objects_generation.wrapping_add(1);
    }

    fn update_position(&mut self, position: Pos2) {
        self.position = position;
    }

    fn update_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    fn update_compositing_rect_fill(&mut self, fill: &Fill) {
        self.fill = *fill;
    }

    fn update_compositing_rect_size(&mut self) {
        self.compositing_rect = Some(self.stage_rect());
    }

    fn get_canvas(&self, rect: Option<Rect>, attrs: &RenderAttrs) -> RgbaImage {
        // Output never extends past the stage.
        let stage = self.stage_rect();
        let region = match rect {
            Some(r) => stage.intersect(r),
            None => stage,
        };
        if !region.is_positive() {
            return RgbaImage::new(0, 0);
        }
        let x0 = region.min.x.floor() as i64;
        let y0 = region.min.y.floor() as i64;
        let w = (region.max.x.ceil() as i64 - x0) as u32;
        let h = (region.max.y.ceil() as i64 - y0) as u32;
        let mut out = RgbaImage::new(w, h);

        let opacity = attrs.opacity.unwrap_or(self.opacity).clamp(0.0, 1.0);
        let color = self.fill.color;
        let row_bytes = w as usize * 4;

        out
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(oy, row)| {
                for ox in 0..w as usize {
                    let cov = self.coverage_at(x0 + ox as i64, y0 + oy as i64);
                    if cov == 0 {
                        continue;
                    }
                    let a = (cov as f32 * opacity + 0.5) as u8;
                    row[ox * 4..ox * 4 + 4].copy_from_slice(&[color.r, color.g, color.b, a]);
                }
            });
        out
    }

    fn destroy(&mut self) {
        self.coverage.clear();
        self.compositing_rect = None;
        self.destroyed = true;
    }
}

/// Alpha of the pixel at (x, y), or 0 outside the image.
pub fn alpha_at(img: &RgbaImage, x: u32, y: u32) -> u8 {
    if x >= img.width() || y >= img.height() {
        return 0;
    }
    let Rgba([_, _, _, a]) = *img.get_pixel(x, y);
    a
}
