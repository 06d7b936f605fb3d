use std::fmt;
use std::sync::Arc;

use egui::{Pos2, Rect};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::error::CanvasError;

// ============================================================================
// ENTITY IDENTIFIERS
// ============================================================================

/// Kind of canvas entity.  Only inpaint masks are modelled here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    InpaintMask,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::InpaintMask => "inpaint_mask",
        }
    }
}

/// Stable handle naming one entity in the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityIdentifier {
    pub id: String,
    pub kind: EntityKind,
}

impl EntityIdentifier {
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self { id: id.into(), kind }
    }

    /// Fresh random identifier, e.g. `inpaint_mask_3f2a…`.
    pub fn generate(kind: EntityKind) -> Self {
        let id = format!("{}_{}", kind.name(), uuid::Uuid::new_v4().simple());
        Self { id, kind }
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.id)
    }
}

// ============================================================================
// FILL
// ============================================================================

/// Pattern drawn over the compositing rect of a mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStyle {
    Solid,
    Grid,
    Crosshatch,
    #[default]
    Diagonal,
    Horizontal,
    Vertical,
}

impl FillStyle {
    pub fn all() -> &'static [FillStyle] {
        &[
            FillStyle::Solid,
            FillStyle::Grid,
            FillStyle::Crosshatch,
            FillStyle::Diagonal,
            FillStyle::Horizontal,
            FillStyle::Vertical,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FillStyle::Solid => "solid",
            FillStyle::Grid => "grid",
            FillStyle::Crosshatch => "crosshatch",
            FillStyle::Diagonal => "diagonal",
            FillStyle::Horizontal => "horizontal",
            FillStyle::Vertical => "vertical",
        }
    }

    /// Parse a style name (case-insensitive).  Unknown names yield `None`.
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|style| style.name() == s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Serialize as "r,g,b"
    pub fn to_config_string(&self) -> String {
        format!("{},{},{}", self.r, self.g, self.b)
    }

    /// Parse from "r,g,b"
    pub fn from_config_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return None;
        }
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        Some(Self { r, g, b })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub style: FillStyle,
    pub color: RgbColor,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            style: FillStyle::Diagonal,
            color: RgbColor::new(224, 117, 117),
        }
    }
}

// ============================================================================
// MASK OBJECTS
// ============================================================================

/// A drawable object belonging to a mask.  Coordinates are entity-local.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaskObject {
    BrushLine {
        id: String,
        stroke_width: f32,
        points: Vec<Pos2>,
        #[serde(default)]
        clip: Option<Rect>,
    },
    EraserLine {
        id: String,
        stroke_width: f32,
        points: Vec<Pos2>,
        #[serde(default)]
        clip: Option<Rect>,
    },
    Rect {
        id: String,
        rect: Rect,
    },
}

impl MaskObject {
    pub fn id(&self) -> &str {
        match self {
            MaskObject::BrushLine { id, .. }
            | MaskObject::EraserLine { id, .. }
            | MaskObject::Rect { id, .. } => id,
        }
    }

    pub fn is_eraser(&self) -> bool {
        matches!(self, MaskObject::EraserLine { .. })
    }

    /// Entity-local bounds of the object (stroke radius included).
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            MaskObject::BrushLine { stroke_width, points, clip, .. }
            | MaskObject::EraserLine { stroke_width, points, clip, .. } => {
                let first = points.first()?;
                let mut r = Rect::from_min_max(*first, *first);
                for p in points.iter().skip(1) {
                    r.extend_with(*p);
                }
                let r = r.expand(stroke_width / 2.0);
                Some(match clip {
                    Some(c) => r.intersect(*c),
                    None => r,
                })
            }
            MaskObject::Rect { rect, .. } => Some(*rect),
        }
    }
}

// ============================================================================
// ENTITY STATE
// ============================================================================

/// Store-issued stamp.  A field whose stamp is unchanged between two
/// snapshots has not been replaced.
pub type Revision = u64;

/// One revision per tracked field group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldRevisions {
    pub is_enabled: Revision,
    pub is_locked: Revision,
    pub objects: Revision,
    pub position: Revision,
    pub opacity: Revision,
    pub fill: Revision,
}

impl FieldRevisions {
    /// Every field stamped with the same revision (fresh entity).
    pub fn all(rev: Revision) -> Self {
        Self {
            is_enabled: rev,
            is_locked: rev,
            objects: rev,
            position: rev,
            opacity: rev,
            fill: rev,
        }
    }
}

/// Immutable snapshot of one inpaint mask.  The store replaces it wholesale
/// on each change; readers hold it behind an `Arc`.
#[derive(Clone, Debug)]
pub struct InpaintMaskState {
    pub id: EntityIdentifier,
    pub name: Option<String>,
    pub is_enabled: bool,
    pub is_locked: bool,
    pub objects: Vec<MaskObject>,
    pub position: Pos2,
    /// 0.0 – 1.0
    pub opacity: f32,
    pub fill: Fill,
    pub(crate) revision: Revision,
    pub(crate) revisions: FieldRevisions,
}

impl InpaintMaskState {
    pub(crate) fn new(id: EntityIdentifier, defaults: &MaskDefaults, revision: Revision) -> Self {
        Self {
            id,
            name: None,
            is_enabled: true,
            is_locked: false,
            objects: Vec::new(),
            position: Pos2::ZERO,
            opacity: defaults.opacity.clamp(0.0, 1.0),
            fill: defaults.fill,
            revision,
            revisions: FieldRevisions::all(revision),
        }
    }

    /// Revision of the snapshot as a whole.  Bumped on every change.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn revisions(&self) -> &FieldRevisions {
        &self.revisions
    }

    /// Name shown in the layer list.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(n) if !n.trim().is_empty() => n.clone(),
            _ => "Inpaint Mask".to_string(),
        }
    }

    /// Content fingerprint: the state minus name, opacity and fill.
    ///
    /// Exhaustive: every new field must be classified here.
    pub fn hashable(&self) -> HashableMaskState {
        let InpaintMaskState {
            id,
            name: _,
            is_enabled,
            is_locked,
            objects,
            position,
            opacity: _,
            fill: _,
            revision: _,
            revisions: _,
        } = self;
        HashableMaskState {
            id: id.clone(),
            is_enabled: *is_enabled,
            is_locked: *is_locked,
            objects: objects.clone(),
            position: *position,
        }
    }
}

/// Initial values for newly added masks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskDefaults {
    pub fill: Fill,
    pub opacity: f32,
}

impl Default for MaskDefaults {
    fn default() -> Self {
        Self {
            fill: Fill::default(),
            opacity: 1.0,
        }
    }
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// Reduced mask state used to detect content-equivalent entities.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HashableMaskState {
    pub id: EntityIdentifier,
    pub is_enabled: bool,
    pub is_locked: bool,
    pub objects: Vec<MaskObject>,
    pub position: Pos2,
}

impl HashableMaskState {
    /// First 8 bytes (little-endian) of the BLAKE3 digest of the bincode
    /// encoding.  Stable across builds and platforms.
    pub fn content_hash(&self) -> Result<u64, CanvasError> {
        let mut hasher = blake3::Hasher::new();
        bincode::serialize_into(&mut hasher, self).map_err(|e| CanvasError::Fingerprint(e.to_string()))?;
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Ok(u64::from_le_bytes(head))
    }
}

// ============================================================================
// MASK TILES – sparse 64×64 coverage chunks
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// Largest stage (width × height) a coverage buffer may cover.
pub const MAX_STAGE_PIXELS: u64 = 256_000_000;

/// Reject empty stages and stages above [`MAX_STAGE_PIXELS`].
pub fn check_stage_size(width: u32, height: u32) -> Result<(), CanvasError> {
    let total = width as u64 * height as u64;
    if width == 0 || height == 0 || total > MAX_STAGE_PIXELS {
        return Err(CanvasError::StageSize { width, height, max: MAX_STAGE_PIXELS });
    }
    Ok(())
}

/// Sparse single-channel coverage buffer backed by a flat
/// `Vec<Option<Arc<GrayImage>>>`.  Missing chunks read as 0 (uncovered).
///
/// Chunks are wrapped in `Arc` for copy-on-write: `clone()` only bumps
/// reference counts, writes go through `Arc::make_mut`.
#[derive(Clone)]
pub struct MaskTiles {
    width: u32,
    height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<GrayImage>>>,
}

impl MaskTiles {
    /// Create an empty (fully uncovered) buffer.
    pub fn new(width: u32, height: u32) -> Self {
        // Out-of-range sizes collapse to 1×1; callers check with `check_stage_size` first.
        let (width, height) = match check_stage_size(width, height) {
            Ok(()) => (width, height),
            Err(e) => {
                log::warn!("MaskTiles::new: {}, clamped to 1×1", e);
                (1, 1)
            }
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
        }
    }

    #[inline(always)]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    #[inline(always)]
    fn chunk_coord(x: u32, y: u32) -> (u32, u32) { (x / CHUNK_SIZE, y / CHUNK_SIZE) }

    #[inline(always)]
    fn local(x: u32, y: u32) -> (u32, u32) { (x % CHUNK_SIZE, y % CHUNK_SIZE) }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    /// Coverage at (x, y); 0 outside the buffer or in missing chunks.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height { return 0; }
        let (cx, cy) = Self::chunk_coord(x, y);
        let (lx, ly) = Self::local(x, y);
        self.chunks[self.flat_index(cx, cy)]
            .as_ref()
            .map(|c| c.get_pixel(lx, ly)[0])
            .unwrap_or(0)
    }

    /// Overwrite coverage at (x, y), creating the chunk on demand.
    #[inline]
    pub fn put(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.width || y >= self.height { return; }
        let (cx, cy) = Self::chunk_coord(x, y);
        if value == 0 && self.chunks[self.flat_index(cx, cy)].is_none() {
            return;
        }
        let (lx, ly) = Self::local(x, y);
        let idx = self.flat_index(cx, cy);
        let arc = self.chunks[idx]
            .get_or_insert_with(|| Arc::new(GrayImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(arc).put_pixel(lx, ly, Luma([value]));
    }

    /// Brush stamp: keep the stronger of existing and new coverage, so
    /// overlapping dabs never stack.
    #[inline]
    pub fn stamp_max(&mut self, x: u32, y: u32, value: u8) {
        let cur = self.get(x, y);
        if value > cur {
            self.put(x, y, value);
        }
    }

    /// Eraser stamp: reduce coverage proportionally to `value`.
    #[inline]
    pub fn stamp_erase(&mut self, x: u32, y: u32, value: u8) {
        let cur = self.get(x, y);
        if cur == 0 || value == 0 {
            return;
        }
        let next = (cur as u32 * (255 - value as u32)) / 255;
        self.put(x, y, next as u8);
    }

    /// Drop all chunks.
    pub fn clear(&mut self) {
        for slot in &mut self.chunks {
            *slot = None;
        }
    }

    /// Number of populated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    /// Iterator over populated chunk coordinates.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cpr = self.chunks_per_row;
        self.chunks.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref().map(|_| ((i as u32) % cpr, (i as u32) / cpr))
        })
    }

    /// Tight bounding box `(min_x, min_y, max_x, max_y)` (inclusive) of
    /// all covered pixels, or `None` when nothing is covered.
    pub fn pixel_bbox(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bbox: Option<(u32, u32, u32, u32)> = None;
        for (cx, cy) in self.chunk_keys() {
            let Some(chunk) = self.chunks[self.flat_index(cx, cy)].as_ref() else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            for (lx, ly, px) in chunk.enumerate_pixels() {
                if px[0] == 0 {
                    continue;
                }
                let (x, y) = (base_x + lx, base_y + ly);
                if x >= self.width || y >= self.height {
                    continue;
                }
                bbox = Some(match bbox {
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                    None => (x, y, x, y),
                });
            }
        }
        bbox
    }

    /// Whether any pixel is covered.
    pub fn is_empty(&self) -> bool {
        self.pixel_bbox().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn mask_with(objects: Vec<MaskObject>) -> InpaintMaskState {
        let mut s = InpaintMaskState::new(
            EntityIdentifier::new("mask_a", EntityKind::InpaintMask),
            &MaskDefaults::default(),
            1,
        );
        s.objects = objects;
        s
    }

    fn rect_object(id: &str) -> MaskObject {
        MaskObject::Rect {
            id: id.to_string(),
            rect: Rect::from_min_max(pos2(0.0, 0.0), pos2(10.0, 10.0)),
        }
    }

    #[test]
    fn fingerprint_ignores_cosmetic_fields() {
        let a = mask_with(vec![rect_object("r1")]);
        let mut b = a.clone();
        b.name = Some("Renamed".to_string());
        b.opacity = 0.3;
        b.fill = Fill { style: FillStyle::Grid, color: RgbColor::new(1, 2, 3) };

        assert_eq!(a.hashable(), b.hashable());
        assert_eq!(a.hashable().content_hash().unwrap(), b.hashable().content_hash().unwrap());
    }

    #[test]
    fn fingerprint_tracks_content_fields() {
        let a = mask_with(vec![rect_object("r1")]);

        let mut moved = a.clone();
        moved.position = pos2(5.0, 0.0);
        let mut disabled = a.clone();
        disabled.is_enabled = false;
        let mut locked = a.clone();
        locked.is_locked = true;
        let mut more = a.clone();
        more.objects.push(rect_object("r2"));
        let mut other_id = a.clone();
        other_id.id = EntityIdentifier::new("mask_b", EntityKind::InpaintMask);

        for changed in [moved, disabled, locked, more, other_id] {
            assert_ne!(a.hashable(), changed.hashable());
            assert_ne!(a.hashable().content_hash().unwrap(), changed.hashable().content_hash().unwrap());
        }
    }

    #[test]
    fn fill_style_names_round_trip() {
        for style in FillStyle::all() {
            assert_eq!(FillStyle::from_name(style.name()), Some(*style));
        }
        assert_eq!(FillStyle::from_name(" Grid "), Some(FillStyle::Grid));
        assert_eq!(FillStyle::from_name("zigzag"), None);
    }

    #[test]
    fn rgb_config_string_rejects_garbage() {
        assert_eq!(RgbColor::from_config_string("1, 2,3"), Some(RgbColor::new(1, 2, 3)));
        assert_eq!(RgbColor::from_config_string("1,2"), None);
        assert_eq!(RgbColor::from_config_string("1,2,300"), None);
    }

    #[test]
    fn mask_tiles_stamps_and_bbox() {
        let mut tiles = MaskTiles::new(200, 100);
        assert!(tiles.is_empty());

        tiles.stamp_max(70, 10, 128);
        tiles.stamp_max(70, 10, 64);
        assert_eq!(tiles.get(70, 10), 128);

        tiles.stamp_max(150, 90, 255);
        assert_eq!(tiles.pixel_bbox(), Some((70, 10, 150, 90)));
        assert_eq!(tiles.chunk_count(), 2);

        tiles.stamp_erase(150, 90, 255);
        assert_eq!(tiles.get(150, 90), 0);
        assert_eq!(tiles.pixel_bbox(), Some((70, 10, 70, 10)));

        // Out of bounds is ignored
        tiles.put(500, 500, 255);
        assert_eq!(tiles.get(500, 500), 0);

        tiles.clear();
        assert_eq!(tiles.chunk_count(), 0);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = mask_with(vec![rect_object("r1")]);
        let first = a.hashable().content_hash().unwrap();
        assert_eq!(a.clone().hashable().content_hash().unwrap(), first);
        assert_eq!(a.hashable().content_hash().unwrap(), first);
    }

    #[test]
    fn stage_size_limits() {
        assert!(check_stage_size(1, 1).is_ok());
        assert!(check_stage_size(16_000, 16_000).is_ok());
        assert!(matches!(check_stage_size(17_000, 17_000), Err(CanvasError::StageSize { .. })));
        assert!(check_stage_size(0, 10).is_err());
        assert!(check_stage_size(u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn brush_bounds_include_stroke_radius() {
        let line = MaskObject::BrushLine {
            id: "l".into(),
            stroke_width: 10.0,
            points: vec![pos2(10.0, 10.0), pos2(30.0, 20.0)],
            clip: None,
        };
        let b = line.bounds().unwrap();
        assert_eq!(b.min, pos2(5.0, 5.0));
        assert_eq!(b.max, pos2(35.0, 25.0));
    }
}
