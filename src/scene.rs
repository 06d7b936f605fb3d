// ============================================================================
// SCENE FILES — JSON description of a stage and its inpaint masks
// ============================================================================
//
// {
//   "width": 512, "height": 512,
//   "masks": [
//     { "name": "face", "position": { "x": 10, "y": 0 }, "opacity": 0.5,
//       "fill": { "style": "grid", "color": { "r": 255, "g": 0, "b": 0 } },
//       "objects": [
//         { "type": "brush_line", "stroke_width": 12, "points": [{ "x": 0, "y": 0 }, { "x": 40, "y": 40 }] },
//         { "type": "rect", "rect": { "min": { "x": 0, "y": 0 }, "max": { "x": 8, "y": 8 } } }
//       ] }
//   ]
// }

use std::path::Path;

use egui::{Pos2, Rect};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::canvas::{EntityIdentifier, Fill, InpaintMaskState, MaskDefaults, check_stage_size};
use crate::error::{PersistError, SceneError};
use crate::manager::CanvasManager;
use crate::renderer::RasterMaskRenderer;
use crate::store::{CanvasAction, CanvasStore};

/// Object as written in a scene file.  Ids are assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneObject {
    BrushLine {
        stroke_width: f32,
        points: Vec<Pos2>,
        #[serde(default)]
        clip: Option<Rect>,
    },
    EraserLine {
        stroke_width: f32,
        points: Vec<Pos2>,
        #[serde(default)]
        clip: Option<Rect>,
    },
    Rect {
        rect: Rect,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneMask {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Pos2,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub fill: Option<Fill>,
    #[serde(default = "enabled_default")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

fn enabled_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub masks: Vec<SceneMask>,
}

pub type SceneManager = CanvasManager<RasterMaskRenderer, Box<dyn FnMut(&InpaintMaskState) -> RasterMaskRenderer>>;

impl Scene {
    pub fn from_json(text: &str) -> Result<Self, PersistError> {
        let scene: Scene = serde_json::from_str(text)?;
        check_stage_size(scene.width, scene.height)
            .map_err(|e| PersistError::InvalidFormat(format!("scene: {}", e)))?;
        Ok(scene)
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let text = std::fs::read_to_string(path)?;
        let scene = Self::from_json(&text)?;
        log::info!("loaded scene {} ({}x{}, {} masks)", path.display(), scene.width, scene.height, scene.masks.len());
        Ok(scene)
    }

    /// Build a store + manager holding every mask of the scene, with one
    /// synced adapter per mask.  Ids are returned in scene order.
    pub fn build(&self, defaults: MaskDefaults) -> Result<(SceneManager, Vec<EntityIdentifier>), SceneError> {
        let (w, h) = (self.width, self.height);
        let store = CanvasStore::try_new(w, h, defaults)?;
        // Size checked above, so renderer and store agree on the stage.
        let make_renderer: Box<dyn FnMut(&InpaintMaskState) -> RasterMaskRenderer> =
            Box::new(move |_state: &InpaintMaskState| RasterMaskRenderer::new(w, h));
        let mut manager = CanvasManager::new(store, make_renderer);

        let mut ids = Vec::with_capacity(self.masks.len());
        for mask in &self.masks {
            let added = manager.dispatch(CanvasAction::InpaintMaskAdded {
                name: mask.name.clone(),
                position: mask.position,
            })?;
            let Some(id) = added else {
                return Err(PersistError::InvalidFormat("mask was not added".into()).into());
            };
            for action in mask_actions(&id, mask) {
                manager.dispatch(action)?;
            }
            ids.push(id);
        }
        Ok((manager, ids))
    }
}

fn mask_actions(id: &EntityIdentifier, mask: &SceneMask) -> Vec<CanvasAction> {
    let mut actions = Vec::new();
    if let Some(opacity) = mask.opacity {
        actions.push(CanvasAction::EntityOpacityChanged { id: id.clone(), opacity });
    }
    if let Some(fill) = mask.fill {
        actions.push(CanvasAction::FillStyleChanged { id: id.clone(), style: fill.style });
        actions.push(CanvasAction::FillColorChanged { id: id.clone(), color: fill.color });
    }
    if !mask.is_enabled {
        actions.push(CanvasAction::EntityIsEnabledChanged { id: id.clone(), is_enabled: false });
    }
    for object in &mask.objects {
        actions.push(match object {
            SceneObject::BrushLine { stroke_width, points, clip } => CanvasAction::BrushLineAdded {
                id: id.clone(),
                stroke_width: *stroke_width,
                points: points.clone(),
                clip: *clip,
            },
            SceneObject::EraserLine { stroke_width, points, clip } => CanvasAction::EraserLineAdded {
                id: id.clone(),
                stroke_width: *stroke_width,
                points: points.clone(),
                clip: *clip,
            },
            SceneObject::Rect { rect } => CanvasAction::RectAdded { id: id.clone(), rect: *rect },
        });
    }
    if mask.is_locked {
        actions.push(CanvasAction::EntityIsLockedChanged { id: id.clone(), is_locked: true });
    }
    actions
}

/// Rasterize one mask.  `preview` renders the on-screen appearance (fill
/// pattern at the configured opacity) instead of the full-opacity mask.
pub fn render_mask(
    manager: &SceneManager,
    id: &EntityIdentifier,
    region: Option<Rect>,
    preview: bool,
) -> Result<RgbaImage, SceneError> {
    if !preview {
        return Ok(manager.get_canvas(id, region)?);
    }
    let adapter = manager.adapter(id).ok_or_else(|| crate::error::CanvasError::EntityNotFound(id.clone()))?;
    let renderer = adapter.renderer();
    let full = renderer
        .display_image()
        .unwrap_or_else(|| RgbaImage::new(renderer.stage_rect().width() as u32, renderer.stage_rect().height() as u32));
    let Some(region) = region else { return Ok(full) };

    let stage = renderer.stage_rect().intersect(region);
    if !stage.is_positive() {
        return Ok(RgbaImage::new(0, 0));
    }
    let x = stage.min.x.floor() as u32;
    let y = stage.min.y.floor() as u32;
    let w = stage.width().ceil() as u32;
    let h = stage.height().ceil() as u32;
    Ok(image::imageops::crop_imm(&full, x, y, w, h).to_image())
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<(), SceneError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(PersistError::from)?;
    }
    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}
