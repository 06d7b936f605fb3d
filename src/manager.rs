// ============================================================================
// CANVAS MANAGER — one adapter per inpaint-mask entity
// ============================================================================

use egui::Rect;
use image::RgbaImage;

use crate::canvas::{EntityIdentifier, InpaintMaskState};
use crate::components::mask_adapter::InpaintMaskAdapter;
use crate::error::CanvasError;
use crate::renderer::EntityRenderer;
use crate::store::{CanvasAction, CanvasStore, EntityChange, SnapshotSource, Subscription};

/// Owns the store and keeps a live adapter for every mask in it.
///
/// `make_renderer` builds the renderer for a newly added entity.
pub struct CanvasManager<R, F>
where
    R: EntityRenderer,
    F: FnMut(&InpaintMaskState) -> R,
{
    store: CanvasStore,
    adapters: Vec<InpaintMaskAdapter<R>>,
    entity_events: Subscription,
    make_renderer: F,
}

impl<R, F> CanvasManager<R, F>
where
    R: EntityRenderer,
    F: FnMut(&InpaintMaskState) -> R,
{
    /// Wrap `store`, creating adapters for any entities it already holds.
    pub fn new(mut store: CanvasStore, make_renderer: F) -> Self {
        let entity_events = store.subscribe();
        let mut manager = Self {
            store,
            adapters: Vec::new(),
            entity_events,
            make_renderer,
        };
        for id in manager.store.entity_ids() {
            manager.create_adapter(id);
        }
        manager
    }

    pub fn store(&self) -> &CanvasStore {
        &self.store
    }

    pub fn adapters(&self) -> &[InpaintMaskAdapter<R>] {
        &self.adapters
    }

    pub fn adapter(&self, id: &EntityIdentifier) -> Option<&InpaintMaskAdapter<R>> {
        self.adapters.iter().find(|a| a.id() == id)
    }

    /// Apply an action and process the resulting notifications.
    pub fn dispatch(&mut self, action: CanvasAction) -> Result<Option<EntityIdentifier>, CanvasError> {
        let result = self.store.dispatch(action)?;
        self.pump();
        Ok(result)
    }

    /// Process every pending notification: new entities get an adapter,
    /// existing adapters sync in emission order, destroyed adapters are
    /// dropped.
    pub fn pump(&mut self) {
        let added: Vec<EntityIdentifier> = self
            .entity_events
            .drain()
            .filter(|e| e.change == EntityChange::Added)
            .map(|e| e.entity)
            .collect();

        for adapter in &mut self.adapters {
            adapter.handle_notifications(&self.store);
        }

        for id in added {
            // The entity may already be gone again by the time we get here.
            if self.store.snapshot(&id).is_some() && self.adapter(&id).is_none() {
                self.create_adapter(id);
            }
        }

        self.adapters.retain(|a| !a.is_destroyed());
    }

    /// Forced sync of every adapter, e.g. after the renderers changed
    /// structurally.
    pub fn resync_all(&mut self) {
        for adapter in &mut self.adapters {
            adapter.sync(&self.store, true);
        }
        self.adapters.retain(|a| !a.is_destroyed());
    }

    pub fn get_canvas(&self, id: &EntityIdentifier, rect: Option<Rect>) -> Result<RgbaImage, CanvasError> {
        self.adapter(id)
            .map(|a| a.get_canvas(rect))
            .ok_or_else(|| CanvasError::EntityNotFound(id.clone()))
    }

    pub fn content_hash(&self, id: &EntityIdentifier) -> Result<u64, CanvasError> {
        self.adapter(id)
            .ok_or_else(|| CanvasError::EntityNotFound(id.clone()))?
            .content_hash()
    }

    fn create_adapter(&mut self, id: EntityIdentifier) {
        let Some(state) = self.store.snapshot(&id) else { return };
        let renderer = (self.make_renderer)(&state);
        match InpaintMaskAdapter::new(id, &mut self.store, renderer) {
            Ok(adapter) => self.adapters.push(adapter),
            Err(e) => log::warn!("adapter not created: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MaskDefaults;
    use crate::renderer::RasterMaskRenderer;
    use egui::{Pos2, pos2};

    fn manager() -> CanvasManager<RasterMaskRenderer, impl FnMut(&InpaintMaskState) -> RasterMaskRenderer> {
        let store = CanvasStore::new(32, 32, MaskDefaults::default());
        CanvasManager::new(store, |_state: &InpaintMaskState| RasterMaskRenderer::new(32, 32))
    }

    #[test]
    fn adapters_follow_entity_lifecycle() {
        let mut m = manager();
        let a = m.dispatch(CanvasAction::InpaintMaskAdded { name: None, position: Pos2::ZERO }).unwrap().unwrap();
        let b = m.dispatch(CanvasAction::InpaintMaskAdded { name: None, position: Pos2::ZERO }).unwrap().unwrap();
        assert_eq!(m.adapters().len(), 2);
        assert_eq!(m.store().listener_count(), 3);

        m.dispatch(CanvasAction::EntityDeleted { id: a.clone() }).unwrap();
        assert_eq!(m.adapters().len(), 1);
        assert!(m.adapter(&a).is_none());
        assert!(m.adapter(&b).is_some());
        assert!(matches!(m.get_canvas(&a, None), Err(CanvasError::EntityNotFound(_))));
    }

    #[test]
    fn renderer_tracks_store_through_manager() {
        let mut m = manager();
        let id = m.dispatch(CanvasAction::InpaintMaskAdded { name: None, position: Pos2::ZERO }).unwrap().unwrap();
        let rect = Rect::from_min_max(pos2(0.0, 0.0), pos2(4.0, 4.0));
        m.dispatch(CanvasAction::RectAdded { id: id.clone(), rect }).unwrap();
        m.dispatch(CanvasAction::EntityMoved { id: id.clone(), position: pos2(8.0, 8.0) }).unwrap();

        let renderer = m.adapter(&id).unwrap().renderer();
        assert_eq!(renderer.position(), pos2(8.0, 8.0));
        assert_eq!(renderer.objects_generation(), 2);
        assert_eq!(renderer.pixel_bbox(), Some(Rect::from_min_max(pos2(8.0, 8.0), pos2(12.0, 12.0))));
    }

    #[test]
    fn existing_entities_get_adapters_on_construction() {
        let mut store = CanvasStore::new(16, 16, MaskDefaults::default());
        store.dispatch(CanvasAction::InpaintMaskAdded { name: None, position: Pos2::ZERO }).unwrap();
        let m = CanvasManager::new(store, |_s: &InpaintMaskState| RasterMaskRenderer::new(16, 16));
        assert_eq!(m.adapters().len(), 1);
    }
}
