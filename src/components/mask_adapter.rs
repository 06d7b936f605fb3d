use std::sync::Arc;

use egui::Rect;
use image::RgbaImage;

use crate::canvas::{EntityIdentifier, HashableMaskState, InpaintMaskState};
use crate::error::CanvasError;
use crate::renderer::{EntityRenderer, RenderAttrs};
use crate::store::{CanvasStore, SnapshotSource, Subscription};

// ============================================================================
// SYNC OUTCOME
// ============================================================================

/// One renderer update issued by [`InpaintMaskAdapter::sync`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStep {
    IsEnabled,
    IsLocked,
    Objects,
    Position,
    Opacity,
    CompositingRectFill,
    CompositingRectSize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Snapshot unchanged and not forced; nothing was called.
    Unchanged,
    /// These updates were applied, in this order.
    Applied(Vec<SyncStep>),
    /// The entity is gone; the adapter has been torn down.
    Destroyed,
}

// ============================================================================
// INPAINT MASK ADAPTER
// ============================================================================

/// Binds one inpaint-mask entity to its rendered representation and keeps
/// the renderer in step with the store, one changed field at a time.
pub struct InpaintMaskAdapter<R: EntityRenderer> {
    id: EntityIdentifier,
    state: Arc<InpaintMaskState>,
    renderer: R,
    subscription: Option<Subscription>,
    destroyed: bool,
}

impl<R: EntityRenderer> InpaintMaskAdapter<R> {
    pub const TYPE: &'static str = "inpaint_mask_adapter";

    /// Subscribe to `store` and run a forced sync.  Fails when the entity
    /// has no snapshot.
    pub fn new(id: EntityIdentifier, store: &mut CanvasStore, renderer: R) -> Result<Self, CanvasError> {
        let state = store
            .snapshot(&id)
            .ok_or_else(|| CanvasError::EntityNotFound(id.clone()))?;
        let subscription = store.subscribe();
        let mut adapter = Self {
            id,
            state,
            renderer,
            subscription: Some(subscription),
            destroyed: false,
        };
        log::info!("{} created for {}", Self::TYPE, adapter.id);
        adapter.sync(&*store, true);
        Ok(adapter)
    }

    pub fn id(&self) -> &EntityIdentifier {
        &self.id
    }

    /// Last snapshot applied to the renderer.
    pub fn state(&self) -> &InpaintMaskState {
        &self.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Drain pending store notifications and sync once per notification
    /// that concerns this entity, in emission order.  Returns how many syncs
    /// ran.
    pub fn handle_notifications(&mut self, source: &impl SnapshotSource) -> usize {
        let events: Vec<_> = match &self.subscription {
            Some(sub) => sub.drain().filter(|e| e.entity == self.id).collect(),
            None => return 0,
        };
        let mut handled = 0;
        for _ in events {
            if self.destroyed {
                break;
            }
            self.sync(source, false);
            handled += 1;
        }
        handled
    }

    /// Bring the renderer in line with the latest snapshot.
    ///
    /// Fields are compared by revision stamp against the previously applied
    /// snapshot; only changed fields are pushed unless `force` is set.  The
    /// compositing rect size is only recomputed on a forced sync.
    pub fn sync(&mut self, source: &impl SnapshotSource, force: bool) -> SyncOutcome {
        if self.destroyed {
            return SyncOutcome::Destroyed;
        }

        let Some(state) = source.snapshot(&self.id) else {
            self.destroy();
            return SyncOutcome::Destroyed;
        };

        let prev = std::mem::replace(&mut self.state, state);

        if !force && prev.revision() == self.state.revision() {
            return SyncOutcome::Unchanged;
        }

        let old = prev.revisions();
        let new = *self.state.revisions();
        let mut steps = Vec::new();

        if force || new.is_enabled != old.is_enabled {
            self.renderer.update_is_enabled(self.state.is_enabled);
            steps.push(SyncStep::IsEnabled);
        }
        if force || new.is_locked != old.is_locked {
            self.renderer.update_is_locked(self.state.is_locked);
            steps.push(SyncStep::IsLocked);
        }
        if force || new.objects != old.objects {
            self.renderer.update_objects(&self.state.objects);
            steps.push(SyncStep::Objects);
        }
        if force || new.position != old.position {
            self.renderer.update_position(self.state.position);
            steps.push(SyncStep::Position);
        }
        if force || new.opacity != old.opacity {
            self.renderer.update_opacity(self.state.opacity);
            steps.push(SyncStep::Opacity);
        }
        if force || new.fill != old.fill {
            self.renderer.update_compositing_rect_fill(&self.state.fill);
            steps.push(SyncStep::CompositingRectFill);
        }
        if force {
            self.renderer.update_compositing_rect_size();
            steps.push(SyncStep::CompositingRectSize);
        }

        log::debug!("{} synced (force={}): {:?}", self.id, force, steps);
        SyncOutcome::Applied(steps)
    }

    /// The state minus name, opacity and fill.
    pub fn hashable_state(&self) -> HashableMaskState {
        self.state.hashable()
    }

    pub fn content_hash(&self) -> Result<u64, CanvasError> {
        self.hashable_state().content_hash()
    }

    /// Rasterize the mask.  Mask regions must be fully opaque for consumers,
    /// so opacity is forced to 1.0 for this render only.
    pub fn get_canvas(&self, rect: Option<Rect>) -> RgbaImage {
        let attrs = RenderAttrs { opacity: Some(1.0) };
        self.renderer.get_canvas(rect, &attrs)
    }

    /// Unsubscribe and release the renderer.  Terminal; later syncs are no-ops.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
        self.renderer.destroy();
        log::info!("{} destroyed for {}", Self::TYPE, self.id);
    }
}
