// ============================================================================
// CANVAS STORE — entity snapshots, typed actions, change notifications
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryIter};

use egui::{Pos2, Rect};

use crate::canvas::{
    check_stage_size, EntityIdentifier, EntityKind, FillStyle, InpaintMaskState, MaskDefaults, MaskObject, Revision,
    RgbColor,
};
use crate::error::CanvasError;

/// Read access to the latest entity snapshots.
pub trait SnapshotSource {
    fn snapshot(&self, id: &EntityIdentifier) -> Option<Arc<InpaintMaskState>>;
}

// ---- actions ----------------------------------------------------------------

/// Mutations accepted by [`CanvasStore::dispatch`].
#[derive(Clone, Debug, PartialEq)]
pub enum CanvasAction {
    InpaintMaskAdded { name: Option<String>, position: Pos2 },
    EntityIsEnabledChanged { id: EntityIdentifier, is_enabled: bool },
    EntityIsLockedChanged { id: EntityIdentifier, is_locked: bool },
    BrushLineAdded { id: EntityIdentifier, stroke_width: f32, points: Vec<Pos2>, clip: Option<Rect> },
    EraserLineAdded { id: EntityIdentifier, stroke_width: f32, points: Vec<Pos2>, clip: Option<Rect> },
    RectAdded { id: EntityIdentifier, rect: Rect },
    /// Remove every object from the entity.
    EntityReset { id: EntityIdentifier },
    EntityMoved { id: EntityIdentifier, position: Pos2 },
    EntityOpacityChanged { id: EntityIdentifier, opacity: f32 },
    FillColorChanged { id: EntityIdentifier, color: RgbColor },
    FillStyleChanged { id: EntityIdentifier, style: FillStyle },
    EntityRenamed { id: EntityIdentifier, name: Option<String> },
    EntityDeleted { id: EntityIdentifier },
}

impl CanvasAction {
    pub fn name(&self) -> &'static str {
        match self {
            CanvasAction::InpaintMaskAdded { .. } => "inpaintMaskAdded",
            CanvasAction::EntityIsEnabledChanged { .. } => "entityIsEnabledChanged",
            CanvasAction::EntityIsLockedChanged { .. } => "entityIsLockedChanged",
            CanvasAction::BrushLineAdded { .. } => "brushLineAdded",
            CanvasAction::EraserLineAdded { .. } => "eraserLineAdded",
            CanvasAction::RectAdded { .. } => "rectAdded",
            CanvasAction::EntityReset { .. } => "entityReset",
            CanvasAction::EntityMoved { .. } => "entityMoved",
            CanvasAction::EntityOpacityChanged { .. } => "entityOpacityChanged",
            CanvasAction::FillColorChanged { .. } => "fillColorChanged",
            CanvasAction::FillStyleChanged { .. } => "fillStyleChanged",
            CanvasAction::EntityRenamed { .. } => "entityRenamed",
            CanvasAction::EntityDeleted { .. } => "entityDeleted",
        }
    }

    fn target(&self) -> Option<&EntityIdentifier> {
        match self {
            CanvasAction::InpaintMaskAdded { .. } => None,
            CanvasAction::EntityIsEnabledChanged { id, .. }
            | CanvasAction::EntityIsLockedChanged { id, .. }
            | CanvasAction::BrushLineAdded { id, .. }
            | CanvasAction::EraserLineAdded { id, .. }
            | CanvasAction::RectAdded { id, .. }
            | CanvasAction::EntityReset { id }
            | CanvasAction::EntityMoved { id, .. }
            | CanvasAction::EntityOpacityChanged { id, .. }
            | CanvasAction::FillColorChanged { id, .. }
            | CanvasAction::FillStyleChanged { id, .. }
            | CanvasAction::EntityRenamed { id, .. }
            | CanvasAction::EntityDeleted { id } => Some(id),
        }
    }
}

// ---- notifications ----------------------------------------------------------

/// Field groups an update touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityField {
    Name,
    IsEnabled,
    IsLocked,
    Objects,
    Position,
    Opacity,
    Fill,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntityChange {
    Added,
    Updated(EntityField),
    Removed,
}

/// Typed change notification delivered to subscribers in emission order.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreEvent {
    /// Store revision after the change.
    pub revision: Revision,
    pub entity: EntityIdentifier,
    pub change: EntityChange,
}

/// Handle returned by [`CanvasStore::subscribe`].  Dropping it (or calling
/// [`Subscription::unsubscribe`]) cancels delivery.
pub struct Subscription {
    id: u64,
    rx: Receiver<StoreEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pending notifications, oldest first.  Never blocks.
    pub fn drain(&self) -> TryIter<'_, StoreEvent> {
        self.rx.try_iter()
    }

    pub fn unsubscribe(self) {}
}

// ---- store ------------------------------------------------------------------

pub struct CanvasStore {
    width: u32,
    height: u32,
    defaults: MaskDefaults,
    entities: Vec<Arc<InpaintMaskState>>,
    revision: Revision,
    next_object_id: u64,
    next_subscription_id: u64,
    listeners: Vec<(u64, Sender<StoreEvent>)>,
}

impl CanvasStore {
    pub fn new(width: u32, height: u32, defaults: MaskDefaults) -> Self {
        Self {
            width,
            height,
            defaults,
            entities: Vec::new(),
            revision: 0,
            next_object_id: 0,
            next_subscription_id: 0,
            listeners: Vec::new(),
        }
    }

    /// Like [`CanvasStore::new`] but rejects stages no renderer can cover.
    pub fn try_new(width: u32, height: u32, defaults: MaskDefaults) -> Result<Self, CanvasError> {
        check_stage_size(width, height)?;
        Ok(Self::new(width, height, defaults))
    }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    /// Current store revision (bumped once per applied change).
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Entity ids in insertion (draw) order.
    pub fn entity_ids(&self) -> Vec<EntityIdentifier> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        self.listeners.push((id, tx));
        Subscription { id, rx }
    }

    /// Remove a subscription immediately rather than on the next emit.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.listeners.retain(|(id, _)| *id != subscription.id);
    }

    /// Number of live subscribers (dropped handles are pruned on emit).
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn bump(&mut self) -> Revision {
        self.revision += 1;
        self.revision
    }

    fn next_object_id(&mut self, prefix: &str) -> String {
        self.next_object_id += 1;
        format!("{}:{}", prefix, self.next_object_id)
    }

    fn index_of(&self, id: &EntityIdentifier) -> Option<usize> {
        self.entities.iter().position(|e| &e.id == id)
    }

    fn emit(&mut self, event: StoreEvent) {
        self.listeners.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Apply an action.  Returns the new entity id for `InpaintMaskAdded`.
    ///
    /// Every applied change stamps the touched field with a fresh revision,
    /// even when the new value equals the old one.
    pub fn dispatch(&mut self, action: CanvasAction) -> Result<Option<EntityIdentifier>, CanvasError> {
        let idx = match action.target() {
            Some(id) => match self.index_of(id) {
                Some(idx) => Some(idx),
                None => {
                    log::warn!("{} rejected: unknown entity {}", action.name(), id);
                    return Err(CanvasError::EntityNotFound(id.clone()));
                }
            },
            None => None,
        };

        let rev = self.bump();

        let (entity, change) = match (action, idx) {
            (CanvasAction::InpaintMaskAdded { name, position }, _) => {
                let id = EntityIdentifier::generate(EntityKind::InpaintMask);
                let mut state = InpaintMaskState::new(id.clone(), &self.defaults, rev);
                state.name = name;
                state.position = position;
                self.entities.push(Arc::new(state));
                log::info!("added {}", id);
                self.emit(StoreEvent { revision: rev, entity: id.clone(), change: EntityChange::Added });
                return Ok(Some(id));
            }
            (CanvasAction::EntityDeleted { id }, Some(idx)) => {
                self.entities.remove(idx);
                log::info!("deleted {}", id);
                (id, EntityChange::Removed)
            }
            (action, Some(idx)) => {
                let field = self.apply_update(idx, action, rev);
                (self.entities[idx].id.clone(), EntityChange::Updated(field))
            }
            (action, None) => {
                // target() is Some for every non-add action
                log::warn!("{} dispatched without a target", action.name());
                return Ok(None);
            }
        };

        self.emit(StoreEvent { revision: rev, entity, change });
        Ok(None)
    }

    fn apply_update(&mut self, idx: usize, action: CanvasAction, rev: Revision) -> EntityField {
        // Object ids are allocated before borrowing the entity.
        let object = match &action {
            CanvasAction::BrushLineAdded { stroke_width, points, clip, .. } => Some(MaskObject::BrushLine {
                id: self.next_object_id("brush_line"),
                stroke_width: *stroke_width,
                points: points.clone(),
                clip: *clip,
            }),
            CanvasAction::EraserLineAdded { stroke_width, points, clip, .. } => Some(MaskObject::EraserLine {
                id: self.next_object_id("eraser_line"),
                stroke_width: *stroke_width,
                points: points.clone(),
                clip: *clip,
            }),
            CanvasAction::RectAdded { rect, .. } => Some(MaskObject::Rect {
                id: self.next_object_id("rect"),
                rect: *rect,
            }),
            _ => None,
        };

        let state = Arc::make_mut(&mut self.entities[idx]);
        state.revision = rev;
        match action {
            CanvasAction::EntityIsEnabledChanged { is_enabled, .. } => {
                state.is_enabled = is_enabled;
                state.revisions.is_enabled = rev;
                EntityField::IsEnabled
            }
            CanvasAction::EntityIsLockedChanged { is_locked, .. } => {
                state.is_locked = is_locked;
                state.revisions.is_locked = rev;
                EntityField::IsLocked
            }
            CanvasAction::BrushLineAdded { .. }
            | CanvasAction::EraserLineAdded { .. }
            | CanvasAction::RectAdded { .. } => {
                state.objects.extend(object);
                state.revisions.objects = rev;
                EntityField::Objects
            }
            CanvasAction::EntityReset { .. } => {
                state.objects.clear();
                state.revisions.objects = rev;
                EntityField::Objects
            }
            CanvasAction::EntityMoved { position, .. } => {
                state.position = position;
                state.revisions.position = rev;
                EntityField::Position
            }
            CanvasAction::EntityOpacityChanged { opacity, .. } => {
                state.opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
                state.revisions.opacity = rev;
                EntityField::Opacity
            }
            CanvasAction::FillColorChanged { color, .. } => {
                state.fill.color = color;
                state.revisions.fill = rev;
                EntityField::Fill
            }
            CanvasAction::FillStyleChanged { style, .. } => {
                state.fill.style = style;
                state.revisions.fill = rev;
                EntityField::Fill
            }
            CanvasAction::EntityRenamed { name, .. } => {
                state.name = name;
                EntityField::Name
            }
            CanvasAction::InpaintMaskAdded { .. } | CanvasAction::EntityDeleted { .. } => {
                unreachable!("handled in dispatch")
            }
        }
    }
}

impl SnapshotSource for CanvasStore {
    fn snapshot(&self, id: &EntityIdentifier) -> Option<Arc<InpaintMaskState>> {
        self.entities.iter().find(|e| &e.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn store_with_mask() -> (CanvasStore, EntityIdentifier) {
        let mut store = CanvasStore::new(256, 256, MaskDefaults::default());
        let id = store
            .dispatch(CanvasAction::InpaintMaskAdded { name: None, position: Pos2::ZERO })
            .unwrap()
            .unwrap();
        (store, id)
    }

    #[test]
    fn oversized_stage_is_rejected() {
        let err = CanvasStore::try_new(17_000, 17_000, MaskDefaults::default()).err();
        assert!(matches!(err, Some(CanvasError::StageSize { width: 17_000, height: 17_000, .. })));
        assert!(CanvasStore::try_new(512, 512, MaskDefaults::default()).is_ok());
    }

    #[test]
    fn added_mask_uses_defaults() {
        let defaults = MaskDefaults { opacity: 0.5, ..MaskDefaults::default() };
        let mut store = CanvasStore::new(64, 64, defaults);
        let id = store
            .dispatch(CanvasAction::InpaintMaskAdded { name: Some("Mask".into()), position: pos2(3.0, 4.0) })
            .unwrap()
            .unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.opacity, 0.5);
        assert_eq!(snap.position, pos2(3.0, 4.0));
        assert_eq!(snap.display_name(), "Mask");
        assert!(snap.is_enabled);
        assert!(id.id.starts_with("inpaint_mask_"));
    }

    #[test]
    fn update_restamps_only_touched_field() {
        let (mut store, id) = store_with_mask();
        let before = store.snapshot(&id).unwrap();

        store.dispatch(CanvasAction::EntityMoved { id: id.clone(), position: pos2(10.0, 0.0) }).unwrap();
        let after = store.snapshot(&id).unwrap();

        assert_ne!(before.revision(), after.revision());
        assert_ne!(before.revisions().position, after.revisions().position);
        assert_eq!(before.revisions().objects, after.revisions().objects);
        assert_eq!(before.revisions().fill, after.revisions().fill);
        // The earlier snapshot is untouched
        assert_eq!(before.position, Pos2::ZERO);
    }

    #[test]
    fn same_value_still_gets_new_stamp() {
        let (mut store, id) = store_with_mask();
        let before = store.snapshot(&id).unwrap();
        store.dispatch(CanvasAction::EntityIsEnabledChanged { id: id.clone(), is_enabled: true }).unwrap();
        let after = store.snapshot(&id).unwrap();
        assert_ne!(before.revisions().is_enabled, after.revisions().is_enabled);
    }

    #[test]
    fn rename_does_not_touch_tracked_fields() {
        let (mut store, id) = store_with_mask();
        let before = store.snapshot(&id).unwrap();
        store.dispatch(CanvasAction::EntityRenamed { id: id.clone(), name: Some("x".into()) }).unwrap();
        let after = store.snapshot(&id).unwrap();
        assert_eq!(before.revisions(), after.revisions());
        assert_ne!(before.revision(), after.revision());
    }

    #[test]
    fn opacity_is_clamped() {
        let (mut store, id) = store_with_mask();
        store.dispatch(CanvasAction::EntityOpacityChanged { id: id.clone(), opacity: 3.0 }).unwrap();
        assert_eq!(store.snapshot(&id).unwrap().opacity, 1.0);
        store.dispatch(CanvasAction::EntityOpacityChanged { id: id.clone(), opacity: -1.0 }).unwrap();
        assert_eq!(store.snapshot(&id).unwrap().opacity, 0.0);
        store.dispatch(CanvasAction::EntityOpacityChanged { id: id.clone(), opacity: f32::NAN }).unwrap();
        assert_eq!(store.snapshot(&id).unwrap().opacity, 1.0);
    }

    #[test]
    fn objects_get_unique_ids_and_reset_clears() {
        let (mut store, id) = store_with_mask();
        let rect = Rect::from_min_max(pos2(0.0, 0.0), pos2(4.0, 4.0));
        store.dispatch(CanvasAction::RectAdded { id: id.clone(), rect }).unwrap();
        store.dispatch(CanvasAction::RectAdded { id: id.clone(), rect }).unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.objects.len(), 2);
        assert_ne!(snap.objects[0].id(), snap.objects[1].id());

        store.dispatch(CanvasAction::EntityReset { id: id.clone() }).unwrap();
        assert!(store.snapshot(&id).unwrap().objects.is_empty());
    }

    #[test]
    fn unknown_entity_is_rejected_without_notification() {
        let (mut store, _) = store_with_mask();
        let sub = store.subscribe();
        let ghost = EntityIdentifier::new("ghost", EntityKind::InpaintMask);
        let rev = store.revision();

        let err = store.dispatch(CanvasAction::EntityMoved { id: ghost.clone(), position: Pos2::ZERO });
        assert_eq!(err, Err(CanvasError::EntityNotFound(ghost)));
        assert_eq!(store.revision(), rev);
        assert_eq!(sub.drain().count(), 0);
    }

    #[test]
    fn notifications_arrive_in_order() {
        let (mut store, id) = store_with_mask();
        let sub = store.subscribe();

        store.dispatch(CanvasAction::EntityMoved { id: id.clone(), position: pos2(1.0, 1.0) }).unwrap();
        store.dispatch(CanvasAction::FillStyleChanged { id: id.clone(), style: FillStyle::Grid }).unwrap();
        store.dispatch(CanvasAction::EntityDeleted { id: id.clone() }).unwrap();

        let events: Vec<StoreEvent> = sub.drain().collect();
        let changes: Vec<EntityChange> = events.iter().map(|e| e.change.clone()).collect();
        assert_eq!(
            changes,
            vec![
                EntityChange::Updated(EntityField::Position),
                EntityChange::Updated(EntityField::Fill),
                EntityChange::Removed,
            ]
        );
        assert!(events.windows(2).all(|w| w[0].revision < w[1].revision));
        assert!(store.snapshot(&id).is_none());
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let (mut store, id) = store_with_mask();
        let kept = store.subscribe();
        let dropped = store.subscribe();
        let removed = store.subscribe();
        assert_eq!(store.listener_count(), 3);

        store.unsubscribe(removed);
        assert_eq!(store.listener_count(), 2);

        dropped.unsubscribe();
        store.dispatch(CanvasAction::EntityReset { id }).unwrap();
        assert_eq!(store.listener_count(), 1);
        assert_eq!(kept.drain().count(), 1);
    }
}
