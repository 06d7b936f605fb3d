//! CanvasFE core: keeps rendered inpaint-mask layers in step with the canvas
//! store, plus the persisted UI flags slice.

pub mod canvas;
pub mod components;
pub mod error;
pub mod logger;
pub mod manager;
pub mod ops;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod store;

pub use canvas::{EntityIdentifier, EntityKind, Fill, FillStyle, InpaintMaskState, MaskDefaults, MaskObject, RgbColor};
pub use components::mask_adapter::{InpaintMaskAdapter, SyncOutcome, SyncStep};
pub use components::ui_state::{TabName, UiAction, UiState};
pub use error::{CanvasError, PersistError, SceneError};
pub use manager::CanvasManager;
pub use renderer::{EntityRenderer, RasterMaskRenderer, RenderAttrs};
pub use store::{CanvasAction, CanvasStore, EntityChange, EntityField, StoreEvent, Subscription};
