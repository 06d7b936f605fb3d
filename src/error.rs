use thiserror::Error;

use crate::canvas::EntityIdentifier;

/// Errors raised by store actions and adapter construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityIdentifier),
    #[error("stage size {width}x{height} out of range (1..={max} pixels)")]
    StageSize { width: u32, height: u32, max: u64 },
    #[error("fingerprint encoding failed: {0}")]
    Fingerprint(String),
}

/// Error type for reading / writing state files (UI state, scenes).
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Errors from the headless scene pipeline.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
