use image::RgbaImage;
use std::path::{Path, PathBuf};
use iconstage_common::EntityId;
use iconstage_kernel::SceneError;

/// Everything that can go wrong in a render operation.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No subject was configured. Nothing was touched.
    #[error("subject not set")]
    SubjectNotSet,
    /// The subject reference does not resolve in the scene. Nothing was touched.
    #[error("subject {0:?} not found in scene")]
    SubjectMissing(EntityId),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// Composition, camera setup, draw or readback failed. Teardown still ran.
    #[error("render failed: {0}")]
    Render(String),
    /// Directory creation, encoding, writing or import metadata failed.
    #[error("persist failed: {0}")]
    Persist(String),
    /// No adapter or device could be opened for offscreen rendering.
    #[error("gpu unavailable: {0}")]
    Gpu(String),
}

impl RenderError {
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }
}

impl From<SceneError> for RenderError {
    fn from(e: SceneError) -> Self {
        Self::Render(e.to_string())
    }
}

/// Outcome of a public render operation. Exactly one variant is populated.
#[derive(Debug)]
pub enum RenderResult {
    /// In-memory render.
    Bitmap(RgbaImage),
    /// Persisted render; the path of the written file.
    Saved(PathBuf),
    Failed(RenderError),
}

impl RenderResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn bitmap(&self) -> Option<&RgbaImage> {
        match self {
            Self::Bitmap(img) => Some(img),
            _ => None,
        }
    }

    pub fn saved_path(&self) -> Option<&Path> {
        match self {
            Self::Saved(path) => Some(path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RenderError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Human-readable failure message, for command surfaces.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }
}

impl From<Result<RgbaImage, RenderError>> for RenderResult {
    fn from(r: Result<RgbaImage, RenderError>) -> Self {
        match r {
            Ok(img) => Self::Bitmap(img),
            Err(e) => Self::Failed(e),
        }
    }
}

impl From<Result<PathBuf, RenderError>> for RenderResult {
    fn from(r: Result<PathBuf, RenderError>) -> Self {
        match r {
            Ok(path) => Self::Saved(path),
            Err(e) => Self::Failed(e),
        }
    }
}
