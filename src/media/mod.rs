//! Сборка видео беседы через внешний рендерер

pub mod composer;
pub mod plan;
pub mod renderer;
pub mod stages;
pub mod workspace;

pub use composer::{subtitle_document, ComposedVideo, VideoComposer};
pub use plan::{CompositionPlan, CompositionRequest};
pub use renderer::{FfmpegRenderer, MediaRenderer, RenderStage, StageError};
pub use workspace::CompositionWorkspace;
