//! Основной файл библиотеки dialogue-studio
//!
//! Синтез диалогов двух участников с пословной разметкой, сборка видео
//! с субтитрами и экспорт учебного контента для мобильного клиента.

pub mod config;
pub mod error;
pub mod export;
pub mod media;
pub mod models;
pub mod service;
pub mod storage;
pub mod store;
pub mod timing;
pub mod tts;
pub mod utils;

pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use export::{ExportJob, ExportSummary};
pub use media::{ComposedVideo, CompositionRequest, FfmpegRenderer, MediaRenderer, VideoComposer};
pub use service::ConversationService;
pub use timing::{extract_word_timings, word_timings_for_range};
pub use tts::{DialogueSynthesizer, ElevenLabsClient, SpeechBackend, SynthesisOutcome};
