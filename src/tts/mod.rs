//! Модуль для работы с TTS
//!
//! Синтез диалога одним запросом к сервису с поддержкой нескольких голосов
//! и сопоставление ответа с исходными репликами.

pub mod elevenlabs;
pub mod synthesizer;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timing::CharacterAlignment;

pub use elevenlabs::ElevenLabsClient;
pub use synthesizer::{
    format_request_text, order_sentences, validate_preconditions, DialogueSynthesizer,
    SynthesisOutcome, SynthesizedDialogue,
};

/// Один элемент запроса: текст реплики и голос говорящего
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueInput {
    pub text: String,
    pub voice_id: String,
}

/// Сегмент ответа, соответствующий одному элементу запроса.
///
/// Индексы символов указывают в глобальную разметку всего текста.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSegment {
    #[serde(default)]
    pub voice_id: String,
    pub start_time_seconds: f64,
    pub end_time_seconds: f64,
    pub character_start_index: usize,
    pub character_end_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_input_index: Option<usize>,
}

/// Ответ синтеза с метками времени
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSpeech {
    pub audio_base64: String,
    #[serde(default)]
    pub alignment: Option<CharacterAlignment>,
    /// Разметка после нормализации текста сервисом
    #[serde(default)]
    pub normalized_alignment: Option<CharacterAlignment>,
    #[serde(default)]
    pub voice_segments: Vec<VoiceSegment>,
}

impl TimestampedSpeech {
    /// Разметка, с которой согласованы индексы сегментов.
    ///
    /// Если сервис нормализовал текст, индексы сегментов указывают в
    /// нормализованную разметку, поэтому она предпочтительнее.
    pub fn preferred_alignment(&self) -> Option<&CharacterAlignment> {
        self.normalized_alignment
            .as_ref()
            .filter(|alignment| !alignment.is_empty())
            .or(self.alignment.as_ref())
    }
}

/// Сервис синтеза речи.
///
/// Реализация обязана возвращать сегменты в порядке элементов запроса.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Синтез с посимвольными метками времени
    async fn synthesize_timestamped(&self, inputs: &[DialogueInput]) -> Result<TimestampedSpeech>;

    /// Обычный синтез без меток времени
    async fn synthesize(&self, inputs: &[DialogueInput]) -> Result<Bytes>;
}
