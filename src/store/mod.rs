//! Доступ к документному хранилищу.
//!
//! Ядру нужны только поиск беседы по id и условное обновление с
//! возвратом результата; экспорт дополнительно читает учебный контент.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::models::{
    AlignmentMode, Conversation, ConversationStatus, Course, DialogueAlignment, GrammarPoint,
    Lesson, VocabularyItem,
};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Условие применения обновления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCondition {
    Always,
    StatusIs(ConversationStatus),
    StatusIsNot(ConversationStatus),
}

impl UpdateCondition {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        match self {
            Self::Always => true,
            Self::StatusIs(status) => conversation.status == *status,
            Self::StatusIsNot(status) => conversation.status != *status,
        }
    }
}

/// Частичное обновление беседы.
///
/// `None` оставляет поле как есть, `Some(None)` очищает его.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub status: Option<ConversationStatus>,
    pub error: Option<Option<String>>,
    pub audio_key: Option<Option<String>>,
    pub audio_duration: Option<Option<f64>>,
    pub alignment: Option<Option<DialogueAlignment>>,
    pub alignment_mode: Option<Option<AlignmentMode>>,
    pub video_key: Option<Option<String>>,
    pub subtitle_key: Option<Option<String>>,
}

impl ConversationPatch {
    pub fn status(status: ConversationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(self, conversation: &mut Conversation) {
        if let Some(status) = self.status {
            conversation.status = status;
        }
        if let Some(error) = self.error {
            conversation.error = error;
        }
        if let Some(audio_key) = self.audio_key {
            conversation.audio_key = audio_key;
        }
        if let Some(audio_duration) = self.audio_duration {
            conversation.audio_duration = audio_duration;
        }
        if let Some(alignment) = self.alignment {
            conversation.alignment = alignment;
        }
        if let Some(alignment_mode) = self.alignment_mode {
            conversation.alignment_mode = alignment_mode;
        }
        if let Some(video_key) = self.video_key {
            conversation.video_key = video_key;
        }
        if let Some(subtitle_key) = self.subtitle_key {
            conversation.subtitle_key = subtitle_key;
        }
        conversation.updated_at = Utc::now();
    }
}

/// Хранилище бесед
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Применить `patch`, если беседа найдена и удовлетворяет `condition`.
    ///
    /// Возвращает обновлённый документ либо `None`.
    async fn update_conversation(
        &self,
        id: &str,
        condition: UpdateCondition,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>>;
}

/// Источник учебного контента для экспорта
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>>;
    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>>;
    async fn vocabulary_for_lesson(&self, lesson_id: &str) -> Result<Vec<VocabularyItem>>;
    async fn grammar_for_lesson(&self, lesson_id: &str) -> Result<Vec<GrammarPoint>>;
    async fn conversations_for_lesson(&self, lesson_id: &str) -> Result<Vec<Conversation>>;
}
