//! Беседа (диалог двух участников) и её артефакты.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alignment::DialogueAlignment;

/// Роль говорящего. В беседе ровно две роли.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantRole {
    A,
    B,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Участник беседы с назначенным голосом синтезатора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationParticipant {
    pub role: ParticipantRole,
    pub name: String,
    /// Идентификатор голоса; пустая строка означает «не назначен»
    #[serde(default)]
    pub voice_id: String,
}

impl ConversationParticipant {
    pub fn has_voice(&self) -> bool {
        !self.voice_id.trim().is_empty()
    }
}

/// Одна реплика диалога
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSentence {
    pub id: String,
    pub role: ParticipantRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    /// Порядок воспроизведения; при равенстве сохраняется порядок в массиве
    #[serde(default)]
    pub order: i32,
}

/// Состояние генерации аудио
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Draft,
    Generating,
    Completed,
    Failed,
}

/// Каким путём получена разметка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Пословная разметка от синтезатора
    Timestamped,
    /// Резервный синтез без меток времени, все времена нулевые
    Degraded,
}

/// Беседа: участники, реплики и ссылки на сгенерированные артефакты.
///
/// Артефакты хранятся как ключи объектного хранилища, а не как байты.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<ConversationParticipant>,
    #[serde(default)]
    pub sentences: Vec<DialogueSentence>,
    #[serde(default)]
    pub status: ConversationStatus,
    /// Текст последней ошибки генерации
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    /// Длительность аудио в секундах
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<DialogueAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_mode: Option<AlignmentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_key: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lesson_id: None,
            participants: Vec::new(),
            sentences: Vec::new(),
            status: ConversationStatus::Draft,
            error: None,
            audio_key: None,
            audio_duration: None,
            alignment: None,
            alignment_mode: None,
            video_key: None,
            subtitle_key: None,
            updated_at: Utc::now(),
        }
    }

    pub fn participant(&self, role: ParticipantRole) -> Option<&ConversationParticipant> {
        self.participants.iter().find(|p| p.role == role)
    }

    /// Длительность речи: сохранённая при генерации или из разметки
    pub fn recorded_duration(&self) -> f64 {
        self.audio_duration
            .or_else(|| self.alignment.as_ref().map(|a| a.total_duration))
            .unwrap_or(0.0)
    }
}
