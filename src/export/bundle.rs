//! Вложенный JSON-пакет контента для мобильного клиента

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AlignmentMode, Conversation, ConversationParticipant, ConversationStatus, Course,
    DialogueAlignment, DialogueSentence, GrammarPoint, Lesson, VocabularyItem,
};

/// Версия формата пакета
pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBundle {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub courses: Vec<CourseBundle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseBundle {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<LessonBundle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonBundle {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub vocabulary: Vec<VocabularyItem>,
    pub grammar: Vec<GrammarPoint>,
    pub conversations: Vec<ConversationEntry>,
}

/// Беседа в том виде, в каком её видит клиент: без служебного статуса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub id: String,
    pub name: String,
    pub participants: Vec<ConversationParticipant>,
    pub sentences: Vec<DialogueSentence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<DialogueAlignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment_mode: Option<AlignmentMode>,
}

impl ConversationEntry {
    /// Только беседы с готовым аудио попадают в пакет
    pub fn from_conversation(conversation: Conversation) -> Option<Self> {
        if conversation.status != ConversationStatus::Completed || conversation.audio_key.is_none() {
            return None;
        }

        let mut sentences = conversation.sentences;
        sentences.sort_by_key(|s| s.order);

        Some(Self {
            id: conversation.id,
            name: conversation.name,
            participants: conversation.participants,
            sentences,
            audio_key: conversation.audio_key,
            audio_duration: conversation.audio_duration,
            video_key: conversation.video_key,
            subtitle_key: conversation.subtitle_key,
            alignment: conversation.alignment,
            alignment_mode: conversation.alignment_mode,
        })
    }
}

impl LessonBundle {
    pub fn new(
        lesson: Lesson,
        mut vocabulary: Vec<VocabularyItem>,
        mut grammar: Vec<GrammarPoint>,
        conversations: Vec<Conversation>,
    ) -> Self {
        vocabulary.sort_by_key(|v| v.order);
        grammar.sort_by_key(|g| g.order);

        let mut conversations: Vec<ConversationEntry> = conversations
            .into_iter()
            .filter_map(ConversationEntry::from_conversation)
            .collect();
        conversations.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        Self {
            lesson,
            vocabulary,
            grammar,
            conversations,
        }
    }
}

impl ContentBundle {
    pub fn new(mut courses: Vec<CourseBundle>) -> Self {
        courses.sort_by_key(|c| c.course.order);
        for course in &mut courses {
            course.lessons.sort_by_key(|l| l.lesson.order);
        }
        Self {
            version: BUNDLE_VERSION,
            generated_at: Utc::now(),
            courses,
        }
    }

    pub fn lesson_count(&self) -> usize {
        self.courses.iter().map(|c| c.lessons.len()).sum()
    }

    fn lessons(&self) -> impl Iterator<Item = &LessonBundle> {
        self.courses.iter().flat_map(|c| c.lessons.iter())
    }

    pub fn vocabulary_count(&self) -> usize {
        self.lessons().map(|l| l.vocabulary.len()).sum()
    }

    pub fn grammar_count(&self) -> usize {
        self.lessons().map(|l| l.grammar.len()).sum()
    }

    pub fn conversation_count(&self) -> usize {
        self.lessons().map(|l| l.conversations.len()).sum()
    }
}
