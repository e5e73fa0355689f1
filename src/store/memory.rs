//! Хранилище в памяти процесса (тесты и одноразовые прогоны)

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ContentSource, ConversationPatch, ConversationStore, UpdateCondition};
use crate::error::Result;
use crate::models::{Conversation, Course, GrammarPoint, Lesson, VocabularyItem};

#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    courses: RwLock<Vec<Course>>,
    lessons: RwLock<Vec<Lesson>>,
    vocabulary: RwLock<Vec<VocabularyItem>>,
    grammar: RwLock<Vec<GrammarPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_conversation(&self, conversation: Conversation) {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation);
    }

    pub async fn insert_course(&self, course: Course) {
        self.courses.write().await.push(course);
    }

    pub async fn insert_lesson(&self, lesson: Lesson) {
        self.lessons.write().await.push(lesson);
    }

    pub async fn insert_vocabulary(&self, item: VocabularyItem) {
        self.vocabulary.write().await.push(item);
    }

    pub async fn insert_grammar(&self, point: GrammarPoint) {
        self.grammar.write().await.push(point);
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn update_conversation(
        &self,
        id: &str,
        condition: UpdateCondition,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(id) {
            Some(conversation) if condition.matches(conversation) => {
                patch.apply(conversation);
                Ok(Some(conversation.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ContentSource for MemoryStore {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.courses.read().await.clone())
    }

    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>> {
        Ok(self
            .lessons
            .read()
            .await
            .iter()
            .filter(|lesson| lesson.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn vocabulary_for_lesson(&self, lesson_id: &str) -> Result<Vec<VocabularyItem>> {
        Ok(self
            .vocabulary
            .read()
            .await
            .iter()
            .filter(|item| item.lesson_id == lesson_id)
            .cloned()
            .collect())
    }

    async fn grammar_for_lesson(&self, lesson_id: &str) -> Result<Vec<GrammarPoint>> {
        Ok(self
            .grammar
            .read()
            .await
            .iter()
            .filter(|point| point.lesson_id == lesson_id)
            .cloned()
            .collect())
    }

    async fn conversations_for_lesson(&self, lesson_id: &str) -> Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.lesson_id.as_deref() == Some(lesson_id))
            .cloned()
            .collect())
    }
}
