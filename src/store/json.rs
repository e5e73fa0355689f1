//! Документы в виде JSON-файлов: `<root>/<collection>/<id>.json`.
//!
//! Используется CLI. Обновления сериализуются мьютексом и записываются
//! через временный файл с переименованием.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{ContentSource, ConversationPatch, ConversationStore, UpdateCondition};
use crate::error::{Result, StudioError};
use crate::models::{Conversation, Course, GrammarPoint, Lesson, VocabularyItem};

const CONVERSATIONS: &str = "conversations";
const COURSES: &str = "courses";
const LESSONS: &str = "lessons";
const VOCABULARY: &str = "vocabulary";
const GRAMMAR: &str = "grammar";

pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StudioError::Precondition(format!(
                "invalid document id: {:?}",
                id
            )));
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    async fn read_document<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let path = self.document_path(collection, id)?;
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Записать документ атомарно
    pub async fn write_document<T: Serialize>(&self, collection: &str, id: &str, document: &T) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let dir = self.root.join(collection);
        let raw = serde_json::to_vec_pretty(document)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(&raw)?;
            file.persist(&path).map_err(|e| StudioError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StudioError::Other(format!("document write task failed: {}", e)))?
    }

    async fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.root.join(collection);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read(&path).await?;
            match serde_json::from_slice(&raw) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    log::error!("Failed to parse {}: {}", path.display(), e);
                    return Err(e.into());
                }
            }
        }
        Ok(documents)
    }

    pub async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.write_document(CONVERSATIONS, &conversation.id, conversation)
            .await
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.read_document(CONVERSATIONS, id).await
    }

    async fn update_conversation(
        &self,
        id: &str,
        condition: UpdateCondition,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>> {
        let _guard = self.write_lock.lock().await;

        let Some(mut conversation) = self.read_document::<Conversation>(CONVERSATIONS, id).await? else {
            return Ok(None);
        };
        if !condition.matches(&conversation) {
            log::debug!("Update of conversation {} skipped: {:?} not met", id, condition);
            return Ok(None);
        }

        patch.apply(&mut conversation);
        self.write_document(CONVERSATIONS, id, &conversation).await?;
        Ok(Some(conversation))
    }
}

#[async_trait]
impl ContentSource for JsonFileStore {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.read_collection(COURSES).await
    }

    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let lessons: Vec<Lesson> = self.read_collection(LESSONS).await?;
        Ok(lessons.into_iter().filter(|l| l.course_id == course_id).collect())
    }

    async fn vocabulary_for_lesson(&self, lesson_id: &str) -> Result<Vec<VocabularyItem>> {
        let items: Vec<VocabularyItem> = self.read_collection(VOCABULARY).await?;
        Ok(items.into_iter().filter(|i| i.lesson_id == lesson_id).collect())
    }

    async fn grammar_for_lesson(&self, lesson_id: &str) -> Result<Vec<GrammarPoint>> {
        let points: Vec<GrammarPoint> = self.read_collection(GRAMMAR).await?;
        Ok(points.into_iter().filter(|p| p.lesson_id == lesson_id).collect())
    }

    async fn conversations_for_lesson(&self, lesson_id: &str) -> Result<Vec<Conversation>> {
        let conversations: Vec<Conversation> = self.read_collection(CONVERSATIONS).await?;
        Ok(conversations
            .into_iter()
            .filter(|c| c.lesson_id.as_deref() == Some(lesson_id))
            .collect())
    }
}
