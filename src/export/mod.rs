//! Экспорт учебного контента в офлайн-формат мобильного клиента.
//!
//! Курсы, уроки и содержимое уроков читаются параллельно, затем
//! записываются `content.json` и две SQLite-базы.

pub mod bundle;
pub mod sqlite;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use log::info;

use crate::error::{Result, StudioError};
use crate::models::{Course, Lesson};
use crate::store::ContentSource;

pub use bundle::{ContentBundle, ConversationEntry, CourseBundle, LessonBundle, BUNDLE_VERSION};

pub const CONTENT_FILE: &str = "content.json";
pub const VOCABULARY_DB: &str = "vocabulary.db";
pub const GRAMMAR_DB: &str = "grammar.db";

/// Итог экспорта
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub courses: usize,
    pub lessons: usize,
    pub vocabulary: usize,
    pub grammar: usize,
    pub conversations: usize,
    pub content_path: PathBuf,
    pub vocabulary_db: PathBuf,
    pub grammar_db: PathBuf,
}

pub struct ExportJob {
    source: Arc<dyn ContentSource>,
}

impl ExportJob {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Собрать вложенный пакет контента
    pub async fn collect(&self) -> Result<ContentBundle> {
        let courses = self.source.list_courses().await?;
        info!("Exporting {} courses", courses.len());

        let courses = try_join_all(courses.into_iter().map(|course| self.collect_course(course))).await?;
        Ok(ContentBundle::new(courses))
    }

    async fn collect_course(&self, course: Course) -> Result<CourseBundle> {
        let lessons = self.source.lessons_for_course(&course.id).await?;
        let lessons = try_join_all(lessons.into_iter().map(|lesson| self.collect_lesson(lesson))).await?;
        Ok(CourseBundle { course, lessons })
    }

    async fn collect_lesson(&self, lesson: Lesson) -> Result<LessonBundle> {
        let (vocabulary, grammar, conversations) = futures::try_join!(
            self.source.vocabulary_for_lesson(&lesson.id),
            self.source.grammar_for_lesson(&lesson.id),
            self.source.conversations_for_lesson(&lesson.id),
        )?;
        Ok(LessonBundle::new(lesson, vocabulary, grammar, conversations))
    }

    /// Выполнить экспорт в каталог `output_dir`
    pub async fn run(&self, output_dir: &Path) -> Result<ExportSummary> {
        tokio::fs::create_dir_all(output_dir).await?;
        let bundle = Arc::new(self.collect().await?);

        let content_path = output_dir.join(CONTENT_FILE);
        let json = serde_json::to_vec_pretty(bundle.as_ref())?;
        tokio::fs::write(&content_path, json).await?;
        info!("Wrote {}", content_path.display());

        let vocabulary_db = output_dir.join(VOCABULARY_DB);
        let grammar_db = output_dir.join(GRAMMAR_DB);

        let vocabulary_task = {
            let bundle = bundle.clone();
            let path = vocabulary_db.clone();
            tokio::task::spawn_blocking(move || sqlite::write_vocabulary_db(&path, &bundle))
        };
        let grammar_task = {
            let bundle = bundle.clone();
            let path = grammar_db.clone();
            tokio::task::spawn_blocking(move || sqlite::write_grammar_db(&path, &bundle))
        };
        let (vocabulary_rows, grammar_rows) = futures::try_join!(vocabulary_task, grammar_task)
            .map_err(|e| StudioError::Other(format!("export task failed: {}", e)))?;
        let (vocabulary_rows, grammar_rows) = (vocabulary_rows?, grammar_rows?);

        let summary = ExportSummary {
            courses: bundle.courses.len(),
            lessons: bundle.lesson_count(),
            vocabulary: vocabulary_rows,
            grammar: grammar_rows,
            conversations: bundle.conversation_count(),
            content_path,
            vocabulary_db,
            grammar_db,
        };
        info!(
            "Export finished: {} courses, {} lessons, {} words, {} grammar points, {} conversations",
            summary.courses, summary.lessons, summary.vocabulary, summary.grammar, summary.conversations
        );
        Ok(summary)
    }
}
