// Плоские SQLite-базы для офлайн-поиска на клиенте.
// Каждая база создаётся заново при каждом экспорте.

use std::path::Path;

use rusqlite::{params, Connection};

use super::bundle::ContentBundle;
use crate::error::Result;

const VOCABULARY_SCHEMA: &str = r#"
    CREATE TABLE vocabulary (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        course_title TEXT NOT NULL,
        lesson_id TEXT NOT NULL,
        lesson_title TEXT NOT NULL,
        lesson_order INTEGER NOT NULL,
        word TEXT NOT NULL,
        translation TEXT NOT NULL,
        pronunciation TEXT,
        example TEXT,
        item_order INTEGER NOT NULL
    );
    CREATE INDEX idx_vocabulary_lesson ON vocabulary(lesson_id, item_order);
    CREATE INDEX idx_vocabulary_word ON vocabulary(word);
"#;

const GRAMMAR_SCHEMA: &str = r#"
    CREATE TABLE grammar (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        course_title TEXT NOT NULL,
        lesson_id TEXT NOT NULL,
        lesson_title TEXT NOT NULL,
        lesson_order INTEGER NOT NULL,
        title TEXT NOT NULL,
        explanation TEXT NOT NULL,
        examples TEXT NOT NULL,
        item_order INTEGER NOT NULL
    );
    CREATE INDEX idx_grammar_lesson ON grammar(lesson_id, item_order);
"#;

const METADATA_SCHEMA: &str = r#"
    CREATE TABLE export_info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Открыть новую базу, удалив прежний файл
fn create_fresh(path: &Path, schema: &str) -> Result<Connection> {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed previous database {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(METADATA_SCHEMA)?;
    conn.execute_batch(schema)?;
    Ok(conn)
}

fn write_metadata(conn: &Connection, bundle: &ContentBundle) -> Result<()> {
    conn.execute(
        "INSERT INTO export_info (key, value) VALUES ('version', ?1), ('generated_at', ?2)",
        params![bundle.version.to_string(), bundle.generated_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Записать словарь всех уроков; возвращает число строк
pub fn write_vocabulary_db(path: &Path, bundle: &ContentBundle) -> Result<usize> {
    let mut conn = create_fresh(path, VOCABULARY_SCHEMA)?;
    write_metadata(&conn, bundle)?;

    let tx = conn.transaction()?;
    let mut rows = 0;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO vocabulary (
                id, course_id, course_title, lesson_id, lesson_title, lesson_order,
                word, translation, pronunciation, example, item_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )?;

        for course in &bundle.courses {
            for lesson in &course.lessons {
                for item in &lesson.vocabulary {
                    stmt.execute(params![
                        item.id,
                        course.course.id,
                        course.course.title,
                        lesson.lesson.id,
                        lesson.lesson.title,
                        lesson.lesson.order,
                        item.word,
                        item.translation,
                        item.pronunciation,
                        item.example,
                        item.order,
                    ])?;
                    rows += 1;
                }
            }
        }
    }
    tx.commit()?;

    log::info!("Wrote {} vocabulary rows to {}", rows, path.display());
    Ok(rows)
}

/// Записать грамматику всех уроков; примеры хранятся JSON-массивом
pub fn write_grammar_db(path: &Path, bundle: &ContentBundle) -> Result<usize> {
    let mut conn = create_fresh(path, GRAMMAR_SCHEMA)?;
    write_metadata(&conn, bundle)?;

    let tx = conn.transaction()?;
    let mut rows = 0;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO grammar (
                id, course_id, course_title, lesson_id, lesson_title, lesson_order,
                title, explanation, examples, item_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )?;

        for course in &bundle.courses {
            for lesson in &course.lessons {
                for point in &lesson.grammar {
                    let examples = serde_json::to_string(&point.examples)?;
                    stmt.execute(params![
                        point.id,
                        course.course.id,
                        course.course.title,
                        lesson.lesson.id,
                        lesson.lesson.title,
                        lesson.lesson.order,
                        point.title,
                        point.explanation,
                        examples,
                        point.order,
                    ])?;
                    rows += 1;
                }
            }
        }
    }
    tx.commit()?;

    log::info!("Wrote {} grammar rows to {}", rows, path.display());
    Ok(rows)
}
