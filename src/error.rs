//! Модуль обработки ошибок
//!
//! Все операции библиотеки возвращают [`StudioError`]. Ошибки делятся на
//! клиентские (нарушение предусловий, не найдено, конфликт) и ошибки
//! внешних систем (синтез речи, рендер, хранилище).

use thiserror::Error;

use crate::media::StageError;

/// Ошибки библиотеки dialogue-studio
#[derive(Debug, Error)]
pub enum StudioError {
    /// Нарушено предусловие операции (проверяется до любых внешних вызовов)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Документ не найден
    #[error("Not found: {0}")]
    NotFound(String),

    /// Над беседой уже выполняется другая операция
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Некорректный base64 в ответе синтезатора
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Ошибка SQLite при экспорте
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Ошибка сервиса синтеза речи
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    /// Ответ синтезатора не согласуется с запросом
    #[error("Alignment mismatch: expected {expected} voice segments, got {actual}")]
    AlignmentMismatch { expected: usize, actual: usize },

    /// Ошибка одного из этапов рендера
    #[error(transparent)]
    Render(#[from] StageError),

    /// Ошибка объектного хранилища
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl StudioError {
    /// Ошибка вызвана входными данными, а не внешней системой
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_) | Self::NotFound(_) | Self::Conflict(_)
        )
    }
}

impl From<&str> for StudioError {
    fn from(s: &str) -> Self {
        StudioError::Other(s.to_string())
    }
}

impl From<String> for StudioError {
    fn from(s: String) -> Self {
        StudioError::Other(s)
    }
}

/// Тип Result для библиотеки
pub type Result<T> = std::result::Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(StudioError::Precondition("no voice".into()).is_client_error());
        assert!(StudioError::Conflict("busy".into()).is_client_error());
        assert!(!StudioError::Synthesis("502".into()).is_client_error());
        assert!(!StudioError::AlignmentMismatch { expected: 3, actual: 2 }.is_client_error());
    }

    #[test]
    fn test_alignment_mismatch_message() {
        let err = StudioError::AlignmentMismatch { expected: 3, actual: 2 };
        assert_eq!(
            err.to_string(),
            "Alignment mismatch: expected 3 voice segments, got 2"
        );
    }
}
