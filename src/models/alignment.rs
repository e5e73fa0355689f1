//! Временная разметка диалога: слова, реплики, вся запись.
//!
//! JSON-представление (camelCase) совпадает с форматом файла субтитров,
//! который читают мобильный клиент и видеоплеер.

use serde::{Deserialize, Serialize};

use super::conversation::ParticipantRole;

/// Границы одного слова в секундах
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Одна реплика с фактическими временами звучания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSegment {
    /// Идентификатор исходной реплики (`DialogueSentence::id`)
    pub sentence_id: String,
    pub text: String,
    pub participant_role: ParticipantRole,
    pub start_time: f64,
    pub end_time: f64,
    pub words: Vec<WordTiming>,
}

/// Разметка всей аудиозаписи беседы.
///
/// Сегменты идут в том же порядке, что и реплики, из которых они получены,
/// и `total_duration` не меньше конца любого сегмента.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueAlignment {
    pub segments: Vec<DialogueSegment>,
    pub total_duration: f64,
}

impl DialogueAlignment {
    /// Собрать разметку, вычислив общую длительность по сегментам
    pub fn from_segments(segments: Vec<DialogueSegment>) -> Self {
        let total_duration = segments
            .iter()
            .map(|segment| segment.end_time)
            .fold(0.0_f64, f64::max);

        Self {
            segments,
            total_duration,
        }
    }

    /// Конец последнего звучащего сегмента
    pub fn max_end_time(&self) -> f64 {
        self.segments
            .iter()
            .map(|segment| segment.end_time)
            .fold(0.0_f64, f64::max)
    }

    /// Копия разметки, сдвинутая на `offset` секунд.
    ///
    /// Исходное значение не изменяется: оно по-прежнему описывает
    /// аудиофайл без вступления.
    pub fn shifted(&self, offset: f64) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|segment| DialogueSegment {
                start_time: segment.start_time + offset,
                end_time: segment.end_time + offset,
                words: segment
                    .words
                    .iter()
                    .map(|word| WordTiming {
                        word: word.word.clone(),
                        start: word.start + offset,
                        end: word.end + offset,
                    })
                    .collect(),
                ..segment.clone()
            })
            .collect();

        Self {
            segments,
            total_duration: self.total_duration + offset,
        }
    }

    /// Есть ли в разметке реальные времена (а не нули после деградации)
    pub fn has_timing(&self) -> bool {
        self.total_duration > 0.0
    }
}
