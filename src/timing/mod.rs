//! Посимвольная разметка синтезатора и её преобразование в пословную.

pub mod words;

use serde::{Deserialize, Serialize};

pub use words::{extract_word_timings, is_cjk, word_timings_for_range};

/// Глобальная посимвольная разметка всего синтезированного текста
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterAlignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl CharacterAlignment {
    /// Число символов, для которых есть обе метки времени
    pub fn len(&self) -> usize {
        self.characters
            .len()
            .min(self.character_start_times_seconds.len())
            .min(self.character_end_times_seconds.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
