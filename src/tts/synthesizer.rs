//! Оркестратор синтеза диалога
//!
//! Превращает упорядоченный список реплик в один запрос к сервису синтеза и
//! сопоставляет сегменты ответа с идентификаторами реплик. Если синтез с
//! метками времени недоступен, выполняется обычный синтез и возвращается
//! деградированная разметка.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;

use super::{DialogueInput, SpeechBackend, TimestampedSpeech};
use crate::error::{Result, StudioError};
use crate::models::{
    AlignmentMode, ConversationParticipant, DialogueAlignment, DialogueSegment, DialogueSentence,
};
use crate::timing::word_timings_for_range;

/// Аудио и разметка диалога
#[derive(Debug, Clone)]
pub struct SynthesizedDialogue {
    pub audio: Bytes,
    pub alignment: DialogueAlignment,
}

/// Результат синтеза: с пословной разметкой или без неё
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    Timestamped(SynthesizedDialogue),
    /// Обычный синтез; `reason` описывает отказ основного пути
    Degraded {
        dialogue: SynthesizedDialogue,
        reason: String,
    },
}

impl SynthesisOutcome {
    pub fn dialogue(&self) -> &SynthesizedDialogue {
        match self {
            Self::Timestamped(dialogue) => dialogue,
            Self::Degraded { dialogue, .. } => dialogue,
        }
    }

    pub fn into_dialogue(self) -> SynthesizedDialogue {
        match self {
            Self::Timestamped(dialogue) => dialogue,
            Self::Degraded { dialogue, .. } => dialogue,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn mode(&self) -> AlignmentMode {
        match self {
            Self::Timestamped(_) => AlignmentMode::Timestamped,
            Self::Degraded { .. } => AlignmentMode::Degraded,
        }
    }
}

/// Оркестратор синтеза диалога
#[derive(Clone)]
pub struct DialogueSynthesizer {
    backend: Arc<dyn SpeechBackend>,
}

impl DialogueSynthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self { backend }
    }

    /// Синтезировать диалог.
    ///
    /// Предусловия проверяются до любого сетевого вызова. Ошибка основного
    /// пути приводит к обычному синтезу, ошибка обычного синтеза
    /// возвращается вызывающему.
    pub async fn synthesize(
        &self,
        sentences: &[DialogueSentence],
        participants: &[ConversationParticipant],
    ) -> Result<SynthesisOutcome> {
        validate_preconditions(sentences, participants)?;

        let ordered = order_sentences(sentences);
        let inputs = build_inputs(&ordered, participants)?;

        log::info!("Synthesizing dialogue with {} sentences", inputs.len());

        match self.synthesize_timestamped(&ordered, &inputs).await {
            Ok(dialogue) => {
                log::info!(
                    "Timestamped synthesis completed: {:.2}s, {} segments",
                    dialogue.alignment.total_duration,
                    dialogue.alignment.segments.len()
                );
                Ok(SynthesisOutcome::Timestamped(dialogue))
            }
            Err(err) => {
                log::warn!(
                    "Timestamped synthesis failed, falling back to plain synthesis: {}",
                    err
                );
                let audio = self.backend.synthesize(&inputs).await?;
                Ok(SynthesisOutcome::Degraded {
                    dialogue: SynthesizedDialogue {
                        audio,
                        alignment: degraded_alignment(&ordered),
                    },
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn synthesize_timestamped(
        &self,
        ordered: &[&DialogueSentence],
        inputs: &[DialogueInput],
    ) -> Result<SynthesizedDialogue> {
        let speech = self.backend.synthesize_timestamped(inputs).await?;
        assemble_dialogue(ordered, &speech)
    }
}

/// Проверка предусловий: есть реплики, у каждой используемой роли есть голос
pub fn validate_preconditions(
    sentences: &[DialogueSentence],
    participants: &[ConversationParticipant],
) -> Result<()> {
    if sentences.is_empty() {
        return Err(StudioError::Precondition(
            "conversation has no sentences".to_string(),
        ));
    }

    for sentence in sentences {
        voice_for(sentence, participants)?;
    }
    Ok(())
}

fn voice_for<'a>(
    sentence: &DialogueSentence,
    participants: &'a [ConversationParticipant],
) -> Result<&'a str> {
    participants
        .iter()
        .find(|p| p.role == sentence.role)
        .filter(|p| p.has_voice())
        .map(|p| p.voice_id.as_str())
        .ok_or_else(|| {
            StudioError::Precondition(format!(
                "participant {} has no voice assigned",
                sentence.role
            ))
        })
}

/// Реплики по возрастанию `order`; сортировка устойчивая
pub fn order_sentences(sentences: &[DialogueSentence]) -> Vec<&DialogueSentence> {
    let mut ordered: Vec<&DialogueSentence> = sentences.iter().collect();
    ordered.sort_by_key(|sentence| sentence.order);
    ordered
}

/// Текст запроса: тон и эмоция в одном маркере перед репликой
pub fn format_request_text(sentence: &DialogueSentence) -> String {
    let labels: Vec<&str> = [sentence.tone.as_deref(), sentence.emotion.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect();

    if labels.is_empty() {
        sentence.text.clone()
    } else {
        format!("[{}] {}", labels.join(", "), sentence.text)
    }
}

fn build_inputs(
    ordered: &[&DialogueSentence],
    participants: &[ConversationParticipant],
) -> Result<Vec<DialogueInput>> {
    ordered
        .iter()
        .map(|sentence| {
            Ok(DialogueInput {
                text: format_request_text(sentence),
                voice_id: voice_for(sentence, participants)?.to_string(),
            })
        })
        .collect()
}

/// Сопоставить ответ сервиса с репликами.
///
/// Сегмент `i` относится к реплике `i`; число сегментов обязано совпадать с
/// числом реплик.
fn assemble_dialogue(
    ordered: &[&DialogueSentence],
    speech: &TimestampedSpeech,
) -> Result<SynthesizedDialogue> {
    if speech.voice_segments.len() != ordered.len() {
        return Err(StudioError::AlignmentMismatch {
            expected: ordered.len(),
            actual: speech.voice_segments.len(),
        });
    }

    let characters = speech.preferred_alignment().ok_or_else(|| {
        StudioError::Synthesis("response contains no character alignment".to_string())
    })?;

    let audio = Bytes::from(general_purpose::STANDARD.decode(&speech.audio_base64)?);

    let segments = ordered
        .iter()
        .zip(&speech.voice_segments)
        .map(|(sentence, voice_segment)| DialogueSegment {
            sentence_id: sentence.id.clone(),
            text: sentence.text.clone(),
            participant_role: sentence.role,
            start_time: voice_segment.start_time_seconds,
            end_time: voice_segment.end_time_seconds,
            words: word_timings_for_range(
                characters,
                voice_segment.character_start_index,
                voice_segment.character_end_index,
            ),
        })
        .collect();

    Ok(SynthesizedDialogue {
        audio,
        alignment: DialogueAlignment::from_segments(segments),
    })
}

/// Разметка без времён: по сегменту на реплику, в том же порядке
fn degraded_alignment(ordered: &[&DialogueSentence]) -> DialogueAlignment {
    let segments = ordered
        .iter()
        .map(|sentence| DialogueSegment {
            sentence_id: sentence.id.clone(),
            text: sentence.text.clone(),
            participant_role: sentence.role,
            start_time: 0.0,
            end_time: 0.0,
            words: Vec::new(),
        })
        .collect();

    DialogueAlignment {
        segments,
        total_duration: 0.0,
    }
}
