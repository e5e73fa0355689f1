//! Сценарии работы с беседой: генерация аудио и сборка видео.
//!
//! Статус беседы меняется условным обновлением, поэтому две параллельные
//! генерации одной беседы невозможны: вторая получит `Conflict`.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::{Result, StudioError};
use crate::media::{ComposedVideo, CompositionRequest, VideoComposer};
use crate::models::{AlignmentMode, Conversation, ConversationStatus};
use crate::storage::{delete_quietly, keys, ObjectStorage};
use crate::store::{ConversationPatch, ConversationStore, UpdateCondition};
use crate::tts::{validate_preconditions, DialogueSynthesizer, SynthesisOutcome};

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    storage: Arc<dyn ObjectStorage>,
    synthesizer: Option<DialogueSynthesizer>,
    composer: Option<VideoComposer>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            store,
            storage,
            synthesizer: None,
            composer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: DialogueSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_composer(mut self, composer: VideoComposer) -> Self {
        self.composer = Some(composer);
        self
    }

    async fn load(&self, conversation_id: &str) -> Result<Conversation> {
        self.store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| StudioError::NotFound(format!("conversation {}", conversation_id)))
    }

    /// Сгенерировать аудио и разметку беседы.
    ///
    /// Нарушение предусловий не меняет статус. Любая ошибка после перехода
    /// в `Generating` переводит беседу в `Failed` с текстом ошибки, прежние
    /// артефакты при этом остаются на месте. Прерванная генерация тоже
    /// оставляет беседу в `Failed`.
    pub async fn generate_audio(&self, conversation_id: &str) -> Result<Conversation> {
        self.run_generation(
            conversation_id,
            UpdateCondition::StatusIsNot(ConversationStatus::Generating),
        )
        .await
    }

    /// Как `generate_audio`, но без проверки статуса `Generating`.
    ///
    /// Для бесед, оставшихся в `Generating` после падения процесса.
    pub async fn force_generate_audio(&self, conversation_id: &str) -> Result<Conversation> {
        warn!("Forcing audio generation for conversation {}", conversation_id);
        self.run_generation(conversation_id, UpdateCondition::Always).await
    }

    async fn run_generation(&self, conversation_id: &str, claim: UpdateCondition) -> Result<Conversation> {
        let synthesizer = self.synthesizer.as_ref().ok_or_else(|| {
            StudioError::Configuration("speech synthesis is not configured".to_string())
        })?;
        let conversation = self.load(conversation_id).await?;
        validate_preconditions(&conversation.sentences, &conversation.participants)?;

        let claimed = self
            .store
            .update_conversation(
                conversation_id,
                claim,
                ConversationPatch::status(ConversationStatus::Generating),
            )
            .await?;
        let Some(conversation) = claimed else {
            return Err(StudioError::Conflict(format!(
                "audio for conversation {} is already being generated",
                conversation_id
            )));
        };
        let guard = GenerationGuard::new(self.store.clone(), conversation_id);

        match self.produce_audio(synthesizer, &conversation).await {
            Ok(updated) => {
                guard.disarm();
                if let Some(previous) = conversation.audio_key.as_deref() {
                    if updated.audio_key.as_deref() != Some(previous) {
                        delete_quietly(self.storage.as_ref(), previous).await;
                    }
                }
                Ok(updated)
            }
            Err(e) => {
                error!("Audio generation for conversation {} failed: {}", conversation_id, e);
                if let Err(update_err) = self
                    .store
                    .update_conversation(conversation_id, UpdateCondition::Always, failed_patch(e.to_string()))
                    .await
                {
                    warn!("Failed to mark conversation {} as failed: {}", conversation_id, update_err);
                }
                guard.disarm();
                Err(e)
            }
        }
    }

    async fn produce_audio(
        &self,
        synthesizer: &DialogueSynthesizer,
        conversation: &Conversation,
    ) -> Result<Conversation> {
        let outcome = synthesizer
            .synthesize(&conversation.sentences, &conversation.participants)
            .await?;

        if let SynthesisOutcome::Degraded { reason, .. } = &outcome {
            warn!(
                "Conversation {} synthesized without word timing: {}",
                conversation.id, reason
            );
        }
        let mode = outcome.mode();
        let dialogue = outcome.into_dialogue();

        // после деградации длительность неизвестна, её измерит сборка видео
        let audio_duration = match mode {
            AlignmentMode::Timestamped => Some(dialogue.alignment.total_duration),
            AlignmentMode::Degraded => None,
        };

        let audio_key = keys::audio(&conversation.id);
        let size = dialogue.audio.len();
        self.storage
            .upload(&audio_key, dialogue.audio, "audio/mpeg")
            .await?;

        let patch = ConversationPatch {
            status: Some(ConversationStatus::Completed),
            error: Some(None),
            audio_key: Some(Some(audio_key.clone())),
            audio_duration: Some(audio_duration),
            alignment: Some(Some(dialogue.alignment)),
            alignment_mode: Some(Some(mode)),
            ..ConversationPatch::default()
        };

        let updated = self
            .store
            .update_conversation(&conversation.id, UpdateCondition::Always, patch)
            .await;
        match updated {
            Ok(Some(updated)) => {
                info!(
                    "Audio for conversation {} stored as {} ({} bytes, {:?})",
                    conversation.id, audio_key, size, mode
                );
                Ok(updated)
            }
            Ok(None) => {
                delete_quietly(self.storage.as_ref(), &audio_key).await;
                Err(StudioError::NotFound(format!("conversation {}", conversation.id)))
            }
            Err(e) => {
                delete_quietly(self.storage.as_ref(), &audio_key).await;
                Err(e)
            }
        }
    }

    /// Собрать видео; прежние видео и субтитры удаляются после успеха
    pub async fn compose_video(&self, request: CompositionRequest) -> Result<ComposedVideo> {
        let composer = self.composer.as_ref().ok_or_else(|| {
            StudioError::Configuration("video composition is not configured".to_string())
        })?;

        let previous = self.load(&request.conversation_id).await?;
        let composed = composer.compose_video(request).await?;

        for key in [previous.video_key, previous.subtitle_key].into_iter().flatten() {
            if key != composed.video_key && key != composed.subtitle_key {
                delete_quietly(self.storage.as_ref(), &key).await;
            }
        }
        Ok(composed)
    }

    /// Подписанная ссылка на аудио беседы
    pub async fn audio_url(&self, conversation_id: &str, ttl: Duration) -> Result<reqwest::Url> {
        let conversation = self.load(conversation_id).await?;
        let key = conversation.audio_key.ok_or_else(|| {
            StudioError::NotFound(format!("audio for conversation {}", conversation_id))
        })?;
        let download_name = format!("{}.mp3", conversation.name);
        self.storage
            .signed_get_url(&key, ttl, Some(&download_name))
            .await
    }
}

fn failed_patch(message: String) -> ConversationPatch {
    ConversationPatch {
        status: Some(ConversationStatus::Failed),
        error: Some(Some(message)),
        ..ConversationPatch::default()
    }
}

/// Захваченная генерация: если future сброшен до завершения, беседа
/// переводится из `Generating` в `Failed` фоновой задачей.
struct GenerationGuard {
    store: Arc<dyn ConversationStore>,
    conversation_id: String,
    armed: bool,
}

impl GenerationGuard {
    fn new(store: Arc<dyn ConversationStore>, conversation_id: &str) -> Self {
        Self {
            store,
            conversation_id: conversation_id.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Audio generation for conversation {} was interrupted", self.conversation_id);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No runtime to release conversation {}, it stays in Generating",
                self.conversation_id
            );
            return;
        };
        let store = self.store.clone();
        let conversation_id = std::mem::take(&mut self.conversation_id);
        runtime.spawn(async move {
            let released = store
                .update_conversation(
                    &conversation_id,
                    UpdateCondition::StatusIs(ConversationStatus::Generating),
                    failed_patch("generation interrupted".to_string()),
                )
                .await;
            if let Err(e) = released {
                warn!("Failed to release conversation {}: {}", conversation_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    mod test_service;
}
