//! Сборка видео беседы: вступление, основной клип, концовка и файл
//! субтитров со сдвигом на длительность вступления.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};

use super::plan::{CompositionPlan, CompositionRequest};
use super::renderer::MediaRenderer;
use super::stages::{self, IntroBackground};
use super::workspace::CompositionWorkspace;
use crate::config::RenderConfig;
use crate::error::{Result, StudioError};
use crate::models::{Conversation, DialogueAlignment};
use crate::storage::{delete_quietly, fetch_object, keys, ObjectStorage};
use crate::store::{ConversationPatch, ConversationStore, UpdateCondition};

/// Ключи загруженных артефактов
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedVideo {
    pub video_key: String,
    pub subtitle_key: String,
}

/// Результат этапов рендера
struct RenderedVideo {
    video: Bytes,
    plan: CompositionPlan,
}

pub struct VideoComposer {
    store: Arc<dyn ConversationStore>,
    storage: Arc<dyn ObjectStorage>,
    renderer: Arc<dyn MediaRenderer>,
    config: RenderConfig,
    signed_url_ttl: Duration,
}

impl VideoComposer {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        storage: Arc<dyn ObjectStorage>,
        renderer: Arc<dyn MediaRenderer>,
        config: RenderConfig,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            renderer,
            config,
            signed_url_ttl,
        }
    }

    /// Собрать видео и субтитры и записать их ключи в беседу.
    ///
    /// При ошибке любого этапа беседа не изменяется, а рабочий каталог
    /// удаляется.
    pub async fn compose_video(&self, request: CompositionRequest) -> Result<ComposedVideo> {
        let conversation = self
            .store
            .find_conversation(&request.conversation_id)
            .await?
            .ok_or_else(|| {
                StudioError::NotFound(format!("conversation {}", request.conversation_id))
            })?;

        let plan = CompositionPlan::new(&request, &conversation, &self.config)?;
        let alignment = conversation
            .alignment
            .clone()
            .ok_or_else(|| StudioError::Precondition("conversation has no alignment".to_string()))?;

        info!(
            "Composing video for conversation {} ({}x{}, intro {:.2}s, music: {}, outro: {})",
            conversation.id, plan.width, plan.height, plan.intro_duration, plan.has_music, plan.has_outro
        );

        let workspace = CompositionWorkspace::new(self.config.work_dir.as_deref())?;
        let rendered = self.render(&request, &conversation, plan, &workspace).await;
        if let Err(e) = workspace.close() {
            warn!("Failed to remove composition workspace: {}", e);
        }
        let rendered = rendered?;

        let subtitles = subtitle_document(&alignment, rendered.plan.intro_duration)?;
        let composed = self.upload(&conversation.id, rendered.video, subtitles).await?;

        let patch = ConversationPatch {
            video_key: Some(Some(composed.video_key.clone())),
            subtitle_key: Some(Some(composed.subtitle_key.clone())),
            ..ConversationPatch::default()
        };
        let updated = self
            .store
            .update_conversation(&conversation.id, UpdateCondition::Always, patch)
            .await;

        match updated {
            Ok(Some(_)) => {
                info!("Video for conversation {} stored as {}", conversation.id, composed.video_key);
                Ok(composed)
            }
            Ok(None) => {
                self.discard(&composed).await;
                Err(StudioError::NotFound(format!("conversation {}", conversation.id)))
            }
            Err(e) => {
                self.discard(&composed).await;
                Err(e)
            }
        }
    }

    /// Этапы 1-7 внутри рабочего каталога
    async fn render(
        &self,
        request: &CompositionRequest,
        conversation: &Conversation,
        plan: CompositionPlan,
        workspace: &CompositionWorkspace,
    ) -> Result<RenderedVideo> {
        let renderer = self.renderer.as_ref();

        // 1. Фоновые изображения
        let image_src = workspace.write("image.src", &request.image).await?;
        let image = workspace.file("image.png");
        renderer
            .render(&stages::normalize_still("normalize-image", &image_src, &image))
            .await?;

        let intro_image = match request.intro_image.as_ref().filter(|_| plan.has_intro_image) {
            Some(bytes) => {
                let src = workspace.write("intro.src", bytes).await?;
                let png = workspace.file("intro.png");
                renderer
                    .render(&stages::normalize_still("normalize-intro-image", &src, &png))
                    .await?;
                Some(png)
            }
            None => None,
        };

        // 2. Речь
        let audio_key = conversation.audio_key.as_deref().ok_or_else(|| {
            StudioError::Precondition("conversation has no generated audio".to_string())
        })?;
        let audio = fetch_object(self.storage.as_ref(), audio_key, self.signed_url_ttl).await?;
        let speech = workspace.write("speech.mp3", &audio).await?;

        let plan = if plan.needs_duration_probe() {
            let duration = renderer.probe_duration(&speech).await?;
            info!("Recorded duration unknown, probed speech file: {:.3}s", duration);
            plan.with_recorded_duration(duration)
        } else {
            plan
        };

        // 3. Музыка и концовка
        let music = match request.music.as_ref().filter(|_| plan.has_music) {
            Some(bytes) => Some(workspace.write("music.src", bytes).await?),
            None => None,
        };
        let outro_src = match request.outro_video.as_ref().filter(|_| plan.has_outro) {
            Some(bytes) => Some(workspace.write("outro.src", bytes).await?),
            None => None,
        };

        let mut clips = Vec::with_capacity(3);

        // 4. Вступление
        if plan.has_intro() {
            let title_file;
            let background = match &intro_image {
                Some(png) => IntroBackground::Image(png),
                None => {
                    title_file = workspace.write("title.txt", plan.title.as_bytes()).await?;
                    IntroBackground::TitleCard { text_file: &title_file }
                }
            };
            let output = workspace.file("intro.mp4");
            renderer
                .render(&stages::intro_clip(&plan, &self.config, background, &speech, &output))
                .await?;
            clips.push(output);
        } else {
            debug!("Intro disabled for conversation {}", conversation.id);
        }

        // 5. Основной клип
        let main = workspace.file("main.mp4");
        renderer
            .render(&stages::main_clip(&plan, &self.config, &image, &speech, music.as_deref(), &main))
            .await?;
        clips.push(main);

        // 6. Концовка
        if let Some(src) = &outro_src {
            let has_audio = renderer.has_audio_stream(src).await?;
            if !has_audio {
                debug!("Outro has no audio stream, padding with silence");
            }
            let output = workspace.file("outro.mp4");
            renderer
                .render(&stages::outro_clip(&plan, &self.config, src, has_audio, &output))
                .await?;
            clips.push(output);
        }

        // 7. Склейка
        let list = workspace.write("concat.txt", stages::concat_list(&clips)).await?;
        let output = workspace.file("final.mp4");
        renderer.render(&stages::concat(&list, &output)).await?;

        let video = Bytes::from(tokio::fs::read(&output).await?);
        debug!("Final video: {} bytes", video.len());
        Ok(RenderedVideo { video, plan })
    }

    /// Этапы 8-9; видео удаляется, если субтитры загрузить не удалось
    async fn upload(&self, conversation_id: &str, video: Bytes, subtitles: Bytes) -> Result<ComposedVideo> {
        let video_key = keys::video(conversation_id);
        self.storage.upload(&video_key, video, "video/mp4").await?;

        let subtitle_key = keys::subtitles(conversation_id);
        if let Err(e) = self
            .storage
            .upload(&subtitle_key, subtitles, "application/json")
            .await
        {
            warn!("Subtitle upload failed, removing video {}: {}", video_key, e);
            delete_quietly(self.storage.as_ref(), &video_key).await;
            return Err(e);
        }

        Ok(ComposedVideo {
            video_key,
            subtitle_key,
        })
    }

    async fn discard(&self, composed: &ComposedVideo) {
        delete_quietly(self.storage.as_ref(), &composed.video_key).await;
        delete_quietly(self.storage.as_ref(), &composed.subtitle_key).await;
    }
}

/// JSON субтитров: сегменты, сдвинутые на длительность вступления
pub fn subtitle_document(alignment: &DialogueAlignment, intro_duration: f64) -> Result<Bytes> {
    let shifted = alignment.shifted(intro_duration);
    Ok(Bytes::from(serde_json::to_vec(&shifted.segments)?))
}
