//! Запрос на сборку видео и вычисленный по нему план

use bytes::Bytes;

use crate::config::RenderConfig;
use crate::error::{Result, StudioError};
use crate::models::Conversation;

/// Самое короткое ненулевое вступление, представимое в аргументах ffmpeg
pub const MIN_INTRO_DURATION: f64 = 0.001;

/// Запрос на сборку видео беседы.
///
/// Изображения и музыка передаются байтами; форматы не проверяются,
/// их разбирает рендерер.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub conversation_id: String,
    /// Фон основного клипа
    pub image: Bytes,
    pub music: Option<Bytes>,
    /// Фон вступления; без него рисуется титульная карточка
    pub intro_image: Option<Bytes>,
    pub outro_video: Option<Bytes>,
    /// Длительность вступления в секундах, 0 отключает вступление
    pub intro_duration: f64,
    pub width: u32,
    pub height: u32,
}

impl CompositionRequest {
    /// Запрос с размерами и вступлением из конфигурации
    pub fn new(conversation_id: impl Into<String>, image: Bytes, config: &RenderConfig) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            image,
            music: None,
            intro_image: None,
            outro_video: None,
            intro_duration: config.default_intro_duration,
            width: config.default_width,
            height: config.default_height,
        }
    }
}

/// План сборки, вычисляется один раз до запуска этапов
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    pub has_music: bool,
    pub has_intro_image: bool,
    pub has_outro: bool,
    pub intro_duration: f64,
    /// Длительность речи по данным беседы (0 после деградации)
    pub recorded_duration: f64,
    pub main_duration: f64,
    pub min_main_duration: f64,
    pub width: u32,
    pub height: u32,
    /// Текст титульной карточки
    pub title: String,
}

impl CompositionPlan {
    /// Проверить предусловия и построить план
    pub fn new(request: &CompositionRequest, conversation: &Conversation, config: &RenderConfig) -> Result<Self> {
        validate_dimensions(request.width, request.height)?;

        if !request.intro_duration.is_finite() || request.intro_duration < 0.0 {
            return Err(StudioError::Precondition(format!(
                "intro duration must be >= 0, got {}",
                request.intro_duration
            )));
        }
        if request.intro_duration > 0.0 && request.intro_duration < MIN_INTRO_DURATION {
            return Err(StudioError::Precondition(format!(
                "intro duration must be 0 or at least {}s, got {}",
                MIN_INTRO_DURATION, request.intro_duration
            )));
        }
        if request.image.is_empty() {
            return Err(StudioError::Precondition("background image is empty".to_string()));
        }
        if conversation.audio_key.is_none() {
            return Err(StudioError::Precondition(format!(
                "conversation {} has no generated audio",
                conversation.id
            )));
        }
        if conversation.alignment.is_none() {
            return Err(StudioError::Precondition(format!(
                "conversation {} has no alignment",
                conversation.id
            )));
        }

        let recorded_duration = conversation.recorded_duration();
        Ok(Self {
            has_music: request.music.as_ref().is_some_and(|m| !m.is_empty()),
            has_intro_image: request.intro_image.as_ref().is_some_and(|i| !i.is_empty()),
            has_outro: request.outro_video.as_ref().is_some_and(|o| !o.is_empty()),
            intro_duration: request.intro_duration,
            recorded_duration,
            main_duration: recorded_duration.max(config.min_main_duration),
            min_main_duration: config.min_main_duration,
            width: request.width,
            height: request.height,
            title: conversation.name.clone(),
        })
    }

    pub fn has_intro(&self) -> bool {
        self.intro_duration > 0.0
    }

    /// Длительность неизвестна и должна быть измерена по файлу речи
    pub fn needs_duration_probe(&self) -> bool {
        self.recorded_duration <= 0.0
    }

    /// План с измеренной длительностью речи
    pub fn with_recorded_duration(&self, duration: f64) -> Self {
        let recorded_duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            recorded_duration,
            main_duration: recorded_duration.max(self.min_main_duration),
            ..self.clone()
        }
    }
}

/// yuv420p требует чётных ненулевых размеров
fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(StudioError::Precondition(format!(
            "video dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(StudioError::Precondition(format!(
            "video dimensions must be even, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DialogueAlignment;

    fn conversation(duration: f64) -> Conversation {
        let mut conversation = Conversation::new("c1", "At the cafe");
        conversation.audio_key = Some("conversations/audio/c1/a.mp3".to_string());
        conversation.alignment = Some(DialogueAlignment {
            segments: Vec::new(),
            total_duration: duration,
        });
        conversation
    }

    fn request() -> CompositionRequest {
        CompositionRequest::new("c1", Bytes::from_static(b"png"), &RenderConfig::default())
    }

    #[test]
    fn test_plan_flags_and_durations() {
        let mut request = request();
        request.music = Some(Bytes::from_static(b"mp3"));
        request.intro_duration = 2.0;

        let plan = CompositionPlan::new(&request, &conversation(12.5), &RenderConfig::default()).unwrap();
        assert!(plan.has_music);
        assert!(!plan.has_intro_image);
        assert!(!plan.has_outro);
        assert!(plan.has_intro());
        assert_eq!(plan.main_duration, 12.5);
        assert_eq!(plan.title, "At the cafe");
        assert!(!plan.needs_duration_probe());
    }

    #[test]
    fn test_main_duration_floor() {
        let plan = CompositionPlan::new(&request(), &conversation(0.0), &RenderConfig::default()).unwrap();
        assert_eq!(plan.main_duration, 0.1);
        assert!(plan.needs_duration_probe());

        let probed = plan.with_recorded_duration(9.75);
        assert_eq!(probed.main_duration, 9.75);
        assert_eq!(plan.main_duration, 0.1);

        assert_eq!(plan.with_recorded_duration(f64::NAN).main_duration, 0.1);
    }

    #[test]
    fn test_zero_intro_disables_intro() {
        let mut request = request();
        request.intro_duration = 0.0;
        let plan = CompositionPlan::new(&request, &conversation(3.0), &RenderConfig::default()).unwrap();
        assert!(!plan.has_intro());
    }

    #[test]
    fn test_preconditions() {
        let config = RenderConfig::default();

        let mut odd = request();
        odd.width = 1281;
        assert!(matches!(
            CompositionPlan::new(&odd, &conversation(1.0), &config),
            Err(StudioError::Precondition(_))
        ));

        let mut negative = request();
        negative.intro_duration = -1.0;
        assert!(CompositionPlan::new(&negative, &conversation(1.0), &config).is_err());

        let mut tiny = request();
        tiny.intro_duration = 0.0004;
        assert!(matches!(
            CompositionPlan::new(&tiny, &conversation(1.0), &config),
            Err(StudioError::Precondition(_))
        ));
        tiny.intro_duration = MIN_INTRO_DURATION;
        assert!(CompositionPlan::new(&tiny, &conversation(1.0), &config).unwrap().has_intro());

        let mut no_audio = conversation(1.0);
        no_audio.audio_key = None;
        assert!(CompositionPlan::new(&request(), &no_audio, &config).is_err());

        let mut no_alignment = conversation(1.0);
        no_alignment.alignment = None;
        assert!(CompositionPlan::new(&request(), &no_alignment, &config).is_err());
    }
}
