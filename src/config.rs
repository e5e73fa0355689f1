//! Модуль конфигурации
//!
//! Конфигурация читается из TOML-файла, затем поверх применяются
//! переменные окружения. Все поля имеют значения по умолчанию, поэтому
//! пустой файл (или его отсутствие) даёт рабочую конфигурацию.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// Переменная окружения с ключом API синтеза речи
pub const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";
/// Переменная окружения с каталогом данных
pub const DATA_DIR_ENV: &str = "DIALOGUE_STUDIO_DATA_DIR";

/// Настройки сервиса синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// API ключ
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Базовый URL API
    pub base_url: String,
    /// Модель синтеза диалогов
    pub model_id: String,
    /// Формат выходного аудио
    pub output_format: String,
    /// Таймаут одного запроса в секундах
    pub request_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_v3".to_string(),
            output_format: "mp3_44100_128".to_string(),
            request_timeout_secs: 180,
        }
    }
}

/// Параметры рендера видео.
///
/// Кодек, пресет и прочие параметры одинаковы для вступления, основного
/// клипа и концовки, иначе склейка без перекодирования невозможна.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Путь к ffmpeg (по умолчанию ищется в PATH)
    pub ffmpeg_path: Option<PathBuf>,
    /// Путь к ffprobe (по умолчанию ищется в PATH)
    pub ffprobe_path: Option<PathBuf>,
    /// Родительский каталог для временных рабочих каталогов
    pub work_dir: Option<PathBuf>,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub pixel_format: String,
    pub fps: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    /// Громкость фоновой музыки относительно речи
    pub music_volume: f32,
    /// Длительность fade-in/fade-out в секундах
    pub fade_duration: f64,
    /// Минимальная длительность основного клипа в секундах
    pub min_main_duration: f64,
    /// Цвет фона титульной карточки
    pub title_background: String,
    /// Цвет текста титульной карточки
    pub title_color: String,
    /// Шрифт для drawtext (иначе используется fontconfig)
    pub font_file: Option<PathBuf>,
    pub default_intro_duration: f64,
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            work_dir: None,
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
            fps: 30,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            audio_sample_rate: 44100,
            music_volume: 0.05,
            fade_duration: 0.5,
            min_main_duration: 0.1,
            title_background: "0x1f2937".to_string(),
            title_color: "white".to_string(),
            font_file: None,
            default_intro_duration: 3.0,
            default_width: 1280,
            default_height: 720,
        }
    }
}

/// Настройки объектного хранилища
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Корень локального хранилища (по умолчанию `<data_dir>/objects`)
    pub root: Option<PathBuf>,
    /// Время жизни подписанной ссылки в секундах
    pub signed_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            signed_url_ttl_secs: 300,
        }
    }
}

/// Конфигурация приложения
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub synthesis: SynthesisConfig,
    pub render: RenderConfig,
    pub storage: StorageConfig,
    /// Каталог с документами (беседы, курсы, уроки)
    pub data_dir: Option<PathBuf>,
}

impl StudioConfig {
    /// Путь к файлу конфигурации по умолчанию
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dialogue-studio").join("config.toml"))
    }

    /// Загрузить конфигурацию из файла (если он есть) и окружения
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                log::debug!("Loading configuration from {}", path.display());
                let raw = std::fs::read_to_string(&path)?;
                Self::from_toml(&raw)?
            }
            Some(path) => {
                log::debug!("No configuration file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Разобрать конфигурацию из строки TOML
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| StudioError::Configuration(format!("invalid config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.synthesis.api_key = key;
            }
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
    }

    /// Проверка значений, которые нельзя исправить по умолчанию
    pub fn validate(&self) -> Result<()> {
        let render = &self.render;
        if !(0.0..=1.0).contains(&render.music_volume) {
            return Err(StudioError::Configuration(format!(
                "render.music_volume must be within 0.0..=1.0, got {}",
                render.music_volume
            )));
        }
        if render.fade_duration < 0.0 || render.min_main_duration <= 0.0 {
            return Err(StudioError::Configuration(
                "render.fade_duration must be >= 0 and render.min_main_duration > 0".to_string(),
            ));
        }
        if render.fps == 0 || render.audio_sample_rate == 0 {
            return Err(StudioError::Configuration(
                "render.fps and render.audio_sample_rate must be positive".to_string(),
            ));
        }
        if self.storage.signed_url_ttl_secs == 0 {
            return Err(StudioError::Configuration(
                "storage.signed_url_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Каталог данных: из конфигурации или `~/.local/share/dialogue-studio`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dialogue-studio")
        })
    }

    /// Корень локального объектного хранилища
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir().join("objects"))
    }
}
