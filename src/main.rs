use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::info;

use dialogue_studio::config::StudioConfig;
use dialogue_studio::export::ExportJob;
use dialogue_studio::media::{CompositionRequest, FfmpegRenderer, VideoComposer};
use dialogue_studio::service::ConversationService;
use dialogue_studio::storage::LocalObjectStorage;
use dialogue_studio::store::JsonFileStore;
use dialogue_studio::tts::{DialogueSynthesizer, ElevenLabsClient};
use dialogue_studio::utils::logger::init_logger;
use dialogue_studio::utils::tools::locate_tool;

/// Dialogue audio, video and offline content for language lessons
#[derive(Parser, Debug)]
#[command(name = "dialogue-studio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short = 'c', env = "DIALOGUE_STUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate dialogue audio and word timing for a conversation
    Synthesize {
        conversation_id: String,
        /// Regenerate even if the conversation is stuck in `generating`
        #[arg(long)]
        force: bool,
    },
    /// Render the conversation video and subtitle file
    Compose {
        conversation_id: String,
        /// Background image of the main clip
        #[arg(long)]
        image: PathBuf,
        /// Background music, mixed quietly under the speech
        #[arg(long)]
        music: Option<PathBuf>,
        /// Intro background; a title card is drawn when omitted
        #[arg(long)]
        intro_image: Option<PathBuf>,
        /// Video appended after the main clip
        #[arg(long)]
        outro: Option<PathBuf>,
        /// Intro length in seconds, 0 disables the intro
        #[arg(long)]
        intro_duration: Option<f64>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Export courses into content.json, vocabulary.db and grammar.db
    Export {
        /// Output directory
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Check configuration and external tools
    Check,
}

async fn read_optional(path: Option<&Path>) -> Result<Option<Bytes>> {
    match path {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(Bytes::from(bytes)))
        }
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = StudioConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let data_dir = config.data_dir();
    let ttl = Duration::from_secs(config.storage.signed_url_ttl_secs);

    let store = Arc::new(JsonFileStore::new(&data_dir));
    let storage = Arc::new(LocalObjectStorage::new(config.storage_root()));

    match cli.command {
        Command::Synthesize { conversation_id, force } => {
            let backend = Arc::new(ElevenLabsClient::new(&config.synthesis)?);
            let service = ConversationService::new(store, storage)
                .with_synthesizer(DialogueSynthesizer::new(backend));

            let conversation = if force {
                service.force_generate_audio(&conversation_id).await?
            } else {
                service.generate_audio(&conversation_id).await?
            };
            let url = service.audio_url(&conversation_id, ttl).await?;
            println!(
                "{}: {:?}, {:.2}s, audio {}",
                conversation.id,
                conversation.alignment_mode,
                conversation.recorded_duration(),
                url
            );
        }
        Command::Compose {
            conversation_id,
            image,
            music,
            intro_image,
            outro,
            intro_duration,
            width,
            height,
        } => {
            let renderer = Arc::new(FfmpegRenderer::from_config(&config.render)?);
            let composer = VideoComposer::new(
                store.clone(),
                storage.clone(),
                renderer,
                config.render.clone(),
                ttl,
            );

            let image = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let mut request = CompositionRequest::new(conversation_id, Bytes::from(image), &config.render);
            request.music = read_optional(music.as_deref()).await?;
            request.intro_image = read_optional(intro_image.as_deref()).await?;
            request.outro_video = read_optional(outro.as_deref()).await?;
            if let Some(duration) = intro_duration {
                request.intro_duration = duration;
            }
            if let Some(width) = width {
                request.width = width;
            }
            if let Some(height) = height {
                request.height = height;
            }

            let service = ConversationService::new(store, storage).with_composer(composer);

            let composed = service.compose_video(request).await?;
            println!("video: {}", composed.video_key);
            println!("subtitles: {}", composed.subtitle_key);
        }
        Command::Export { output } => {
            let summary = ExportJob::new(store).run(&output).await?;
            println!(
                "{} courses, {} lessons, {} words, {} grammar points, {} conversations",
                summary.courses, summary.lessons, summary.vocabulary, summary.grammar, summary.conversations
            );
            println!("{}", summary.content_path.display());
            println!("{}", summary.vocabulary_db.display());
            println!("{}", summary.grammar_db.display());
        }
        Command::Check => {
            info!("Data directory: {}", data_dir.display());
            println!("data dir: {}", data_dir.display());
            println!("object storage: {}", config.storage_root().display());
            println!(
                "speech synthesis: {}",
                if config.synthesis.api_key.trim().is_empty() { "API key missing" } else { "configured" }
            );

            let ffmpeg = locate_tool("ffmpeg", config.render.ffmpeg_path.as_deref())?;
            let ffprobe = locate_tool("ffprobe", config.render.ffprobe_path.as_deref())?;
            for tool in [ffmpeg, ffprobe] {
                let version = tool
                    .version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{}: {} ({})", tool.name, tool.path.display(), version);
            }
        }
    }

    Ok(())
}
