//! Аргументы ffmpeg для каждого этапа сборки.
//!
//! Все клипы кодируются с одинаковыми параметрами (кодек, пиксельный
//! формат, частота кадров, раскладка аудио), поэтому финальная склейка
//! идёт без перекодирования.

use std::path::{Path, PathBuf};

use super::plan::CompositionPlan;
use super::renderer::RenderStage;
use crate::config::RenderConfig;

/// Фон вступления
#[derive(Debug, Clone, Copy)]
pub enum IntroBackground<'a> {
    /// Нормализованное изображение вступления
    Image(&'a Path),
    /// Титульная карточка; текст берётся из файла
    TitleCard { text_file: &'a Path },
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Экранирование пути для использования внутри фильтра
pub fn escape_filter_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(normalized.len() + 8);
    for ch in normalized.chars() {
        match ch {
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("\\'"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Масштабирование с заполнением кадра и обрезкой по центру
pub fn cover_crop(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
        w = width,
        h = height
    )
}

fn stereo(config: &RenderConfig) -> String {
    format!(
        "aformat=sample_rates={}:channel_layouts=stereo",
        config.audio_sample_rate
    )
}

/// Общие параметры кодирования клипа
pub fn encoding_args(config: &RenderConfig) -> Vec<String> {
    vec![
        "-c:v".into(),
        config.video_codec.clone(),
        "-preset".into(),
        config.preset.clone(),
        "-crf".into(),
        config.crf.to_string(),
        "-pix_fmt".into(),
        config.pixel_format.clone(),
        "-r".into(),
        config.fps.to_string(),
        "-c:a".into(),
        config.audio_codec.clone(),
        "-b:a".into(),
        config.audio_bitrate.clone(),
        "-ar".into(),
        config.audio_sample_rate.to_string(),
        "-ac".into(),
        "2".into(),
    ]
}

fn still_input(path: &Path, duration: f64, config: &RenderConfig) -> Vec<String> {
    vec![
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        config.fps.to_string(),
        "-t".into(),
        seconds(duration),
        "-i".into(),
        path_arg(path),
    ]
}

/// Этап 1: один кадр RGB PNG из произвольного изображения
pub fn normalize_still(name: &'static str, input: &Path, output: &Path) -> RenderStage {
    let args = vec![
        "-i".into(),
        path_arg(input),
        "-frames:v".into(),
        "1".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        path_arg(output),
    ];
    RenderStage::new(name, args, output)
}

/// Фильтр видео вступления
pub fn intro_video_filter(plan: &CompositionPlan, config: &RenderConfig, background: IntroBackground<'_>) -> String {
    let mut chain = cover_crop(plan.width, plan.height);

    if let IntroBackground::TitleCard { text_file } = background {
        chain.push_str(&format!(
            ",drawtext=textfile={}:fontcolor={}:fontsize=h/12:x=(w-text_w)/2:y=(h-text_h)/2",
            escape_filter_path(text_file),
            config.title_color
        ));
        if let Some(font) = &config.font_file {
            chain.push_str(&format!(":fontfile={}", escape_filter_path(font)));
        }
    }

    let fade = config.fade_duration.min(plan.intro_duration);
    let fade_start = (plan.intro_duration - config.fade_duration).max(0.0);
    format!(
        "[0:v]{},fade=t=out:st={}:d={},format={}[v];[1:a]volume=0,{}[a]",
        chain,
        seconds(fade_start),
        seconds(fade),
        config.pixel_format,
        stereo(config)
    )
}

/// Этап 4: вступление с зацикленной приглушённой речью
pub fn intro_clip(
    plan: &CompositionPlan,
    config: &RenderConfig,
    background: IntroBackground<'_>,
    speech: &Path,
    output: &Path,
) -> RenderStage {
    let mut args = match background {
        IntroBackground::Image(image) => still_input(image, plan.intro_duration, config),
        IntroBackground::TitleCard { .. } => vec![
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!(
                "color=c={}:s={}x{}:r={}:d={}",
                config.title_background,
                plan.width,
                plan.height,
                config.fps,
                seconds(plan.intro_duration)
            ),
        ],
    };
    args.extend([
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        path_arg(speech),
        "-filter_complex".into(),
        intro_video_filter(plan, config, background),
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-t".into(),
        seconds(plan.intro_duration),
    ]);
    args.extend(encoding_args(config));
    args.push(path_arg(output));
    RenderStage::new("intro", args, output)
}

/// Фильтр основного клипа
pub fn main_filter(plan: &CompositionPlan, config: &RenderConfig) -> String {
    let video = format!(
        "[0:v]{},fade=t=in:st=0:d={},format={}[v]",
        cover_crop(plan.width, plan.height),
        seconds(config.fade_duration.min(plan.main_duration)),
        config.pixel_format
    );

    let audio = if plan.has_music {
        format!(
            "[1:a]{stereo}[speech];[2:a]volume={volume},{stereo}[music];\
             [speech][music]amix=inputs=2:duration=first:dropout_transition=0:normalize=0,{stereo}[a]",
            stereo = stereo(config),
            volume = config.music_volume
        )
    } else {
        format!("[1:a]{}[a]", stereo(config))
    };

    format!("{};{}", video, audio)
}

/// Этап 5: основной клип на всю длительность речи
pub fn main_clip(
    plan: &CompositionPlan,
    config: &RenderConfig,
    image: &Path,
    speech: &Path,
    music: Option<&Path>,
    output: &Path,
) -> RenderStage {
    let mut args = still_input(image, plan.main_duration, config);
    args.extend(["-i".into(), path_arg(speech)]);
    if let Some(music) = music.filter(|_| plan.has_music) {
        args.extend([
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            path_arg(music),
        ]);
    }
    args.extend([
        "-filter_complex".into(),
        main_filter(plan, config),
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-t".into(),
        seconds(plan.main_duration),
    ]);
    args.extend(encoding_args(config));
    args.push(path_arg(output));
    RenderStage::new("main", args, output)
}

/// Этап 6: концовка в тех же параметрах кодирования.
///
/// Концовка без звука получает тишину, чтобы у всех клипов была
/// одинаковая раскладка потоков.
pub fn outro_clip(
    plan: &CompositionPlan,
    config: &RenderConfig,
    input: &Path,
    has_audio: bool,
    output: &Path,
) -> RenderStage {
    let mut args: Vec<String> = vec!["-i".into(), path_arg(input)];
    let audio_map = if has_audio {
        "0:a:0"
    } else {
        args.extend([
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!("anullsrc=channel_layout=stereo:sample_rate={}", config.audio_sample_rate),
        ]);
        "1:a:0"
    };
    args.extend([
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        audio_map.into(),
        "-vf".into(),
        format!(
            "{},fps={},format={}",
            cover_crop(plan.width, plan.height),
            config.fps,
            config.pixel_format
        ),
        "-af".into(),
        stereo(config),
    ]);
    if !has_audio {
        args.push("-shortest".into());
    }
    args.extend(encoding_args(config));
    args.push(path_arg(output));
    RenderStage::new("outro", args, output)
}

/// Список файлов для concat demuxer
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| format!("file '{}'\n", clip.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Этап 7: склейка без перекодирования
pub fn concat(list: &Path, output: &Path) -> RenderStage {
    let args = vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ];
    RenderStage::new("concat", args, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(has_music: bool, intro: f64) -> CompositionPlan {
        CompositionPlan {
            has_music,
            has_intro_image: false,
            has_outro: false,
            intro_duration: intro,
            recorded_duration: 10.0,
            main_duration: 10.0,
            min_main_duration: 0.1,
            width: 1280,
            height: 720,
            title: "At the cafe".to_string(),
        }
    }

    #[test]
    fn test_cover_crop() {
        assert_eq!(
            cover_crop(1080, 1920),
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setsar=1"
        );
    }

    #[test]
    fn test_intro_fades_out_and_mutes_speech() {
        let config = RenderConfig::default();
        let filter = intro_video_filter(&plan(false, 3.0), &config, IntroBackground::Image(Path::new("intro.png")));
        assert!(filter.contains("fade=t=out:st=2.500:d=0.500"));
        assert!(filter.contains("[1:a]volume=0,"));
        assert!(filter.contains("channel_layouts=stereo"));
        assert!(!filter.contains("drawtext"));
    }

    #[test]
    fn test_short_intro_fade_starts_at_zero() {
        let config = RenderConfig::default();
        let filter = intro_video_filter(&plan(false, 0.3), &config, IntroBackground::Image(Path::new("intro.png")));
        assert!(filter.contains("fade=t=out:st=0.000:d=0.300"));
    }

    #[test]
    fn test_title_card_uses_text_file() {
        let config = RenderConfig::default();
        let plan = plan(false, 3.0);
        let stage = intro_clip(
            &plan,
            &config,
            IntroBackground::TitleCard { text_file: Path::new("/tmp/w/title.txt") },
            Path::new("/tmp/w/speech.mp3"),
            Path::new("/tmp/w/intro.mp4"),
        );
        let filter = stage.arg_after("-filter_complex").unwrap();
        assert!(filter.contains("drawtext=textfile=/tmp/w/title.txt"));
        assert!(stage.args.iter().any(|a| a.starts_with("color=c=0x1f2937:s=1280x720")));
        assert_eq!(stage.arg_after("-stream_loop"), Some("-1"));
        assert_eq!(stage.arg_after("-t"), Some("3.000"));
    }

    #[test]
    fn test_main_filter_mixes_music_quietly() {
        let config = RenderConfig::default();
        let with_music = main_filter(&plan(true, 0.0), &config);
        assert!(with_music.contains("fade=t=in:st=0:d=0.500"));
        assert!(with_music.contains("[2:a]volume=0.05"));
        assert!(with_music.contains("amix=inputs=2:duration=first"));
        // речь остаётся на полной громкости
        assert!(with_music.contains(":normalize=0"));
        assert!(with_music.ends_with("channel_layouts=stereo[a]"));

        let speech_only = main_filter(&plan(false, 0.0), &config);
        assert!(!speech_only.contains("amix"));
        assert!(speech_only.ends_with("channel_layouts=stereo[a]"));
    }

    #[test]
    fn test_main_clip_skips_music_input_when_absent() {
        let config = RenderConfig::default();
        let stage = main_clip(
            &plan(false, 0.0),
            &config,
            Path::new("image.png"),
            Path::new("speech.mp3"),
            Some(Path::new("music.src")),
            Path::new("main.mp4"),
        );
        assert!(!stage.args.iter().any(|a| a == "music.src"));
        assert_eq!(stage.arg_after("-t"), Some("10.000"));
        assert_eq!(stage.arg_after("-pix_fmt"), Some("yuv420p"));
        assert_eq!(stage.arg_after("-c:v"), Some("libx264"));
    }

    #[test]
    fn test_outro_always_carries_stereo_audio() {
        let config = RenderConfig::default();
        let plan = plan(false, 0.0);

        let voiced = outro_clip(&plan, &config, Path::new("outro.src"), true, Path::new("outro.mp4"));
        let maps: Vec<&str> = voiced
            .args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| voiced.args[i + 1].as_str())
            .collect();
        assert_eq!(maps, vec!["0:v:0", "0:a:0"]);
        assert!(!voiced.args.iter().any(|a| a.starts_with("anullsrc")));
        assert!(!voiced.args.iter().any(|a| a == "-shortest"));

        let silent = outro_clip(&plan, &config, Path::new("outro.src"), false, Path::new("outro.mp4"));
        assert!(silent
            .args
            .iter()
            .any(|a| a == "anullsrc=channel_layout=stereo:sample_rate=44100"));
        assert!(silent.args.iter().any(|a| a == "1:a:0"));
        assert!(!silent.args.iter().any(|a| a.ends_with('?')));
        assert!(silent.args.iter().any(|a| a == "-shortest"));
        assert_eq!(silent.arg_after("-ac"), Some("2"));
        assert_eq!(silent.arg_after("-c:a"), Some("aac"));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("C:\\a b\\t'x.txt")), "C\\:/a b/t\\'x.txt");
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/w/intro.mp4"), PathBuf::from("/w/it's.mp4")]);
        assert_eq!(list, "file '/w/intro.mp4'\nfile '/w/it'\\''s.mp4'\n");
    }
}
