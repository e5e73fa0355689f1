//! Внешний рендерер (ffmpeg) как набор независимых этапов.
//!
//! Каждый этап получает готовый список аргументов и путь выходного файла;
//! ошибка этапа несёт имя этапа, командную строку и хвост stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command as TokioCommand;

use crate::config::RenderConfig;
use crate::error::{Result, StudioError};
use crate::utils::tools::locate_tool;

/// Сколько последних строк stderr сохранять в ошибке
const STDERR_TAIL_LINES: usize = 20;

/// Один вызов рендерера
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStage {
    /// Имя этапа для логов и ошибок
    pub name: &'static str,
    /// Аргументы без имени программы
    pub args: Vec<String>,
    /// Файл, который этап обязан создать
    pub output: PathBuf,
}

impl RenderStage {
    pub fn new(name: &'static str, args: Vec<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            name,
            args,
            output: output.into(),
        }
    }

    /// Командная строка для диагностики
    pub fn command_line(&self, program: &str) -> String {
        let mut line = String::from(program);
        for arg in &self.args {
            line.push(' ');
            if arg.contains(|c: char| c.is_whitespace() || c == ';' || c == '[') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Значение аргумента, следующего за `flag`
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Ошибка этапа рендера
#[derive(Debug, Clone, Error)]
#[error("render stage '{stage}' failed (exit code {exit_code:?}): {stderr}\ncommand: {command}")]
pub struct StageError {
    pub stage: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl StageError {
    pub fn new(stage: &RenderStage, command: String, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            stage: stage.name.to_string(),
            command,
            exit_code,
            stderr: stderr.into(),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Внешний рендерер медиа
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    /// Выполнить этап; успешный этап обязан создать `stage.output`
    async fn render(&self, stage: &RenderStage) -> std::result::Result<(), StageError>;

    /// Длительность медиафайла в секундах
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Есть ли в файле хотя бы одна аудиодорожка
    async fn has_audio_stream(&self, path: &Path) -> Result<bool>;
}

/// Рендерер на основе ffmpeg/ffprobe
pub struct FfmpegRenderer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Найти ffmpeg и ffprobe и проверить их версии
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        let ffmpeg = locate_tool("ffmpeg", config.ffmpeg_path.as_deref())?;
        let ffprobe = locate_tool("ffprobe", config.ffprobe_path.as_deref())?;
        Ok(Self::new(ffmpeg.path, ffprobe.path))
    }
}

#[async_trait]
impl MediaRenderer for FfmpegRenderer {
    async fn render(&self, stage: &RenderStage) -> std::result::Result<(), StageError> {
        let program = self.ffmpeg.to_string_lossy().to_string();
        let command = stage.command_line(&program);
        log::debug!("Running {} stage: {}", stage.name, command);

        let output = TokioCommand::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .args(&stage.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StageError::new(stage, command.clone(), None, format!("failed to spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let message = stderr_tail(&output.stderr);
            log::error!("{} stage failed with status {}: {}", stage.name, output.status, message);
            return Err(StageError::new(stage, command, output.status.code(), message));
        }

        if !tokio::fs::try_exists(&stage.output).await.unwrap_or(false) {
            return Err(StageError::new(
                stage,
                command,
                output.status.code(),
                format!("ffmpeg produced no output at {}", stage.output.display()),
            ));
        }

        log::info!("{} stage completed: {}", stage.name, stage.output.display());
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = TokioCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(StudioError::Other(format!(
                "ffprobe failed with status {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str.trim().parse::<f64>().map_err(|_| {
            StudioError::Other(format!("Failed to parse media duration: {}", duration_str.trim()))
        })
    }

    async fn has_audio_stream(&self, path: &Path) -> Result<bool> {
        let output = TokioCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=index",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(StudioError::Other(format!(
                "ffprobe failed with status {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_filtergraphs() {
        let stage = RenderStage::new(
            "main",
            vec![
                "-filter_complex".to_string(),
                "[0:v]scale=2:2[v];[1:a]anull[a]".to_string(),
                "out.mp4".to_string(),
            ],
            "out.mp4",
        );
        assert_eq!(
            stage.command_line("ffmpeg"),
            "ffmpeg -filter_complex \"[0:v]scale=2:2[v];[1:a]anull[a]\" out.mp4"
        );
        assert_eq!(stage.arg_after("-filter_complex"), Some("[0:v]scale=2:2[v];[1:a]anull[a]"));
        assert_eq!(stage.arg_after("-t"), None);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[test]
    fn test_stage_error_mentions_stage_and_command() {
        let stage = RenderStage::new("concat", vec!["-f".into(), "concat".into()], "final.mp4");
        let err = StageError::new(&stage, stage.command_line("ffmpeg"), Some(1), "Invalid data");
        let text = err.to_string();
        assert!(text.contains("'concat'"));
        assert!(text.contains("ffmpeg -f concat"));
        assert!(text.contains("Invalid data"));
    }
}
