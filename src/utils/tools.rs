use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use regex::Regex;
use semver::Version;

use crate::error::{Result, StudioError};

/// Minimum supported ffmpeg/ffprobe version
pub const MIN_FFMPEG_VERSION: Version = Version::new(4, 4, 0);

// Structure to represent an external tool
#[derive(Debug, Clone)]
pub struct ExternalTool {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<Version>,
    pub min_version: Version,
}

impl ExternalTool {
    pub fn is_supported(&self) -> bool {
        self.version
            .as_ref()
            .map_or(true, |version| *version >= self.min_version)
    }
}

/// Find a command in PATH
pub fn check_command_in_path(command: &str) -> Result<PathBuf> {
    which::which(command)
        .map_err(|e| StudioError::Configuration(format!("{} not found in PATH: {}", command, e)))
}

/// Parse `ffmpeg -version` / `ffprobe -version` output.
///
/// Git builds (`ffmpeg version N-1234-g...`) carry no semantic version and
/// yield `None`.
pub fn parse_tool_version(output: &str) -> Option<Version> {
    let re = Regex::new(r"(?:ffmpeg|ffprobe) version n?(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
    let caps = re.captures(output)?;

    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(Version::new(part(1), part(2), part(3)))
}

/// Check tool version
fn check_tool_version(path: &Path) -> Result<Option<Version>> {
    let output = Command::new(path)
        .args(["-version"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(StudioError::Configuration(format!(
            "failed to execute {} -version",
            path.display()
        )));
    }

    let version = parse_tool_version(&String::from_utf8_lossy(&output.stdout));
    if version.is_none() {
        debug!("Could not parse version of {}, assuming a recent build", path.display());
    }
    Ok(version)
}

/// Locate ffmpeg or ffprobe: the configured path wins over PATH
pub fn locate_tool(name: &str, configured: Option<&Path>) -> Result<ExternalTool> {
    let path = match configured {
        Some(path) => path.to_path_buf(),
        None => check_command_in_path(name)?,
    };
    info!("Found {} at {}", name, path.display());

    let tool = ExternalTool {
        name: name.to_string(),
        version: check_tool_version(&path)?,
        path,
        min_version: MIN_FFMPEG_VERSION,
    };

    if !tool.is_supported() {
        return Err(StudioError::Configuration(format!(
            "{} {} is older than the required {}",
            tool.name,
            tool.version.as_ref().map(ToString::to_string).unwrap_or_default(),
            tool.min_version
        )));
    }

    if let Some(version) = &tool.version {
        info!("{} version: {}", name, version);
    }
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_versions() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers";
        assert_eq!(parse_tool_version(out), Some(Version::new(6, 1, 1)));

        let out = "ffprobe version n7.0 Copyright (c) 2007-2024";
        assert_eq!(parse_tool_version(out), Some(Version::new(7, 0, 0)));
    }

    #[test]
    fn test_parse_git_build_has_no_version() {
        let out = "ffmpeg version N-113000-g1234abcd Copyright (c) 2000-2024";
        assert_eq!(parse_tool_version(out), None);
    }

    #[test]
    fn test_unknown_version_is_supported() {
        let tool = ExternalTool {
            name: "ffmpeg".to_string(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
            version: None,
            min_version: MIN_FFMPEG_VERSION,
        };
        assert!(tool.is_supported());

        let old = ExternalTool {
            version: Some(Version::new(3, 4, 8)),
            ..tool
        };
        assert!(!old.is_supported());

        // amix normalize=0 появился в 4.4
        let without_normalize = ExternalTool {
            version: Some(Version::new(4, 3, 2)),
            ..old.clone()
        };
        assert!(!without_normalize.is_supported());
        let current = ExternalTool {
            version: Some(Version::new(4, 4, 0)),
            ..old
        };
        assert!(current.is_supported());
    }
}
