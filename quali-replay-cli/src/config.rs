//! Configuration loading and parsing

use anyhow::{Context, Result};
use quali_replay::{ReplayConfig, SessionQuery};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Which session to replay
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_session_name")]
    pub session_name: String,
    #[serde(default = "default_year")]
    pub year: i32,
}

fn default_country() -> String {
    "Bahrain".to_string()
}

fn default_session_name() -> String {
    "Qualifying".to_string()
}

fn default_year() -> i32 {
    2024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            country: default_country(),
            session_name: default_session_name(),
            year: default_year(),
        }
    }
}

impl SessionConfig {
    pub fn query(&self) -> SessionQuery {
        SessionQuery {
            country: self.country.clone(),
            session_name: self.session_name.clone(),
            year: self.year,
        }
    }
}

/// Location of the archived OpenF1 documents
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
        }
    }
}

/// Terminal playback loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Wall-clock milliseconds between ticks
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
    /// Print the leaderboard every N frames (0 disables live output)
    #[serde(default = "default_print_every")]
    pub print_every: u32,
    /// Rows shown in the live leaderboard (0 shows every driver)
    #[serde(default)]
    pub rows: usize,
}

fn default_frame_ms() -> u64 {
    50
}

fn default_print_every() -> u32 {
    20
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            print_every: default_print_every(),
            rows: 0,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if !(config.replay.speed.is_finite() && config.replay.speed > 0.0) {
        anyhow::bail!("Invalid playback speed in {:?}: {}", path, config.replay.speed);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [session]
            country = "Saudi Arabia"
            year = 2023

            [archive]
            dir = "/data/openf1"

            [playback]
            frame_ms = 100

            [replay]
            speed = 10.0
            batch_size = 4
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.session.country, "Saudi Arabia");
        assert_eq!(config.session.session_name, "Qualifying");
        assert_eq!(config.session.year, 2023);
        assert_eq!(config.archive.dir, PathBuf::from("/data/openf1"));
        assert_eq!(config.playback.frame_ms, 100);
        assert_eq!(config.playback.print_every, 20);
        assert_eq!(config.replay.speed, 10.0);
        assert_eq!(config.replay.batch_size, 4);
        assert_eq!(config.replay.step_ms, 80);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.session.query().year, 2024);
        assert_eq!(config.archive.dir, PathBuf::from("archive"));
        assert_eq!(config.replay, ReplayConfig::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\ncountry = \"Italy\"\n\n[replay]\nspeed = 2.5").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.session.country, "Italy");
        assert_eq!(config.replay.speed, 2.5);
    }

    #[test]
    fn test_load_config_rejects_bad_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[replay]\nspeed = -1.0").unwrap();
        assert!(load_config(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session\ncountry = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        assert!(load_config(Path::new("/nonexistent/config.toml")).is_err());
    }
}
