//! Configuration loading for the photobooth kiosk.
//!
//! One immutable [`BoothConfig`] value is built at startup and handed to
//! every component. Nothing reads configuration from globals afterwards.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/photobooth/config.toml` (system)
//! 2. `~/.config/photobooth/config.toml` (user)
//! 3. `./photobooth.toml` (local override, replaced by `--config` when given)
//! 4. Environment variables (`PHOTOBOOTH_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! frame_dir = "~/booth/frames"
//! archive_dir = "~/booth/printed"
//!
//! [session]
//! countdown_secs = 5
//! capture_max_retries = 2
//!
//! [camera]
//! capture_command = ["/usr/local/bin/take-picture"]
//! scan_command = ["gphoto2", "--auto-detect"]
//!
//! [printer]
//! name = "Canon_SELPHY_CP1500"
//! print_command = ["/usr/local/bin/print-picture"]
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{
    CameraConfig, Dimensions, MontageConfig, Offset, PathsConfig, PrinterConfig, SessionConfig,
    TelemetryConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete kiosk configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BoothConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub montage: MontageConfig,

    #[serde(default)]
    pub printer: PrinterConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BoothConfig {
    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, sources.files.last().map(PathBuf::as_path))?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.expand_paths();
        config.validate()?;

        Ok((config, sources))
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.countdown_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.countdown_secs must be at least 1".to_string(),
            ));
        }
        if self.camera.capture_command.is_empty() {
            return Err(ConfigError::Invalid(
                "camera.capture_command must name a program".to_string(),
            ));
        }
        if self.printer.print_command.is_empty() {
            return Err(ConfigError::Invalid(
                "printer.print_command must name a program".to_string(),
            ));
        }
        let preview = self.montage.preview_size;
        if preview.width == 0 || preview.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "montage.preview_size must be non-zero, got {}",
                preview
            )));
        }
        if self.montage.frame_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid(
                "montage.frame_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize the effective configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(format!("# Photobooth Configuration\n\n{}", body))
    }

    fn expand_paths(&mut self) {
        let paths = &mut self.paths;
        paths.frame_dir = expand_path(&paths.frame_dir.to_string_lossy());
        paths.capture_file = expand_path(&paths.capture_file.to_string_lossy());
        paths.montage_file = expand_path(&paths.montage_file.to_string_lossy());
        paths.archive_dir = expand_path(&paths.archive_dir.to_string_lossy());
        if let Some(dir) = paths.pictures_dir.take() {
            paths.pictures_dir = Some(expand_path(&dir.to_string_lossy()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_kiosk_constants() {
        let config = BoothConfig::default();
        assert_eq!(config.session.countdown_secs, 7);
        assert_eq!(config.session.inactivity_timeout_ms, 60_000);
        assert_eq!(config.session.error_timeout_ms, 15_000);
        assert_eq!(config.session.capture_max_retries, 3);
        assert_eq!(config.camera.picture_size, Dimensions::new(1504, 1000));
        assert_eq!(config.montage.framed_size, Dimensions::new(1748, 1181));
        assert_eq!(config.montage.picture_offset, Offset { x: 122, y: 91 });
        assert_eq!(config.printer.name, "Canon_SELPHY_CP1500");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_roundtrips() {
        let config = BoothConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[paths]"));
        assert!(rendered.contains("[session]"));
        assert!(rendered.contains("Canon_SELPHY_CP1500"));

        let parsed: BoothConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_zero_countdown() {
        let mut config = BoothConfig::default();
        config.session.countdown_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_print_command() {
        let mut config = BoothConfig::default();
        config.printer.print_command.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("booth.toml");
        std::fs::write(
            &path,
            r#"
[session]
countdown_secs = 3

[printer]
name = "Test Printer"
"#,
        )
        .unwrap();

        let (config, sources) = BoothConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.session.countdown_secs, 3);
        assert_eq!(config.printer.name, "Test Printer");
        assert!(sources.files.contains(&path));
    }
}
