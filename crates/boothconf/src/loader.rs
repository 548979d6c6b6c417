//! Config file discovery, table merging, and environment variable overlay.

use crate::{BoothConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/photobooth/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("photobooth/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("photobooth.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read and parse one config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse::<toml::Table>()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key,
/// everything else (including arrays) is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

/// Turn a merged table into a typed config; missing fields take defaults.
pub fn from_table(table: toml::Table, origin: Option<&Path>) -> Result<BoothConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("<merged>")),
            message: e.to_string(),
        })
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut BoothConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit list of variables.
pub fn apply_overrides_from<I>(config: &mut BoothConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let applied = match key.as_str() {
            "PHOTOBOOTH_FRAME_DIR" => {
                config.paths.frame_dir = PathBuf::from(&value);
                true
            }
            "PHOTOBOOTH_CAPTURE_FILE" => {
                config.paths.capture_file = PathBuf::from(&value);
                true
            }
            "PHOTOBOOTH_MONTAGE_FILE" => {
                config.paths.montage_file = PathBuf::from(&value);
                true
            }
            "PHOTOBOOTH_ARCHIVE_DIR" => {
                config.paths.archive_dir = PathBuf::from(&value);
                true
            }
            "PHOTOBOOTH_PICTURES_DIR" => {
                config.paths.pictures_dir = Some(PathBuf::from(&value));
                true
            }
            "PHOTOBOOTH_COUNTDOWN_SECS" => parse_into(&value, &mut config.session.countdown_secs),
            "PHOTOBOOTH_CAPTURE_MAX_RETRIES" => {
                parse_into(&value, &mut config.session.capture_max_retries)
            }
            "PHOTOBOOTH_WEBCAM_ID" => parse_into(&value, &mut config.camera.webcam_id),
            "PHOTOBOOTH_PRINTER" => {
                config.printer.name = value.clone();
                true
            }
            "PHOTOBOOTH_LOG_LEVEL" | "RUST_LOG" => {
                config.telemetry.log_level = value.clone();
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            return PathBuf::from(path);
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> toml::Table {
        contents.parse().unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/booth/frames");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("booth/frames"));
    }

    #[test]
    fn test_expand_path_relative_untouched() {
        assert_eq!(expand_path("frames"), PathBuf::from("frames"));
        assert_eq!(expand_path("/abs/frames"), PathBuf::from("/abs/frames"));
    }

    #[test]
    fn test_merge_keeps_untouched_keys() {
        let mut base = parse(
            r#"
[session]
countdown_secs = 5
error_timeout_ms = 1000
"#,
        );
        let overlay = parse(
            r#"
[session]
countdown_secs = 9
"#,
        );
        merge_tables(&mut base, overlay);

        let config = from_table(base, None).unwrap();
        assert_eq!(config.session.countdown_secs, 9);
        assert_eq!(config.session.error_timeout_ms, 1000);
        // Untouched sections still default
        assert_eq!(config.session.inactivity_timeout_ms, 60_000);
    }

    #[test]
    fn test_merge_replaces_arrays() {
        let mut base = parse(r#"camera = { capture_command = ["a", "b"] }"#);
        let overlay = parse(r#"camera = { capture_command = ["c"] }"#);
        merge_tables(&mut base, overlay);

        let config = from_table(base, None).unwrap();
        assert_eq!(config.camera.capture_command, vec!["c".to_string()]);
    }

    #[test]
    fn test_full_file_parses() {
        let table = parse(
            r#"
[paths]
frame_dir = "/srv/frames"
pictures_dir = "/srv/pictures"

[session]
countdown_secs = 4
capture_max_retries = 1
capture_retry_delay_ms = 250

[camera]
webcam_id = 0
scan_command = ["gphoto2", "--auto-detect"]
picture_size = { width = 6000, height = 4000 }

[montage]
frame_extension = "PNG"
picture_offset = { x = 10, y = 20 }

[printer]
status_command = ["lpstat", "-p", "{printer}"]
not_ready_markers = ["paused"]
"#,
        );
        let config = from_table(table, None).unwrap();

        assert_eq!(config.paths.frame_dir, PathBuf::from("/srv/frames"));
        assert_eq!(config.paths.pictures_dir, Some(PathBuf::from("/srv/pictures")));
        assert_eq!(config.session.countdown_secs, 4);
        assert_eq!(config.session.capture_retry_delay_ms, 250);
        assert_eq!(config.camera.webcam_id, 0);
        assert_eq!(config.camera.scan_command.len(), 2);
        assert_eq!(config.camera.picture_size.width, 6000);
        assert_eq!(config.montage.frame_extension, "PNG");
        assert_eq!(config.montage.picture_offset.y, 20);
        assert_eq!(config.printer.not_ready_markers, vec!["paused".to_string()]);
    }

    #[test]
    fn test_bad_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[session\ncountdown_secs = ").unwrap();

        match load_table(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides_recorded() {
        let mut config = BoothConfig::default();
        let mut sources = ConfigSources::default();
        let vars = vec![
            ("PHOTOBOOTH_COUNTDOWN_SECS".to_string(), "3".to_string()),
            ("PHOTOBOOTH_PRINTER".to_string(), "Kiosk Printer".to_string()),
            ("PHOTOBOOTH_CAPTURE_MAX_RETRIES".to_string(), "nope".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        apply_overrides_from(&mut config, &mut sources, vars);

        assert_eq!(config.session.countdown_secs, 3);
        assert_eq!(config.printer.name, "Kiosk Printer");
        assert_eq!(config.session.capture_max_retries, 3);
        assert_eq!(
            sources.env_overrides,
            vec![
                "PHOTOBOOTH_COUNTDOWN_SECS".to_string(),
                "PHOTOBOOTH_PRINTER".to_string()
            ]
        );
    }
}
