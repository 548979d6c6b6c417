//! Configuration sections. Every default mirrors the values the kiosk
//! shipped with, so an empty config file yields a working booth.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pixel dimensions. Advisory only: mismatches produce warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel offset of the picture inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i64,
    pub y: i64,
}

/// Files and directories the kiosk reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned once at startup for frame overlays.
    #[serde(default = "PathsConfig::default_frame_dir")]
    pub frame_dir: PathBuf,

    /// Well-known path the capture helper writes the latest picture to.
    #[serde(default = "PathsConfig::default_capture_file")]
    pub capture_file: PathBuf,

    /// Output of the latest composition, read by review and print.
    #[serde(default = "PathsConfig::default_montage_file")]
    pub montage_file: PathBuf,

    /// Every printed montage is copied here before printing.
    #[serde(default = "PathsConfig::default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Optional copy of every raw capture. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pictures_dir: Option<PathBuf>,
}

impl PathsConfig {
    fn default_frame_dir() -> PathBuf {
        PathBuf::from("frames")
    }

    fn default_capture_file() -> PathBuf {
        PathBuf::from("latest.jpg")
    }

    fn default_montage_file() -> PathBuf {
        PathBuf::from("latest-framed.png")
    }

    fn default_archive_dir() -> PathBuf {
        PathBuf::from("printed")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            frame_dir: Self::default_frame_dir(),
            capture_file: Self::default_capture_file(),
            montage_file: Self::default_montage_file(),
            archive_dir: Self::default_archive_dir(),
            pictures_dir: None,
        }
    }
}

/// Session pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Countdown before the shutter fires, in seconds.
    #[serde(default = "SessionConfig::default_countdown_secs")]
    pub countdown_secs: u32,

    /// How long the review screen waits before returning to welcome.
    #[serde(default = "SessionConfig::default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,

    /// How long an error message stays on screen.
    #[serde(default = "SessionConfig::default_error_timeout_ms")]
    pub error_timeout_ms: u64,

    /// How long the "printing" screen stays up.
    #[serde(default = "SessionConfig::default_printing_timeout_ms")]
    pub printing_timeout_ms: u64,

    /// Retries after the first capture attempt before giving up.
    #[serde(default = "SessionConfig::default_capture_max_retries")]
    pub capture_max_retries: u32,

    /// Pause between capture attempts. Zero retries immediately.
    #[serde(default)]
    pub capture_retry_delay_ms: u64,
}

impl SessionConfig {
    fn default_countdown_secs() -> u32 {
        7
    }

    fn default_inactivity_timeout_ms() -> u64 {
        60_000
    }

    fn default_error_timeout_ms() -> u64 {
        15_000
    }

    fn default_printing_timeout_ms() -> u64 {
        5_000
    }

    fn default_capture_max_retries() -> u32 {
        3
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: Self::default_countdown_secs(),
            inactivity_timeout_ms: Self::default_inactivity_timeout_ms(),
            error_timeout_ms: Self::default_error_timeout_ms(),
            printing_timeout_ms: Self::default_printing_timeout_ms(),
            capture_max_retries: Self::default_capture_max_retries(),
            capture_retry_delay_ms: 0,
        }
    }
}

/// Camera identification and the capture helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Index of the live-preview webcam.
    #[serde(default = "CameraConfig::default_webcam_id")]
    pub webcam_id: u32,

    #[serde(default = "CameraConfig::default_manufacturer")]
    pub manufacturer: String,

    #[serde(default = "CameraConfig::default_device_name")]
    pub device_name: String,

    /// Helper that takes one picture and writes it to `paths.capture_file`.
    #[serde(default = "CameraConfig::default_capture_command")]
    pub capture_command: Vec<String>,

    /// Optional device listing run once at startup. Empty disables the scan.
    #[serde(default)]
    pub scan_command: Vec<String>,

    /// Upper bound on a single capture helper run. Zero waits forever.
    #[serde(default = "CameraConfig::default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Expected size of the pictures the camera produces.
    #[serde(default = "CameraConfig::default_picture_size")]
    pub picture_size: Dimensions,
}

impl CameraConfig {
    fn default_webcam_id() -> u32 {
        1
    }

    fn default_manufacturer() -> String {
        "Nikon Corporation".to_string()
    }

    fn default_device_name() -> String {
        "D70s".to_string()
    }

    fn default_capture_command() -> Vec<String> {
        vec!["photobooth-capture".to_string()]
    }

    fn default_capture_timeout_ms() -> u64 {
        30_000
    }

    fn default_picture_size() -> Dimensions {
        Dimensions::new(1504, 1000)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            webcam_id: Self::default_webcam_id(),
            manufacturer: Self::default_manufacturer(),
            device_name: Self::default_device_name(),
            capture_command: Self::default_capture_command(),
            scan_command: Vec::new(),
            capture_timeout_ms: Self::default_capture_timeout_ms(),
            picture_size: Self::default_picture_size(),
        }
    }
}

/// Frame catalog and composition geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MontageConfig {
    /// Extension (without dot) of frame files, matched case-insensitively.
    #[serde(default = "MontageConfig::default_frame_extension")]
    pub frame_extension: String,

    /// Expected size of each frame asset.
    #[serde(default = "MontageConfig::default_framed_size")]
    pub framed_size: Dimensions,

    /// Where the picture's top-left corner lands inside the frame.
    #[serde(default = "MontageConfig::default_picture_offset")]
    pub picture_offset: Offset,

    /// Aspect ratio the montage is cropped to.
    #[serde(default = "MontageConfig::default_preview_size")]
    pub preview_size: Dimensions,
}

impl MontageConfig {
    fn default_frame_extension() -> String {
        "png".to_string()
    }

    fn default_framed_size() -> Dimensions {
        Dimensions::new(1748, 1181)
    }

    fn default_picture_offset() -> Offset {
        Offset { x: 122, y: 91 }
    }

    fn default_preview_size() -> Dimensions {
        Dimensions::new(960, 720)
    }
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            frame_extension: Self::default_frame_extension(),
            framed_size: Self::default_framed_size(),
            picture_offset: Self::default_picture_offset(),
            preview_size: Self::default_preview_size(),
        }
    }
}

/// Printer identification, preflight and print helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// CUPS queue name, substituted into `status_command`. Queue names
    /// cannot contain spaces.
    #[serde(default = "PrinterConfig::default_name")]
    pub name: String,

    /// Helper that sends `PHOTOBOOTH_PRINT_FILE` to the spooler.
    #[serde(default = "PrinterConfig::default_print_command")]
    pub print_command: Vec<String>,

    /// Status query; `{printer}` is replaced by the printer name.
    #[serde(default = "PrinterConfig::default_status_command")]
    pub status_command: Vec<String>,

    /// Substrings of the status output meaning "not ready" (case-insensitive).
    #[serde(default = "PrinterConfig::default_not_ready_markers")]
    pub not_ready_markers: Vec<String>,

    /// Upper bound on the print helper. Zero waits forever.
    #[serde(default = "PrinterConfig::default_print_timeout_ms")]
    pub print_timeout_ms: u64,
}

impl PrinterConfig {
    fn default_name() -> String {
        "Canon_SELPHY_CP1500".to_string()
    }

    fn default_print_command() -> Vec<String> {
        vec!["photobooth-print".to_string()]
    }

    fn default_status_command() -> Vec<String> {
        vec!["lpstat".to_string(), "-p".to_string(), "{printer}".to_string()]
    }

    fn default_not_ready_markers() -> Vec<String> {
        vec![
            "disabled".to_string(),
            "offline".to_string(),
            "not connected".to_string(),
        ]
    }

    fn default_print_timeout_ms() -> u64 {
        60_000
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            print_command: Self::default_print_command(),
            status_command: Self::default_status_command(),
            not_ready_markers: Self::default_not_ready_markers(),
            print_timeout_ms: Self::default_print_timeout_ms(),
        }
    }
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive (trace, debug, info, warn, error, or per-target).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
