//! Capture service: one run of the capture helper per request.
//!
//! Stateless between calls. Attempt counting and retry decisions live in
//! the session, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use boothconf::BoothConfig;
use thiserror::Error;
use tracing::{info, warn};

use crate::process::{run_command, CommandSpec, ProcessError};

/// Environment variable telling the helper where to write the picture.
pub const CAPTURE_FILE_ENV: &str = "PHOTOBOOTH_CAPTURE_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture helper timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture helper failed: {0}")]
    ProcessFailure(String),
}

/// Acquire one photograph.
#[async_trait]
pub trait Capture: Send + Sync {
    /// Returns the path of the fresh picture.
    async fn capture(&self) -> Result<PathBuf, CaptureError>;
}

#[derive(Debug, Clone)]
pub struct CaptureService {
    command: CommandSpec,
    capture_file: PathBuf,
    pictures_dir: Option<PathBuf>,
}

impl CaptureService {
    pub fn new(command: CommandSpec, capture_file: PathBuf) -> Self {
        let command = command.env(CAPTURE_FILE_ENV, capture_file.to_string_lossy());
        Self {
            command,
            capture_file,
            pictures_dir: None,
        }
    }

    /// Keep a copy of every successful capture in `dir`.
    pub fn with_pictures_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.pictures_dir = dir;
        self
    }

    pub fn from_config(config: &BoothConfig) -> Option<Self> {
        let command = CommandSpec::from_argv(&config.camera.capture_command)?
            .timeout_ms(config.camera.capture_timeout_ms);
        Some(
            Self::new(command, config.paths.capture_file.clone())
                .with_pictures_dir(config.paths.pictures_dir.clone()),
        )
    }

    /// Copy the picture into the originals directory. Failures only warn.
    async fn keep_original(&self, dir: &Path) -> Option<PathBuf> {
        let ext = self
            .capture_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let target = dir.join(format!("{}.{}", chrono::Utc::now().timestamp_millis(), ext));

        let result = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::copy(&self.capture_file, &target).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                info!(original = %target.display(), "kept original picture");
                Some(target)
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "could not keep original picture");
                None
            }
        }
    }
}

#[async_trait]
impl Capture for CaptureService {
    async fn capture(&self) -> Result<PathBuf, CaptureError> {
        // A leftover picture would hide a helper that exits 0 without writing.
        match tokio::fs::remove_file(&self.capture_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CaptureError::ProcessFailure(format!(
                    "cannot clear previous picture {}: {}",
                    self.capture_file.display(),
                    e
                )))
            }
        }

        let output = match run_command(&self.command).await {
            Ok(output) => output,
            Err(ProcessError::TimedOut { timeout, .. }) => {
                warn!(timeout = ?timeout, "capture helper timed out");
                return Err(CaptureError::Timeout(timeout));
            }
            Err(e) => {
                warn!(error = %e, "capture helper could not run");
                return Err(CaptureError::ProcessFailure(e.to_string()));
            }
        };

        if !output.success() {
            let diagnostic = output.diagnostic();
            warn!(exit_code = ?output.exit_code, stderr = %diagnostic, "capture helper failed");
            return Err(CaptureError::ProcessFailure(diagnostic));
        }

        if !tokio::fs::try_exists(&self.capture_file).await.unwrap_or(false) {
            return Err(CaptureError::ProcessFailure(format!(
                "helper exited successfully but wrote no picture at {}",
                self.capture_file.display()
            )));
        }

        info!(picture = %self.capture_file.display(), "picture captured");

        if let Some(dir) = &self.pictures_dir {
            self.keep_original(dir).await;
        }

        Ok(self.capture_file.clone())
    }
}
