//! Print service: archive the montage, check the printer, hand off the job.
//!
//! The archived copy is made before anything can fail, so every print
//! request leaves a file behind even when the printer is off.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boothconf::{BoothConfig, PrinterConfig};
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{info, warn};

use crate::process::{run_command, CommandSpec, ProcessError};

pub const PRINT_FILE_ENV: &str = "PHOTOBOOTH_PRINT_FILE";
pub const PRINTER_ENV: &str = "PHOTOBOOTH_PRINTER";
pub const PRINT_JOB_ENV: &str = "PHOTOBOOTH_PRINT_JOB_NAME";

const PRINTER_PLACEHOLDER: &str = "{printer}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrintError {
    #[error("cannot archive montage: {0}")]
    Archive(String),

    #[error("printer unreachable: {0}")]
    PrinterUnreachable(String),

    #[error("print helper failed: {0}")]
    ProcessFailure(String),

    #[error("print helper timed out after {0:?}")]
    Timeout(Duration),
}

/// One accepted print request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub archived_filename: String,
    pub archived_path: PathBuf,
    pub timestamp: DateTime<Local>,
}

/// Name for the next archived montage: the number of files already in the
/// archive, then the wall-clock time, then the montage extension.
pub fn archive_name(index: usize, now: DateTime<Local>, extension: &str) -> String {
    format!("{}{}.{}", index, now.format("-%H-%M-%S"), extension)
}

/// Copy `montage` into `archive_dir`, creating the directory if needed.
pub fn archive_montage(
    montage: &Path,
    archive_dir: &Path,
    now: DateTime<Local>,
) -> Result<PrintJob, PrintError> {
    if !montage.is_file() {
        return Err(PrintError::Archive(format!(
            "no montage at {}",
            montage.display()
        )));
    }

    std::fs::create_dir_all(archive_dir).map_err(|e| {
        PrintError::Archive(format!("cannot create {}: {}", archive_dir.display(), e))
    })?;

    let index = std::fs::read_dir(archive_dir)
        .map_err(|e| PrintError::Archive(format!("cannot list {}: {}", archive_dir.display(), e)))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .count();

    let extension = montage
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    let archived_filename = archive_name(index, now, extension);
    let archived_path = archive_dir.join(&archived_filename);

    std::fs::copy(montage, &archived_path).map_err(|e| {
        PrintError::Archive(format!("cannot copy to {}: {}", archived_path.display(), e))
    })?;

    Ok(PrintJob {
        archived_filename,
        archived_path,
        timestamp: now,
    })
}

/// Is the printer ready to accept a job?
#[async_trait]
pub trait PrinterProbe: Send + Sync {
    async fn check(&self) -> Result<(), PrintError>;
}

/// Runs the configured status command and looks for not-ready markers.
#[derive(Debug, Clone)]
pub struct StatusCommandProbe {
    command: CommandSpec,
    markers: Vec<String>,
}

impl StatusCommandProbe {
    pub fn new(command: CommandSpec, markers: Vec<String>) -> Self {
        let markers = markers.into_iter().map(|m| m.to_lowercase()).collect();
        Self { command, markers }
    }

    /// `None` when no status command is configured.
    pub fn from_config(printer: &PrinterConfig) -> Option<Self> {
        let argv: Vec<String> = printer
            .status_command
            .iter()
            .map(|arg| arg.replace(PRINTER_PLACEHOLDER, &printer.name))
            .collect();
        let command = CommandSpec::from_argv(&argv)?.timeout_ms(printer.print_timeout_ms);
        Some(Self::new(command, printer.not_ready_markers.clone()))
    }
}

#[async_trait]
impl PrinterProbe for StatusCommandProbe {
    async fn check(&self) -> Result<(), PrintError> {
        let output = run_command(&self.command)
            .await
            .map_err(|e| PrintError::PrinterUnreachable(e.to_string()))?;

        if !output.success() {
            return Err(PrintError::PrinterUnreachable(output.diagnostic()));
        }

        let status = output.stdout.to_lowercase();
        if let Some(marker) = self.markers.iter().find(|m| status.contains(m.as_str())) {
            return Err(PrintError::PrinterUnreachable(format!(
                "status reports '{}'",
                marker
            )));
        }

        Ok(())
    }
}

/// Probe used when no status command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

#[async_trait]
impl PrinterProbe for AlwaysReady {
    async fn check(&self) -> Result<(), PrintError> {
        Ok(())
    }
}

/// Print the latest montage.
#[async_trait]
pub trait Print: Send + Sync {
    async fn print_latest(&self) -> Result<PrintJob, PrintError>;
}

pub struct PrintService {
    montage: PathBuf,
    archive_dir: PathBuf,
    printer_name: String,
    command: CommandSpec,
    probe: Arc<dyn PrinterProbe>,
}

impl PrintService {
    pub fn new(
        montage: PathBuf,
        archive_dir: PathBuf,
        printer_name: String,
        command: CommandSpec,
        probe: Arc<dyn PrinterProbe>,
    ) -> Self {
        Self {
            montage,
            archive_dir,
            printer_name,
            command,
            probe,
        }
    }

    pub fn from_config(config: &BoothConfig) -> Option<Self> {
        let command = CommandSpec::from_argv(&config.printer.print_command)?
            .timeout_ms(config.printer.print_timeout_ms);
        let probe: Arc<dyn PrinterProbe> = match StatusCommandProbe::from_config(&config.printer) {
            Some(probe) => Arc::new(probe),
            None => Arc::new(AlwaysReady),
        };
        Some(Self::new(
            config.paths.montage_file.clone(),
            config.paths.archive_dir.clone(),
            config.printer.name.clone(),
            command,
            probe,
        ))
    }

    async fn send(&self, job: &PrintJob) -> Result<(), PrintError> {
        let command = self
            .command
            .clone()
            .env(PRINT_FILE_ENV, job.archived_path.to_string_lossy())
            .env(PRINTER_ENV, self.printer_name.as_str())
            .env(PRINT_JOB_ENV, job.archived_filename.as_str());

        let output = match run_command(&command).await {
            Ok(output) => output,
            Err(ProcessError::TimedOut { timeout, .. }) => return Err(PrintError::Timeout(timeout)),
            Err(e) => return Err(PrintError::ProcessFailure(e.to_string())),
        };

        if !output.success() {
            let diagnostic = output.diagnostic();
            warn!(exit_code = ?output.exit_code, stderr = %diagnostic, "print helper failed");
            return Err(PrintError::ProcessFailure(diagnostic));
        }
        Ok(())
    }
}

#[async_trait]
impl Print for PrintService {
    async fn print_latest(&self) -> Result<PrintJob, PrintError> {
        let job = archive_montage(&self.montage, &self.archive_dir, Local::now())?;
        info!(job.file = %job.archived_filename, "montage archived");

        if let Err(e) = self.probe.check().await {
            warn!(printer = %self.printer_name, error = %e, "printer preflight failed");
            return Err(e);
        }

        self.send(&job).await?;
        info!(job.file = %job.archived_filename, printer = %self.printer_name, "print job accepted");
        Ok(job)
    }
}
