//! Startup checks and service wiring.

use std::sync::Arc;

use boothconf::{BoothConfig, CameraConfig};
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::CaptureService;
use crate::montage::{CatalogError, MontageService};
use crate::print::PrintService;
use crate::process::{run_command, CommandSpec};
use crate::session::Services;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("camera {manufacturer} {device} not found")]
    DeviceScanFailure {
        manufacturer: String,
        device: String,
    },

    #[error("device scan failed: {0}")]
    ScanCommand(String),

    #[error(transparent)]
    Frames(#[from] CatalogError),

    #[error("no {0} configured")]
    MissingCommand(&'static str),
}

/// Run the configured device scan and require the camera in its output.
/// Skipped when no scan command is configured.
pub async fn scan_for_camera(camera: &CameraConfig) -> Result<(), StartupError> {
    let Some(command) = CommandSpec::from_argv(&camera.scan_command) else {
        debug!("no device scan configured");
        return Ok(());
    };

    let output = run_command(&command.timeout_ms(camera.capture_timeout_ms))
        .await
        .map_err(|e| StartupError::ScanCommand(e.to_string()))?;
    if !output.success() {
        return Err(StartupError::ScanCommand(output.diagnostic()));
    }

    if !output.stdout.contains(&camera.manufacturer) || !output.stdout.contains(&camera.device_name)
    {
        return Err(StartupError::DeviceScanFailure {
            manufacturer: camera.manufacturer.clone(),
            device: camera.device_name.clone(),
        });
    }

    info!(
        manufacturer = %camera.manufacturer,
        device = %camera.device_name,
        "camera found"
    );
    Ok(())
}

/// Scan for the camera, load the frame catalog and build the services.
pub async fn build_services(config: &BoothConfig) -> Result<Services, StartupError> {
    scan_for_camera(&config.camera).await?;

    let capture =
        CaptureService::from_config(config).ok_or(StartupError::MissingCommand("capture command"))?;
    let montage = MontageService::from_config(config)?;
    let print =
        PrintService::from_config(config).ok_or(StartupError::MissingCommand("print command"))?;

    Ok(Services {
        capture: Arc::new(capture),
        montage: Arc::new(montage),
        print: Arc::new(print),
    })
}
