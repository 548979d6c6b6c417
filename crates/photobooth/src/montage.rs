//! Montage service: frame catalog, frame selection, and composition.
//!
//! Composition decodes two images and encodes one, which is slow enough to
//! stall the session loop, so every request runs on the blocking pool. The
//! session never issues a second request before the first completes, so the
//! output file has a single writer without any locking here.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use boothconf::{BoothConfig, Dimensions, Offset};
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MontageError {
    #[error("captured picture not found at {0}")]
    SourceMissing(PathBuf),

    #[error("cannot decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("cannot write montage {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("composition worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read frame directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no .{extension} frames found in {path}")]
    Empty { path: PathBuf, extension: String },
}

/// An image whose size differs from the configured expectation.
/// Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub asset: PathBuf,
    pub expected: Dimensions,
    pub actual: Dimensions,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {} but {} was expected",
            self.asset.display(),
            self.actual,
            self.expected
        )
    }
}

/// Outcome of one successful composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MontageResult {
    pub source_picture: PathBuf,
    pub frame_asset: PathBuf,
    pub output: PathBuf,
    pub frame_index: usize,
    pub warnings: Vec<DimensionMismatch>,
}

/// Frame overlays available to the booth. Immutable after load.
#[derive(Debug, Clone)]
pub struct FrameCatalog {
    frames: Vec<PathBuf>,
}

impl FrameCatalog {
    /// Scan `dir` (non-recursively) for files ending in `.extension`.
    /// Sorted by file name so the cycle order is stable across restarts.
    pub fn load(dir: &Path, extension: &str) -> Result<Self, CatalogError> {
        let extension = extension.trim_start_matches('.');
        let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Unreadable {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            })
            .collect();
        frames.sort();

        Self::from_frames(frames).ok_or_else(|| CatalogError::Empty {
            path: dir.to_path_buf(),
            extension: extension.to_string(),
        })
    }

    /// `None` for an empty list.
    pub fn from_frames(frames: Vec<PathBuf>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.frames.get(index).map(PathBuf::as_path)
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }
}

/// Next frame when the user asks for a different one on the same picture.
pub fn cyclic_index(current: usize, len: usize) -> usize {
    (current + 1) % len
}

/// Frame for a fresh picture: uniform over the whole catalog.
pub fn random_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> usize {
    rng.random_range(0..len)
}

/// Current frame position plus the randomness behind fresh picks.
#[derive(Debug)]
pub struct FrameCursor {
    index: usize,
    len: usize,
    rng: StdRng,
}

impl FrameCursor {
    pub fn new(len: usize, rng: StdRng) -> Self {
        Self { index: 0, len, rng }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move to the next frame and return its index.
    pub fn advance(&mut self, randomized: bool) -> usize {
        self.index = if randomized {
            random_index(&mut self.rng, self.len)
        } else {
            cyclic_index(self.index, self.len)
        };
        self.index
    }
}

/// Geometry of a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub picture_offset: Offset,
    pub expected_picture: Dimensions,
    pub expected_frame: Dimensions,
    pub aspect: Dimensions,
}

impl Layout {
    pub fn from_config(config: &BoothConfig) -> Self {
        Self {
            picture_offset: config.montage.picture_offset,
            expected_picture: config.camera.picture_size,
            expected_frame: config.montage.framed_size,
            aspect: config.montage.preview_size,
        }
    }
}

/// Compose a montage from the latest picture.
#[async_trait]
pub trait Compose: Send + Sync {
    async fn compose(&self, randomized: bool) -> Result<MontageResult, MontageError>;
}

struct Inner {
    catalog: FrameCatalog,
    cursor: Mutex<FrameCursor>,
    layout: Layout,
    source: PathBuf,
    output: PathBuf,
}

#[derive(Clone)]
pub struct MontageService {
    inner: Arc<Inner>,
}

impl MontageService {
    pub fn new(catalog: FrameCatalog, layout: Layout, source: PathBuf, output: PathBuf) -> Self {
        Self::with_rng(catalog, layout, source, output, StdRng::from_os_rng())
    }

    /// Deterministic frame picks for tests.
    pub fn with_rng(
        catalog: FrameCatalog,
        layout: Layout,
        source: PathBuf,
        output: PathBuf,
        rng: StdRng,
    ) -> Self {
        let cursor = Mutex::new(FrameCursor::new(catalog.len(), rng));
        Self {
            inner: Arc::new(Inner {
                catalog,
                cursor,
                layout,
                source,
                output,
            }),
        }
    }

    pub fn from_config(config: &BoothConfig) -> Result<Self, CatalogError> {
        let catalog = FrameCatalog::load(&config.paths.frame_dir, &config.montage.frame_extension)?;
        info!(
            frames = catalog.len(),
            dir = %config.paths.frame_dir.display(),
            "frame catalog loaded"
        );
        Ok(Self::new(
            catalog,
            Layout::from_config(config),
            config.paths.capture_file.clone(),
            config.paths.montage_file.clone(),
        ))
    }

    pub fn catalog(&self) -> &FrameCatalog {
        &self.inner.catalog
    }

    pub fn current_index(&self) -> usize {
        self.inner.cursor.lock().map(|c| c.index()).unwrap_or(0)
    }
}

impl Inner {
    fn compose_blocking(&self, randomized: bool) -> Result<MontageResult, MontageError> {
        let frame_index = {
            let mut cursor = self
                .cursor
                .lock()
                .map_err(|_| MontageError::Worker("frame cursor poisoned".to_string()))?;
            cursor.advance(randomized)
        };
        let frame_asset = self
            .catalog
            .get(frame_index)
            .ok_or_else(|| MontageError::Worker(format!("frame index {} out of range", frame_index)))?
            .to_path_buf();

        debug!(frame_index, frame = %frame_asset.display(), randomized, "composing montage");

        let warnings = compose_files(&self.layout, &self.source, &frame_asset, &self.output)?;
        for warning in &warnings {
            warn!(%warning, "montage dimension mismatch");
        }

        info!(output = %self.output.display(), frame_index, "montage ready");

        Ok(MontageResult {
            source_picture: self.source.clone(),
            frame_asset,
            output: self.output.clone(),
            frame_index,
            warnings,
        })
    }
}

#[async_trait]
impl Compose for MontageService {
    async fn compose(&self, randomized: bool) -> Result<MontageResult, MontageError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.compose_blocking(randomized))
            .await
            .map_err(|e| MontageError::Worker(e.to_string()))?
    }
}

/// Paste `source` onto a canvas the size of `frame` at the configured
/// offset, draw the frame over it, crop to the configured aspect ratio and
/// write the result to `output`.
pub fn compose_files(
    layout: &Layout,
    source: &Path,
    frame: &Path,
    output: &Path,
) -> Result<Vec<DimensionMismatch>, MontageError> {
    if !source.is_file() {
        return Err(MontageError::SourceMissing(source.to_path_buf()));
    }

    let picture = open_image(source)?;
    let overlay = open_image(frame)?;

    let mut warnings = Vec::new();
    check_size(&picture, source, layout.expected_picture, &mut warnings);
    check_size(&overlay, frame, layout.expected_frame, &mut warnings);

    let mut canvas = RgbaImage::new(overlay.width(), overlay.height());
    imageops::overlay(
        &mut canvas,
        &picture.to_rgba8(),
        layout.picture_offset.x,
        layout.picture_offset.y,
    );
    imageops::overlay(&mut canvas, &overlay.to_rgba8(), 0, 0);

    let cropped = center_crop(&canvas, layout.aspect);
    write_atomically(DynamicImage::ImageRgba8(cropped), output)?;

    Ok(warnings)
}

fn open_image(path: &Path) -> Result<DynamicImage, MontageError> {
    image::open(path).map_err(|e| MontageError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn check_size(
    image: &DynamicImage,
    path: &Path,
    expected: Dimensions,
    warnings: &mut Vec<DimensionMismatch>,
) {
    let (width, height) = image.dimensions();
    let actual = Dimensions::new(width, height);
    if actual != expected {
        warnings.push(DimensionMismatch {
            asset: path.to_path_buf(),
            expected,
            actual,
        });
    }
}

/// Largest centred region of `canvas` with the aspect ratio of `aspect`.
pub fn center_crop(canvas: &RgbaImage, aspect: Dimensions) -> RgbaImage {
    let (width, height) = canvas.dimensions();
    let (w, h) = (u64::from(width), u64::from(height));
    let (aw, ah) = (u64::from(aspect.width), u64::from(aspect.height));

    let (crop_w, crop_h) = if w * ah > h * aw {
        ((h * aw / ah) as u32, height)
    } else {
        (width, (w * ah / aw) as u32)
    };
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;

    imageops::crop_imm(canvas, x, y, crop_w, crop_h).to_image()
}

/// Encode next to `output` and rename into place, so readers never see a
/// half-written montage.
fn write_atomically(image: DynamicImage, output: &Path) -> Result<(), MontageError> {
    let write_err = |message: String| MontageError::Write {
        path: output.to_path_buf(),
        message,
    };

    let format = ImageFormat::from_path(output).map_err(|e| write_err(e.to_string()))?;
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };

    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "montage".to_string());
    let partial = output.with_file_name(format!(".{}.partial", file_name));

    image
        .save_with_format(&partial, format)
        .map_err(|e| write_err(e.to_string()))?;
    std::fs::rename(&partial, output).map_err(|e| write_err(e.to_string()))?;
    Ok(())
}
