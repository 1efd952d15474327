//! Deep Zoom pyramid generation.
//!
//! The [`Tiler`] trait is the seam between the converter and whatever turns a
//! bitmap into `<base>.dzi` plus `<base>_files/<level>/<col>_<row>.jpg`:
//!
//! | Backend | How |
//! |---|---|
//! | [`PyramidTiler`] | in-process, `image` crate decode/resize/JPEG encode |
//! | [`VipsCliTiler`] | spawns `vips dzsave` |
//! | [`AutoTiler`] | in-process, falling back to `vips` for undecodable inputs |

pub mod pyramid;
pub mod vips;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Settings, TilerChoice};
use crate::progress::TileProgress;

pub use pyramid::PyramidTiler;
pub use vips::VipsCliTiler;

#[derive(Error, Debug)]
pub enum TilingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported input {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("tiling tool `{tool}` is not available: {source}")]
    ToolUnavailable {
        tool: String,
        source: std::io::Error,
    },
    #[error("tiling tool `{tool}` exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Fixed Deep Zoom parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileParams {
    pub tile_size: u32,
    pub overlap: u32,
    pub quality: u8,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            tile_size: 256,
            overlap: 1,
            quality: 85,
        }
    }
}

impl TileParams {
    pub const TILE_EXTENSION: &'static str = "jpg";

    /// Output suffix in `vips` syntax, e.g. `.jpg[Q=85]`.
    pub fn vips_suffix(&self) -> String {
        format!(".{}[Q={}]", Self::TILE_EXTENSION, self.quality)
    }
}

/// One tiling run: `source` in, `<output_base>.dzi` and `<output_base>_files/` out.
#[derive(Debug, Clone)]
pub struct TileJob {
    pub source: PathBuf,
    pub output_base: PathBuf,
    pub params: TileParams,
}

impl TileJob {
    pub fn new(source: impl Into<PathBuf>, output_base: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_base: output_base.into(),
            params: TileParams::default(),
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        descriptor_path(&self.output_base)
    }

    pub fn tiles_dir(&self) -> PathBuf {
        tiles_dir(&self.output_base)
    }
}

pub fn descriptor_path(output_base: &Path) -> PathBuf {
    with_suffix(output_base, ".dzi")
}

pub fn tiles_dir(output_base: &Path) -> PathBuf {
    with_suffix(output_base, "_files")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

pub trait Tiler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write the descriptor and tile tree for `job`.
    ///
    /// Backends that cannot observe their own progress never call `progress`.
    fn tile(&self, job: &TileJob, progress: &dyn Fn(TileProgress)) -> Result<(), TilingError>;
}

pub struct AutoTiler {
    primary: PyramidTiler,
    fallback: VipsCliTiler,
}

impl AutoTiler {
    pub fn new(fallback: VipsCliTiler) -> Self {
        Self {
            primary: PyramidTiler::new(),
            fallback,
        }
    }
}

impl Tiler for AutoTiler {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn tile(&self, job: &TileJob, progress: &dyn Fn(TileProgress)) -> Result<(), TilingError> {
        match self.primary.tile(job, progress) {
            Err(TilingError::Unsupported { path, reason }) => {
                tracing::warn!(
                    path = %path.display(),
                    %reason,
                    "in-process decoder cannot read input, falling back to vips"
                );
                self.fallback.tile(job, progress)
            }
            other => other,
        }
    }
}

pub fn tiler_from_settings(settings: &Settings) -> Box<dyn Tiler> {
    let vips = VipsCliTiler::new(settings.vips_bin.clone());
    match settings.tiler {
        TilerChoice::Auto => Box::new(AutoTiler::new(vips)),
        TilerChoice::Image => Box::new(PyramidTiler::new()),
        TilerChoice::Vips => Box::new(vips),
    }
}
