//! Environment-driven settings shared by the server and the converter.
//!
//! Values come from the process environment (after `.env` has been loaded by
//! the binary). Empty values count as unset.

use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::thumbnail::DEFAULT_THUMB_SIZE;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_INDEX: &str = "index.html";
pub const ARTWORKS_DIR_NAME: &str = "Artworks";
pub const DEFAULT_VIPS_BIN: &str = "vips";

/// Which tiling backend the converter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilerChoice {
    /// In-process first, `vips` CLI for inputs the decoder cannot read.
    Auto,
    /// In-process pyramid writer only.
    Image,
    /// `vips dzsave` only.
    Vips,
}

impl TilerChoice {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "image" => Ok(Self::Image),
            "vips" => Ok(Self::Vips),
            other => bail!("unknown DZI_TILER value: {other} (expected auto, image or vips)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub artworks_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub index_document: String,
    pub thumb_size: u32,
    pub tiler: TilerChoice,
    pub vips_bin: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let root_dir = var("GALLERY_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let artworks_dir = var("ARTWORKS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| root_dir.join(ARTWORKS_DIR_NAME));
        let port = var("GALLERY_PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let thumb_size = var("THUMB_SIZE")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_THUMB_SIZE);
        let tiler = match var("DZI_TILER") {
            Some(value) => TilerChoice::parse(&value)?,
            None => TilerChoice::Auto,
        };

        Ok(Self {
            root_dir,
            artworks_dir,
            host: var("GALLERY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            index_document: var("GALLERY_INDEX").unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            thumb_size,
            tiler,
            vips_bin: var("VIPS_BIN").unwrap_or_else(|| DEFAULT_VIPS_BIN.to_string()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
