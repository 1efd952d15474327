//! Source image → `<root>/<slug>/<slug>.dzi` + `<slug>_files/`.
//!
//! The source is first copied into `<root>/.staging/` so the tiler only ever
//! reads from inside the artworks root. The staged copy is removed on every
//! exit path, success or failure.
//!
//! Tiles are written under `<root>/<slug>/.partial/` and only replace the
//! live pyramid once both outputs are verified. A failed run leaves an
//! existing artwork untouched and removes a `<slug>/` it created itself.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::fs;

use crate::catalog::{ArtworkRecord, MetadataStore};
use crate::progress::TileProgress;
use crate::slug::slugify;
use crate::thumbnail::{self, DEFAULT_THUMB_SIZE};
use crate::tiling::{TileJob, Tiler, TilingError};

/// Extensions `--cleanup` is allowed to delete.
pub const RASTER_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "webp"];
pub const STAGING_DIR_NAME: &str = ".staging";
pub const PARTIAL_DIR_NAME: &str = ".partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Descriptor,
    TilesDir,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Descriptor => f.write_str("DZI file"),
            Artifact::TilesDir => f.write_str("tiles directory"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("{artifact} not created: {}", .path.display())]
    MissingArtifact { artifact: Artifact, path: PathBuf },
    #[error(transparent)]
    Tiling(#[from] TilingError),
    #[error("tiling task panicked: {0}")]
    TilingTask(#[from] tokio::task::JoinError),
    #[error("failed to update metadata store: {0:#}")]
    Metadata(anyhow::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    /// Delete the source image after a successful conversion (raster files only).
    pub cleanup: bool,
}

#[derive(Debug, Clone)]
pub struct Conversion {
    pub slug: String,
    pub original_name: String,
    pub descriptor: PathBuf,
    pub tiles_dir: PathBuf,
    /// Descriptor path relative to the artworks root.
    pub dzi_path: String,
    pub thumbnail: Option<PathBuf>,
    /// Record previously stored under the same slug, if any.
    pub replaced: Option<ArtworkRecord>,
    pub source_removed: bool,
}

type ProgressFn = Arc<dyn Fn(TileProgress) + Send + Sync>;

pub struct Converter {
    artworks_root: PathBuf,
    tiler: Arc<dyn Tiler>,
    store: MetadataStore,
    thumb_size: u32,
    progress: Option<ProgressFn>,
}

impl Converter {
    pub fn new(artworks_root: PathBuf, tiler: Arc<dyn Tiler>) -> Self {
        Self {
            store: MetadataStore::new(&artworks_root),
            artworks_root,
            tiler,
            thumb_size: DEFAULT_THUMB_SIZE,
            progress: None,
        }
    }

    pub fn with_thumb_size(mut self, size: u32) -> Self {
        self.thumb_size = size;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(TileProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub async fn convert(&self, source: &Path, options: ConvertOptions) -> Result<Conversion, ConvertError> {
        let source = resolve_source(source).await?;
        let original_name = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let slug = slugify(&original_name);
        tracing::info!(source = %source.display(), %slug, tiler = self.tiler.name(), "converting to DZI");

        let artwork_dir = self.artworks_root.join(&slug);
        let created_dir = CreatedDir::create(&artwork_dir).await?;
        let staged = StagedCopy::create(&self.artworks_root, &slug, &source).await?;

        let job = TileJob::new(staged.path(), artwork_dir.join(&slug));
        let partial = PartialPyramid::prepare(&job, &slug).await?;
        self.run_tiler(partial.job().clone()).await?;
        verify_outputs(partial.job(), &job).await?;
        partial.promote(&job).await?;
        drop(partial);

        let thumbnail = thumbnail::get_or_generate(&self.artworks_root, &slug, self.thumb_size).await;
        if thumbnail.is_none() {
            tracing::warn!(%slug, "no thumbnail generated");
        }

        let descriptor = job.descriptor_path();
        let dzi_path = ArtworkRecord::relative_dzi_path(&slug);
        let record = ArtworkRecord {
            original_name: original_name.clone(),
            dzi_path: dzi_path.clone(),
            dzi_file: descriptor.to_string_lossy().into_owned(),
            converted_at: Some(Utc::now().to_rfc3339()),
        };
        let replaced = self
            .store
            .upsert(&slug, record)
            .await
            .map_err(ConvertError::Metadata)?;
        if let Some(previous) = replaced.as_ref().filter(|prev| prev.original_name != original_name) {
            tracing::warn!(
                %slug,
                previous = %previous.original_name,
                current = %original_name,
                "slug collision: replaced an artwork converted from a different file"
            );
        }

        created_dir.keep();
        drop(staged);
        let source_removed = options.cleanup && is_raster(&source) && {
            fs::remove_file(&source).await?;
            true
        };

        Ok(Conversion {
            slug,
            original_name,
            tiles_dir: job.tiles_dir(),
            descriptor,
            dzi_path,
            thumbnail,
            replaced,
            source_removed,
        })
    }

    async fn run_tiler(&self, job: TileJob) -> Result<(), ConvertError> {
        let tiler = Arc::clone(&self.tiler);
        let progress = self.progress.clone();
        tokio::task::spawn_blocking(move || {
            let report = |p: TileProgress| {
                if let Some(progress) = &progress {
                    progress(p);
                }
            };
            tiler.tile(&job, &report)
        })
        .await??;
        Ok(())
    }
}

pub fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RASTER_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

async fn resolve_source(source: &Path) -> Result<PathBuf, ConvertError> {
    let resolved = match fs::canonicalize(source).await {
        Ok(path) => path,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConvertError::SourceNotFound(source.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    if !fs::metadata(&resolved).await?.is_file() {
        return Err(ConvertError::SourceNotFound(resolved));
    }
    Ok(resolved)
}

/// Remove the pyramid under `job`'s base so tiles never mix.
async fn remove_outputs(job: &TileJob) -> Result<(), ConvertError> {
    match fs::remove_file(job.descriptor_path()).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    match fs::remove_dir_all(job.tiles_dir()).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    Ok(())
}

/// Tiling tools can exit cleanly without writing anything, so check.
/// Errors name the live path the artifact was meant for.
async fn verify_outputs(produced: &TileJob, live: &TileJob) -> Result<(), ConvertError> {
    if !fs::metadata(produced.descriptor_path()).await.is_ok_and(|m| m.is_file()) {
        return Err(ConvertError::MissingArtifact {
            artifact: Artifact::Descriptor,
            path: live.descriptor_path(),
        });
    }
    if !fs::metadata(produced.tiles_dir()).await.is_ok_and(|m| m.is_dir()) {
        return Err(ConvertError::MissingArtifact {
            artifact: Artifact::TilesDir,
            path: live.tiles_dir(),
        });
    }
    Ok(())
}

/// Tiler output kept in `<slug>/.partial/` until it is verified.
/// The directory is removed on drop.
struct PartialPyramid {
    dir: PathBuf,
    job: TileJob,
}

impl PartialPyramid {
    async fn prepare(live: &TileJob, slug: &str) -> Result<Self, ConvertError> {
        let parent = live.output_base.parent().unwrap_or(Path::new("."));
        let dir = parent.join(PARTIAL_DIR_NAME);
        match fs::remove_dir_all(&dir).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
            _ => {}
        }
        fs::create_dir_all(&dir).await?;
        let job = TileJob {
            output_base: dir.join(slug),
            ..live.clone()
        };
        Ok(Self { dir, job })
    }

    fn job(&self) -> &TileJob {
        &self.job
    }

    /// Replace the live descriptor and tiles with the verified ones.
    async fn promote(&self, live: &TileJob) -> Result<(), ConvertError> {
        remove_outputs(live).await?;
        fs::rename(self.job.tiles_dir(), live.tiles_dir()).await?;
        fs::rename(self.job.descriptor_path(), live.descriptor_path()).await?;
        Ok(())
    }
}

impl Drop for PartialPyramid {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.dir.display(), error = %err, "failed to remove partial pyramid");
            }
            _ => {}
        }
    }
}

/// `<root>/<slug>/` made by this run. Removed on drop unless kept.
struct CreatedDir {
    path: Option<PathBuf>,
}

impl CreatedDir {
    async fn create(path: &Path) -> Result<Self, ConvertError> {
        let existed = fs::try_exists(path).await?;
        fs::create_dir_all(path).await?;
        Ok(Self {
            path: (!existed).then(|| path.to_path_buf()),
        })
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for CreatedDir {
    fn drop(&mut self) {
        let Some(path) = &self.path else { return };
        match std::fs::remove_dir_all(path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove artwork directory");
            }
            _ => {}
        }
    }
}

/// Copy of the source under `<root>/.staging/`, deleted on drop.
struct StagedCopy {
    path: PathBuf,
}

impl StagedCopy {
    async fn create(artworks_root: &Path, slug: &str, source: &Path) -> Result<Self, ConvertError> {
        let dir = artworks_root.join(STAGING_DIR_NAME);
        fs::create_dir_all(&dir).await?;
        let name = match source.extension() {
            Some(ext) => format!("{slug}.{}", ext.to_string_lossy()),
            None => slug.to_string(),
        };
        let path = dir.join(name);
        let staged = Self { path };
        fs::copy(source, &staged.path).await?;
        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedCopy {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove staged copy");
            }
            _ => {}
        }
        if let Some(dir) = self.path.parent() {
            // Only succeeds once the staging directory is empty.
            let _ = std::fs::remove_dir(dir);
        }
    }
}
