//! Lazily generated artwork previews.
//!
//! A thumbnail is `<root>/<slug>/.thumb-<size>.jpg`. Its presence on disk is
//! the whole cache: once written it is returned as-is forever. It is rendered
//! from a single existing pyramid tile, never from the source image.
//!
//! That tile is not the level-0 `0_0` tile itself. Level 0 of a Deep Zoom
//! pyramid is 1×1, so it only gates availability: without it there is no
//! thumbnail. The tile actually resized is the deepest level's `0_0` that
//! still covers the whole image on its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use image::imageops::FilterType;
use tokio::fs;

use crate::catalog::MetadataStore;
use crate::tiling::pyramid::write_jpeg;

pub const DEFAULT_THUMB_SIZE: u32 = 200;
pub const THUMB_QUALITY: u8 = 80;

const TILE_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

pub fn thumbnail_path(artworks_root: &Path, slug: &str, size: u32) -> PathBuf {
    artworks_root.join(slug).join(format!(".thumb-{size}.jpg"))
}

pub async fn has_thumbnail(artworks_root: &Path, slug: &str, size: u32) -> bool {
    fs::try_exists(thumbnail_path(artworks_root, slug, size))
        .await
        .unwrap_or(false)
}

/// Return the cached thumbnail, rendering it first if needed.
///
/// `None` means unavailable: no level-0 tile, or any decode/resize/encode
/// failure. Errors are logged, never returned.
pub async fn get_or_generate(artworks_root: &Path, slug: &str, size: u32) -> Option<PathBuf> {
    let thumb = thumbnail_path(artworks_root, slug, size);
    if fs::try_exists(&thumb).await.unwrap_or(false) {
        return Some(thumb);
    }

    let tiles_dir = artworks_root.join(slug).join(format!("{slug}_files"));
    let dest = thumb.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let tile = preview_tile(&tiles_dir).ok_or_else(|| anyhow!("no level-0 tile"))?;
        render(&tile, &dest, size)
    })
    .await;

    match rendered {
        Ok(Ok(())) => Some(thumb),
        Ok(Err(err)) => {
            tracing::debug!(%slug, error = %err, "thumbnail unavailable");
            None
        }
        Err(err) => {
            tracing::warn!(%slug, error = %err, "thumbnail task failed");
            None
        }
    }
}

/// Try to produce a thumbnail for every slug in the metadata store,
/// malformed records included.
pub async fn backfill(artworks_root: &Path, store: &MetadataStore, size: u32) -> BTreeMap<String, bool> {
    let mut results = BTreeMap::new();
    for slug in store.slugs().await {
        let ok = if crate::slug::is_safe_segment(&slug) {
            get_or_generate(artworks_root, &slug, size).await.is_some()
        } else {
            tracing::warn!(%slug, "skipping metadata entry with unsafe slug");
            false
        };
        results.insert(slug, ok);
    }
    results
}

/// The tile to shrink into a thumbnail.
///
/// Level 0 must exist. From there, the deepest level still covered by a
/// single `0_0` tile wins.
fn preview_tile(tiles_dir: &Path) -> Option<PathBuf> {
    let mut best = find_tile(&tiles_dir.join("0"), "0_0")?;
    for level in 1.. {
        let level_dir = tiles_dir.join(level.to_string());
        let Some(tile) = find_tile(&level_dir, "0_0") else {
            break;
        };
        if find_tile(&level_dir, "1_0").is_some() || find_tile(&level_dir, "0_1").is_some() {
            break;
        }
        best = tile;
    }
    Some(best)
}

fn find_tile(level_dir: &Path, stem: &str) -> Option<PathBuf> {
    TILE_EXTENSIONS
        .iter()
        .map(|ext| level_dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

fn render(tile: &Path, dest: &Path, size: u32) -> Result<()> {
    let image = image::open(tile)?;
    let thumb = image.resize(size, size, FilterType::Lanczos3).to_rgb8();
    let tmp = dest.with_extension("jpg.tmp");
    let written = write_jpeg(&thumb, &tmp, THUMB_QUALITY)
        .map_err(anyhow::Error::from)
        .and_then(|()| std::fs::rename(&tmp, dest).map_err(anyhow::Error::from));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_tile(root: &Path, slug: &str, level: u32, name: &str, w: u32, h: u32) {
        let dir = root.join(slug).join(format!("{slug}_files")).join(level.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(w, h, image::Rgb([200, 80, 40]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn generates_once_then_reuses() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "dawn", 0, "0_0.jpg", 1, 1);
        write_tile(root.path(), "dawn", 1, "0_0.jpg", 2, 1);
        write_tile(root.path(), "dawn", 9, "0_0.jpg", 256, 128);

        let first = get_or_generate(root.path(), "dawn", 200).await.unwrap();
        assert_eq!(first, thumbnail_path(root.path(), "dawn", 200));
        let modified = std::fs::metadata(&first).unwrap().modified().unwrap();
        let bytes = std::fs::read(&first).unwrap();

        let second = get_or_generate(root.path(), "dawn", 200).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::metadata(&second).unwrap().modified().unwrap(), modified);
        assert_eq!(std::fs::read(&second).unwrap(), bytes);
        assert!(has_thumbnail(root.path(), "dawn", 200).await);
    }

    #[tokio::test]
    async fn longer_edge_matches_size() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "wide", 0, "0_0.jpg", 1, 1);
        write_tile(root.path(), "wide", 1, "0_0.jpg", 256, 128);

        let thumb = get_or_generate(root.path(), "wide", 200).await.unwrap();
        assert_eq!(image::image_dimensions(thumb).unwrap(), (200, 100));
    }

    #[test]
    fn stops_at_first_multi_tile_level() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "big", 0, "0_0.jpg", 1, 1);
        write_tile(root.path(), "big", 1, "0_0.jpg", 120, 60);
        write_tile(root.path(), "big", 2, "0_0.jpg", 257, 240);
        write_tile(root.path(), "big", 2, "1_0.jpg", 2, 240);

        let tiles_dir = root.path().join("big/big_files");
        assert_eq!(preview_tile(&tiles_dir), Some(tiles_dir.join("1/0_0.jpg")));
    }

    #[tokio::test]
    async fn accepts_jpeg_extension() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "alt", 0, "0_0.jpeg", 4, 4);
        assert!(get_or_generate(root.path(), "alt", 50).await.is_some());
    }

    #[tokio::test]
    async fn missing_level_zero_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "partial", 3, "0_0.jpg", 8, 8);

        assert!(get_or_generate(root.path(), "partial", 200).await.is_none());
        assert!(get_or_generate(root.path(), "absent", 200).await.is_none());
        assert!(!has_thumbnail(root.path(), "partial", 200).await);
    }

    #[tokio::test]
    async fn corrupt_tile_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("broken/broken_files/0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("0_0.jpg"), b"not a jpeg").unwrap();

        assert!(get_or_generate(root.path(), "broken", 200).await.is_none());
        assert!(!thumbnail_path(root.path(), "broken", 200).exists());
    }

    #[tokio::test]
    async fn backfill_reports_each_recorded_slug() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "ok", 0, "0_0.jpg", 1, 1);
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        std::fs::write(
            root.path().join(crate::catalog::METADATA_FILE_NAME),
            br#"{"ok": {"original_name": "Ok"}, "empty": {"original_name": "Empty"}}"#,
        )
        .unwrap();

        let store = MetadataStore::new(root.path());
        let results = backfill(root.path(), &store, 64).await;
        assert_eq!(results.len(), 2);
        assert!(results["ok"]);
        assert!(!results["empty"]);
    }

    #[tokio::test]
    async fn backfill_includes_malformed_records() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "odd", 0, "0_0.jpg", 1, 1);
        std::fs::write(
            root.path().join(crate::catalog::METADATA_FILE_NAME),
            br#"{"odd": {"original_name": null}}"#,
        )
        .unwrap();

        let store = MetadataStore::new(root.path());
        assert!(store.load().await.is_empty());
        let results = backfill(root.path(), &store, 64).await;
        assert_eq!(results.len(), 1);
        assert!(results["odd"]);
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let root = tempfile::tempdir().unwrap();
        write_tile(root.path(), "x", 0, "0_0.jpg", 4, 4);
        let tile = root.path().join("x/x_files/0/0_0.jpg");
        let dest = thumbnail_path(root.path(), "x", 32);
        std::fs::create_dir_all(dest.join("occupied")).unwrap();

        assert!(render(&tile, &dest, 32).is_err());
        assert!(!dest.with_extension("jpg.tmp").exists());
        assert!(dest.is_dir());
    }
}
