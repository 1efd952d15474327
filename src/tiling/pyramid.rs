//! In-process Deep Zoom writer on top of the `image` crate.
//!
//! Level `max = ceil(log2(max(w, h)))` is the source at full size; every
//! lower level halves the one above (rounding up) down to 1×1 at level 0.
//! Tiles are `tile_size` square plus `overlap` pixels on each interior edge.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, ImageReader, RgbImage};

use super::{TileJob, TileParams, Tiler, TilingError};
use crate::progress::{ProgressTracker, TileProgress};

const DEEP_ZOOM_NAMESPACE: &str = "http://schemas.microsoft.com/deepzoom/2008";

#[derive(Debug, Default, Clone, Copy)]
pub struct PyramidTiler;

impl PyramidTiler {
    pub fn new() -> Self {
        Self
    }
}

impl Tiler for PyramidTiler {
    fn name(&self) -> &'static str {
        "image"
    }

    fn tile(&self, job: &TileJob, progress: &dyn Fn(TileProgress)) -> Result<(), TilingError> {
        let source = load_rgb(&job.source)?;
        let (width, height) = source.dimensions();
        let params = job.params;
        let levels = level_dimensions(width, height);
        let total: u64 = levels
            .iter()
            .map(|&(w, h)| tile_count(w, params.tile_size) * tile_count(h, params.tile_size))
            .sum();
        let mut tracker = ProgressTracker::new(total);

        let tiles_dir = job.tiles_dir();
        let mut current = source;
        for (level, &(level_width, level_height)) in levels.iter().enumerate().rev() {
            if current.dimensions() != (level_width, level_height) {
                current = imageops::resize(&current, level_width, level_height, FilterType::Triangle);
            }
            let level_dir = tiles_dir.join(level.to_string());
            fs::create_dir_all(&level_dir)?;
            for row in 0..tile_count(level_height, params.tile_size) as u32 {
                let (y, tile_height) = tile_span(row, level_height, &params);
                for col in 0..tile_count(level_width, params.tile_size) as u32 {
                    let (x, tile_width) = tile_span(col, level_width, &params);
                    let tile = imageops::crop_imm(&current, x, y, tile_width, tile_height).to_image();
                    let name = format!("{col}_{row}.{}", TileParams::TILE_EXTENSION);
                    write_jpeg(&tile, &level_dir.join(name), params.quality)?;
                    progress(tracker.advance());
                }
            }
        }

        fs::write(job.descriptor_path(), descriptor_xml(width, height, &params))?;
        tracing::debug!(
            source = %job.source.display(),
            width,
            height,
            levels = levels.len(),
            tiles = total,
            "pyramid written"
        );
        Ok(())
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage, TilingError> {
    let decoded = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| match err {
            ImageError::Unsupported(_) | ImageError::Decoding(_) => TilingError::Unsupported {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
            other => TilingError::Image(other),
        })?;
    Ok(decoded.to_rgb8())
}

pub(crate) fn write_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<(), TilingError> {
    let writer = BufWriter::new(File::create(path)?);
    image.write_with_encoder(JpegEncoder::new_with_quality(writer, quality))?;
    Ok(())
}

/// Dimensions of every level, index 0 (1×1) through full size.
pub fn level_dimensions(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut levels = vec![(width.max(1), height.max(1))];
    let (mut w, mut h) = levels[0];
    while w > 1 || h > 1 {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        levels.push((w, h));
    }
    levels.reverse();
    levels
}

fn tile_count(extent: u32, tile_size: u32) -> u64 {
    u64::from(extent.div_ceil(tile_size))
}

/// Start and length of tile `index` along an axis of `extent` pixels.
pub fn tile_span(index: u32, extent: u32, params: &TileParams) -> (u32, u32) {
    let start = (index * params.tile_size).saturating_sub(if index > 0 { params.overlap } else { 0 });
    let end = ((index + 1) * params.tile_size + params.overlap).min(extent);
    (start, end - start)
}

pub fn descriptor_xml(width: u32, height: u32, params: &TileParams) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Image xmlns=\"{DEEP_ZOOM_NAMESPACE}\" Format=\"{}\" Overlap=\"{}\" TileSize=\"{}\">\n  \
         <Size Width=\"{width}\" Height=\"{height}\"/>\n\
         </Image>\n",
        TileParams::TILE_EXTENSION,
        params.overlap,
        params.tile_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn levels_halve_down_to_one_pixel() {
        let levels = level_dimensions(600, 400);
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[0], (1, 1));
        assert_eq!(levels[9], (300, 200));
        assert_eq!(levels[10], (600, 400));
    }

    #[test]
    fn single_pixel_image_has_one_level() {
        assert_eq!(level_dimensions(1, 1), vec![(1, 1)]);
    }

    #[test]
    fn spans_include_overlap_on_interior_edges() {
        let params = TileParams::default();
        assert_eq!(tile_span(0, 600, &params), (0, 257));
        assert_eq!(tile_span(1, 600, &params), (255, 258));
        assert_eq!(tile_span(2, 600, &params), (511, 89));
        assert_eq!(tile_span(0, 100, &params), (0, 100));
    }

    #[test]
    fn descriptor_carries_size_and_params() {
        let xml = descriptor_xml(600, 400, &TileParams::default());
        assert!(xml.contains(r#"Format="jpg" Overlap="1" TileSize="256""#));
        assert!(xml.contains(r#"<Size Width="600" Height="400"/>"#));
    }

    #[test]
    fn writes_full_pyramid() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        gradient(600, 400).save(&source).unwrap();
        let job = TileJob::new(&source, dir.path().join("out"));

        let seen = Mutex::new(Vec::new());
        PyramidTiler::new()
            .tile(&job, &|p| seen.lock().unwrap().push(p.percent))
            .unwrap();

        assert!(job.descriptor_path().is_file());
        let tiles = job.tiles_dir();
        assert_eq!(image::image_dimensions(tiles.join("0/0_0.jpg")).unwrap(), (1, 1));
        assert_eq!(image::image_dimensions(tiles.join("10/0_0.jpg")).unwrap(), (257, 257));
        assert_eq!(image::image_dimensions(tiles.join("10/1_1.jpg")).unwrap(), (258, 145));
        assert_eq!(image::image_dimensions(tiles.join("10/2_1.jpg")).unwrap(), (89, 145));
        assert!(!tiles.join("10/3_0.jpg").exists());
        assert!(!tiles.join("9/2_0.jpg").exists());

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn garbage_input_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"hello").unwrap();
        let err = PyramidTiler::new()
            .tile(&TileJob::new(&source, dir.path().join("out")), &|_| {})
            .unwrap_err();
        assert!(matches!(err, TilingError::Unsupported { .. }), "{err}");
    }
}
