use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use dzi_gallery::{
    catalog::MetadataStore,
    config::Settings,
    convert::{ConvertOptions, Converter},
    progress::TerminalProgress,
    thumbnail,
    tiling::{self, Tiler},
};

#[derive(Parser)]
#[command(name = "dzi-convert")]
#[command(about = "Convert an image into a Deep Zoom pyramid under the artworks directory")]
struct Cli {
    /// Image to convert (JPEG, PNG, TIFF, WebP, ...)
    #[arg(required_unless_present = "backfill_thumbnails")]
    image: Option<PathBuf>,

    /// Delete the original image after a successful conversion
    #[arg(long)]
    cleanup: bool,

    /// Artworks directory [default: $ARTWORKS_DIR or ./Artworks]
    #[arg(long)]
    artworks_dir: Option<PathBuf>,

    /// Generate missing thumbnails for every recorded artwork, then exit
    #[arg(long, conflicts_with_all = ["image", "cleanup"])]
    backfill_thumbnails: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(err) = dzi_gallery::init_tracing() {
        eprintln!("warning: logging unavailable: {err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\nError: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.artworks_dir {
        settings.artworks_dir = dir;
    }
    if cli.backfill_thumbnails {
        return backfill(&settings).await;
    }
    let image = cli.image.context("no image given")?;

    let tiler: Arc<dyn Tiler> = Arc::from(tiling::tiler_from_settings(&settings));
    let bar = TerminalProgress::new();
    let converter = Converter::new(settings.artworks_dir.clone(), tiler)
        .with_thumb_size(settings.thumb_size)
        .with_progress(move |progress| bar.draw(progress));

    println!("Converting {} to DZI format...", image.display());
    let conversion = converter
        .convert(&image, ConvertOptions { cleanup: cli.cleanup })
        .await?;

    println!();
    println!("✓ DZI created successfully!");
    println!("Slug: {}", conversion.slug);
    if let Some(dir) = conversion.descriptor.parent() {
        println!("Files saved to: {}/", dir.display());
    }
    if conversion.thumbnail.is_none() {
        println!("(no thumbnail yet, it will be generated on first request)");
    }
    println!();
    println!("Viewer links:");
    println!("  Direct:    viewer.html?image=/artworks/{}", conversion.dzi_path);
    println!("  Gallery:   http://localhost:{}/", settings.port);
    if conversion.source_removed {
        println!("✓ Original image deleted");
    }
    Ok(())
}

async fn backfill(settings: &Settings) -> Result<()> {
    let store = MetadataStore::new(&settings.artworks_dir);
    let results = thumbnail::backfill(&settings.artworks_dir, &store, settings.thumb_size).await;
    for (slug, ok) in &results {
        println!("{} {slug}", if *ok { "✓" } else { "✗" });
    }
    let available = results.values().filter(|ok| **ok).count();
    println!("{available}/{} thumbnails available", results.len());
    Ok(())
}
