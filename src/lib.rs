pub mod catalog;
pub mod config;
pub mod convert;
pub mod gallery;
pub mod progress;
pub mod slug;
pub mod thumbnail;
pub mod tiling;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the `fmt` subscriber, honouring `RUST_LOG` on top of `dzi_gallery=info`.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dzi_gallery=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
