use anyhow::Result;

use dzi_gallery::{config::Settings, gallery};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    dzi_gallery::init_tracing()?;

    let settings = Settings::from_env()?;
    let router = gallery::router(&settings);
    let bind_address = settings.bind_address();
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address).await?;

    tracing::info!(
        %bind_address,
        root = %settings.root_dir.display(),
        artworks = %settings.artworks_dir.display(),
        "gallery server listening"
    );
    println!("Art Gallery Server");
    println!("==================");
    println!();
    println!("Gallery: http://localhost:{}", settings.port);
    println!("Artworks: {}", settings.artworks_dir.display());
    println!();
    println!("Press Ctrl+C to stop");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    println!("\nServer stopped");
    Ok(())
}
