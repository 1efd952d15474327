//! HTTP surface: artwork listing, thumbnails, and static files.
//!
//! | Route | Served by |
//! |---|---|
//! | `GET /api/artworks` | [`list_artworks`] |
//! | `GET, HEAD /api/thumb/{slug}` | [`thumbnail`], [`thumbnail_head`] |
//! | `GET /` | the configured index document |
//! | `/artworks/*` | the artworks root |
//! | anything else | the document root |
//!
//! Nothing is cached in memory; every request looks at the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::{HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::catalog::{ArtworkRecord, MetadataStore, display_name_in};
use crate::config::Settings;
use crate::slug::is_safe_segment;
use crate::thumbnail;

pub const THUMB_UNAVAILABLE: &str = "thumbnail not available";
pub const THUMB_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Clone, Debug)]
pub struct GalleryState {
    pub artworks_root: PathBuf,
    pub store: MetadataStore,
    pub thumb_size: u32,
}

impl GalleryState {
    pub fn new(artworks_root: PathBuf, thumb_size: u32) -> Self {
        Self {
            store: MetadataStore::new(&artworks_root),
            artworks_root,
            thumb_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkEntry {
    pub name: String,
    pub slug: String,
    pub path: String,
    pub thumbnail: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

pub fn router(settings: &Settings) -> Router {
    let state = Arc::new(GalleryState::new(
        settings.artworks_dir.clone(),
        settings.thumb_size,
    ));
    let index = settings.root_dir.join(&settings.index_document);
    Router::new()
        .route("/api/artworks", get(list_artworks))
        .route("/api/thumb/{slug}", get(thumbnail).head(thumbnail_head))
        .route_service("/", ServeFile::new(index))
        .nest_service("/artworks", ServeDir::new(&settings.artworks_dir))
        .fallback_service(ServeDir::new(&settings.root_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn list_artworks(State(state): State<Arc<GalleryState>>) -> Json<Vec<ArtworkEntry>> {
    Json(scan_artworks(&state.artworks_root, &state.store).await)
}

/// Every visible directory `<slug>` under `artworks_root` holding `<slug>.dzi`,
/// sorted by slug.
pub async fn scan_artworks(artworks_root: &Path, store: &MetadataStore) -> Vec<ArtworkEntry> {
    let mut dir = match fs::read_dir(artworks_root).await {
        Ok(dir) => dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            tracing::warn!(root = %artworks_root.display(), error = %err, "cannot read artworks root");
            return Vec::new();
        }
    };

    let mut slugs = Vec::new();
    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "artworks scan stopped early");
                break;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if !fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        let descriptor = path.join(format!("{name}.dzi"));
        if fs::metadata(&descriptor).await.is_ok_and(|m| m.is_file()) {
            slugs.push(name);
        }
    }
    if slugs.is_empty() {
        return Vec::new();
    }
    slugs.sort();

    let catalog = store.load().await;
    slugs
        .into_iter()
        .map(|slug| ArtworkEntry {
            name: display_name_in(&catalog, &slug),
            path: ArtworkRecord::relative_dzi_path(&slug),
            thumbnail: format!("/api/thumb/{slug}"),
            slug,
        })
        .collect()
}

pub async fn thumbnail(
    State(state): State<Arc<GalleryState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    match load_thumbnail(&state, &slug).await {
        Some(bytes) => {
            let headers = thumbnail_headers(&bytes);
            (StatusCode::OK, headers, bytes).into_response()
        }
        None => json_error(StatusCode::NOT_FOUND, THUMB_UNAVAILABLE),
    }
}

/// Same generation side effect as [`thumbnail`], headers only.
pub async fn thumbnail_head(
    State(state): State<Arc<GalleryState>>,
    AxumPath(slug): AxumPath<String>,
) -> Response {
    match load_thumbnail(&state, &slug).await {
        Some(bytes) => (StatusCode::OK, thumbnail_headers(&bytes)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn load_thumbnail(state: &GalleryState, slug: &str) -> Option<Vec<u8>> {
    if !is_safe_segment(slug) {
        return None;
    }
    let path = thumbnail::get_or_generate(&state.artworks_root, slug, state.thumb_size).await?;
    match fs::read(&path).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot read thumbnail");
            None
        }
    }
}

fn thumbnail_headers(bytes: &[u8]) -> [(HeaderName, String); 4] {
    [
        (header::CONTENT_TYPE, "image/jpeg".to_string()),
        (header::CONTENT_LENGTH, bytes.len().to_string()),
        (header::CACHE_CONTROL, THUMB_CACHE_CONTROL.to_string()),
        (header::ETAG, format!("\"{}\"", hex::encode(Sha256::digest(bytes)))),
    ]
}
