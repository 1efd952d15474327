use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use super::metadata::{ArtworkRecord, Catalog};

pub const METADATA_FILE_NAME: &str = ".artworks.json";

/// The `.artworks.json` file under an artworks root.
///
/// Reads never fail: a missing or unreadable file is an empty catalog.
/// Typed reads skip entries that are not valid records, but upserts rewrite
/// the raw JSON object, so such entries stay on disk untouched.
/// Writes go through a temp file and a rename, and upserts from clones of the
/// same store are serialized. Separate processes still race (last writer wins).
#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    pub fn new(artworks_root: &Path) -> Self {
        Self {
            path: artworks_root.join(METADATA_FILE_NAME),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Catalog {
        typed_catalog(self.load_raw().await)
    }

    /// Every slug in the store, including those whose record is malformed.
    pub async fn slugs(&self) -> Vec<String> {
        self.load_raw().await.into_iter().map(|(slug, _)| slug).collect()
    }

    async fn load_raw(&self) -> Map<String, Value> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "metadata store unreadable, treating as empty");
                return Map::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            tracing::warn!(path = %self.path.display(), "metadata store is not a JSON object, treating as empty");
            Map::new()
        })
    }

    pub async fn get(&self, slug: &str) -> Option<ArtworkRecord> {
        self.load().await.remove(slug)
    }

    /// Display name for `slug`, falling back to the slug itself.
    pub async fn display_name(&self, slug: &str) -> String {
        display_name_in(&self.load().await, slug)
    }

    /// Insert or replace the record for `slug`, returning the record it replaced.
    pub async fn upsert(&self, slug: &str, record: ArtworkRecord) -> Result<Option<ArtworkRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut raw = self.load_raw().await;
        let previous = raw
            .insert(slug.to_string(), serde_json::to_value(&record)?)
            .and_then(|value| serde_json::from_value(value).ok());
        self.write(&raw).await?;
        Ok(previous)
    }

    async fn write(&self, raw: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(raw)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &payload).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

pub fn display_name_in(catalog: &Catalog, slug: &str) -> String {
    catalog
        .get(slug)
        .map(|record| record.original_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(slug)
        .to_string()
}

/// Entries that are not valid records are skipped.
fn typed_catalog(raw: Map<String, Value>) -> Catalog {
    raw.into_iter()
        .filter_map(|(slug, value)| match serde_json::from_value::<ArtworkRecord>(value) {
            Ok(record) => Some((slug, record)),
            Err(err) => {
                tracing::warn!(%slug, error = %err, "skipping malformed metadata record");
                None
            }
        })
        .collect()
}
