use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One converted artwork as recorded in `.artworks.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkRecord {
    #[serde(default)]
    pub original_name: String,
    /// Descriptor path relative to the artworks root, `<slug>/<slug>.dzi`.
    #[serde(default)]
    pub dzi_path: String,
    /// Absolute descriptor path at conversion time.
    #[serde(default)]
    pub dzi_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<String>,
}

impl ArtworkRecord {
    pub fn relative_dzi_path(slug: &str) -> String {
        format!("{slug}/{slug}.dzi")
    }
}

/// Slug → record, ordered so the file is written in slug order.
pub type Catalog = BTreeMap<String, ArtworkRecord>;
