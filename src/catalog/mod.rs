pub mod metadata;
pub mod store;

pub use metadata::{ArtworkRecord, Catalog};
pub use store::{METADATA_FILE_NAME, MetadataStore, display_name_in};
