mod dictionary;
mod xray_db;

pub use dictionary::{DictionaryStore, SenseInsert};
pub use xray_db::{find_excerpt_images, ExcerptImage, XRayDatabase, XRayInput, XRayReport};
