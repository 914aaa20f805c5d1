mod container;
mod opf;

pub use container::EpubContainer;
pub use opf::{media_type, ManifestItem, Package};
