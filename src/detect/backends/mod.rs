pub mod blob;
pub mod circle;

pub use blob::{BlobExtractor, BlobParams};
pub use circle::{CircleExtractor, CircleParams};
