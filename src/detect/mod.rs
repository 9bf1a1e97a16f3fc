//! Shape/centroid extraction: class mask -> best candidate or "absent".

mod backend;
mod backends;
mod result;

pub use backend::ShapeExtractor;
pub use backends::{BlobExtractor, BlobParams, CircleExtractor, CircleParams};
pub use result::{Detection, SizeMeasure};
