use anyhow::Result;

use crate::frame::Mask;

use super::result::Detection;

/// Shape extractor: class mask in, at most one detection out.
///
/// Implementations must treat the mask as read-only and must report "nothing
/// found" (including degenerate zero-area geometry) as `Detection::absent()`,
/// never as an error. Errors are reserved for genuine faults inside the
/// extractor itself.
///
/// Extra detectors (e.g. a learned model) plug into the control loop by
/// implementing this trait; see `control::TrackedClass::with_extractor`.
pub trait ShapeExtractor: Send {
    /// Strategy identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extract the best candidate from `mask`.
    fn extract(&mut self, mask: &Mask) -> Result<Detection>;
}
