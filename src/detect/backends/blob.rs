use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::backend::ShapeExtractor;
use crate::detect::result::Detection;
use crate::frame::Mask;
use crate::imgproc::external_contours;

/// Tuning for the largest-blob strategy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    /// Smallest contour area (square pixels) accepted as a detection.
    pub min_area: f64,
}

impl BlobParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_area >= 0.0) {
            return Err(anyhow!("blob min_area must be non-negative (got {})", self.min_area));
        }
        Ok(())
    }
}

impl Default for BlobParams {
    fn default() -> Self {
        Self { min_area: 500.0 }
    }
}

/// Largest-blob strategy for larger, irregular targets (goal markers).
///
/// Picks the external contour with the largest enclosed area, requires it to
/// reach `min_area`, and reports its centroid from the area moments.
pub struct BlobExtractor {
    params: BlobParams,
}

impl BlobExtractor {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }
}

impl Default for BlobExtractor {
    fn default() -> Self {
        Self::new(BlobParams::default())
    }
}

impl ShapeExtractor for BlobExtractor {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn extract(&mut self, mask: &Mask) -> Result<Detection> {
        let largest = external_contours(mask)
            .into_iter()
            .map(|contour| contour.moments())
            .max_by(|a, b| a.m00.total_cmp(&b.m00));
        let Some(moments) = largest else {
            return Ok(Detection::absent());
        };
        if moments.m00 < self.params.min_area {
            return Ok(Detection::absent());
        }
        let Some((cx, cy)) = moments.centroid() else {
            return Ok(Detection::absent());
        };
        Ok(Detection::blob(
            cx as i32,
            cy as i32,
            moments.m00 as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_region_above_threshold_wins() -> Result<()> {
        let mut mask = Mask::new(100, 100);
        // area 100 (11x11 pixels) and area 300 (11x31 pixels)
        mask.fill_rect(2, 2, 11, 11);
        mask.fill_rect(50, 40, 11, 31);
        let mut blob = BlobExtractor::new(BlobParams { min_area: 200.0 });
        let d = blob.extract(&mask)?;
        assert!(d.valid);
        assert_eq!((d.x, d.y), (55, 55));
        assert_eq!(d.size, 300.0);
        Ok(())
    }

    #[test]
    fn region_below_threshold_is_absent() -> Result<()> {
        let mut mask = Mask::new(40, 40);
        // area 50 (6x11 pixels)
        mask.fill_rect(10, 10, 6, 11);
        let mut blob = BlobExtractor::new(BlobParams { min_area: 200.0 });
        assert!(!blob.extract(&mask)?.valid);
        Ok(())
    }

    #[test]
    fn zero_area_region_is_absent_even_with_zero_threshold() -> Result<()> {
        let mut mask = Mask::new(10, 10);
        mask.fill_rect(1, 1, 8, 1);
        let mut blob = BlobExtractor::new(BlobParams { min_area: 0.0 });
        assert!(!blob.extract(&mask)?.valid);
        Ok(())
    }

    #[test]
    fn region_at_origin_is_a_real_detection() -> Result<()> {
        let mut mask = Mask::new(50, 50);
        mask.fill_rect(0, 0, 21, 21);
        let mut blob = BlobExtractor::new(BlobParams { min_area: 100.0 });
        let d = blob.extract(&mask)?;
        assert!(d.valid);
        assert_eq!((d.x, d.y), (10, 10));
        Ok(())
    }
}
