use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::backend::ShapeExtractor;
use crate::detect::result::Detection;
use crate::frame::Mask;
use crate::imgproc::{gaussian_blur, hough_circles, HoughParams, Plane};

/// Tuning for the circular-candidate strategy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleParams {
    pub dp: f32,
    pub min_dist: f32,
    pub edge_threshold: f32,
    pub votes_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    pub blur_kernel: usize,
    pub blur_sigma: f32,
}

impl Default for CircleParams {
    fn default() -> Self {
        let hough = HoughParams::default();
        Self {
            dp: hough.dp,
            min_dist: hough.min_dist,
            edge_threshold: hough.edge_threshold,
            votes_threshold: hough.votes_threshold,
            min_radius: hough.min_radius,
            max_radius: hough.max_radius,
            blur_kernel: 9,
            blur_sigma: 2.0,
        }
    }
}

impl CircleParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.dp > 0.0) {
            return Err(anyhow!("circle dp must be positive (got {})", self.dp));
        }
        if !(self.min_dist > 0.0) {
            return Err(anyhow!("circle min_dist must be positive (got {})", self.min_dist));
        }
        // max_radius 0 leaves the band open above min_radius
        if self.max_radius != 0 && self.min_radius > self.max_radius {
            return Err(anyhow!(
                "circle min_radius {} exceeds max_radius {}",
                self.min_radius,
                self.max_radius
            ));
        }
        if self.blur_kernel % 2 == 0 {
            return Err(anyhow!("blur kernel must be odd (got {})", self.blur_kernel));
        }
        Ok(())
    }

    fn hough(&self) -> HoughParams {
        HoughParams {
            dp: self.dp,
            min_dist: self.min_dist,
            edge_threshold: self.edge_threshold,
            votes_threshold: self.votes_threshold,
            min_radius: self.min_radius,
            max_radius: self.max_radius,
        }
    }
}

/// Circular-candidate strategy for compact round targets (balls).
///
/// Blurs the mask, runs the circle transform, and keeps the first candidate in
/// the transform's native (strongest-first) order. There is no cross-frame
/// tracking: every frame starts from scratch.
pub struct CircleExtractor {
    params: CircleParams,
}

impl CircleExtractor {
    pub fn new(params: CircleParams) -> Self {
        Self { params }
    }
}

impl Default for CircleExtractor {
    fn default() -> Self {
        Self::new(CircleParams::default())
    }
}

impl ShapeExtractor for CircleExtractor {
    fn name(&self) -> &'static str {
        "circle"
    }

    fn extract(&mut self, mask: &Mask) -> Result<Detection> {
        if mask.is_empty() {
            return Ok(Detection::absent());
        }
        let plane = Plane::from_vec(
            mask.to_intensity(),
            mask.width as usize,
            mask.height as usize,
        );
        let blurred = gaussian_blur(&plane, self.params.blur_kernel, self.params.blur_sigma)?;
        let candidates = hough_circles(&blurred, &self.params.hough());
        let Some(first) = candidates.first() else {
            return Ok(Detection::absent());
        };
        if candidates.len() > 1 {
            log::trace!(
                "circle: {} candidates, keeping strongest ({} votes)",
                candidates.len(),
                first.votes
            );
        }
        if first.radius <= 0.0 {
            return Ok(Detection::absent());
        }
        Ok(Detection::circle(
            first.x.round() as i32,
            first.y.round() as i32,
            first.radius,
        ))
    }
}
