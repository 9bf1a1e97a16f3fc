//! Pinhole range estimate from apparent size.
//!
//! `distance = real_diameter * focal_length / apparent_diameter_px`, in the units of
//! `real_diameter`. Advisory only: used for logging and overlays, never for steering.

use anyhow::{anyhow, Result};

use crate::detect::Detection;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeEstimator {
    real_diameter: f64,
    focal_length_px: f64,
}

impl RangeEstimator {
    pub fn new(real_diameter: f64, focal_length_px: f64) -> Result<Self> {
        if !(real_diameter > 0.0) || !real_diameter.is_finite() {
            return Err(anyhow!("real diameter must be positive (got {})", real_diameter));
        }
        if !(focal_length_px > 0.0) || !focal_length_px.is_finite() {
            return Err(anyhow!("focal length must be positive (got {})", focal_length_px));
        }
        Ok(Self {
            real_diameter,
            focal_length_px,
        })
    }

    pub fn real_diameter(&self) -> f64 {
        self.real_diameter
    }

    pub fn focal_length_px(&self) -> f64 {
        self.focal_length_px
    }

    /// Distance for an apparent diameter; `None` when the diameter is not positive.
    pub fn distance_for_diameter(&self, apparent_diameter_px: f64) -> Option<f64> {
        if !(apparent_diameter_px > 0.0) {
            return None;
        }
        Some(self.real_diameter * self.focal_length_px / apparent_diameter_px)
    }

    /// Distance to a detection; `None` when it is invalid or has no size.
    pub fn estimate(&self, detection: &Detection) -> Option<f64> {
        let diameter = detection.apparent_diameter()?;
        self.distance_for_diameter(diameter as f64)
    }
}
