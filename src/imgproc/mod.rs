//! Image primitives used by the shape extractors.
//!
//! Everything here operates on single-channel `Plane`s (f32 intensities) or on
//! binary `Mask`es. All functions are pure: inputs are borrowed, outputs are new.

mod blur;
mod contour;
mod hough;

pub use blur::{gaussian_blur, gaussian_kernel};
pub use contour::{external_contours, Contour, Moments};
pub use hough::{hough_circles, CircleCandidate, HoughParams};

/// Single-channel f32 image, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; width * height],
            width,
            height,
        }
    }

    /// Wrap existing row-major data. Panics in debug builds on a size mismatch.
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Lookup with coordinates clamped to the nearest edge pixel.
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.get(cx, cy)
    }

    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}
