// Separable Gaussian smoothing with clamp-to-edge borders.

use anyhow::{anyhow, Result};

use super::Plane;

/// Normalized 1D Gaussian kernel of odd length `size`.
///
/// A non-positive `sigma` is derived from the size the way OpenCV does:
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Result<Vec<f32>> {
    if size == 0 || size % 2 == 0 {
        return Err(anyhow!("gaussian kernel size must be odd (got {})", size));
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (size / 2) as isize;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    Ok(kernel)
}

/// Blur `src` with a `size` x `size` Gaussian.
pub fn gaussian_blur(src: &Plane, size: usize, sigma: f32) -> Result<Plane> {
    let kernel = gaussian_kernel(size, sigma)?;
    let rows = convolve(src, &kernel, true);
    Ok(convolve(&rows, &kernel, false))
}

fn convolve(src: &Plane, kernel: &[f32], horizontal: bool) -> Plane {
    let half = (kernel.len() / 2) as isize;
    let mut dst = Plane::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let mut acc = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let offset = k as isize - half;
                let v = if horizontal {
                    src.get_clamped(x as isize + offset, y as isize)
                } else {
                    src.get_clamped(x as isize, y as isize + offset)
                };
                acc += v * w;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}
