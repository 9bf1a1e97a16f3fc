use anyhow::{anyhow, Result};

/// Capture formats the device backend accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

/// Convert a captured buffer to packed BGR.
pub(crate) fn normalize_to_bgr(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = frame_bytes(width, height, 3)?;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame too short: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            let mut bgr = pixels[..expected].to_vec();
            for px in bgr.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(bgr)
        }
        PixelFormat::Yuyv => yuyv_to_bgr(pixels, width, height),
    }
}

// Drivers may pad the mmap buffer, so only a short buffer is an error.
fn yuyv_to_bgr(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width must be even (got {})", width));
    }
    let expected = frame_bytes(width, height, 2)?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame too short: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut bgr = Vec::with_capacity(expected / 2 * 3);
    for quad in pixels[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            bgr.push(clamp_to_u8(y + 1.772_f32 * u));
            bgr.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            bgr.push(clamp_to_u8(y + 1.402_f32 * v));
        }
    }
    Ok(bgr)
}

fn frame_bytes(width: u32, height: u32, per_pixel: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(per_pixel))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
