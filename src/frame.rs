//! Frame containers for one control cycle.
//!
//! - `Frame`: color pixel buffer (BGR or RGB, 8 bits per channel) as delivered by a camera source.
//! - `HsvFrame`: the same pixels in hue/saturation/value space, OpenCV 8-bit convention
//!   (H in 0..180, S and V in 0..=255).
//! - `Mask`: binary image, every pixel strictly 0 or 1.
//!
//! Frames are produced by the camera source each cycle and dropped at the end of that
//! cycle. Nothing in the pipeline keeps a frame across cycles.

use anyhow::{anyhow, Result};

/// Channel order of a `Frame`'s pixel bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorEncoding {
    Bgr,
    Rgb,
}

/// Color frame. Three bytes per pixel, row-major, no padding.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: ColorEncoding,
    /// Capture sequence number assigned by the source (1-based).
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, encoding: ColorEncoding) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            encoding,
            sequence: 0,
        })
    }

    /// Frame filled with a single BGR color.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            data,
            width,
            height,
            encoding: ColorEncoding::Bgr,
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (x, y) in BGR order regardless of the stored encoding.
    pub fn bgr(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        let px = [self.data[i], self.data[i + 1], self.data[i + 2]];
        match self.encoding {
            ColorEncoding::Bgr => px,
            ColorEncoding::Rgb => [px[2], px[1], px[0]],
        }
    }

    /// Write a BGR pixel. Out-of-bounds coordinates are ignored.
    pub fn put_bgr(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = self.offset(x as u32, y as u32);
        let px = match self.encoding {
            ColorEncoding::Bgr => bgr,
            ColorEncoding::Rgb => [bgr[2], bgr[1], bgr[0]],
        };
        self.data[i..i + 3].copy_from_slice(&px);
    }

    /// Fill a disk of `radius` pixels centred at (cx, cy).
    pub fn fill_disk(&mut self, cx: i64, cy: i64, radius: i64, bgr: [u8; 3]) {
        let r2 = radius * radius;
        for y in (cy - radius)..=(cy + radius) {
            for x in (cx - radius)..=(cx + radius) {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r2 {
                    self.put_bgr(x, y, bgr);
                }
            }
        }
    }

    /// Fill the axis-aligned rectangle with top-left (x0, y0) and size w x h.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, w: i64, h: i64, bgr: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                self.put_bgr(x, y, bgr);
            }
        }
    }

    /// Convert to hue/saturation/value. The frame itself is not modified.
    pub fn to_hsv(&self) -> HsvFrame {
        let mut data = Vec::with_capacity(self.data.len() / 3);
        for px in self.data.chunks_exact(3) {
            let (b, g, r) = match self.encoding {
                ColorEncoding::Bgr => (px[0], px[1], px[2]),
                ColorEncoding::Rgb => (px[2], px[1], px[0]),
            };
            data.push(bgr_to_hsv(b, g, r));
        }
        HsvFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }
}

/// One HSV pixel, OpenCV 8-bit convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// Convert one BGR pixel to HSV with hue halved into 0..180.
pub fn bgr_to_hsv(b: u8, g: u8, r: u8) -> Hsv {
    let (bf, gf, rf) = (b as f32, g as f32, r as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 {
        (255.0 * delta / max).round()
    } else {
        0.0
    };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    let mut h8 = (h / 2.0).round() as u16;
    if h8 >= 180 {
        h8 -= 180;
    }

    Hsv {
        h: h8 as u8,
        s: s.clamp(0.0, 255.0) as u8,
        v: max as u8,
    }
}

/// Frame converted to HSV.
#[derive(Clone, Debug)]
pub struct HsvFrame {
    data: Vec<Hsv>,
    pub width: u32,
    pub height: u32,
}

impl HsvFrame {
    /// Build directly from HSV pixels (row-major).
    pub fn from_pixels(data: Vec<Hsv>, width: u32, height: u32) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(anyhow!(
                "hsv frame length mismatch: expected {}, got {}",
                width as usize * height as usize,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> Hsv {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[Hsv] {
        &self.data
    }
}

/// Binary mask. Values are 0 or 1, never anything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize] != 0
    }

    /// Signed lookup; anything outside the mask reads as unset.
    pub fn is_set(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.get(x as u32, y as u32)
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = u8::from(on);
    }

    /// Set every pixel of the rectangle with top-left (x0, y0) and size w x h, clipped.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..(y0 + h).min(self.height) {
            for x in x0..(x0 + w).min(self.width) {
                self.set(x, y, true);
            }
        }
    }

    /// Set every pixel within `radius` of (cx, cy), clipped.
    pub fn fill_disk(&mut self, cx: i64, cy: i64, radius: i64) {
        let r2 = radius * radius;
        for y in (cy - radius).max(0)..=(cy + radius).min(self.height as i64 - 1) {
            for x in (cx - radius).max(0)..=(cx + radius).min(self.width as i64 - 1) {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r2 {
                    self.set(x as u32, y as u32, true);
                }
            }
        }
    }

    /// Logical OR with another mask of the same size.
    pub fn union_with(&mut self, other: &Mask) -> Result<()> {
        if self.width != other.width || self.height != other.height {
            return Err(anyhow!(
                "mask size mismatch: {}x{} vs {}x{}",
                self.width,
                self.height,
                other.width,
                other.height
            ));
        }
        for (dst, &src) in self.data.iter_mut().zip(&other.data) {
            *dst |= src;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Raw 0/1 values, row-major.
    pub fn values(&self) -> &[u8] {
        &self.data
    }

    /// Mask as an 8-bit intensity image (0 or 255), the input expected by the blur stage.
    pub fn to_intensity(&self) -> Vec<f32> {
        self.data.iter().map(|&v| if v != 0 { 255.0 } else { 0.0 }).collect()
    }
}
