//! Color segmentation: HSV frame + color class -> binary mask.
//!
//! A class owns one or more inclusive HSV boxes. Hue is circular, so colors such
//! as red are described by two boxes on either side of 0/180. A pixel is set in the
//! class mask iff it falls inside at least one box; overlapping boxes never push a
//! pixel above 1.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::{Hsv, HsvFrame, Mask};

/// Largest hue value accepted in a bound (OpenCV 8-bit hue spans 0..180).
pub const MAX_HUE: u8 = 180;

/// Inclusive lower/upper HSV box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, px: Hsv) -> bool {
        let [h0, s0, v0] = self.lower;
        let [h1, s1, v1] = self.upper;
        (h0..=h1).contains(&px.h) && (s0..=s1).contains(&px.s) && (v0..=v1).contains(&px.v)
    }

    fn validate(&self, class: &str) -> Result<()> {
        for channel in 0..3 {
            if self.lower[channel] > self.upper[channel] {
                return Err(anyhow!(
                    "class {}: range lower {:?} exceeds upper {:?}",
                    class,
                    self.lower,
                    self.upper
                ));
            }
        }
        if self.lower[0] > MAX_HUE || self.upper[0] > MAX_HUE {
            return Err(anyhow!(
                "class {}: hue bounds must be within 0..={}",
                class,
                MAX_HUE
            ));
        }
        Ok(())
    }
}

/// Named color class. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorClassSpec {
    name: String,
    ranges: Vec<HsvRange>,
}

impl ColorClassSpec {
    pub fn new(name: impl Into<String>, ranges: Vec<HsvRange>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(anyhow!("color class name must not be empty"));
        }
        if ranges.is_empty() {
            return Err(anyhow!("class {}: at least one HSV range is required", name));
        }
        for range in &ranges {
            range.validate(&name)?;
        }
        Ok(Self { name, ranges })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ranges(&self) -> &[HsvRange] {
        &self.ranges
    }

    pub fn matches(&self, px: Hsv) -> bool {
        self.ranges.iter().any(|range| range.contains(px))
    }
}

/// Produce the class mask for an HSV frame.
pub fn segment(frame: &HsvFrame, class: &ColorClassSpec) -> Mask {
    let mut mask = Mask::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            if class.matches(frame.get(x, y)) {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

/// Stock red class (two hue bands around 0/180).
pub fn red_ranges() -> Vec<HsvRange> {
    vec![
        HsvRange::new([0, 170, 100], [10, 255, 255]),
        HsvRange::new([170, 170, 100], [180, 255, 255]),
    ]
}

/// Stock pink class.
pub fn pink_ranges() -> Vec<HsvRange> {
    vec![HsvRange::new([140, 100, 100], [170, 255, 255])]
}

/// Stock yellow class.
pub fn yellow_ranges() -> Vec<HsvRange> {
    vec![HsvRange::new([20, 170, 100], [30, 255, 255])]
}

/// Stock white class: any hue, low saturation, bright.
pub fn white_ranges() -> Vec<HsvRange> {
    vec![HsvRange::new([0, 0, 200], [180, 50, 255])]
}

/// Stock ranges by color name.
pub fn preset_ranges(color: &str) -> Option<Vec<HsvRange>> {
    match color.trim().to_ascii_lowercase().as_str() {
        "red" => Some(red_ranges()),
        "pink" => Some(pink_ranges()),
        "yellow" => Some(yellow_ranges()),
        "white" => Some(white_ranges()),
        _ => None,
    }
}
