/// What `Detection::size` measures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SizeMeasure {
    /// Radius in pixels (circle strategy).
    #[default]
    Radius,
    /// Enclosed contour area in square pixels (blob strategy).
    Area,
}

/// Result of extraction for one class in one frame.
///
/// Absence is carried by `valid`, never by a coordinate sentinel: a detection at
/// (0, 0) or any other pixel is a real detection when `valid` is true.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Detection {
    pub valid: bool,
    pub x: i32,
    pub y: i32,
    pub size: f32,
    pub measure: SizeMeasure,
}

impl Detection {
    /// "Not found" outcome.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn circle(x: i32, y: i32, radius: f32) -> Self {
        Self {
            valid: true,
            x,
            y,
            size: radius,
            measure: SizeMeasure::Radius,
        }
    }

    pub fn blob(x: i32, y: i32, area: f32) -> Self {
        Self {
            valid: true,
            x,
            y,
            size: area,
            measure: SizeMeasure::Area,
        }
    }

    /// Position when valid.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.valid.then_some((self.x, self.y))
    }

    /// Apparent diameter in pixels; blobs use the equal-area circle.
    pub fn apparent_diameter(&self) -> Option<f32> {
        if !self.valid || self.size <= 0.0 {
            return None;
        }
        Some(match self.measure {
            SizeMeasure::Radius => 2.0 * self.size,
            SizeMeasure::Area => 2.0 * (self.size / std::f32::consts::PI).sqrt(),
        })
    }

    /// Radius for drawing; blobs use the equal-area circle.
    pub fn display_radius(&self) -> Option<f32> {
        self.apparent_diameter().map(|d| d / 2.0)
    }
}
