// External contour extraction and polygon moments.
//
// Components are 8-connected. Each component's outer boundary is traced with
// Moore-neighbour tracing starting from its first pixel in raster order, giving a
// closed polygon through boundary pixel centres. Holes are ignored.

use crate::frame::Mask;

/// Clockwise neighbour offsets (image coordinates, y down), starting east.
const DIRS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Closed boundary polygon of one connected region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

/// Area and first-order moments of a closed polygon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// `(M10/M00, M01/M00)`, or `None` for a degenerate (zero-area) region.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

impl Contour {
    /// Polygon moments via Green's theorem. Orientation-independent.
    pub fn moments(&self) -> Moments {
        let n = self.points.len();
        if n < 3 {
            return Moments::default();
        }
        let (mut a00, mut a10, mut a01) = (0.0f64, 0.0f64, 0.0f64);
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            let (x0, y0, x1, y1) = (x0 as f64, y0 as f64, x1 as f64, y1 as f64);
            let cross = x0 * y1 - x1 * y0;
            a00 += cross;
            a10 += cross * (x0 + x1);
            a01 += cross * (y0 + y1);
        }
        let mut m = Moments {
            m00: a00 / 2.0,
            m10: a10 / 6.0,
            m01: a01 / 6.0,
        };
        if m.m00 < 0.0 {
            m.m00 = -m.m00;
            m.m10 = -m.m10;
            m.m01 = -m.m01;
        }
        m
    }

    pub fn area(&self) -> f64 {
        self.moments().m00
    }

    /// `(min_x, min_y, max_x, max_y)` of the boundary points.
    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            (first.0, first.1, first.0, first.1),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        ))
    }
}

/// Outer contours of every 8-connected region in `mask`, in raster order of
/// each region's first pixel.
pub fn external_contours(mask: &Mask) -> Vec<Contour> {
    let (w, h) = (mask.width as usize, mask.height as usize);
    let mut labeled = vec![false; w * h];
    let mut contours = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if labeled[y * w + x] || !mask.get(x as u32, y as u32) {
                continue;
            }
            let size = flood(mask, &mut labeled, &mut stack, x, y);
            let points = trace_boundary(mask, (x as i64, y as i64), 4 * size + 16);
            contours.push(Contour { points });
        }
    }
    contours
}

fn flood(
    mask: &Mask,
    labeled: &mut [bool],
    stack: &mut Vec<(i64, i64)>,
    x: usize,
    y: usize,
) -> usize {
    let w = mask.width as usize;
    let mut size = 0;
    labeled[y * w + x] = true;
    stack.push((x as i64, y as i64));
    while let Some((px, py)) = stack.pop() {
        size += 1;
        for (dx, dy) in DIRS {
            let (nx, ny) = (px + dx, py + dy);
            if !mask.is_set(nx, ny) {
                continue;
            }
            let idx = ny as usize * w + nx as usize;
            if !labeled[idx] {
                labeled[idx] = true;
                stack.push((nx, ny));
            }
        }
    }
    size
}

fn trace_boundary(mask: &Mask, start: (i64, i64), limit: usize) -> Vec<(i32, i32)> {
    let mut points = vec![start];
    let mut current = start;
    // West of the first raster pixel is always background.
    let mut back = (start.0 - 1, start.1);

    while let Some((next, next_back)) = next_boundary_pixel(mask, current, back) {
        if current == start && points.len() > 1 && next == points[1] {
            break;
        }
        points.push(next);
        current = next;
        back = next_back;
        if points.len() > limit {
            log::warn!("contour trace exceeded {} points, truncating", limit);
            break;
        }
    }
    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
        .into_iter()
        .map(|(x, y)| (x as i32, y as i32))
        .collect()
}

/// Next boundary pixel clockwise from `back` around `p`, plus the background
/// pixel examined just before it (the new backtrack).
fn next_boundary_pixel(
    mask: &Mask,
    p: (i64, i64),
    back: (i64, i64),
) -> Option<((i64, i64), (i64, i64))> {
    let from = direction_index(back.0 - p.0, back.1 - p.1);
    let mut prev = back;
    for k in 1..=8 {
        let (dx, dy) = DIRS[(from + k) % 8];
        let q = (p.0 + dx, p.1 + dy);
        if mask.is_set(q.0, q.1) {
            return Some((q, prev));
        }
        prev = q;
    }
    None
}

fn direction_index(dx: i64, dy: i64) -> usize {
    DIRS.iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_area_and_centroid() {
        let mut mask = Mask::new(40, 40);
        // 11 x 31 pixels -> polygon through pixel centres is 10 x 30
        mask.fill_rect(5, 3, 11, 31);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let m = contours[0].moments();
        assert!((m.m00 - 300.0).abs() < 1e-9);
        let (cx, cy) = m.centroid().unwrap();
        assert!((cx - 10.0).abs() < 1e-9);
        assert!((cy - 18.0).abs() < 1e-9);
        assert_eq!(contours[0].bounds(), Some((5, 3, 15, 33)));
    }

    #[test]
    fn separate_regions_give_separate_contours() {
        let mut mask = Mask::new(30, 30);
        mask.fill_rect(1, 1, 5, 5);
        mask.fill_rect(20, 20, 6, 3);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert!((contours[0].area() - 16.0).abs() < 1e-9);
        assert!((contours[1].area() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn diagonal_neighbours_join_one_region() {
        let mut mask = Mask::new(5, 5);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        mask.set(3, 3, true);
        assert_eq!(external_contours(&mask).len(), 1);
    }

    #[test]
    fn holes_do_not_reduce_external_area() {
        let mut mask = Mask::new(20, 20);
        mask.fill_rect(2, 2, 11, 11);
        for y in 5..10 {
            for x in 5..10 {
                mask.set(x, y, false);
            }
        }
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert!((contours[0].area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_regions_have_no_centroid() {
        let mut mask = Mask::new(10, 10);
        mask.set(4, 4, true);
        mask.fill_rect(0, 8, 6, 1);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 2);
        for contour in contours {
            assert_eq!(contour.area(), 0.0);
            assert!(contour.moments().centroid().is_none());
        }
    }
}
