// Gradient Hough transform for circles.
//
// Edge pixels (thinned Sobel magnitude above a threshold) vote along their gradient
// direction, both ways, for every radius in the configured band. Accumulator peaks
// above the vote threshold become centres, strongest first, with a minimum spacing
// between accepted centres. Each centre's radius is the most supported edge distance.

use super::Plane;

/// Parameters mirroring the usual HOUGH_GRADIENT knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughParams {
    /// Inverse accumulator resolution (1.0 = one cell per pixel).
    pub dp: f32,
    /// Minimum distance between accepted centres, in pixels.
    pub min_dist: f32,
    /// Gradient magnitude an edge pixel must reach.
    pub edge_threshold: f32,
    /// Votes a centre needs to be reported.
    pub votes_threshold: u32,
    pub min_radius: u32,
    /// 0 = bounded only by the image size.
    pub max_radius: u32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            dp: 1.2,
            min_dist: 50.0,
            edge_threshold: 100.0,
            votes_threshold: 30,
            min_radius: 20,
            max_radius: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleCandidate {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub votes: u32,
}

struct Edge {
    x: f32,
    y: f32,
    ux: f32,
    uy: f32,
}

/// Detect circles in `img`. Candidates come back strongest first.
pub fn hough_circles(img: &Plane, params: &HoughParams) -> Vec<CircleCandidate> {
    if img.width < 3 || img.height < 3 || params.dp <= 0.0 {
        return Vec::new();
    }
    let max_radius = if params.max_radius == 0 {
        img.width.max(img.height) as u32
    } else {
        params.max_radius
    };
    let min_radius = params.min_radius.max(1);
    if min_radius > max_radius {
        return Vec::new();
    }

    let edges = detect_edges(img, params.edge_threshold);
    if edges.is_empty() {
        return Vec::new();
    }

    let aw = (img.width as f32 / params.dp).ceil() as usize + 1;
    let ah = (img.height as f32 / params.dp).ceil() as usize + 1;
    let mut acc = vec![0u32; aw * ah];
    let (w, h) = (img.width as f32, img.height as f32);

    for edge in &edges {
        for r in min_radius..=max_radius {
            let r = r as f32;
            for sign in [-1.0f32, 1.0] {
                let cx = edge.x + sign * r * edge.ux;
                let cy = edge.y + sign * r * edge.uy;
                if cx < 0.0 || cy < 0.0 || cx >= w || cy >= h {
                    continue;
                }
                let ax = (cx / params.dp) as usize;
                let ay = (cy / params.dp) as usize;
                acc[ay * aw + ax] += 1;
            }
        }
    }

    let mut peaks = Vec::new();
    for ay in 1..ah - 1 {
        for ax in 1..aw - 1 {
            let idx = ay * aw + ax;
            let v = acc[idx];
            if v > params.votes_threshold
                && v > acc[idx - 1]
                && v >= acc[idx + 1]
                && v > acc[idx - aw]
                && v >= acc[idx + aw]
            {
                peaks.push((v, ax, ay));
            }
        }
    }
    // strongest first; sort is stable so ties keep raster order
    peaks.sort_by(|a, b| b.0.cmp(&a.0));

    let min_dist2 = params.min_dist * params.min_dist;
    let mut circles: Vec<CircleCandidate> = Vec::new();
    for (votes, ax, ay) in peaks {
        let cx = (ax as f32 + 0.5) * params.dp;
        let cy = (ay as f32 + 0.5) * params.dp;
        let too_close = circles.iter().any(|c| {
            let (dx, dy) = (c.x - cx, c.y - cy);
            dx * dx + dy * dy < min_dist2
        });
        if too_close {
            continue;
        }
        if let Some(radius) = best_radius(&edges, cx, cy, min_radius, max_radius) {
            circles.push(CircleCandidate {
                x: cx,
                y: cy,
                radius,
                votes,
            });
        }
    }
    circles
}

fn best_radius(edges: &[Edge], cx: f32, cy: f32, min_radius: u32, max_radius: u32) -> Option<f32> {
    let mut hist = vec![0u32; (max_radius - min_radius + 1) as usize];
    for edge in edges {
        let d = ((edge.x - cx).powi(2) + (edge.y - cy).powi(2)).sqrt().round();
        if d < min_radius as f32 || d > max_radius as f32 {
            continue;
        }
        hist[(d as u32 - min_radius) as usize] += 1;
    }
    let (best, count) = hist
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
    if *count == 0 {
        return None;
    }
    Some((best as u32 + min_radius) as f32)
}

/// Sobel gradients, thinned by non-maximum suppression along the gradient.
fn detect_edges(img: &Plane, threshold: f32) -> Vec<Edge> {
    let (w, h) = (img.width, img.height);
    let mut gx = Plane::new(w, h);
    let mut gy = Plane::new(w, h);
    let mut mag = Plane::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as isize, y as isize);
            let p = |dx: isize, dy: isize| img.get_clamped(xi + dx, yi + dy);
            let sx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            let sy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            gx.set(x, y, sx);
            gy.set(x, y, sy);
            mag.set(x, y, (sx * sx + sy * sy).sqrt());
        }
    }

    let mut edges = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let m = mag.get(x, y);
            if m < threshold || m == 0.0 {
                continue;
            }
            let (sx, sy) = (gx.get(x, y), gy.get(x, y));
            let mut angle = sy.atan2(sx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            let (dx, dy): (isize, isize) = if !(22.5..157.5).contains(&angle) {
                (1, 0)
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (0, 1)
            } else {
                (-1, 1)
            };
            let (xi, yi) = (x as isize, y as isize);
            let ahead = mag.get_clamped(xi + dx, yi + dy);
            let behind = mag.get_clamped(xi - dx, yi - dy);
            if m >= ahead && m > behind {
                edges.push(Edge {
                    x: x as f32,
                    y: y as f32,
                    ux: sx / m,
                    uy: sy / m,
                });
            }
        }
    }
    edges
}
