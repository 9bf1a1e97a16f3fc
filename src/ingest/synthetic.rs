//! Synthetic arena for `stub://` URLs.
//!
//! A dark, low-saturation noisy floor with a red ball sweeping left to right and a
//! pink goal marker near the top-right corner. The ball leaves the frame for part
//! of every sweep, so the absent-target path is exercised too.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CameraConfig, CameraStats};
use crate::frame::{ColorEncoding, Frame};

pub const BALL_BGR: [u8; 3] = [30, 30, 220];
pub const GOAL_BGR: [u8; 3] = [200, 40, 230];

/// Frames per full ball sweep.
const SWEEP_FRAMES: u64 = 120;
const FLOOR_LEVEL: i16 = 60;
const FLOOR_JITTER: i16 = 6;

pub(super) struct SyntheticCamera {
    config: CameraConfig,
    rng: StdRng,
    frame_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticCamera {
    pub(super) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(0x5e4f0),
            frame_count: 0,
            next_due: None,
        }
    }

    /// Synthetic sources are always "connected".
    pub(super) fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} ({}x{}, synthetic)",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.pace();
        let frame = self.render(self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    /// Ball centre for frame `index`, `None` while it is off-screen.
    pub(super) fn ball_center(&self, index: u64) -> Option<(i64, i64)> {
        let (x, y, r) = self.ball_track(index);
        (x - r >= 0 && x + r < self.config.width as i64).then_some((x, y))
    }

    /// Unclipped ball centre and radius; x runs from `-2r` to `width + 2r`.
    fn ball_track(&self, index: u64) -> (i64, i64, i64) {
        let (w, h) = (self.config.width as i64, self.config.height as i64);
        let r = (h / 10).clamp(20, 100);
        let travel = w + 4 * r;
        let x = -2 * r + (index % SWEEP_FRAMES) as i64 * travel / SWEEP_FRAMES as i64;
        (x, h / 2 + h / 8, r)
    }

    fn render(&mut self, index: u64) -> Result<Frame> {
        let (w, h) = (self.config.width, self.config.height);
        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        for _ in 0..(w as usize * h as usize) {
            let base = FLOOR_LEVEL + self.rng.gen_range(-FLOOR_JITTER..=FLOOR_JITTER);
            for _ in 0..3 {
                let jitter = self.rng.gen_range(-2i16..=2);
                data.push((base + jitter).clamp(0, 255) as u8);
            }
        }
        let mut frame = Frame::new(data, w, h, ColorEncoding::Bgr)?;

        let (w, h) = (w as i64, h as i64);
        frame.fill_rect(w * 3 / 4, h / 10, w / 8, h / 6, GOAL_BGR);

        let (x, y, r) = self.ball_track(index);
        frame.fill_disk(x, y, r, BALL_BGR);

        Ok(frame)
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let period = Duration::from_secs(1) / self.config.target_fps;
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.unwrap_or(now).max(now) + period);
    }

    pub(super) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
            backend: "synthetic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{pink_ranges, red_ranges, segment, ColorClassSpec};

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(CameraConfig {
            url: "stub://arena".to_string(),
            width: 320,
            height: 240,
            target_fps: 0,
            max_frames: None,
        })
    }

    #[test]
    fn ball_and_goal_segment_cleanly() -> Result<()> {
        let mut cam = camera();
        let index = SWEEP_FRAMES / 2;
        let frame = cam.render(index)?;
        let hsv = frame.to_hsv();

        let red = segment(&hsv, &ColorClassSpec::new("ball", red_ranges())?);
        let pink = segment(&hsv, &ColorClassSpec::new("goal", pink_ranges())?);

        let (cx, cy) = cam.ball_center(index).expect("ball on screen mid-sweep");
        assert!(red.get(cx as u32, cy as u32));
        assert!(!red.get(2, 2));
        // 40x40 goal rectangle
        assert_eq!(pink.count(), 40 * 40);
        Ok(())
    }

    #[test]
    fn ball_leaves_the_frame_each_sweep() -> Result<()> {
        let mut cam = camera();
        assert!(cam.ball_center(0).is_none());
        let frame = cam.render(0)?;
        let red = segment(&frame.to_hsv(), &ColorClassSpec::new("ball", red_ranges())?);
        assert!(red.is_empty());
        Ok(())
    }

    #[test]
    fn frames_count_up() -> Result<()> {
        let mut cam = camera();
        cam.connect()?;
        assert!(cam.next_frame()?.is_some());
        assert!(cam.next_frame()?.is_some());
        assert_eq!(cam.stats().frames_captured, 2);
        Ok(())
    }
}
