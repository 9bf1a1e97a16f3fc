//! Observability sink: draws the cycle's outcome onto the frame and optionally
//! keeps JPEG snapshots. Nothing here feeds back into steering.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::control::CycleReport;
use crate::frame::Frame;
use crate::steer::{center_of, SteeringCommand};

/// Marker colors, by class priority.
const PALETTE: [[u8; 3]; 4] = [[0, 255, 0], [255, 255, 0], [0, 255, 255], [255, 0, 255]];
const BAND_BGR: [u8; 3] = [200, 200, 200];
const BAR_HEIGHT: u32 = 8;

/// Draw detections, the centred band and a command bar.
pub fn annotate(frame: &mut Frame, report: &CycleReport, tolerance_px: i32) {
    let (w, h) = (frame.width as i64, frame.height as i64);

    let center = center_of(frame.width) as i64;
    for x in [center - tolerance_px as i64, center + tolerance_px as i64] {
        // dashed
        for y in (0..h).filter(|y| (y / 4) % 2 == 0) {
            frame.put_bgr(x, y, BAND_BGR);
        }
    }

    for (index, observation) in report.observations.iter().enumerate() {
        let Some((x, y)) = observation.detection.position() else {
            continue;
        };
        let color = PALETTE[index % PALETTE.len()];
        if let Some(radius) = observation.detection.display_radius() {
            draw_ring(frame, x as i64, y as i64, radius.round() as i64, color);
        }
        frame.fill_disk(x as i64, y as i64, 3, color);
    }

    let bar_top = h - BAR_HEIGHT as i64;
    let third = w / 3;
    let (x0, width, color) = match report.decision.command {
        SteeringCommand::TurnLeft => (0, third, [0, 200, 255]),
        SteeringCommand::Forward => (third, w - 2 * third, [0, 220, 0]),
        SteeringCommand::TurnRight => (w - third, third, [0, 200, 255]),
        SteeringCommand::Backward => (0, w, [255, 80, 0]),
        SteeringCommand::Stop => (0, w, [90, 90, 90]),
    };
    frame.fill_rect(x0, bar_top, width, BAR_HEIGHT as i64, color);
}

fn draw_ring(frame: &mut Frame, cx: i64, cy: i64, radius: i64, bgr: [u8; 3]) {
    let outer = radius + 1;
    let (lo, hi) = ((radius - 1).max(0).pow(2), outer * outer);
    for y in (cy - outer)..=(cy + outer) {
        for x in (cx - outer)..=(cx + outer) {
            let d2 = (x - cx).pow(2) + (y - cy).pow(2);
            if d2 >= lo && d2 <= hi {
                frame.put_bgr(x, y, bgr);
            }
        }
    }
}

/// Writes every `every`-th offered frame to `dir` as JPEG.
#[derive(Debug)]
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    offered: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(dir: impl AsRef<Path>, every: u64) -> Result<Self> {
        if every == 0 {
            return Err(anyhow!("snapshot interval must be at least 1"));
        }
        if cfg!(not(feature = "image-io")) {
            return Err(anyhow!("snapshots require the image-io feature"));
        }
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
        Ok(Self {
            dir,
            every,
            offered: 0,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path written, if this frame was due.
    pub fn offer(&mut self, frame: &Frame) -> Result<Option<PathBuf>> {
        self.offered += 1;
        if (self.offered - 1) % self.every != 0 {
            return Ok(None);
        }
        let path = self.dir.join(format!("frame-{:06}.jpg", frame.sequence));
        write_jpeg(frame, &path)?;
        self.written += 1;
        log::debug!("SnapshotSink: wrote {}", path.display());
        Ok(Some(path))
    }
}

#[cfg(feature = "image-io")]
fn write_jpeg(frame: &Frame, path: &Path) -> Result<()> {
    use image::codecs::jpeg::JpegEncoder;
    use image::RgbImage;
    use std::io::BufWriter;

    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let [b, g, r] = frame.bgr(x, y);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    let img = RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| anyhow!("snapshot buffer size mismatch"))?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("create snapshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, 85))
        .with_context(|| format!("encode snapshot {}", path.display()))?;
    Ok(())
}

#[cfg(not(feature = "image-io"))]
fn write_jpeg(_frame: &Frame, _path: &Path) -> Result<()> {
    Err(anyhow!("snapshots require the image-io feature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ClassObservation;
    use crate::detect::Detection;
    use crate::steer::Decision;

    fn report(command: SteeringCommand, detection: Detection) -> CycleReport {
        CycleReport {
            sequence: 1,
            frame_width: 120,
            observations: vec![ClassObservation {
                name: "ball".to_string(),
                detection,
                distance: None,
            }],
            decision: Decision {
                command,
                driver: detection.valid.then_some(0),
            },
            applied: true,
        }
    }

    #[test]
    fn draws_marker_band_and_bar() {
        let mut frame = Frame::filled(120, 90, [0, 0, 0]);
        annotate(
            &mut frame,
            &report(SteeringCommand::TurnLeft, Detection::circle(30, 40, 10.0)),
            15,
        );
        assert_eq!(frame.bgr(30, 40), PALETTE[0]);
        assert_eq!(frame.bgr(40, 40), PALETTE[0]);
        assert_eq!(frame.bgr(45, 0), BAND_BGR);
        assert_eq!(frame.bgr(75, 0), BAND_BGR);
        assert_eq!(frame.bgr(5, 85), [0, 200, 255]);
        assert_eq!(frame.bgr(100, 85), [0, 0, 0]);
    }

    #[test]
    fn absent_detection_draws_no_marker() {
        let mut frame = Frame::filled(120, 90, [0, 0, 0]);
        annotate(&mut frame, &report(SteeringCommand::Stop, Detection::absent()), 15);
        assert_eq!(frame.bgr(0, 40), [0, 0, 0]);
        assert_eq!(frame.bgr(100, 85), [90, 90, 90]);
    }

    #[cfg(feature = "image-io")]
    #[test]
    fn snapshots_every_nth_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = SnapshotSink::new(dir.path(), 2)?;
        for seq in 1..=5 {
            let frame = Frame::filled(16, 16, [10, 20, 30]).with_sequence(seq);
            sink.offer(&frame)?;
        }
        assert_eq!(sink.written(), 3);
        assert!(dir.path().join("frame-000001.jpg").exists());
        assert!(!dir.path().join("frame-000002.jpg").exists());
        assert!(dir.path().join("frame-000005.jpg").exists());
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = std::env::temp_dir();
        let err = SnapshotSink::new(dir, 0).unwrap_err();
        assert!(err.to_string().contains("interval"), "{err}");
    }

    #[cfg(not(feature = "image-io"))]
    #[test]
    fn snapshots_need_image_io() {
        let err = SnapshotSink::new(std::env::temp_dir(), 30).unwrap_err();
        assert!(err.to_string().contains("image-io"), "{err}");
    }
}
