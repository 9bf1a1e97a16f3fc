//! Camera sources.
//!
//! `CameraSource` picks a backend from the configured URL:
//! - `stub://<name>`: synthetic arena (always available)
//! - `dir://<path>`: still images from a directory (feature: image-io)
//! - `/dev/videoN`: V4L2 capture (feature: ingest-v4l2)
//! - `CameraSource::replay` / `replay_results`: frames supplied by the caller
//!
//! `connect` failing is fatal for startup. After that, `next_frame` returns
//! `Ok(None)` at end of stream and `Err` for a failed read; the control loop
//! treats both as the end of the run, not of the process.

#[cfg(feature = "image-io")]
mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod replay;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

pub(crate) const REPLAY_URL: &str = "replay://";

/// Camera settings. Width/height/fps are requests; devices may adjust them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Pacing for synthetic frames and requested device rate; 0 = unpaced.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://arena".to_string(),
            width: 640,
            height: 480,
            target_fps: 15,
            max_frames: None,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
    pub backend: &'static str,
}

pub struct CameraSource {
    backend: CameraBackend,
    max_frames: Option<u64>,
    delivered: u64,
    released: bool,
}

enum CameraBackend {
    Synthetic(synthetic::SyntheticCamera),
    Replay(replay::ReplaySource),
    #[cfg(feature = "image-io")]
    Images(images::ImageDirSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(v4l2::V4l2Camera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera frame size must be non-zero (got {}x{})",
                config.width,
                config.height
            ));
        }
        let max_frames = config.max_frames.filter(|n| *n > 0);
        let backend = if config.url.starts_with("stub://") {
            CameraBackend::Synthetic(synthetic::SyntheticCamera::new(config))
        } else if let Some(dir) = config.url.strip_prefix("dir://") {
            #[cfg(feature = "image-io")]
            {
                let dir = dir.to_string();
                CameraBackend::Images(images::ImageDirSource::new(config, &dir))
            }
            #[cfg(not(feature = "image-io"))]
            {
                let _ = dir;
                anyhow::bail!("dir:// camera sources require the image-io feature")
            }
        } else if config.url.starts_with("/dev/video") {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(v4l2::V4l2Camera::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!("V4L2 capture requires the ingest-v4l2 feature")
            }
        } else {
            return Err(anyhow!("unsupported camera url '{}'", config.url));
        };
        Ok(Self {
            backend,
            max_frames,
            delivered: 0,
            released: false,
        })
    }

    /// Source that plays `frames` once and then ends.
    pub fn replay(frames: Vec<Frame>) -> Self {
        Self::replay_results(frames.into_iter().map(Ok).collect())
    }

    /// Like `replay`, but an `Err` item surfaces from `next_frame` as a read
    /// failure at that point in the stream.
    pub fn replay_results(items: Vec<Result<Frame>>) -> Self {
        Self::from_replay(replay::ReplaySource::new(items))
    }

    /// Replay source whose `connect` always fails with `reason`.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::from_replay(replay::ReplaySource::unreachable(reason.into()))
    }

    fn from_replay(source: replay::ReplaySource) -> Self {
        Self {
            backend: CameraBackend::Replay(source),
            max_frames: None,
            delivered: 0,
            released: false,
        }
    }

    /// Cap the number of frames delivered; 0 removes the cap.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = (max_frames > 0).then_some(max_frames);
        self
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Replay(source) => source.connect(),
            #[cfg(feature = "image-io")]
            CameraBackend::Images(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Next frame, `Ok(None)` at end of stream.
    ///
    /// Frames carry a 1-based sequence number counted by this source.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(anyhow!("camera already released"));
        }
        if self.max_frames.is_some_and(|max| self.delivered >= max) {
            return Ok(None);
        }
        let frame = match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame()?,
            CameraBackend::Replay(source) => source.next_frame()?,
            #[cfg(feature = "image-io")]
            CameraBackend::Images(source) => source.next_frame()?,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame()?,
        };
        Ok(frame.map(|frame| {
            self.delivered += 1;
            frame.with_sequence(self.delivered)
        }))
    }

    pub fn is_healthy(&self) -> bool {
        if self.released {
            return false;
        }
        match &self.backend {
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
            _ => true,
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Replay(source) => source.stats(),
            #[cfg(feature = "image-io")]
            CameraBackend::Images(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Close the camera handle. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        #[cfg(feature = "ingest-v4l2")]
        if let CameraBackend::Device(source) = &mut self.backend {
            source.release();
        }
        let stats = self.stats();
        log::info!(
            "CameraSource: released {} after {} frame(s)",
            stats.url,
            stats.frames_captured
        );
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
