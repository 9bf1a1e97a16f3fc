use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use super::CameraStats;
use crate::frame::Frame;

/// In-memory frame list, played once in order.
///
/// An `Err` entry is handed out as a failed read; a connect error makes
/// `connect` fail like an unreachable device.
pub(super) struct ReplaySource {
    items: VecDeque<Result<Frame>>,
    total: usize,
    frame_count: u64,
    connect_error: Option<String>,
}

impl ReplaySource {
    pub(super) fn new(items: Vec<Result<Frame>>) -> Self {
        Self {
            total: items.len(),
            items: items.into(),
            frame_count: 0,
            connect_error: None,
        }
    }

    pub(super) fn unreachable(reason: String) -> Self {
        Self {
            connect_error: Some(reason),
            ..Self::new(Vec::new())
        }
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        if let Some(reason) = &self.connect_error {
            return Err(anyhow!("replay source unreachable: {}", reason));
        }
        log::info!("CameraSource: replaying {} item(s)", self.total);
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.items.pop_front() {
            Some(Ok(frame)) => {
                self.frame_count += 1;
                Ok(Some(frame))
            }
            Some(Err(err)) => Err(err.context("replayed read failure")),
            None => Ok(None),
        }
    }

    pub(super) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: super::REPLAY_URL.to_string(),
            backend: "replay",
        }
    }
}
