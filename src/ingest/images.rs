//! Still-image directory source for `dir://<path>` URLs.
//!
//! Files with a png/jpg/jpeg extension are played in lexical order. The end of
//! the listing is the end of the stream.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use super::{CameraConfig, CameraStats};
use crate::frame::{ColorEncoding, Frame};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub(super) struct ImageDirSource {
    config: CameraConfig,
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub(super) fn new(config: CameraConfig, dir: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
            config,
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("open image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let wanted = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if wanted && path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "CameraSource: connected to {} ({} image(s))",
            self.config.url,
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        let frame = Frame::new(image.into_raw(), width, height, ColorEncoding::Rgb)?;
        Ok(Some(frame))
    }

    pub(super) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.cursor as u64,
            url: self.config.url.clone(),
            backend: "images",
        }
    }
}
