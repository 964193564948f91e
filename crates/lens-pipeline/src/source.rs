//! Frame acquisition.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to list {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no images found in {0}")]
    NoImages(PathBuf),
    #[error("frame source failed: {0}")]
    Acquisition(String),
}

/// Pull-based frame producer.
///
/// `Ok(None)` marks the end of the stream; an error ends it abnormally.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Image files of a directory in lexicographic order.
#[derive(Debug)]
pub struct ImageDirSource {
    pending: VecDeque<PathBuf>,
    current: Option<PathBuf>,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FrameError> {
        let dir = dir.as_ref();
        let io_err = |source| FrameError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(FrameError::NoImages(dir.to_path_buf()));
        }
        paths.sort();
        debug!("{} images in {}", paths.len(), dir.display());
        Ok(Self {
            pending: paths.into(),
            current: None,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Path of the frame most recently returned.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let img = image::open(&path).map_err(|source| FrameError::Decode {
            path: path.clone(),
            source,
        })?;
        self.current = Some(path);
        Ok(Some(img.to_rgb8()))
    }
}

/// In-memory frames, yielded in order.
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<RgbImage>,
}

impl VecSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        Ok(self.frames.pop_front())
    }
}
