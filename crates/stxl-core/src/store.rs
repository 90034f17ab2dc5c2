//! Frame storage
//!
//! The camera delivers a finished FITS file, so storing a frame means writing
//! its bytes as-is. Callers needing another layout implement [`ImageStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CameraError, Result};
use crate::exposure::Frame;

/// Destination for captured frames
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, destination: &Path, frame: &Frame) -> Result<()>;
}

/// Writes frames to the local filesystem, creating parent directories
#[derive(Debug, Clone, Default)]
pub struct FileImageStore;

#[async_trait]
impl ImageStore for FileImageStore {
    async fn save(&self, destination: &Path, frame: &Frame) -> Result<()> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CameraError::Storage(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(destination, &frame.data)
            .await
            .map_err(|e| CameraError::Storage(format!("{}: {}", destination.display(), e)))?;

        debug!(path = %destination.display(), bytes = frame.data.len(), "Frame saved");
        Ok(())
    }
}

/// Keeps frames in memory, keyed by destination
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    frames: Mutex<HashMap<PathBuf, Frame>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, destination: impl AsRef<Path>) -> Option<Frame> {
        self.frames.lock().get(destination.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save(&self, destination: &Path, frame: &Frame) -> Result<()> {
        self.frames
            .lock()
            .insert(destination.to_path_buf(), frame.clone());
        Ok(())
    }
}
