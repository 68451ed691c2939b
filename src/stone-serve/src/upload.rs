use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use uuid::Uuid;

/// Persists uploaded image bytes and hands back where they went.
pub trait UploadStore: Send + Sync {
    fn save(&self, bytes: &[u8]) -> io::Result<PathBuf>;
}

/// Stores every upload as `<uuid>.jpg` under a directory.
pub struct DiskUploadStore {
    dir: PathBuf,
}

impl DiskUploadStore {
    pub fn new(dir: &Path) -> Self {
        DiskUploadStore {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl UploadStore for DiskUploadStore {
    fn save(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self
            .dir
            .join(format!("{}.jpg", Uuid::new_v4().simple()));
        fs::write(&path, bytes)?;

        debug!("Stored {} byte upload at {}", bytes.len(), path.display());

        Ok(path)
    }
}
