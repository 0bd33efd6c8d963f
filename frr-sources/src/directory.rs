//! Directory source
//!
//! Reads exports from a local mirror of the storage bucket
//! (`{root}/races/{year}/{round}.json`). Useful offline and in tests.

use frr_core::progress::ProgressTracker;
use frr_core::{ProgressFn, RaceKey, RaceSource, SourceError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: RaceKey) -> PathBuf {
        self.root.join(key.object_path())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RaceSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>> {
        async move {
            let path = self.path_for(key);
            let mut file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(SourceError::NotFound(path.display().to_string()));
                }
                Err(e) => return Err(e.into()),
            };

            let total = file.metadata().await?.len();
            let mut tracker = ProgressTracker::new();
            let mut body = Vec::with_capacity(total as usize);
            let mut chunk = vec![0u8; CHUNK_SIZE];

            loop {
                let n = file.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..n]);
                if let Some(percent) = tracker.observe(body.len() as u64, Some(total)) {
                    progress(percent);
                }
            }
            if let Some(percent) = tracker.finish() {
                progress(percent);
            }

            String::from_utf8(body).map_err(|_| SourceError::Encoding)
        }
        .boxed()
    }
}
