//! Object storage source
//!
//! Race exports are uploaded to `races/{year}/{round}.json` under a bucket.
//! The bucket can be addressed either as a plain HTTP root (any static host
//! or S3-style public bucket) or through the Firebase Storage download API.

use crate::http;
use frr_core::{ProgressFn, RaceKey, RaceSource, SourceError};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

/// How object paths are turned into download URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLayout {
    /// `{root}/races/{year}/{round}.json`
    Plain { root: String },
    /// Firebase Storage REST download URL for `bucket`
    Firebase { bucket: String },
}

pub struct ObjectStorageSource {
    client: reqwest::Client,
    layout: StorageLayout,
}

impl ObjectStorageSource {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            client: http::default_client(),
            layout,
        }
    }

    /// Resolve the download URL for a race
    pub fn resolve_url(&self, key: RaceKey) -> String {
        let path = key.object_path();
        match &self.layout {
            StorageLayout::Plain { root } => format!("{}/{}", root.trim_end_matches('/'), path),
            StorageLayout::Firebase { bucket } => format!(
                "https://firebasestorage.googleapis.com/v0/b/{}/o/{}?alt=media",
                bucket,
                path.replace('/', "%2F")
            ),
        }
    }
}

impl RaceSource for ObjectStorageSource {
    fn name(&self) -> &str {
        "object-storage"
    }

    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>> {
        async move {
            let url = self.resolve_url(key);
            debug!("Fetching {} from object storage: {}", key, url);
            http::download(self.client.get(&url), progress).await
        }
        .boxed()
    }
}
