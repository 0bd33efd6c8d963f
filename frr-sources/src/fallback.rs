//! Local API source
//!
//! Queries `{base}/api/race?year=..&round=..`, an endpoint returning the
//! same schema as the object storage exports. In development this is the
//! server's own synthetic race generator.

use crate::http;
use frr_core::{ProgressFn, RaceKey, RaceSource, SourceError};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

pub struct LocalApiSource {
    client: reqwest::Client,
    base_url: String,
}

impl LocalApiSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http::default_client(),
            base_url: base_url.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/race", self.base_url.trim_end_matches('/'))
    }
}

impl RaceSource for LocalApiSource {
    fn name(&self) -> &str {
        "local-api"
    }

    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>> {
        async move {
            let endpoint = self.endpoint();
            debug!("Fetching {} from local API: {}", key, endpoint);
            let request = self
                .client
                .get(&endpoint)
                .query(&[("year", key.year as u32), ("round", key.round as u32)]);
            http::download(request, progress).await
        }
        .boxed()
    }
}
