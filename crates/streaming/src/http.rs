//! `FrameSource` over the frame service's HTTP API.
//!
//! - `GET  {base}/metadata`
//! - `POST {base}/frames` with `{"indices": [...]}`
//! - `GET  {base}/annotations?start=S&end=E`

use foundation::{FrameIndex, FrameRange};
use tracing::debug;

use crate::protocol::{Annotation, EncodedFrame, FramesRequest, VideoMetadata, WireFrame};
use crate::source::{BoxFuture, FrameSource, SourceError};

#[derive(Debug, Clone)]
pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFrameSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn get_metadata(&self) -> Result<VideoMetadata, SourceError> {
        let resp = self
            .client
            .get(self.url("metadata"))
            .send()
            .await
            .map_err(|e| SourceError::with_source("metadata request failed", e))?;
        let resp = check_status(resp, "metadata")?;
        resp.json()
            .await
            .map_err(|e| SourceError::with_source("metadata response was not valid JSON", e))
    }

    async fn post_frames(&self, indices: Vec<FrameIndex>) -> Result<Vec<EncodedFrame>, SourceError> {
        let requested = indices.len();
        let resp = self
            .client
            .post(self.url("frames"))
            .json(&FramesRequest { indices })
            .send()
            .await
            .map_err(|e| SourceError::with_source("frame batch request failed", e))?;
        let resp = check_status(resp, "frames")?;
        let wire: Vec<WireFrame> = resp
            .json()
            .await
            .map_err(|e| SourceError::with_source("frame batch response was not valid JSON", e))?;
        debug!("frame batch returned {}/{requested} frames", wire.len());

        wire.into_iter()
            .map(|frame| {
                let index = frame.frame_index;
                frame
                    .decode()
                    .map_err(|e| SourceError::with_source(format!("frame {index} payload is not base64"), e))
            })
            .collect()
    }

    async fn get_annotations(&self, range: FrameRange) -> Result<Vec<Annotation>, SourceError> {
        let resp = self
            .client
            .get(self.url("annotations"))
            .query(&[("start", range.start), ("end", range.end)])
            .send()
            .await
            .map_err(|e| SourceError::with_source("annotation request failed", e))?;
        let resp = check_status(resp, "annotations")?;
        resp.json()
            .await
            .map_err(|e| SourceError::with_source("annotation response was not valid JSON", e))
    }
}

fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    resp.error_for_status()
        .map_err(|e| SourceError::with_source(format!("{what} request returned {status}"), e))
}

impl FrameSource for HttpFrameSource {
    fn metadata(&self) -> BoxFuture<'_, Result<VideoMetadata, SourceError>> {
        Box::pin(self.get_metadata())
    }

    fn fetch_frames(&self, indices: Vec<FrameIndex>) -> BoxFuture<'_, Result<Vec<EncodedFrame>, SourceError>> {
        Box::pin(self.post_frames(indices))
    }

    fn fetch_annotations(&self, range: FrameRange) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>> {
        Box::pin(self.get_annotations(range))
    }
}
