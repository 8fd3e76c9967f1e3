//! HTTP download primitive (§4.G): `reqwest`'s `bytes_stream` driven into
//! a buffer chunk by chunk, with a progress callback invoked after each
//! chunk. Nothing is written to disk here — callers decide where bytes
//! land via [`stackpatch_core::ports::PatchStore`].

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use stackpatch_core::entities::{DownloadContext, DownloadTimings};
use stackpatch_core::error::{Error, NetError};
use stackpatch_core::ports::{Downloader, ProgressCallback};

pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn ticks() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0)
}

/// Maps a `reqwest::Error` onto the §7 network taxonomy. `reqwest` does
/// not expose a stable enum for this, so this inspects the error's
/// classification methods in the order the taxonomy lists them.
fn classify_reqwest_error(e: &reqwest::Error) -> NetError {
    if e.is_timeout() {
        NetError::Timeout
    } else if e.is_connect() {
        NetError::Refused
    } else if e.is_builder() || e.is_request() {
        NetError::UnknownScheme
    } else if e.is_body() || e.is_decode() {
        NetError::Disconnect
    } else {
        NetError::Disconnect
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn http_get(
        &self,
        url: &str,
        progress: &ProgressCallback<'_>,
    ) -> Result<DownloadContext, Error> {
        let time_start = ticks();
        let started_at = Instant::now();

        if !progress(0, 0) {
            return Err(Error::Cancelled);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Net(classify_reqwest_error(&e)))?;

        let time_ping = ticks();

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Net(NetError::Http(response.status().as_u16())));
        }

        let total_bytes = response.content_length().unwrap_or(0);
        let mut buffer: Vec<u8> = Vec::with_capacity(total_bytes as usize);
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Net(classify_reqwest_error(&e)))?;
            buffer.extend_from_slice(&chunk);
            downloaded += chunk.len() as u64;
            if !progress(downloaded, total_bytes) {
                return Err(Error::Cancelled);
            }
        }

        let _ = started_at;
        let time_end = ticks();

        Ok(DownloadContext {
            buffer,
            timings: DownloadTimings {
                time_start,
                time_ping,
                time_end,
            },
        })
    }
}
