use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use timelapse_core::config::CaptureConfig;
use timelapse_scheduler::{CaptureError, ImageCapture};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Streams a webcam image to disk.
///
/// The body goes to `<destination>.part` first and is renamed into place
/// once complete; a failed download removes the partial file.
pub struct HttpImageCapture {
    client: reqwest::Client,
}

impl HttpImageCapture {
    pub fn new(timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl ImageCapture for HttpImageCapture {
    async fn capture(&self, url: &str, destination: &Path) -> Result<u64, CaptureError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CaptureError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CaptureError::Status {
                status: resp.status().as_u16(),
            });
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let part = part_path(destination);
        let result = async {
            let written = stream_to_file(resp, &part).await?;
            fs::rename(&part, destination).await?;
            Ok::<_, CaptureError>(written)
        }
        .await;
        if result.is_err() {
            // Best effort; the file may never have been created.
            let _ = fs::remove_file(&part).await;
        } else {
            debug!(%url, path = %destination.display(), "image stored");
        }
        result
    }
}

async fn stream_to_file(resp: reqwest::Response, path: &Path) -> Result<u64, CaptureError> {
    let mut file = fs::File::create(path).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CaptureError::Request(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
