use crate::{Error, Result, config::DownloadConfig};
use reqwest::header::ACCEPT;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Fetches result files and source images with a fixed-delay retry loop.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
    max_content_length: u64,
    request_timeout: Duration,
}

impl Downloader {
    pub fn new(config: &DownloadConfig, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            max_content_length: config.max_content_length,
            request_timeout,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Attempting to download image from: {}", url);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.fetch_once(url).await {
                Ok(bytes) => {
                    info!("Successfully downloaded image, size: {} bytes", bytes.len());
                    return Ok(bytes);
                }
                Err(e) => {
                    last_error = e.to_string();
                    let remaining = self.max_attempts - attempt;
                    if remaining > 0 {
                        warn!(
                            "Download failed ({}), retrying ({} attempts left)...",
                            last_error, remaining
                        );
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        warn!("Giving up on {} after {} attempts", url, self.max_attempts);
        Err(Error::DownloadExhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "image/*, application/octet-stream")
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::remote(format!(
                "Request failed with status code {}",
                status.as_u16()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_content_length {
                return Err(self.too_large(length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let length = (body.len() + chunk.len()) as u64;
            if length > self.max_content_length {
                return Err(self.too_large(length));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn too_large(&self, length: u64) -> Error {
        Error::remote(format!(
            "Response of {} bytes exceeds the {} byte limit",
            length, self.max_content_length
        ))
    }
}
