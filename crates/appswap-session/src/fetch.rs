use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use appswap_core::{UpdateError, UpdaterConfig};
use reqwest::blocking::Client;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams release archives to disk over a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &UpdaterConfig) -> std::result::Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            // Large bundles on slow links must not be cut off mid-transfer.
            .timeout(None::<Duration>)
            .build()
            .map_err(UpdateError::download)?;
        Ok(Self { client })
    }

    /// Downloads `url` into `destination`, calling `on_progress` with a 0-100
    /// percentage whenever the whole-number value changes. Progress is not
    /// reported when the server declares no content length. On error the
    /// destination file must be treated as unusable.
    pub fn download<Progress>(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Progress,
    ) -> std::result::Result<u64, UpdateError>
    where
        Progress: FnMut(f64),
    {
        self.download_inner(url, destination, on_progress)
            .map_err(UpdateError::download)
    }

    fn download_inner<Progress>(
        &self,
        url: &str,
        destination: &Path,
        mut on_progress: Progress,
    ) -> Result<u64>
    where
        Progress: FnMut(f64),
    {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("server rejected request to {url}"))?;

        let total = response.content_length().filter(|total| *total > 0);
        tracing::info!(url, total_bytes = ?total, "downloading update");

        let file = File::create(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0_u8; CHUNK_SIZE];
        let mut downloaded = 0_u64;
        let mut last_reported = None;

        loop {
            let read = response
                .read(&mut buffer)
                .with_context(|| format!("failed reading response body from {url}"))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .with_context(|| format!("failed writing {}", destination.display()))?;
            downloaded += read as u64;

            if let Some(total) = total {
                let percent = (downloaded as f64 / total as f64 * 100.0).min(100.0);
                let whole = percent.floor() as u64;
                if last_reported != Some(whole) {
                    last_reported = Some(whole);
                    on_progress(percent);
                }
            }
        }

        writer
            .flush()
            .with_context(|| format!("failed writing {}", destination.display()))?;

        if let Some(total) = total {
            if downloaded < total {
                return Err(anyhow!(
                    "download truncated: received {downloaded} of {total} bytes"
                ));
            }
        }

        tracing::debug!(bytes = downloaded, path = %destination.display(), "download finished");
        Ok(downloaded)
    }
}
