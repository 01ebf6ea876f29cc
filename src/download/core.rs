//! Streaming asset download with progress tracking

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use log::{debug, warn};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UpdateError};
use crate::progress::{Reporter, UpdatePhase};

/// Write buffer size for the scratch file
const WRITE_BUFFER: usize = 80 * 1024;
/// Emit progress every 256KB
const PROGRESS_THRESHOLD: u64 = 256 * 1024;

/// Download `url` into `dest`, reporting `downloaded / content_length`.
///
/// On any failure the partial file is removed before returning.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    inactivity: Duration,
    reporter: &Reporter,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let result = stream_to_file(client, url, dest, inactivity, reporter, cancel).await;
    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(dest).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove partial download {}: {}", dest.display(), e);
    }
    result.map(|_| dest.to_path_buf())
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    inactivity: Duration,
    reporter: &Reporter,
    cancel: &CancellationToken,
) -> Result<u64> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
        response = client.get(url).send() => response?,
    };

    if !response.status().is_success() {
        return Err(UpdateError::Network(format!(
            "download of {} failed: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_bytes = response.content_length().filter(|len| *len > 0);
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_progress_bytes = 0u64;

    reporter.progress(UpdatePhase::Downloading, total_bytes.map(|_| 0.0));

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            next = timeout(inactivity, stream.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => break,
            Err(_) => {
                return Err(UpdateError::Network(format!(
                    "download timeout: no data received for {} seconds ({} bytes so far)",
                    inactivity.as_secs(),
                    downloaded
                )));
            }
        };

        writer.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if downloaded - last_progress_bytes >= PROGRESS_THRESHOLD {
            reporter.progress(UpdatePhase::Downloading, fraction(downloaded, total_bytes));
            last_progress_bytes = downloaded;
        }
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    if let Some(total) = total_bytes
        && downloaded != total
    {
        return Err(UpdateError::Network(format!(
            "download truncated: received {downloaded} of {total} bytes"
        )));
    }

    reporter.progress(UpdatePhase::Downloading, fraction(downloaded, total_bytes));
    debug!("Downloaded {} bytes to {}", downloaded, dest.display());
    Ok(downloaded)
}

fn fraction(downloaded: u64, total: Option<u64>) -> Option<f32> {
    total.map(|t| (downloaded as f64 / t as f64) as f32)
}
