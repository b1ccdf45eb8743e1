#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Resumable, retrying HTTPS file fetcher.
//!
//! [`fetch`] downloads a single remote artifact to a destination path,
//! resuming from the on-disk byte count across restarts and retries,
//! and detecting corruption from truncated or duplicated chunks.
//!
//! Grounded on `crime_map_source`'s streamed-download pattern
//! (`reqwest::Client` → `bytes_stream()` → `tokio::fs::File`) and its
//! exponential-backoff retry loop, generalized to the full resume/retry/
//! corruption-detection contract.

mod error;
mod retry;

pub use error::{DownloadError, ErrorCode, is_retryable_status, is_transient};
pub use retry::RetryPolicy;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use addresskit_models::ProgressCallback;
use futures::StreamExt as _;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, LOCATION, RANGE};
use tokio::io::{AsyncSeekExt as _, AsyncWriteExt as _};

/// Maximum number of times a 416 may trigger a fresh restart before the
/// fetch gives up, to prevent a server that never honours `Range` from
/// looping forever.
const MAX_RANGE_RESTARTS: u32 = 3;

/// Options controlling one [`fetch`] call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Expected final size in bytes, if known in advance (enables
    /// overflow/mismatch corruption checks and percent-complete progress).
    pub expected_size: Option<u64>,
    /// Time-to-first-byte bound for each attempt.
    pub connect_timeout: Duration,
    /// Inactivity bound between received chunks.
    pub socket_timeout: Duration,
    /// Backoff schedule for retryable failures.
    pub retry: RetryPolicy,
    /// Minimum interval between progress callback updates.
    pub progress_interval: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            expected_size: None,
            connect_timeout: Duration::from_secs(300),
            socket_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// What happened while streaming one response body to disk.
enum StreamOutcome {
    /// The file is complete; total on-disk size.
    Complete(u64),
    /// A retryable condition occurred (timeout, reset, overflow,
    /// mismatch). The file is left in a resumable state (or already
    /// deleted, for corruption) and the caller should back off and
    /// retry the whole attempt.
    Retryable(ErrorCode),
}

/// Downloads `url` to `destination`, resuming and retrying as needed.
///
/// # Errors
///
/// Returns [`DownloadError`] if the fetch exhausts its retry budget, the
/// server returns a non-retryable status, or the destination cannot be
/// written.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    options: &FetchOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, DownloadError> {
    let mut current_url = url.to_string();
    let mut attempt: u32 = 0;
    let mut restart_count: u32 = 0;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
    }

    loop {
        let existing_size = tokio::fs::metadata(destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let start_offset = match options.expected_size {
            Some(expected) if existing_size >= expected => {
                delete_destination(destination).await?;
                0
            }
            _ => existing_size,
        };

        let is_resuming = start_offset > 0;
        progress.set_message(format!(
            "fetching {current_url} (resuming from {start_offset} bytes, attempt {attempt})"
        ));

        let mut request = client.get(&current_url);
        if is_resuming {
            request = request.header(RANGE, format!("bytes={start_offset}-"));
        }

        let send_result = tokio::time::timeout(options.connect_timeout, request.send()).await;

        let response = match send_result {
            Err(_elapsed) => {
                attempt += 1;
                if attempt > options.retry.max_retries {
                    return Err(terminal(
                        ErrorCode::ConnectTimeout,
                        attempt,
                        true,
                        start_offset,
                    ));
                }
                log::warn!("  connect timeout, retry {attempt}/{}", options.retry.max_retries);
                tokio::time::sleep(options.retry.delay_for(attempt)).await;
                continue;
            }
            Ok(Err(e)) => {
                if is_transient(&e) {
                    attempt += 1;
                    if attempt > options.retry.max_retries {
                        return Err(DownloadError::Http(e));
                    }
                    log::warn!("  transient error: {e}, retry {attempt}/{}", options.retry.max_retries);
                    tokio::time::sleep(options.retry.delay_for(attempt)).await;
                    continue;
                }
                return Err(DownloadError::Http(e));
            }
            Ok(Ok(resp)) => resp,
        };

        let status = response.status();

        if status.is_redirection() {
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
            else {
                return Err(terminal(ErrorCode::Http(status.as_u16()), attempt, false, start_offset));
            };
            log::info!("  following redirect to {location}");
            current_url = location;
            continue;
        }

        if status == StatusCode::OK && is_resuming {
            log::warn!("  server ignored Range request, restarting from scratch");
            delete_destination(destination).await?;
            continue;
        }

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            restart_count += 1;
            if restart_count > MAX_RANGE_RESTARTS {
                return Err(terminal(
                    ErrorCode::RangeNotSatisfiable,
                    attempt,
                    false,
                    start_offset,
                ));
            }
            log::warn!("  416 Range Not Satisfiable, restarting ({restart_count}/{MAX_RANGE_RESTARTS})");
            delete_destination(destination).await?;
            continue;
        }

        if is_retryable_status(status) {
            attempt += 1;
            if attempt > options.retry.max_retries {
                return Err(terminal(
                    ErrorCode::Http(status.as_u16()),
                    attempt,
                    true,
                    start_offset,
                ));
            }
            log::warn!("  HTTP {status}, retry {attempt}/{}", options.retry.max_retries);
            tokio::time::sleep(options.retry.delay_for(attempt)).await;
            continue;
        }

        if !status.is_success() {
            return Err(terminal(
                ErrorCode::Http(status.as_u16()),
                attempt,
                false,
                start_offset,
            ));
        }

        let append = status == StatusCode::PARTIAL_CONTENT;
        let expected_remaining = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .or_else(|| options.expected_size.map(|total| total.saturating_sub(start_offset)));

        match stream_to_file(
            response,
            destination,
            start_offset,
            append,
            expected_remaining,
            options,
            progress,
        )
        .await?
        {
            StreamOutcome::Complete(total) => {
                progress.finish(format!("fetched {total} bytes"));
                return Ok(total);
            }
            StreamOutcome::Retryable(code) => {
                attempt += 1;
                if attempt > options.retry.max_retries {
                    let bytes_now = tokio::fs::metadata(destination)
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                    return Err(terminal(code, attempt, true, bytes_now));
                }
                log::warn!("  {code:?}, retry {attempt}/{}", options.retry.max_retries);
                tokio::time::sleep(options.retry.delay_for(attempt)).await;
            }
        }
    }
}

/// Streams one response body to `destination`, appending if `append`,
/// applying the socket-inactivity timeout and the two corruption checks.
#[allow(clippy::too_many_arguments)]
async fn stream_to_file(
    response: reqwest::Response,
    destination: &Path,
    start_offset: u64,
    append: bool,
    expected_remaining: Option<u64>,
    options: &FetchOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<StreamOutcome, DownloadError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(!append)
        .open(destination)
        .await
        .map_err(|e| DownloadError::Io {
            path: destination.display().to_string(),
            source: e,
        })?;

    if append {
        file.seek(std::io::SeekFrom::Start(start_offset))
            .await
            .map_err(|e| DownloadError::Io {
                path: destination.display().to_string(),
                source: e,
            })?;
    }

    if let Some(total) = expected_remaining.map(|r| r + start_offset) {
        progress.set_total(total);
        progress.set_position(start_offset);
    }

    let overflow_bound = expected_remaining.map(|expected| {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (expected as f64 * 1.01) as u64;
        scaled.max(expected.saturating_add(1024))
    });

    let mut stream = response.bytes_stream();
    let mut session_bytes: u64 = 0;
    let mut last_progress_at = Instant::now();

    loop {
        let next = tokio::time::timeout(options.socket_timeout, stream.next()).await;

        let chunk = match next {
            Err(_elapsed) => {
                return Ok(StreamOutcome::Retryable(ErrorCode::SocketTimeout));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                if is_transient(&e) {
                    return Ok(StreamOutcome::Retryable(ErrorCode::ConnectionReset));
                }
                return Err(DownloadError::Http(e));
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::Io {
                path: destination.display().to_string(),
                source: e,
            })?;

        session_bytes += chunk.len() as u64;

        if let Some(bound) = overflow_bound
            && session_bytes > bound
        {
            drop(file);
            delete_destination(destination).await?;
            return Ok(StreamOutcome::Retryable(ErrorCode::DataOverflow));
        }

        if last_progress_at.elapsed() >= options.progress_interval {
            progress.set_position(start_offset + session_bytes);
            last_progress_at = Instant::now();
        }
    }

    file.flush().await.map_err(|e| DownloadError::Io {
        path: destination.display().to_string(),
        source: e,
    })?;
    drop(file);

    let final_size = tokio::fs::metadata(destination)
        .await
        .map(|m| m.len())
        .map_err(|e| DownloadError::Io {
            path: destination.display().to_string(),
            source: e,
        })?;

    if let Some(expected_total) = expected_remaining.map(|r| r + start_offset)
        && final_size != expected_total
    {
        delete_destination(destination).await?;
        return Ok(StreamOutcome::Retryable(ErrorCode::SizeMismatch));
    }

    progress.set_position(final_size);
    Ok(StreamOutcome::Complete(final_size))
}

async fn delete_destination(destination: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(destination).await {
        Ok(()) | Err(_) if !destination.exists() => Ok(()),
        Err(e) => Err(DownloadError::Io {
            path: destination.display().to_string(),
            source: e,
        }),
    }
}

fn terminal(code: ErrorCode, attempt: u32, retryable: bool, bytes_transferred: u64) -> DownloadError {
    DownloadError::Terminal {
        code,
        attempt,
        retryable,
        bytes_transferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_bound_respects_minimum_margin() {
        let tiny_expected = 10u64;
        #[allow(clippy::cast_precision_loss)]
        let scaled = (tiny_expected as f64 * 1.01) as u64;
        let bound = scaled.max(tiny_expected + 1024);
        assert_eq!(bound, tiny_expected + 1024);
    }

    #[tokio::test]
    async fn delete_destination_is_idempotent() {
        let path = std::env::temp_dir().join("addresskit_fetch_delete_test.bin");
        let _ = tokio::fs::write(&path, b"hello").await;
        delete_destination(&path).await.unwrap();
        assert!(!path.exists());
        delete_destination(&path).await.unwrap();
    }
}
