// src/remote/client.rs

//! HTTPS client for manifest queries and build downloads
//!
//! Wraps reqwest with the transport rules the updater relies on:
//! - TLS is mandatory; failing to set it up is reported before any request
//! - Plain `http` URLs are rejected up front
//! - Redirects may never go from a secure to a less secure scheme

use super::FetchError;
use super::download::CancelToken;
use crate::progress::ProgressTracker;
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Maximum redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Buffer size for streaming downloads (64 KB)
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// HTTP client wrapper enforcing secure transport
pub struct UpdateClient {
    client: Client,
}

impl UpdateClient {
    /// Create a client
    ///
    /// `request_timeout` bounds the whole request including the body; pass
    /// `None` for large downloads.
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .use_rustls_tls()
            .https_only(true)
            .redirect(no_less_safe_redirects())
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("rpcs3-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::TransportUnavailable(e.to_string()))?;

        Ok(Self { client })
    }

    /// Send a GET and fail on non-success status
    pub fn get(&self, url: &str) -> Result<Response, FetchError> {
        let url = ensure_secure(url)?;
        debug!("GET {}", url);

        self.client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    /// Fetch a URL into memory (manifest-sized responses only)
    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url)?;
        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Parse a URL and require https
pub fn ensure_secure(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Malformed(format!("{url}: {e}")))?;
    if parsed.scheme() != "https" {
        return Err(FetchError::InsecureUrl(url.to_string()));
    }
    Ok(parsed)
}

/// True when following `from -> to` would drop transport security
pub fn is_less_safe_redirect(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() != "https"
}

fn no_less_safe_redirects() -> Policy {
    Policy::custom(|attempt| {
        let downgrade = attempt
            .previous()
            .last()
            .is_some_and(|prev| is_less_safe_redirect(prev, attempt.url()));

        if downgrade {
            let target = attempt.url().to_string();
            warn!("Refusing redirect to less secure URL {}", target);
            attempt.error(format!("redirect to less secure URL {target} refused"))
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Stream a body to a writer with progress and cancellation
///
/// Never buffers the whole body. The cancel token is checked before every
/// chunk; a cancelled transfer returns `FetchError::Cancelled` and leaves
/// whatever was already written in place for the owner to clean up.
pub(crate) fn stream_to_writer<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    progress: &dyn ProgressTracker,
    cancel: &CancelToken,
) -> Result<u64, FetchError> {
    let mut received: u64 = 0;
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            debug!("Transfer cancelled after {} bytes", received);
            return Err(FetchError::Cancelled);
        }

        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| FetchError::Transport(format!("Failed to read response: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| FetchError::Transport(format!("Failed to write data: {e}")))?;

        received += bytes_read as u64;
        progress.set_position(received);
    }

    Ok(received)
}
