//! Blocking HTTP transport shared by provider clients.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};

use crate::entities::FetchFailure;
use crate::providers::RequestTransport;

const USER_AGENT: &str = "coverkeep/0.1.0 (artwork cache)";
const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

/// `ureq` agent plus a cancel epoch. Responses for requests that started
/// before the latest [`RequestTransport::cancel_all`] are dropped.
pub struct HttpTransport {
    http_client: ureq::Agent,
    cancel_epoch: AtomicU64,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build();
        Self {
            http_client,
            cancel_epoch: AtomicU64::new(0),
        }
    }

    /// Throttling statuses are session-fatal for bulk loads; 404 is a plain miss.
    pub fn classify_status(code: u16) -> FetchFailure {
        match code {
            429 | 503 => FetchFailure::RateLimited,
            404 | 410 => FetchFailure::NotFound,
            _ => FetchFailure::GenericError,
        }
    }

    fn classify_ureq_failure(error: &ureq::Error) -> FetchFailure {
        match error {
            ureq::Error::Status(code, _) => Self::classify_status(*code),
            ureq::Error::Transport(_) => FetchFailure::GenericError,
        }
    }

    fn was_cancelled_since(&self, started_epoch: u64) -> bool {
        self.cancel_epoch.load(Ordering::Acquire) != started_epoch
    }

    /// Downloads `url` and returns the response body.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let started_epoch = self.cancel_epoch.load(Ordering::Acquire);
        let response = self.http_client.get(url).call().map_err(|error| {
            let failure = Self::classify_ureq_failure(&error);
            info!("Artwork transport: request for '{}' failed: {}", url, error);
            failure
        })?;
        if self.was_cancelled_since(started_epoch) {
            debug!("Artwork transport: dropping response for cancelled request '{url}'");
            return Err(FetchFailure::GenericError);
        }

        let bytes = read_limited(response.into_reader(), MAX_IMAGE_BYTES).map_err(|failure| {
            info!("Artwork transport: reading '{url}' failed: {failure:?}");
            failure
        })?;
        if self.was_cancelled_since(started_epoch) {
            debug!("Artwork transport: dropping body for cancelled request '{url}'");
            return Err(FetchFailure::GenericError);
        }
        if bytes.is_empty() {
            return Err(FetchFailure::NotFound);
        }
        Ok(bytes)
    }
}

/// Reads at most `limit` bytes. A longer body is an error, never a
/// truncated image.
fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, FetchFailure> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|_| FetchFailure::GenericError)?;
    if bytes.len() as u64 > limit {
        return Err(FetchFailure::GenericError);
    }
    Ok(bytes)
}

impl RequestTransport for HttpTransport {
    fn cancel_all(&self) {
        let epoch = self.cancel_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Artwork transport: cancel all requests (epoch {epoch})");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{read_limited, HttpTransport};
    use crate::entities::FetchFailure;
    use crate::providers::RequestTransport;

    #[test]
    fn test_classify_status_maps_throttling_to_rate_limited() {
        assert_eq!(HttpTransport::classify_status(503), FetchFailure::RateLimited);
        assert_eq!(HttpTransport::classify_status(429), FetchFailure::RateLimited);
    }

    #[test]
    fn test_classify_status_maps_misses_and_errors() {
        assert_eq!(HttpTransport::classify_status(404), FetchFailure::NotFound);
        assert_eq!(HttpTransport::classify_status(500), FetchFailure::GenericError);
        assert_eq!(HttpTransport::classify_status(403), FetchFailure::GenericError);
    }

    #[test]
    fn test_cancel_all_invalidates_earlier_requests() {
        let transport = HttpTransport::new();
        let started = transport.cancel_epoch.load(std::sync::atomic::Ordering::Acquire);
        assert!(!transport.was_cancelled_since(started));

        transport.cancel_all();

        assert!(transport.was_cancelled_since(started));
    }

    #[test]
    fn test_unreachable_host_is_generic_error() {
        let transport = HttpTransport::new();
        let result = transport.get_bytes("http://127.0.0.1:9/cover.jpg");
        assert_eq!(result, Err(FetchFailure::GenericError));
    }

    #[test]
    fn test_body_at_limit_is_read_whole() {
        let body = vec![7u8; 64];
        let bytes = read_limited(Cursor::new(body.clone()), 64).expect("body fits the limit");
        assert_eq!(bytes, body);
    }

    #[test]
    fn test_body_over_limit_is_rejected_not_truncated() {
        let result = read_limited(Cursor::new(vec![7u8; 65]), 64);
        assert_eq!(result, Err(FetchFailure::GenericError));
    }
}
