//! Acquisition of raw vintage files.
//!
//! A `VintageSource` turns a release number into raw bytes. Sources are
//! interchangeable (network, on-disk cache, in-memory doubles) and are walked
//! sequentially by `fetch_range`, which is the only place the pipeline waits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::FetchSettings;
use crate::domain::{IdentifierRange, VintageId};
use crate::error::FetchError;

/// Where a fetched payload came from. Only network fetches are throttled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Network,
    Cache,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub origin: Origin,
}

#[async_trait]
pub trait VintageSource: Send + Sync {
    /// Retrieve the raw file for one release or say why not.
    async fn fetch_vintage(&self, id: VintageId) -> Result<Fetched, FetchError>;

    /// A unique identifier for this implementation (so that afterwards we know which one we used).
    fn signature(&self) -> &'static str;
}

/// One successfully retrieved release.
#[derive(Debug, Clone)]
pub struct RawVintage {
    pub id: VintageId,
    pub bytes: Vec<u8>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub id: VintageId,
    pub error: FetchError,
}

/// Outcome of walking an identifier range: every attempted id ends up in
/// exactly one of `retrieved` or `failures`.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub attempted: usize,
    pub retrieved: Vec<RawVintage>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn missing_ids(&self) -> Vec<VintageId> {
        self.failures.iter().map(|f| f.id).collect()
    }
}

/// Fetch every release in `range`, in the range's direction, pausing `delay`
/// after each request that touched the network. A failed release is logged and
/// recorded; it never stops the walk.
pub async fn fetch_range(
    source: &dyn VintageSource,
    range: IdentifierRange,
    delay: Duration,
) -> FetchReport {
    let ids = range.ids();
    let mut report = FetchReport {
        attempted: ids.len(),
        ..Default::default()
    };
    log::info!(
        "Fetching {} vintages ({} -> {}) via {}",
        ids.len(),
        range.from,
        range.to,
        source.signature()
    );

    for (i, id) in ids.iter().enumerate() {
        let result = source.fetch_vintage(*id).await;
        let touched_network = match &result {
            Ok(fetched) => fetched.origin == Origin::Network,
            Err(FetchError::NotCached) => false,
            Err(_) => true,
        };

        match result {
            Ok(fetched) => {
                log::info!("Downloaded {} ({} bytes, {:?})", id, fetched.bytes.len(), fetched.origin);
                report.retrieved.push(RawVintage {
                    id: *id,
                    bytes: fetched.bytes,
                    origin: fetched.origin,
                });
            }
            Err(error) => {
                log::warn!("⚠️  Failed to download {}: {}", id, error);
                report.failures.push(FetchFailure { id: *id, error });
            }
        }

        let more_to_come = i + 1 < ids.len();
        if touched_network && more_to_come && !delay.is_zero() {
            sleep(delay).await;
        }
    }

    log::info!(
        "Fetch complete: {} of {} vintages retrieved",
        report.retrieved.len(),
        report.attempted
    );
    report
}

/// Pulls releases from the publisher over HTTP.
pub struct HttpSource {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpSource {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn is_transient(error: &FetchError) -> bool {
    match error {
        FetchError::Timeout | FetchError::Http(_) => true,
        FetchError::Status(code) => *code == 429 || *code >= 500,
        FetchError::NotCached => false,
    }
}

#[async_trait]
impl VintageSource for HttpSource {
    fn signature(&self) -> &'static str {
        "Publisher HTTP"
    }

    async fn fetch_vintage(&self, id: VintageId) -> Result<Fetched, FetchError> {
        let url = self.settings.url_for(id.0);
        let mut attempt: u32 = 0;
        loop {
            match self.get_once(&url).await {
                Ok(bytes) => {
                    return Ok(Fetched {
                        bytes,
                        origin: Origin::Network,
                    });
                }
                Err(error) if attempt < self.settings.retries && is_transient(&error) => {
                    attempt += 1;
                    let wait = self.settings.backoff * attempt;
                    log::warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        id,
                        attempt,
                        error,
                        wait
                    );
                    sleep(wait).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Serves releases from memory. Ids listed in `failing` answer with the given
/// error, which lets callers rehearse partial acquisitions.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<VintageId, Vec<u8>>,
    failing: HashMap<VintageId, FetchError>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: VintageId, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(id, content.into());
        self
    }

    pub fn with_failure(mut self, id: VintageId, error: FetchError) -> Self {
        self.failing.insert(id, error);
        self
    }
}

#[async_trait]
impl VintageSource for MemorySource {
    fn signature(&self) -> &'static str {
        "In-memory"
    }

    async fn fetch_vintage(&self, id: VintageId) -> Result<Fetched, FetchError> {
        if let Some(error) = self.failing.get(&id) {
            return Err(error.clone());
        }
        self.files
            .get(&id)
            .map(|bytes| Fetched {
                bytes: bytes.clone(),
                origin: Origin::Memory,
            })
            .ok_or(FetchError::Status(404))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_vintage_does_not_abort_walk() {
        let source = MemorySource::new()
            .with_file(VintageId(3), "a")
            .with_failure(VintageId(2), FetchError::Timeout)
            .with_file(VintageId(1), "c");

        let report = fetch_range(&source, IdentifierRange::new(3, 1), Duration::ZERO).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.retrieved.len(), 2);
        assert_eq!(report.missing_ids(), vec![VintageId(2)]);
        assert_eq!(report.failures[0].error, FetchError::Timeout);
        // Walk order follows the range direction
        assert_eq!(report.retrieved[0].id, VintageId(3));
        assert_eq!(report.retrieved[1].id, VintageId(1));
    }

    #[tokio::test]
    async fn test_unknown_id_is_reported_as_failure() {
        let source = MemorySource::new();
        let report = fetch_range(&source, IdentifierRange::new(5, 5), Duration::ZERO).await;
        assert!(report.retrieved.is_empty());
        assert_eq!(report.failures[0].error, FetchError::Status(404));
    }

    /// Answers every id from the given origin.
    struct FixedOrigin(Origin);

    #[async_trait]
    impl VintageSource for FixedOrigin {
        fn signature(&self) -> &'static str {
            "Fixed origin"
        }

        async fn fetch_vintage(&self, _id: VintageId) -> Result<Fetched, FetchError> {
            Ok(Fetched {
                bytes: b"x".to_vec(),
                origin: self.0,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_fetches_are_throttled() {
        let delay = Duration::from_secs(3);
        let start = tokio::time::Instant::now();

        let report = fetch_range(&FixedOrigin(Origin::Network), IdentifierRange::new(4, 1), delay).await;

        assert_eq!(report.retrieved.len(), 4);
        // No pause after the last request
        assert_eq!(start.elapsed(), delay * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hits_are_not_throttled() {
        let delay = Duration::from_secs(3);
        let start = tokio::time::Instant::now();

        let report = fetch_range(&FixedOrigin(Origin::Cache), IdentifierRange::new(4, 1), delay).await;

        assert_eq!(report.retrieved.len(), 4);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&FetchError::Timeout));
        assert!(is_transient(&FetchError::Status(503)));
        assert!(is_transient(&FetchError::Status(429)));
        assert!(!is_transient(&FetchError::Status(404)));
        assert!(!is_transient(&FetchError::NotCached));
    }
}
