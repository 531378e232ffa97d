//! Publisher-specific configuration constants and types.

use std::time::Duration;

/// Configuration for the HTTP client used to pull vintages
/// (This is the runtime struct handed to the fetcher)
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub url_template: String,
    pub delay: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            url_template: SOURCE.url_template.to_string(),
            delay: Duration::from_secs(SOURCE.throttle.delay_seconds),
            timeout: Duration::from_millis(SOURCE.client.timeout_ms),
            retries: SOURCE.client.retries,
            backoff: Duration::from_millis(SOURCE.client.backoff_ms),
        }
    }
}

impl FetchSettings {
    /// Substitute the release number into the URL template.
    pub fn url_for(&self, id: u32) -> String {
        self.url_template.replace("{id}", &id.to_string())
    }
}

/// Which releases to pull by default
pub struct ReleaseRange {
    /// First release requested (newest, walked downwards)
    pub start: u32,
    /// Last release requested (inclusive)
    pub end: u32,
}

/// Politeness limits towards the publisher
pub struct Throttle {
    /// Minimum pause between two network requests (seconds)
    pub delay_seconds: u64,
}

/// Default values for the HTTP client
pub struct ClientDefaults {
    pub timeout_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
}

/// The Master Source Configuration
pub struct SourceConfig {
    /// `{id}` is replaced by the release number
    pub url_template: &'static str,
    pub range: ReleaseRange,
    pub throttle: Throttle,
    pub client: ClientDefaults,
}

pub const SOURCE: SourceConfig = SourceConfig {
    url_template: "https://www.ons.gov.uk/generator?format=csv&uri=/employmentandlabourmarket/peopleinwork/employmentandemployeetypes/timeseries/ap2y/lms/previous/v{id}",
    range: ReleaseRange {
        start: 117,
        end: 58,
    },
    throttle: Throttle { delay_seconds: 3 },
    client: ClientDefaults {
        timeout_ms: 30_000,
        retries: 2,
        backoff_ms: 2_000,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_substitution() {
        let settings = FetchSettings::default();
        let url = settings.url_for(117);
        assert!(url.ends_with("/previous/v117"));
        assert!(!url.contains("{id}"));
    }
}
