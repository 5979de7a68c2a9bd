use std::time::Duration;

/// Per-provider request budget and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub request_timeout: Duration,
}

impl ProviderPolicy {
    /// Alpha Vantage free tier: 5 requests per minute.
    pub fn alphavantage_default() -> Self {
        Self {
            quota_window: Duration::from_secs(60),
            quota_limit: 5,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Yahoo publishes no quota, so this budget is self-imposed.
    pub fn yahoo_default() -> Self {
        Self {
            quota_window: Duration::from_secs(60),
            quota_limit: 120,
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_quota(mut self, quota_limit: u32, quota_window: Duration) -> Self {
        self.quota_limit = quota_limit;
        self.quota_window = quota_window;
        self
    }

    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
