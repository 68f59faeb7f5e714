use std::time::Duration;

/// Default backend URL, overridden at runtime via `MODELSHOP_API_URL`.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Delays used by the customer chat widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTimings {
    /// Wait before re-reading history after a message was accepted.
    pub refetch_delay: Duration,
    /// Wait before showing the placeholder reply to anonymous visitors.
    pub placeholder_delay: Duration,
    /// Wait before showing the apology after a failed send.
    pub apology_delay: Duration,
}

impl Default for ChatTimings {
    fn default() -> Self {
        Self {
            refetch_delay: Duration::from_millis(500),
            placeholder_delay: Duration::from_millis(1000),
            apology_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    /// Currency conversion lookup; prices display in the base currency without it.
    pub rates_url: Option<String>,
    /// Applies to ordinary requests, never to event streams.
    pub request_timeout: Duration,
    /// How often the support desk re-reads sessions and stats.
    pub poll_interval: Duration,
    pub chat: ChatTimings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            rates_url: None,
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(5),
            chat: ChatTimings::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `MODELSHOP_API_URL`, `MODELSHOP_RATES_URL` and `MODELSHOP_POLL_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_non_empty("MODELSHOP_API_URL") {
            config.api_url = url;
        }
        config.rates_url = env_non_empty("MODELSHOP_RATES_URL");
        if let Some(secs) = env_non_empty("MODELSHOP_POLL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        config
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
