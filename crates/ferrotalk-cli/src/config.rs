//! Runtime configuration assembled from the environment and CLI flags.

use std::time::Duration;

use tracing::warn;

const ALPHAVANTAGE_KEY_VARS: [&str; 2] =
    ["FERROTALK_ALPHAVANTAGE_API_KEY", "ALPHA_VANTAGE_API_KEY"];
const LLM_KEY_VARS: [&str; 2] = ["FERROTALK_LLM_API_KEY", "GROQ_API_KEY"];
const LLM_BASE_URL_VAR: &str = "FERROTALK_LLM_BASE_URL";
const LLM_MODEL_VAR: &str = "FERROTALK_LLM_MODEL";

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-8b-instant";
const DEMO_ALPHAVANTAGE_KEY: &str = "demo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub alphavantage_api_key: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub fetch_timeout: Duration,
    pub offline: bool,
    pub web_search: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_owned())
                .find(|value| !value.is_empty())
        };

        let alphavantage_api_key = first(&ALPHAVANTAGE_KEY_VARS).unwrap_or_else(|| {
            warn!(
                "no Alpha Vantage key configured; the fallback provider uses the rate-limited \
                 demo key"
            );
            String::from(DEMO_ALPHAVANTAGE_KEY)
        });

        Self {
            alphavantage_api_key,
            llm_api_key: first(&LLM_KEY_VARS),
            llm_base_url: first(&[LLM_BASE_URL_VAR])
                .unwrap_or_else(|| String::from(DEFAULT_LLM_BASE_URL)),
            llm_model: first(&[LLM_MODEL_VAR]).unwrap_or_else(|| String::from(DEFAULT_LLM_MODEL)),
            fetch_timeout: Duration::from_secs(10),
            offline: false,
            web_search: false,
        }
    }

    pub fn with_fetch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fetch_timeout = Duration::from_millis(timeout_ms.max(1));
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_web_search(mut self, web_search: bool) -> Self {
        self.web_search = web_search;
        self
    }

    /// The language model key, unless offline mode is on.
    pub fn language_model_key(&self) -> Option<&str> {
        if self.offline {
            return None;
        }
        self.llm_api_key.as_deref()
    }
}
