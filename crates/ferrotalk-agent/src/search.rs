//! DuckDuckGo Instant Answer backend for the `web_search` tool.

use std::sync::Arc;

use ferrotalk_core::{HttpClient, HttpRequest};
use serde::Deserialize;
use tracing::debug;

use crate::error::SearchError;
use crate::tools::{SearchFuture, WebSearch};

const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const MAX_SNIPPETS: usize = 3;

#[derive(Clone)]
pub struct DuckDuckGoSearch {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout_ms: u64,
}

impl DuckDuckGoSearch {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: 5_000,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    answer: String,
    abstract_text: String,
    abstract_source: String,
    definition: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RelatedTopic {
    text: Option<String>,
    /// Grouped topics nest further entries.
    topics: Vec<RelatedTopic>,
}

impl RelatedTopic {
    fn texts<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(text) = self.text.as_deref().filter(|text| !text.is_empty()) {
            out.push(text);
        }
        for topic in &self.topics {
            topic.texts(out);
        }
    }
}

impl WebSearch for DuckDuckGoSearch {
    fn search<'a>(&'a self, query: &'a str) -> SearchFuture<'a> {
        Box::pin(async move {
            let url = format!(
                "{}/?q={}&format=json&no_html=1&skip_disambig=1",
                self.base_url.trim_end_matches('/'),
                urlencoding::encode(query)
            );
            debug!(%query, "web search");
            let response = self
                .http_client
                .execute(HttpRequest::get(url).with_timeout_ms(self.timeout_ms))
                .await
                .map_err(|error| SearchError::new(error.message()))?;
            if !response.is_success() {
                return Err(SearchError::new(format!("search returned status {}", response.status)));
            }

            let answer: InstantAnswer = serde_json::from_str(&response.body)
                .map_err(|e| SearchError::new(format!("unreadable search response: {e}")))?;
            summarize(&answer).ok_or_else(|| SearchError::new(format!("no results for '{query}'")))
        })
    }
}

fn summarize(answer: &InstantAnswer) -> Option<String> {
    let mut lines = Vec::new();
    if !answer.answer.is_empty() {
        lines.push(answer.answer.clone());
    }
    if !answer.abstract_text.is_empty() {
        let source = if answer.abstract_source.is_empty() {
            String::new()
        } else {
            format!(" ({})", answer.abstract_source)
        };
        lines.push(format!("{}{source}", answer.abstract_text));
    } else if !answer.definition.is_empty() {
        lines.push(answer.definition.clone());
    }

    let mut related = Vec::new();
    for topic in &answer.related_topics {
        topic.texts(&mut related);
    }
    lines.extend(
        related
            .into_iter()
            .take(MAX_SNIPPETS.saturating_sub(lines.len()))
            .map(|text| format!("- {text}")),
    );

    if lines.is_empty() {
        return None;
    }
    if !answer.heading.is_empty() {
        lines.insert(0, format!("{}:", answer.heading));
    }
    Some(lines.join("\n"))
}
