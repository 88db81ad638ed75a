use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::error::LLMError;
use crate::response::{Grounding, GroundingSource};

/// Entry of the `search_results` array returned next to the choices.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    #[serde(default)]
    pub(crate) title: String,
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) date: Option<String>,
    #[serde(default)]
    pub(crate) snippet: Option<String>,
}

/// Builds the grounding shared by every candidate from `search_results`.
pub(crate) fn grounding_from_search_results(value: &Value) -> Result<Grounding, LLMError> {
    let results: Vec<SearchResult> =
        serde_json::from_value(value.clone()).map_err(|err| LLMError::Provider {
            provider: "perplexity",
            message: format!("failed to parse search results: {err}"),
        })?;

    let snippets = results
        .iter()
        .filter_map(|result| result.snippet.clone())
        .filter(|snippet| !snippet.is_empty())
        .collect();
    let sources = results
        .into_iter()
        .map(|result| GroundingSource {
            domain: domain_of(&result.url),
            date: result
                .date
                .as_deref()
                .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()),
            title: result.title,
            url: result.url,
        })
        .collect();

    Ok(Grounding {
        searches: Vec::new(),
        sources,
        snippets,
    })
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}
