use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::LLMError;
use crate::options::ProviderRequestOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Web,
    Academic,
}

/// Only consider sources published within this window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecencyFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// How much retrieved web content is passed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSize {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// ISO 3166-1 alpha-2 code, such as `FR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebSearchOptions {
    #[serde(rename = "search_context_size", skip_serializing_if = "Option::is_none")]
    pub context_size: Option<ContextSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location: Option<UserLocation>,
}

/// Search filters understood only by the Perplexity backend.
///
/// Unset fields are left out of the request body. Dates are sent in the
/// `M/D/YYYY` form the API expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerplexityOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
    #[serde(rename = "search_recency_filter", skip_serializing_if = "Option::is_none")]
    pub recency: Option<RecencyFilter>,
    #[serde(
        rename = "search_before_date_filter",
        serialize_with = "us_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_before: Option<NaiveDate>,
    #[serde(
        rename = "search_after_date_filter",
        serialize_with = "us_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_after: Option<NaiveDate>,
    #[serde(
        rename = "last_updated_before_filter",
        serialize_with = "us_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_before: Option<NaiveDate>,
    #[serde(
        rename = "last_updated_after_filter",
        serialize_with = "us_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_after: Option<NaiveDate>,
    #[serde(rename = "web_search_options", skip_serializing_if = "Option::is_none")]
    pub web_search: Option<WebSearchOptions>,
}

impl ProviderRequestOptions for PerplexityOptions {}

impl PerplexityOptions {
    /// Top-level request body fields carrying these options.
    pub(crate) fn body_fields(&self) -> Result<BTreeMap<String, Value>, LLMError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields.into_iter().collect()),
            Ok(other) => Err(LLMError::Validation {
                message: format!("Perplexity options serialized to {other}"),
            }),
            Err(err) => Err(LLMError::Validation {
                message: format!("invalid Perplexity options: {err}"),
            }),
        }
    }
}

fn us_date<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.collect_str(&date.format("%-m/%-d/%Y")),
        None => serializer.serialize_none(),
    }
}
