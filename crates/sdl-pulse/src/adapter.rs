//! The `Adapter` trait: a pluggable fetcher for one external statistics
//! source (spec §4.7). Each adapter owns its own `reqwest::Client` and knows
//! how to turn one `AdapterConfig` into a series of observed data points.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One calibration target's fetch request: which URL to hit, which field of
/// the response to extract, and what to fall back to if nothing is found.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub source_url: String,
    pub field: Option<String>,
    pub fallback_value: Option<f64>,
    pub target_id: String,
    pub label: Option<String>,
    pub unit: Option<String>,
}

/// One observed data point returned by an adapter (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub source: String,
    /// True when the upstream source itself flags the point as provisional
    /// (common for the most recent year of Eurostat/World Bank series).
    pub provisional: bool,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{source} returned status {status}: {message}")]
    Api {
        source: String,
        status: u16,
        message: String,
    },
    #[error("{source} request timed out after {timeout_ms}ms")]
    Timeout { source: String, timeout_ms: u64 },
    #[error("{source} returned a response this adapter could not parse: {detail}")]
    InvalidResponse { source: String, detail: String },
    #[error("no adapter in the registry can handle url {url}")]
    NoAdapterMatched { url: String },
}

pub type FetchResult<T> = Result<T, FetchError>;

/// A data source capable of fetching observed points for a calibration
/// target. Mirrors the `LlmProvider`/`GroqProvider` shape this workspace
/// already used for pluggable HTTP backends: a struct holding a `reqwest`
/// client plus whatever fixed config the source needs, registered by name.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this adapter recognizes `url` as one of its own.
    fn can_handle(&self, url: &str) -> bool;

    async fn fetch(&self, config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>>;
}
