//! Bundled `Adapter` implementations (spec §4.7). Each one owns its own
//! `reqwest::Client`, the same shape `ucp-bench`'s `GroqProvider` used for a
//! pluggable HTTP backend: a small struct wrapping the client plus whatever
//! fixed config the source needs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::{Adapter, AdapterConfig, FetchError, FetchResult, ObservedPoint};

static DATASET_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data/([A-Za-z0-9_]+)").expect("valid regex"));

/// Dataset-specific query selectors a real Eurostat integration would look
/// up by dataset code (age/sex/freq/indicator). Kept as a small hard-coded
/// table per spec §4.7 rather than a full dataset-metadata client.
static EUROSTAT_QUERY_PARAMS: Lazy<HashMap<&'static str, &'static [(&'static str, &'static str)]>> =
    Lazy::new(|| {
        let mut m: HashMap<&'static str, &'static [(&'static str, &'static str)]> = HashMap::new();
        m.insert("nrg_bal_c", &[("freq", "A"), ("unit", "KTOE")]);
        m.insert("demo_pjan", &[("freq", "A"), ("sex", "T"), ("age", "TOTAL")]);
        m
    });

/// Fetches JSON-stat series from `ec.europa.eu/eurostat` endpoints.
pub struct EurostatAdapter {
    client: reqwest::Client,
}

impl EurostatAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for EurostatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for EurostatAdapter {
    fn name(&self) -> &str {
        "eurostat"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains("ec.europa.eu/eurostat") || url.contains("eurostat")
    }

    async fn fetch(&self, config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
        let dataset = DATASET_CODE_RE
            .captures(&config.source_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let extra_params = EUROSTAT_QUERY_PARAMS
            .get(dataset.as_str())
            .copied()
            .unwrap_or(&[]);
        let geo = "IT";

        let mut request = self.client.get(&config.source_url).query(&[("geo", geo)]);
        for (key, value) in extra_params {
            request = request.query(&[(key, value)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api {
                source: self.name().to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let index = body
            .pointer("/dimension/time/category/index")
            .and_then(|v| v.as_object())
            .ok_or_else(|| FetchError::InvalidResponse {
                source: self.name().to_string(),
                detail: "missing dimension.time.category.index".to_string(),
            })?;
        let values = body
            .get("value")
            .and_then(|v| v.as_object())
            .ok_or_else(|| FetchError::InvalidResponse {
                source: self.name().to_string(),
                detail: "missing value map".to_string(),
            })?;

        let mtoe = config
            .field
            .as_deref()
            .map(|f| f.to_lowercase().contains("mtoe"))
            .unwrap_or(false);

        let mut points = Vec::new();
        for (period, position) in index {
            let Some(position) = position.as_u64() else {
                continue;
            };
            let Some(raw) = values.get(&position.to_string()) else {
                continue;
            };
            let Some(mut value) = raw.as_f64() else {
                continue;
            };
            if mtoe {
                value /= 1000.0;
            }
            let Some(date) = period_to_date(period) else {
                continue;
            };
            points.push(ObservedPoint {
                date,
                value,
                source: self.name().to_string(),
                provisional: false,
            });
        }
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

/// Fetches indicator series from `api.worldbank.org`.
pub struct WorldBankAdapter {
    client: reqwest::Client,
}

impl WorldBankAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WorldBankAdapter {
    fn default() -> Self {
        Self::new()
    }
}

static WB_INDICATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"indicator/([A-Za-z0-9.]+)").expect("valid regex"));
static WB_COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"country/([A-Za-z]+)").expect("valid regex"));

#[async_trait]
impl Adapter for WorldBankAdapter {
    fn name(&self) -> &str {
        "world_bank"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains("worldbank.org")
    }

    async fn fetch(&self, config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
        let indicator = WB_INDICATOR_RE
            .captures(&config.source_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let country = WB_COUNTRY_RE
            .captures(&config.source_url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "ITA".to_string());

        let url = format!(
            "https://api.worldbank.org/v2/country/{country}/indicator/{indicator}"
        );
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("date", "2000:2025"), ("per_page", "500")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Api {
                source: self.name().to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let entries = body
            .get(1)
            .and_then(|v| v.as_array())
            .ok_or_else(|| FetchError::InvalidResponse {
                source: self.name().to_string(),
                detail: "missing second array element".to_string(),
            })?;

        let mut points = Vec::new();
        for entry in entries {
            let Some(value) = entry.get("value").and_then(|v| v.as_f64()) else {
                continue;
            };
            let Some(year_str) = entry.get("date").and_then(|v| v.as_str()) else {
                continue;
            };
            let Ok(year) = year_str.parse::<i32>() else {
                continue;
            };
            let Some(date) = NaiveDate::from_ymd_opt(year, 1, 1) else {
                continue;
            };
            points.push(ObservedPoint {
                date,
                value,
                source: self.name().to_string(),
                provisional: false,
            });
        }
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

/// Bundled historical series used as a last resort (and as primary source
/// for `sdl:fallback/...` URLs), so calibration works offline in tests and
/// in environments without network access.
static FALLBACK_SERIES: Lazy<HashMap<&'static str, &'static [(i32, f64)]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [(i32, f64)]> = HashMap::new();
    m.insert(
        "inflation_rate",
        &[(2019, 0.008), (2020, -0.002), (2021, 0.019), (2022, 0.081), (2023, 0.056)],
    );
    m.insert(
        "gdp_growth",
        &[(2019, 0.003), (2020, -0.089), (2021, 0.083), (2022, 0.037), (2023, 0.009)],
    );
    m
});

pub struct FallbackAdapter {
    client: reqwest::Client,
}

impl FallbackAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn lookup_key<'a>(&self, config: &'a AdapterConfig) -> &'a str {
        config
            .source_url
            .strip_prefix("sdl:fallback/")
            .unwrap_or(config.target_id.as_str())
    }
}

impl Default for FallbackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for FallbackAdapter {
    fn name(&self) -> &str {
        "fallback"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("sdl:fallback/") || FALLBACK_SERIES.keys().any(|k| url.contains(k))
    }

    async fn fetch(&self, config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
        let key = self.lookup_key(config);
        if let Some(series) = FALLBACK_SERIES.get(key) {
            return Ok(series
                .iter()
                .filter_map(|(year, value)| {
                    NaiveDate::from_ymd_opt(*year, 1, 1).map(|date| ObservedPoint {
                        date,
                        value: *value,
                        source: self.name().to_string(),
                        provisional: false,
                    })
                })
                .collect());
        }
        if let Some(fallback_value) = config.fallback_value {
            let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
            return Ok(vec![ObservedPoint {
                date: today,
                value: fallback_value,
                source: self.name().to_string(),
                provisional: true,
            }]);
        }
        Ok(Vec::new())
    }
}

fn period_to_date(period: &str) -> Option<NaiveDate> {
    let year: i32 = period.get(0..4)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Default per-adapter fetch timeout (spec §4.7: "default 10s, configurable").
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, target_id: &str) -> AdapterConfig {
        AdapterConfig {
            source_url: url.to_string(),
            field: None,
            fallback_value: None,
            target_id: target_id.to_string(),
            label: None,
            unit: None,
        }
    }

    #[tokio::test]
    async fn fallback_adapter_serves_bundled_series_by_target_id() {
        let adapter = FallbackAdapter::new();
        let points = adapter
            .fetch(&config("sdl:fallback/inflation_rate", "inflation_rate"))
            .await
            .unwrap();
        assert_eq!(points.len(), 5);
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[tokio::test]
    async fn fallback_adapter_uses_fallback_value_when_no_series_matches() {
        let adapter = FallbackAdapter::new();
        let mut cfg = config("sdl:fallback/unknown_series", "unknown_series");
        cfg.fallback_value = Some(42.0);
        let points = adapter.fetch(&cfg).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 42.0);
        assert!(points[0].provisional);
    }

    #[test]
    fn eurostat_adapter_recognizes_its_own_urls() {
        let adapter = EurostatAdapter::new();
        assert!(adapter.can_handle("https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data/nrg_bal_c"));
        assert!(!adapter.can_handle("https://api.worldbank.org/v2/country/ITA/indicator/NY.GDP.MKTP.KD.ZG"));
    }

    #[test]
    fn world_bank_adapter_extracts_indicator_and_country() {
        let captures = WB_INDICATOR_RE
            .captures("https://api.worldbank.org/v2/country/ITA/indicator/NY.GDP.MKTP.KD.ZG")
            .unwrap();
        assert_eq!(&captures[1], "NY.GDP.MKTP.KD.ZG");
        let country = WB_COUNTRY_RE
            .captures("https://api.worldbank.org/v2/country/ITA/indicator/NY.GDP.MKTP.KD.ZG")
            .unwrap();
        assert_eq!(&country[1], "ITA");
    }

    #[test]
    fn period_to_date_parses_a_four_digit_year() {
        assert_eq!(period_to_date("2022"), NaiveDate::from_ymd_opt(2022, 1, 1));
        assert_eq!(period_to_date(""), None);
    }
}
