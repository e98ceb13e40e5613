//! `AdapterRegistry` (sequential fallback dispatch) and `DataFetcher`
//! (concurrent per-target fetch), per spec §4.7 and §5's concurrency model:
//! "Multiple targets are fetched concurrently; adapter fallback within a
//! single target is sequential (ordered by registration)."

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::adapter::{Adapter, AdapterConfig, FetchError, FetchResult, ObservedPoint};
use crate::adapters::{EurostatAdapter, FallbackAdapter, WorldBankAdapter, DEFAULT_ADAPTER_TIMEOUT};
use crate::cancellation::CancellationToken;

/// Ordered set of adapters consulted for every target. First registered,
/// first tried; a zero-point fetch falls through to the next candidate.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
    timeout: Duration,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            timeout: DEFAULT_ADAPTER_TIMEOUT,
        }
    }

    /// The registry shipped by default: Eurostat, then World Bank, then the
    /// bundled fallback table as the last resort (spec §4.7).
    pub fn with_bundled_adapters() -> Self {
        Self::new()
            .register(Arc::new(EurostatAdapter::new()))
            .register(Arc::new(WorldBankAdapter::new()))
            .register(Arc::new(FallbackAdapter::new()))
    }

    pub fn register(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tries each adapter able to handle `config.source_url`, in
    /// registration order, until one returns a non-empty series.
    pub async fn fetch(&self, config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
        let mut candidates = self.adapters.iter().filter(|a| a.can_handle(&config.source_url)).peekable();
        if candidates.peek().is_none() {
            return Err(FetchError::NoAdapterMatched {
                url: config.source_url.clone(),
            });
        }

        let mut last_err = None;
        for adapter in candidates {
            match tokio::time::timeout(self.timeout, adapter.fetch(config)).await {
                Ok(Ok(points)) if !points.is_empty() => return Ok(points),
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => {
                    warn!(adapter = adapter.name(), target = %config.target_id, error = %err, "adapter fetch failed, trying next");
                    last_err = Some(err);
                }
                Err(_) => {
                    let err = FetchError::Timeout {
                        source: adapter.name().to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    };
                    warn!(adapter = adapter.name(), target = %config.target_id, "adapter fetch timed out");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(FetchError::NoAdapterMatched {
            url: config.source_url.clone(),
        }))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_bundled_adapters()
    }
}

/// One target's fetch outcome: the observed series, or the error that
/// prevented every candidate adapter from producing one.
pub type TargetFetchResult = Result<Vec<ObservedPoint>, FetchError>;

/// Drives concurrent per-target fetches against an `AdapterRegistry` (spec
/// §5: "Multiple targets are fetched concurrently").
pub struct DataFetcher {
    registry: AdapterRegistry,
}

impl DataFetcher {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Fetches every target concurrently, honoring `cancel`: if it trips
    /// before all fetches complete, outstanding work is abandoned and
    /// partially observed data is discarded (spec §5 cancellation model).
    pub async fn fetch_all(
        &self,
        configs: &[AdapterConfig],
        cancel: &CancellationToken,
    ) -> HashMap<String, TargetFetchResult> {
        let fetches = configs.iter().map(|config| {
            let registry = &self.registry;
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = registry.fetch(config) => Some(result),
                };
                (config.target_id.clone(), outcome)
            }
        });

        let results = join_all(fetches).await;
        if cancel.is_cancelled() {
            return HashMap::new();
        }
        results
            .into_iter()
            .filter_map(|(id, outcome)| outcome.map(|result| (id, result)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct EmptyAdapter;

    #[async_trait]
    impl Adapter for EmptyAdapter {
        fn name(&self) -> &str {
            "empty"
        }
        fn can_handle(&self, url: &str) -> bool {
            url.contains("empty")
        }
        async fn fetch(&self, _config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
            Ok(Vec::new())
        }
    }

    struct OneShotAdapter(f64);

    #[async_trait]
    impl Adapter for OneShotAdapter {
        fn name(&self) -> &str {
            "one_shot"
        }
        fn can_handle(&self, url: &str) -> bool {
            url.contains("empty") || url.contains("one_shot")
        }
        async fn fetch(&self, _config: &AdapterConfig) -> FetchResult<Vec<ObservedPoint>> {
            Ok(vec![ObservedPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                value: self.0,
                source: self.name().to_string(),
                provisional: false,
            }])
        }
    }

    fn config(target_id: &str) -> AdapterConfig {
        AdapterConfig {
            source_url: "sdl:empty/one_shot".to_string(),
            field: None,
            fallback_value: None,
            target_id: target_id.to_string(),
            label: None,
            unit: None,
        }
    }

    #[tokio::test]
    async fn falls_through_to_the_next_adapter_on_an_empty_result() {
        let registry = AdapterRegistry::new()
            .register(Arc::new(EmptyAdapter))
            .register(Arc::new(OneShotAdapter(7.0)));
        let points = registry.fetch(&config("t")).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 7.0);
    }

    #[tokio::test]
    async fn no_matching_adapter_is_an_error() {
        let registry = AdapterRegistry::new().register(Arc::new(OneShotAdapter(1.0)));
        let err = registry
            .fetch(&AdapterConfig {
                source_url: "https://example.com/nothing".to_string(),
                field: None,
                fallback_value: None,
                target_id: "t".to_string(),
                label: None,
                unit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoAdapterMatched { .. }));
    }

    #[tokio::test]
    async fn fetch_all_runs_every_target_concurrently() {
        let registry = AdapterRegistry::new().register(Arc::new(OneShotAdapter(3.0)));
        let fetcher = DataFetcher::new(registry);
        let configs = vec![config("a"), config("b")];
        let results = fetcher.fetch_all(&configs, &CancellationToken::new()).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.as_ref().unwrap()[0].value == 3.0));
    }

    #[tokio::test]
    async fn cancellation_discards_partial_results() {
        let registry = AdapterRegistry::new().register(Arc::new(OneShotAdapter(3.0)));
        let fetcher = DataFetcher::new(registry);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = fetcher.fetch_all(&[config("a")], &cancel).await;
        assert!(results.is_empty());
    }
}
