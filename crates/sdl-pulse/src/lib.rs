//! Live-data layer for SDL scenarios (spec §4.7-§4.10): fetches observed
//! series from external statistics sources, Bayesian-calibrates uncertainty
//! priors against them, and watches assumptions for drift from reality.

pub mod adapter;
pub mod adapters;
pub mod calibrate;
pub mod cancellation;
pub mod fetcher;
pub mod orchestrator;
pub mod registry;
pub mod watchdog;

pub use adapter::{Adapter, AdapterConfig, FetchError, FetchResult, ObservedPoint};
pub use adapters::{EurostatAdapter, FallbackAdapter, WorldBankAdapter};
pub use calibrate::{calibrate, CalibrationError, CalibrationResult, CalibrationSkip, DistributionSnapshot};
pub use cancellation::CancellationToken;
pub use fetcher::{AdapterRegistry, DataFetcher, TargetFetchResult};
pub use orchestrator::{pulse, FetchErrorEntry, PulseOptions, PulseResult};
pub use registry::{by_adapter, by_category, by_provider, find_by_id, find_by_url, SourceRegistryEntry, VERIFIED_SOURCES};
pub use watchdog::{AlertSeverity, WatchAlert};
