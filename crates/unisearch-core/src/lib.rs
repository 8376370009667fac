//! # unisearch-core
//!
//! The search aggregation engine: one logical query fanned out across every
//! connected messaging account, merged into a single time-ordered result
//! set with per-platform diagnostics.
//!
//! The [`SearchManager`] owns the moving parts:
//!
//! - a registry of platform connectors (`unisearch-connector`) dispatched
//!   concurrently, one task per platform, with per-account fan-out inside;
//! - the [`AccountRegistry`] tracking connected accounts and their health;
//! - the [`ResultCache`], a fingerprint-keyed TTL cache with a single-flight
//!   guarantee so concurrent identical searches share one upstream fetch;
//! - the [`MetricsCollector`] recording searches, cache effectiveness, and
//!   per-platform error counts.
//!
//! Failures degrade, never abort: a container failing skips that container,
//! an account failing leaves its siblings running, and a platform is marked
//! failed only when all of its accounts fail. Callers always receive a
//! best-effort [`SearchResponse`]; only request-validation errors surface
//! as [`Error`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod cache;
mod error;
pub mod manager;
pub mod metrics;
pub mod search;
pub mod telemetry;

pub use account::{Account, AccountRegistry, ConnectionStatus};
pub use cache::{CacheStats, ResultCache};
pub use error::{Error, Result};
pub use manager::{SearchId, SearchManager};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use search::{Pagination, PlatformSearchStatus, SearchRequest, SearchResponse};

pub use unisearch_connector::{
    AccountId, CancelToken, Connector, ConnectorConfig, MessageResult, MessageType, Platform,
    ProgressSink, ProgressUpdate, SearchFilters, SearchStage, Sender, build_connector,
};
