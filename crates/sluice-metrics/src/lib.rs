//! sluice-metrics — the console's metric query engine.
//!
//! Reads raw per-second samples reported by client instances from a
//! [`MetricsRepository`] and reshapes them into paginated, deduplicated
//! views for the console.
//!
//! # Architecture
//!
//! ```text
//! MetricsAggregator
//!   ├── query_top_resource_metric() → resource → samples (per page)
//!   ├── query_by_view_mode()
//!   │   ├── aggregate → resource → samples folded across instances
//!   │   └── instance  → ip:port → resource → samples
//!   └── query_by_app_and_resource() → one resource, no paging
//!
//! MetricsRepository (trait)
//!   └── InMemoryMetricsRepository — retention-bounded in-process store
//! ```
//!
//! Every list of samples leaving the aggregator has passed the dedup rule:
//! one sample per timestamp, the latest `gmt_create` wins, ascending order.

pub mod aggregator;
pub mod error;
pub mod query;
pub mod sample;
pub mod store;

pub use aggregator::{MetricsAggregator, ViewPage};
pub use error::{QueryError, QueryResult};
pub use query::{MetricPage, MetricQuery, OrderedMap, ResourceQuery, ViewMode};
pub use sample::MetricSample;
pub use store::{InMemoryMetricsRepository, MetricsRepository};
