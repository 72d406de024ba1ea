//! MetricsAggregator — shapes raw samples into the console's metric views.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sluice_core::SharedClock;
use tracing::{debug, error};

use crate::error::{QueryError, QueryResult};
use crate::query::{
    DEFAULT_LIST_SPAN_MS, DEFAULT_RESOURCE_SPAN_MS, MetricPage, MetricQuery, OrderedMap, Paging,
    ResourceQuery, Slice, ViewMode, Window, paginate, require, resolve_paging, resolve_window,
};
use crate::sample::{MetricSample, dedup_by_timestamp, fold_instances};
use crate::store::MetricsRepository;

const APP_REQUIRED: &str = "app can't be null or empty";
const IDENTITY_REQUIRED: &str = "identity can't be null or empty";

/// Result of [`MetricsAggregator::query_by_view_mode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewPage {
    /// resource → samples folded across instances.
    Aggregate(MetricPage<Vec<MetricSample>>),
    /// `ip:port` → resource → samples.
    Instance(MetricPage<OrderedMap<Vec<MetricSample>>>),
}

/// Read-only query engine over a [`MetricsRepository`].
pub struct MetricsAggregator {
    store: Arc<dyn MetricsRepository>,
    clock: SharedClock,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn MetricsRepository>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Hottest resources of an app, each with its deduplicated raw samples.
    pub fn query_top_resource_metric(
        &self,
        query: &MetricQuery,
    ) -> QueryResult<MetricPage<Vec<MetricSample>>> {
        let app = require(query.app.as_deref(), APP_REQUIRED)?;
        let window = self.list_window(query)?;
        let paging = resolve_paging(query);

        let slice = paginate(
            self.ranked_resources(&app)?,
            &paging,
            query.search_key.as_deref(),
        );
        let mut metric = OrderedMap::new();
        for resource in &slice.keys {
            let samples = self.resource_samples(&app, resource, window)?;
            metric.push(resource.clone(), dedup_by_timestamp(samples));
        }
        Ok(page(&slice, &paging, None, metric))
    }

    /// Dispatch on `view_mode`: `instance` groups by reporting instance,
    /// anything else folds instances together per resource.
    pub fn query_by_view_mode(&self, query: &MetricQuery) -> QueryResult<ViewPage> {
        match ViewMode::parse(query.view_mode.as_deref()) {
            ViewMode::Aggregate => self.query_aggregate_view(query).map(ViewPage::Aggregate),
            ViewMode::Instance => self.query_instance_view(query).map(ViewPage::Instance),
        }
    }

    pub fn query_aggregate_view(
        &self,
        query: &MetricQuery,
    ) -> QueryResult<MetricPage<Vec<MetricSample>>> {
        let app = require(query.app.as_deref(), APP_REQUIRED)?;
        let window = self.list_window(query)?;
        let paging = resolve_paging(query);

        let slice = paginate(
            self.ranked_resources(&app)?,
            &paging,
            query.search_key.as_deref(),
        );
        let mut metric = OrderedMap::new();
        for resource in &slice.keys {
            let samples = self.resource_samples(&app, resource, window)?;
            let folded = fold_instances(&app, resource, samples);
            metric.push(resource.clone(), dedup_by_timestamp(folded));
        }
        debug!(app = %app, resources = metric.len(), "aggregate view");
        Ok(page(&slice, &paging, Some(ViewMode::Aggregate), metric))
    }

    pub fn query_instance_view(
        &self,
        query: &MetricQuery,
    ) -> QueryResult<MetricPage<OrderedMap<Vec<MetricSample>>>> {
        let app = require(query.app.as_deref(), APP_REQUIRED)?;
        let window = self.list_window(query)?;
        let paging = resolve_paging(query);

        let mut samples = self
            .store
            .query_by_app_between(&app, window.start, window.end)
            .map_err(store_failure("query_by_app_between", &app))?;
        let ip = query.ip.as_deref().filter(|ip| !ip.is_empty());
        if let (Some(ip), Some(port)) = (ip, query.port) {
            samples.retain(|s| s.ip.as_deref() == Some(ip) && s.port == Some(port));
        }

        // instance → resource → samples, both levels in key order.
        let mut grouped: BTreeMap<String, BTreeMap<String, Vec<MetricSample>>> = BTreeMap::new();
        for sample in samples {
            grouped
                .entry(sample.instance_key())
                .or_default()
                .entry(sample.resource.clone())
                .or_default()
                .push(sample);
        }

        let instances: Vec<String> = grouped.keys().cloned().collect();
        let slice = paginate(instances, &paging, query.search_key.as_deref());
        let mut metric = OrderedMap::new();
        for instance in &slice.keys {
            let Some(resources) = grouped.remove(instance) else {
                continue;
            };
            let per_resource = resources
                .into_iter()
                .map(|(resource, samples)| (resource, dedup_by_timestamp(samples)))
                .collect();
            metric.push(instance.clone(), per_resource);
        }
        debug!(app = %app, instances = metric.len(), "instance view");
        Ok(page(&slice, &paging, Some(ViewMode::Instance), metric))
    }

    /// Deduplicated samples of one resource, unpaged.
    pub fn query_by_app_and_resource(&self, query: &ResourceQuery) -> QueryResult<Vec<MetricSample>> {
        let app = require(query.app.as_deref(), APP_REQUIRED)?;
        let resource = require(query.identity.as_deref(), IDENTITY_REQUIRED)?;
        let window = resolve_window(
            query.start_time,
            query.end_time,
            self.clock.now_millis(),
            DEFAULT_RESOURCE_SPAN_MS,
        )?;
        let samples = self.resource_samples(&app, &resource, window)?;
        Ok(dedup_by_timestamp(samples))
    }

    fn list_window(&self, query: &MetricQuery) -> QueryResult<Window> {
        resolve_window(
            query.start_time,
            query.end_time,
            self.clock.now_millis(),
            DEFAULT_LIST_SPAN_MS,
        )
    }

    fn ranked_resources(&self, app: &str) -> QueryResult<Vec<String>> {
        self.store
            .list_resources_of_app(app)
            .map_err(store_failure("list_resources_of_app", app))
    }

    fn resource_samples(
        &self,
        app: &str,
        resource: &str,
        window: Window,
    ) -> QueryResult<Vec<MetricSample>> {
        self.store
            .query_by_app_and_resource_between(app, resource, window.start, window.end)
            .map_err(store_failure("query_by_app_and_resource_between", app))
    }
}

fn store_failure<'a>(op: &'static str, app: &'a str) -> impl FnOnce(anyhow::Error) -> QueryError + 'a {
    move |err| {
        error!(op, app = %app, error = %err, "metrics store query failed");
        QueryError::Store(format!("{err:#}"))
    }
}

fn page<T>(
    slice: &Slice,
    paging: &Paging,
    view_mode: Option<ViewMode>,
    metric: OrderedMap<T>,
) -> MetricPage<T> {
    MetricPage {
        total_count: slice.total_count,
        total_page: slice.total_page,
        page_index: paging.page_index,
        page_size: paging.page_size,
        view_mode,
        metric,
    }
}
