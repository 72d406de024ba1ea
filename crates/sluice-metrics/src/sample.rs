//! Per-second metric samples and the folding rules applied to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One resource's counters for one second, as reported by one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub app: String,
    pub resource: String,
    /// Second boundary, epoch millis.
    pub timestamp: i64,
    /// When the console received the sample.
    pub gmt_create: i64,
    pub pass_qps: i64,
    pub block_qps: i64,
    pub success_qps: i64,
    pub exception_qps: i64,
    /// Average response time of the successful requests in this second.
    pub rt: f64,
    /// Number of raw samples folded into this one.
    pub count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl MetricSample {
    pub fn new(app: impl Into<String>, resource: impl Into<String>, timestamp: i64) -> Self {
        Self {
            app: app.into(),
            resource: resource.into(),
            timestamp,
            gmt_create: timestamp,
            pass_qps: 0,
            block_qps: 0,
            success_qps: 0,
            exception_qps: 0,
            rt: 0.0,
            count: 0,
            ip: None,
            port: None,
        }
    }

    /// `ip:port` of the reporting instance. Missing parts read `unknown`.
    pub fn instance_key(&self) -> String {
        let ip = self.ip.as_deref().unwrap_or("unknown");
        match self.port {
            Some(port) => format!("{ip}:{port}"),
            None => format!("{ip}:unknown"),
        }
    }

    /// Merge another instance's sample for the same second into this one.
    ///
    /// Counters add up. `rt` becomes the average weighted by successful
    /// requests, so an instance serving nothing does not drag it to zero.
    fn absorb(&mut self, other: &MetricSample) {
        let weight = other.success_qps.max(0);
        let total = self.success_qps.max(0) + weight;
        if total > 0 {
            self.rt = (self.rt * self.success_qps.max(0) as f64 + other.rt * weight as f64)
                / total as f64;
        }
        self.pass_qps += other.pass_qps;
        self.block_qps += other.block_qps;
        self.success_qps += other.success_qps;
        self.exception_qps += other.exception_qps;
        self.count += 1;
    }
}

/// One sample per timestamp, ascending. On a timestamp collision the sample
/// with the later `gmt_create` wins; ties keep the first seen.
pub fn dedup_by_timestamp(samples: impl IntoIterator<Item = MetricSample>) -> Vec<MetricSample> {
    let mut by_second: BTreeMap<i64, MetricSample> = BTreeMap::new();
    for sample in samples {
        match by_second.get(&sample.timestamp) {
            Some(kept) if kept.gmt_create >= sample.gmt_create => {}
            _ => {
                by_second.insert(sample.timestamp, sample);
            }
        }
    }
    by_second.into_values().collect()
}

/// Fold samples from many instances into one sample per second.
///
/// The folded samples carry no instance and use their timestamp as
/// `gmt_create`, so they pass through [`dedup_by_timestamp`] unchanged.
pub fn fold_instances(
    app: &str,
    resource: &str,
    samples: impl IntoIterator<Item = MetricSample>,
) -> Vec<MetricSample> {
    let mut by_second: BTreeMap<i64, MetricSample> = BTreeMap::new();
    for sample in samples {
        by_second
            .entry(sample.timestamp)
            .or_insert_with(|| MetricSample::new(app, resource, sample.timestamp))
            .absorb(&sample);
    }
    by_second.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, pass: i64, success: i64, rt: f64) -> MetricSample {
        MetricSample {
            pass_qps: pass,
            success_qps: success,
            rt,
            count: 1,
            ..MetricSample::new("orders", "/checkout", timestamp)
        }
    }

    #[test]
    fn instance_key_formats() {
        let mut s = sample(1_000, 0, 0, 0.0);
        assert_eq!(s.instance_key(), "unknown:unknown");
        s.ip = Some("10.0.0.1".into());
        s.port = Some(8719);
        assert_eq!(s.instance_key(), "10.0.0.1:8719");
    }

    #[test]
    fn dedup_prefers_latest_gmt_create() {
        let mut first = sample(1_000, 1, 1, 1.0);
        first.gmt_create = 5;
        let mut second = sample(1_000, 2, 2, 2.0);
        second.gmt_create = 9;
        let other = sample(2_000, 3, 3, 3.0);

        let out = dedup_by_timestamp(vec![other.clone(), second.clone(), first]);
        assert_eq!(out, vec![second, other]);
    }

    #[test]
    fn dedup_tie_keeps_first_seen() {
        let a = sample(1_000, 1, 1, 1.0);
        let b = sample(1_000, 2, 2, 2.0);
        let out = dedup_by_timestamp(vec![a.clone(), b]);
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn fold_weights_rt_by_success() {
        let mut busy = sample(1_000, 10, 10, 0.0);
        busy.rt = 7.5;
        let idle = sample(1_000, 5, 0, 0.0);
        let mut other = sample(1_000, 3, 10, 2.5);
        other.exception_qps = 1;

        let out = fold_instances("orders", "/checkout", vec![busy, idle, other]);
        assert_eq!(out.len(), 1);
        let folded = &out[0];
        assert_eq!(folded.pass_qps, 18);
        assert_eq!(folded.success_qps, 20);
        assert_eq!(folded.exception_qps, 1);
        assert_eq!(folded.count, 3);
        assert!((folded.rt - 5.0).abs() < 1e-9);
        assert_eq!(folded.gmt_create, 1_000);
        assert!(folded.ip.is_none());
    }

    #[test]
    fn fold_keeps_seconds_apart_and_ordered() {
        let out = fold_instances(
            "orders",
            "/checkout",
            vec![sample(3_000, 1, 1, 1.0), sample(1_000, 2, 2, 2.0)],
        );
        let seconds: Vec<i64> = out.iter().map(|s| s.timestamp).collect();
        assert_eq!(seconds, vec![1_000, 3_000]);
    }

    #[test]
    fn camel_case_json() {
        let json = serde_json::to_value(sample(1_000, 4, 4, 1.5)).unwrap();
        assert_eq!(json["passQps"], 4);
        assert_eq!(json["gmtCreate"], 1_000);
        assert!(json.get("ip").is_none());
    }
}
