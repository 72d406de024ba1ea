//! Query parameters, their normalization, and the paged response shape.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{QueryError, QueryResult};

/// Widest window any query may span.
pub const MAX_QUERY_INTERVAL_MS: i64 = 60 * 60 * 1000;
/// Default look-back of list queries.
pub const DEFAULT_LIST_SPAN_MS: i64 = 5 * 60 * 1000;
/// Default look-back of single-resource queries.
pub const DEFAULT_RESOURCE_SPAN_MS: i64 = 60 * 1000;
pub const DEFAULT_PAGE_SIZE: usize = 6;
pub const MAX_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Aggregate,
    Instance,
}

impl ViewMode {
    /// `instance` selects the per-instance view; anything else aggregates.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(mode) if mode.eq_ignore_ascii_case("instance") => Self::Instance,
            _ => Self::Aggregate,
        }
    }
}

/// Paged list query, as sent by the console.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub app: Option<String>,
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
    pub desc: Option<bool>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub search_key: Option<String>,
    pub view_mode: Option<String>,
    /// Instance view only; applies when `port` and a non-empty `ip` are set.
    pub ip: Option<String>,
    pub port: Option<i32>,
}

impl MetricQuery {
    pub fn for_app(app: impl Into<String>) -> Self {
        Self {
            app: Some(app.into()),
            ..Default::default()
        }
    }
}

/// Unpaged query for one resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub app: Option<String>,
    pub identity: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Paging {
    pub page_index: usize,
    pub page_size: usize,
    pub desc: bool,
}

pub(crate) fn require(value: Option<&str>, message: &str) -> QueryResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(QueryError::Invalid(message.to_string())),
    }
}

pub(crate) fn resolve_window(
    start: Option<i64>,
    end: Option<i64>,
    now: i64,
    default_span: i64,
) -> QueryResult<Window> {
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end.saturating_sub(default_span));
    // Both bounds come from the caller; a span that overflows is too big too.
    if end
        .checked_sub(start)
        .is_none_or(|span| span > MAX_QUERY_INTERVAL_MS)
    {
        return Err(QueryError::Invalid(
            "time intervalMs is too big, must <= 1h".into(),
        ));
    }
    Ok(Window { start, end })
}

pub(crate) fn resolve_paging(query: &MetricQuery) -> Paging {
    let page_size = match query.page_size {
        Some(size) if size >= MAX_PAGE_SIZE as i64 => MAX_PAGE_SIZE,
        Some(size) if size >= 1 => size as usize,
        _ => DEFAULT_PAGE_SIZE,
    };
    let page_index = match query.page_index {
        Some(index) if index >= 1 => index as usize,
        _ => 1,
    };
    Paging {
        page_index,
        page_size,
        desc: query.desc.unwrap_or(true),
    }
}

/// Result of slicing the ranked resource list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slice {
    pub keys: Vec<String>,
    pub total_count: usize,
    pub total_page: usize,
}

/// Order, filter and cut one page out of `ranked`.
///
/// `ranked` arrives hottest first; ascending order reverses it. A page past
/// the end is empty while the totals still describe the full list.
pub(crate) fn paginate(mut ranked: Vec<String>, paging: &Paging, search_key: Option<&str>) -> Slice {
    if !paging.desc {
        ranked.reverse();
    }
    if let Some(key) = search_key.filter(|k| !k.is_empty()) {
        ranked.retain(|resource| resource.contains(key));
    }
    let total_count = ranked.len();
    let total_page = total_count.div_ceil(paging.page_size);
    let keys = if paging.page_index <= total_page {
        let from = (paging.page_index - 1) * paging.page_size;
        let to = (from + paging.page_size).min(total_count);
        ranked[from..to].to_vec()
    } else {
        Vec::new()
    };
    Slice {
        keys,
        total_count,
        total_page,
    }
}

/// String-keyed map that serializes as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// One page of a paged metric view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPage<T> {
    pub total_count: usize,
    pub total_page: usize,
    pub page_index: usize,
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<ViewMode>,
    pub metric: OrderedMap<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/r{i:02}")).collect()
    }

    fn paging(page_index: usize) -> Paging {
        Paging {
            page_index,
            page_size: 6,
            desc: true,
        }
    }

    #[test]
    fn paging_defaults_and_caps() {
        let q = MetricQuery::default();
        assert_eq!(
            resolve_paging(&q),
            Paging {
                page_index: 1,
                page_size: DEFAULT_PAGE_SIZE,
                desc: true
            }
        );

        let q = MetricQuery {
            page_size: Some(50),
            page_index: Some(-3),
            desc: Some(false),
            ..Default::default()
        };
        let p = resolve_paging(&q);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
        assert_eq!(p.page_index, 1);
        assert!(!p.desc);

        let q = MetricQuery {
            page_size: Some(0),
            ..Default::default()
        };
        assert_eq!(resolve_paging(&q).page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn window_limit_is_inclusive() {
        assert!(resolve_window(Some(0), Some(MAX_QUERY_INTERVAL_MS), 0, DEFAULT_LIST_SPAN_MS).is_ok());
        let err = resolve_window(Some(0), Some(MAX_QUERY_INTERVAL_MS + 1), 0, DEFAULT_LIST_SPAN_MS)
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::Invalid("time intervalMs is too big, must <= 1h".into())
        );
    }

    #[test]
    fn extreme_bounds_are_rejected_without_overflow() {
        let too_big = QueryError::Invalid("time intervalMs is too big, must <= 1h".into());
        assert_eq!(
            resolve_window(Some(i64::MIN), Some(i64::MAX), 0, DEFAULT_LIST_SPAN_MS).unwrap_err(),
            too_big
        );
        assert_eq!(
            resolve_window(Some(i64::MAX), Some(i64::MIN), 0, DEFAULT_LIST_SPAN_MS).unwrap_err(),
            too_big
        );
        let w = resolve_window(None, Some(i64::MIN), 0, DEFAULT_LIST_SPAN_MS).unwrap();
        assert_eq!(w, Window { start: i64::MIN, end: i64::MIN });
    }

    #[test]
    fn window_defaults_from_now() {
        let w = resolve_window(None, None, 1_000_000, DEFAULT_LIST_SPAN_MS).unwrap();
        assert_eq!(w, Window { start: 700_000, end: 1_000_000 });
        let w = resolve_window(None, Some(500_000), 1_000_000, DEFAULT_RESOURCE_SPAN_MS).unwrap();
        assert_eq!(w, Window { start: 440_000, end: 500_000 });
    }

    #[test]
    fn thirteen_resources_make_three_pages() {
        let third = paginate(resources(13), &paging(3), None);
        assert_eq!(third.keys, vec!["/r12".to_string()]);
        assert_eq!(third.total_count, 13);
        assert_eq!(third.total_page, 3);

        let fourth = paginate(resources(13), &paging(4), None);
        assert!(fourth.keys.is_empty());
        assert_eq!(fourth.total_page, 3);
    }

    #[test]
    fn ascending_reverses_and_search_filters() {
        let asc = Paging {
            desc: false,
            ..paging(1)
        };
        let page = paginate(resources(3), &asc, None);
        assert_eq!(page.keys, vec!["/r02", "/r01", "/r00"]);

        let page = paginate(resources(13), &paging(1), Some("r1"));
        assert_eq!(page.keys, vec!["/r10", "/r11", "/r12"]);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.total_page, 1);
    }

    #[test]
    fn view_mode_parsing() {
        assert_eq!(ViewMode::parse(None), ViewMode::Aggregate);
        assert_eq!(ViewMode::parse(Some("instance")), ViewMode::Instance);
        assert_eq!(ViewMode::parse(Some("weird")), ViewMode::Aggregate);
    }

    #[test]
    fn ordered_map_keeps_insertion_order_in_json() {
        let mut map = OrderedMap::new();
        map.push("zeta", 1);
        map.push("alpha", 2);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":2}"#);
        assert_eq!(map.get("alpha"), Some(&2));
    }

    #[test]
    fn query_reads_camel_case() {
        let q: MetricQuery = serde_json::from_str(
            r#"{"app":"orders","pageIndex":2,"pageSize":10,"searchKey":"GET","viewMode":"instance"}"#,
        )
        .unwrap();
        assert_eq!(q.page_index, Some(2));
        assert_eq!(q.search_key.as_deref(), Some("GET"));
        assert_eq!(ViewMode::parse(q.view_mode.as_deref()), ViewMode::Instance);
    }
}
