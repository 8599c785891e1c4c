use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldError},
    resources::ResourceKind,
};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// QuerySpec
///
/// Normalised collection parameters. `page >= 1` and `page_size > 0` always hold.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Exact-match filters as `(column, value)`.
    pub filters: Vec<(&'static str, String)>,
    /// Case-insensitive substring filters as `(column, needle)`.
    pub contains: Vec<(&'static str, String)>,
    pub search_term: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_field: &'static str,
    pub sort_ascending: bool,
    pub page: u32,
    pub page_size: u32,
}

impl QuerySpec {
    /// from_params
    ///
    /// Reads `page`, `limit`, `sort_by`, `sort_order`, `search`, `date_from`,
    /// `date_to` and the kind's own filters. Non-numeric or non-positive
    /// `page`/`limit` fall back to `1`/`10`; `limit` is capped at 100.
    /// An unknown `sort_by` or an unparsable date is rejected.
    pub fn from_params(kind: ResourceKind, params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let spec = kind.spec();
        let param = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let page = param("page")
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(DEFAULT_PAGE);
        let page_size = param("limit")
            .and_then(|l| l.parse::<u32>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);

        let (sort_field, sort_ascending) = match param("sort_by") {
            Some(requested) => {
                let column = spec.sort_column(requested).ok_or_else(|| {
                    ApiError::invalid_fields(
                        "Unsupported sort field",
                        vec![FieldError::new(
                            "sort_by",
                            format!("must be one of: {}", spec.sortable.join(", ")),
                        )],
                    )
                })?;
                let ascending = param("sort_order").is_some_and(|o| o.eq_ignore_ascii_case("asc"));
                (column, ascending)
            }
            None => {
                let (column, default_ascending) = spec.default_sort;
                let ascending = match param("sort_order") {
                    Some(order) => order.eq_ignore_ascii_case("asc"),
                    None => default_ascending,
                };
                (column, ascending)
            }
        };

        let filters = spec
            .filters
            .iter()
            .filter_map(|column| param(*column).map(|v| (*column, v.to_string())))
            .collect();
        let contains = spec
            .contains_filters
            .iter()
            .filter_map(|(key, column)| param(*key).map(|v| (*column, v.to_string())))
            .collect();

        let (date_from, date_to) = if spec.date_field.is_some() {
            (
                param("date_from").map(|d| parse_bound("date_from", d, false)).transpose()?,
                param("date_to").map(|d| parse_bound("date_to", d, true)).transpose()?,
            )
        } else {
            (None, None)
        };

        Ok(Self {
            filters,
            contains,
            search_term: param("search").map(str::to_string),
            date_from,
            date_to,
            sort_field,
            sort_ascending,
            page,
            page_size,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// The recognised parameters, echoed back to the client.
    pub fn applied_filters(&self) -> BTreeMap<String, Option<String>> {
        let mut applied = BTreeMap::new();
        for (column, value) in self.filters.iter().chain(self.contains.iter()) {
            applied.insert(column.to_string(), Some(value.clone()));
        }
        applied.insert("search".to_string(), self.search_term.clone());
        applied.insert("date_from".to_string(), self.date_from.map(|d| d.to_rfc3339()));
        applied.insert("date_to".to_string(), self.date_to.map(|d| d.to_rfc3339()));
        applied
    }
}

/// Accepts RFC 3339 timestamps or plain dates. A plain upper bound covers the
/// whole day.
fn parse_bound(key: &str, raw: &str, upper: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if upper {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        } else {
            NaiveTime::from_hms_opt(0, 0, 0)
        };
        if let Some(time) = time {
            return Ok(date.and_time(time).and_utc());
        }
    }
    Err(ApiError::invalid_fields(
        "Invalid date filter",
        vec![FieldError::new(key, "must be a date (YYYY-MM-DD) or RFC 3339 timestamp")],
    ))
}

/// A free-text search: OR of case-insensitive substring matches.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchClause {
    pub fields: &'static [&'static str],
    pub term: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub field: &'static str,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// ProviderQuery
///
/// The store-facing form of a collection request. Every identifier in it is
/// taken from the kind's static descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    pub table: &'static str,
    pub equals: Vec<(&'static str, String)>,
    pub contains: Vec<(&'static str, String)>,
    pub search: Option<SearchClause>,
    pub range: Option<TimeRange>,
    pub order_by: &'static str,
    pub ascending: bool,
    pub offset: u64,
    pub limit: u64,
}

impl ProviderQuery {
    /// build
    ///
    /// Translates a `QuerySpec`, adding the kind's fixed predicates.
    pub fn build(kind: ResourceKind, spec: &QuerySpec) -> Self {
        let descriptor = kind.spec();

        let mut equals: Vec<(&'static str, String)> = descriptor
            .fixed_filters
            .iter()
            .map(|(column, value)| (*column, value.to_string()))
            .collect();
        equals.extend(spec.filters.iter().cloned());

        let search = spec
            .search_term
            .as_ref()
            .filter(|_| !descriptor.searchable.is_empty())
            .map(|term| SearchClause {
                fields: descriptor.searchable,
                term: term.clone(),
            });

        let range = descriptor.date_field.and_then(|field| {
            (spec.date_from.is_some() || spec.date_to.is_some()).then(|| TimeRange {
                field,
                from: spec.date_from,
                to: spec.date_to,
            })
        });

        Self {
            table: descriptor.table,
            equals,
            contains: spec.contains.clone(),
            search,
            range,
            order_by: spec.sort_field,
            ascending: spec.sort_ascending,
            offset: spec.offset(),
            limit: u64::from(spec.page_size),
        }
    }

    /// Narrows the query to rows owned by `owner_id`.
    pub fn owned_by(mut self, column: &'static str, owner_id: String) -> Self {
        self.equals.push((column, owner_id));
        self
    }

    /// Drops the kind's fixed predicates (owners see their inactive rows too).
    pub fn without_fixed(mut self, kind: ResourceKind) -> Self {
        let fixed = kind.spec().fixed_filters;
        self.equals
            .retain(|(column, value)| !fixed.iter().any(|(c, v)| c == column && v == value));
        self
    }
}

/// Pagination
///
/// Metadata derived from `page`, `limit` and the provider's total count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn compute(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit));
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: u64::from(page) < total_pages,
            has_prev_page: page > 1,
        }
    }
}
