use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Margin applied when deciding whether an access token is still usable.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// Delegated-access credential for the reporting API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Expired,
}

impl Credential {
    pub fn status_at(&self, now: DateTime<Utc>) -> CredentialStatus {
        if now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expiry {
            CredentialStatus::Expired
        } else {
            CredentialStatus::Valid
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localization {
    pub currency_code: String,
    pub language_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Orders rows by exactly one of a dimension or a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub order: SortOrder,
}

/// Keeps rows whose dimension value is one of `matches_any`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub dimension: String,
    pub matches_any: Vec<String>,
}

/// Fully determines one network report query. Built by
/// [`crate::report::build_report_request`], never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSpecification {
    pub date_range: DateRange,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub localization: Localization,
    pub sort_conditions: Vec<SortCondition>,
    pub dimension_filters: Vec<DimensionFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub publisher_id: String,
    pub spec: ReportSpecification,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: BTreeMap<String, DimensionValue>,
    #[serde(default)]
    pub metric_values: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionValue {
    pub value: Option<String>,
}

/// Int64 values arrive JSON-encoded as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub micros_value: Option<String>,
}

#[cfg(test)]
impl ReportRow {
    pub fn new(dimensions: &[(&str, &str)], micros: &[(&str, i64)]) -> Self {
        Self {
            dimension_values: dimensions
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        DimensionValue {
                            value: Some(value.to_string()),
                        },
                    )
                })
                .collect(),
            metric_values: micros
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        MetricValue {
                            micros_value: Some(value.to_string()),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Per-key currency totals for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Earnings {
    pub currency_code: String,
    pub totals: BTreeMap<String, f64>,
}

impl Earnings {
    pub fn grand_total(&self) -> f64 {
        self.totals.values().sum()
    }
}
