use crate::error::AppError;
use crate::models::{
    Credential, DateRange, DimensionFilter, Earnings, Localization, ReportRequest, ReportRow,
    ReportSpecification, SortCondition,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

pub mod admob;
mod present;

pub use present::present;

pub const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Executes a report query and returns the raw response elements,
/// framing records included.
#[async_trait]
pub trait ReportSource {
    async fn generate(
        &self,
        access_token: &str,
        request: &ReportRequest,
    ) -> Result<Vec<Value>, AppError>;
}

fn require_names(kind: &str, names: &[String]) -> Result<Vec<String>, AppError> {
    if names.is_empty() {
        return Err(AppError::InvalidRequest(format!("{kind} list is empty")));
    }
    names
        .iter()
        .map(|name| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                Err(AppError::InvalidRequest(format!("blank {kind} name")))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

/// Validates the inputs eagerly and freezes them into a request. No I/O.
pub fn build_report_request(
    publisher_id: &str,
    date_range: DateRange,
    dimensions: &[String],
    metrics: &[String],
    localization: Localization,
    sort_conditions: &[SortCondition],
    dimension_filters: &[DimensionFilter],
) -> Result<ReportRequest, AppError> {
    let publisher_id = publisher_id.trim();
    if publisher_id.is_empty() {
        return Err(AppError::InvalidRequest(
            "publisher id is not configured".into(),
        ));
    }
    if !publisher_id.starts_with("pub-") {
        return Err(AppError::InvalidRequest(format!(
            "publisher id '{publisher_id}' must look like pub-XXXXXXXXXXXXXXXX"
        )));
    }
    if date_range.end < date_range.start {
        return Err(AppError::InvalidRequest(format!(
            "end date {} is before start date {}",
            date_range.end, date_range.start
        )));
    }

    let dimensions = require_names("dimension", dimensions)?;
    let metrics = require_names("metric", metrics)?;

    let localization = Localization {
        currency_code: localization.currency_code.trim().to_ascii_uppercase(),
        language_code: localization.language_code.trim().to_string(),
    };
    if localization.currency_code.is_empty() || localization.language_code.is_empty() {
        return Err(AppError::InvalidRequest(
            "currency and language codes must be set".into(),
        ));
    }

    for cond in sort_conditions {
        match (&cond.dimension, &cond.metric) {
            (Some(d), None) if dimensions.contains(d) => {}
            (None, Some(m)) if metrics.contains(m) => {}
            _ => {
                return Err(AppError::InvalidRequest(format!(
                    "sort condition must name exactly one requested dimension or metric: {cond:?}"
                )))
            }
        }
    }
    for filter in dimension_filters {
        if !dimensions.contains(&filter.dimension) {
            return Err(AppError::InvalidRequest(format!(
                "filter dimension '{}' is not part of the request",
                filter.dimension
            )));
        }
        if filter.matches_any.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "filter on '{}' has no values",
                filter.dimension
            )));
        }
    }

    Ok(ReportRequest {
        publisher_id: publisher_id.to_string(),
        spec: ReportSpecification {
            date_range,
            dimensions,
            metrics,
            localization,
            sort_conditions: sort_conditions.to_vec(),
            dimension_filters: dimension_filters.to_vec(),
        },
    })
}

/// Drops the header (first) and footer (last) records, whatever they hold.
pub fn data_records(raw: &[Value]) -> Result<&[Value], AppError> {
    if raw.len() < 2 {
        return Err(AppError::Remote(format!(
            "malformed report response: expected header and footer records, got {} element(s)",
            raw.len()
        )));
    }
    Ok(&raw[1..raw.len() - 1])
}

pub fn parse_rows(records: &[Value]) -> Result<Vec<ReportRow>, AppError> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let row = record.get("row").ok_or_else(|| {
                AppError::DataShape(format!("record {} has no row payload", idx + 1))
            })?;
            serde_json::from_value(row.clone()).map_err(|e| {
                AppError::DataShape(format!("record {} is not a report row: {e}", idx + 1))
            })
        })
        .collect()
}

/// Runs the query and returns only the data rows.
pub async fn execute<S>(
    source: &S,
    credential: &Credential,
    request: &ReportRequest,
) -> Result<Vec<ReportRow>, AppError>
where
    S: ReportSource + Sync + ?Sized,
{
    let raw = source.generate(&credential.access_token, request).await?;
    let rows = parse_rows(data_records(&raw)?)?;
    tracing::info!(
        publisher_id = %request.publisher_id,
        rows = rows.len(),
        "network report fetched"
    );
    Ok(rows)
}

/// Sums `metric` (micro-units) per value of `group_by`, in currency units.
pub fn aggregate(
    rows: &[ReportRow],
    group_by: &str,
    metric: &str,
    currency_code: &str,
) -> Result<Earnings, AppError> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();

    for (idx, row) in rows.iter().enumerate() {
        let key = row
            .dimension_values
            .get(group_by)
            .and_then(|d| d.value.as_deref())
            .ok_or_else(|| {
                AppError::DataShape(format!("row {idx} is missing dimension {group_by}"))
            })?;
        let micros = row
            .metric_values
            .get(metric)
            .and_then(|m| m.micros_value.as_deref())
            .ok_or_else(|| AppError::DataShape(format!("row {idx} is missing metric {metric}")))?;
        let micros: i64 = micros.trim().parse().map_err(|_| {
            AppError::DataShape(format!(
                "row {idx} has non-integer {metric} micros value '{micros}'"
            ))
        })?;

        *totals.entry(key.to_string()).or_insert(0.0) += micros as f64 / MICROS_PER_UNIT;
    }

    Ok(Earnings {
        currency_code: currency_code.to_string(),
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortOrder;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).expect("start"),
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).expect("end"),
        }
    }

    fn usd() -> Localization {
        Localization {
            currency_code: "usd".into(),
            language_code: "en-US".into(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn build(dimensions: &[&str], metrics: &[&str]) -> Result<ReportRequest, AppError> {
        build_report_request(
            "pub-1234567890123456",
            range((2020, 9, 1), (2020, 12, 31)),
            &names(dimensions),
            &names(metrics),
            usd(),
            &[],
            &[],
        )
    }

    fn earnings_row(month: &str, micros: i64) -> ReportRow {
        ReportRow::new(
            &[("MONTH", month), ("APP", "ca-app-pub-1~2")],
            &[("ESTIMATED_EARNINGS", micros)],
        )
    }

    #[test]
    fn build_report_request_normalizes_inputs() {
        let request = build(&["MONTH", " APP "], &["ESTIMATED_EARNINGS"]).expect("request");
        assert_eq!(request.publisher_id, "pub-1234567890123456");
        assert_eq!(request.spec.dimensions, vec!["MONTH", "APP"]);
        assert_eq!(request.spec.localization.currency_code, "USD");
    }

    #[test]
    fn build_report_request_rejects_inverted_range() {
        let err = build_report_request(
            "pub-1",
            range((2020, 12, 31), (2020, 9, 1)),
            &names(&["MONTH"]),
            &names(&["ESTIMATED_EARNINGS"]),
            usd(),
            &[],
            &[],
        )
        .expect_err("inverted range");
        assert!(err.to_string().contains("before start date"));
    }

    #[test]
    fn build_report_request_accepts_single_day_range() {
        let request = build_report_request(
            "pub-1",
            range((2020, 10, 1), (2020, 10, 1)),
            &names(&["DATE"]),
            &names(&["CLICKS"]),
            usd(),
            &[],
            &[],
        );
        assert!(request.is_ok());
    }

    #[test]
    fn build_report_request_rejects_empty_lists_and_bad_publisher() {
        assert!(build(&["MONTH"], &[]).is_err());
        assert!(build(&[], &["ESTIMATED_EARNINGS"]).is_err());
        assert!(build(&["MONTH"], &["  "]).is_err());

        let err = build_report_request(
            "ca-app-pub-1",
            range((2020, 9, 1), (2020, 9, 30)),
            &names(&["MONTH"]),
            &names(&["ESTIMATED_EARNINGS"]),
            usd(),
            &[],
            &[],
        )
        .expect_err("bad publisher");
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn build_report_request_checks_sorts_and_filters_against_request() {
        let dims = names(&["MONTH", "APP"]);
        let metrics = names(&["ESTIMATED_EARNINGS"]);
        let ok_sort = SortCondition {
            dimension: Some("MONTH".into()),
            metric: None,
            order: SortOrder::Descending,
        };
        let bad_sort = SortCondition {
            dimension: Some("COUNTRY".into()),
            metric: None,
            order: SortOrder::Ascending,
        };
        let both_sort = SortCondition {
            dimension: Some("MONTH".into()),
            metric: Some("ESTIMATED_EARNINGS".into()),
            order: SortOrder::Ascending,
        };
        let filter = DimensionFilter {
            dimension: "APP".into(),
            matches_any: vec!["ca-app-pub-1~2".into()],
        };
        let r = range((2020, 9, 1), (2020, 12, 31));

        assert!(build_report_request("pub-1", r, &dims, &metrics, usd(), &[ok_sort], &[filter.clone()]).is_ok());
        assert!(build_report_request("pub-1", r, &dims, &metrics, usd(), &[bad_sort], &[]).is_err());
        assert!(build_report_request("pub-1", r, &dims, &metrics, usd(), &[both_sort], &[]).is_err());

        let empty_filter = DimensionFilter {
            dimension: "APP".into(),
            matches_any: vec![],
        };
        assert!(build_report_request("pub-1", r, &dims, &metrics, usd(), &[], &[empty_filter]).is_err());
    }

    #[test]
    fn data_records_strip_exactly_first_and_last() {
        let raw = vec![
            json!({"row": {"dimensionValues": {"MONTH": {"value": "HEADER"}}}}),
            json!({"row": {"n": 1}}),
            json!({"row": {"n": 2}}),
            json!({"row": {"dimensionValues": {"MONTH": {"value": "FOOTER"}}}}),
        ];
        let data = data_records(&raw).expect("data");
        assert_eq!(data, &raw[1..3]);

        let framing_only = vec![json!({"header": {}}), json!({"footer": {}})];
        assert!(data_records(&framing_only).expect("empty").is_empty());

        assert!(matches!(data_records(&[json!({})]), Err(AppError::Remote(_))));
        assert!(data_records(&[]).is_err());
    }

    #[test]
    fn parse_rows_rejects_records_without_row() {
        let err = parse_rows(&[json!({"footer": {"matchingRowCount": "3"}})]).expect_err("no row");
        assert!(matches!(err, AppError::DataShape(_)));
    }

    #[test]
    fn aggregate_sums_per_month() {
        let rows = vec![
            earnings_row("202010", 5_000_000),
            earnings_row("202010", 3_000_000),
            earnings_row("202011", 1_000_000),
        ];
        let earnings = aggregate(&rows, "MONTH", "ESTIMATED_EARNINGS", "USD").expect("aggregate");

        assert_eq!(earnings.totals.len(), 2);
        assert!((earnings.totals["202010"] - 8.0).abs() < 1e-9);
        assert!((earnings.totals["202011"] - 1.0).abs() < 1e-9);
        assert!((earnings.grand_total() - 9.0).abs() < 1e-9);
        assert_eq!(present(&earnings, "202010").expect("present"), "$8.00");
    }

    #[test]
    fn aggregate_totals_match_row_sums() {
        let micros = [1_234_567_i64, 89_000, 10_000_000_001, 0, 555_555];
        let rows: Vec<ReportRow> = micros
            .iter()
            .enumerate()
            .map(|(i, m)| earnings_row(if i % 2 == 0 { "202009" } else { "202012" }, *m))
            .collect();
        let earnings = aggregate(&rows, "MONTH", "ESTIMATED_EARNINGS", "USD").expect("aggregate");

        let expected: f64 = micros.iter().map(|m| *m as f64 / MICROS_PER_UNIT).sum();
        assert!((earnings.grand_total() - expected).abs() < 1e-6);
        let sept: f64 = [micros[0], micros[2], micros[4]]
            .iter()
            .map(|m| *m as f64 / MICROS_PER_UNIT)
            .sum();
        assert!((earnings.totals["202009"] - sept).abs() < 1e-6);
    }

    #[test]
    fn aggregate_of_no_rows_is_empty() {
        let earnings = aggregate(&[], "MONTH", "ESTIMATED_EARNINGS", "USD").expect("aggregate");
        assert!(earnings.totals.is_empty());
        assert!(matches!(
            present(&earnings, "202010"),
            Err(AppError::Lookup(_))
        ));
    }

    #[test]
    fn aggregate_rejects_rows_missing_fields() {
        let missing_dim = ReportRow::new(&[("APP", "x")], &[("ESTIMATED_EARNINGS", 1)]);
        let err = aggregate(&[missing_dim], "MONTH", "ESTIMATED_EARNINGS", "USD")
            .expect_err("missing dimension");
        assert!(matches!(err, AppError::DataShape(_)));

        let missing_metric = ReportRow::new(&[("MONTH", "202010")], &[("CLICKS", 1)]);
        let err = aggregate(&[missing_metric], "MONTH", "ESTIMATED_EARNINGS", "USD")
            .expect_err("missing metric");
        assert!(err.to_string().contains("missing metric ESTIMATED_EARNINGS"));

        let garbage: ReportRow = serde_json::from_value(json!({
            "dimensionValues": {"MONTH": {"value": "202010"}},
            "metricValues": {"ESTIMATED_EARNINGS": {"microsValue": "12.5"}}
        }))
        .expect("row");
        assert!(aggregate(&[garbage], "MONTH", "ESTIMATED_EARNINGS", "USD").is_err());
    }

    struct CannedSource {
        response: Vec<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportSource for CannedSource {
        async fn generate(
            &self,
            access_token: &str,
            request: &ReportRequest,
        ) -> Result<Vec<Value>, AppError> {
            assert_eq!(access_token, "ya29.token");
            assert_eq!(request.publisher_id, "pub-1234567890123456");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn execute_returns_only_data_rows() {
        let source = CannedSource {
            response: vec![
                json!({"header": {"dateRange": {}}}),
                json!({"row": {
                    "dimensionValues": {"MONTH": {"value": "202010"}},
                    "metricValues": {"ESTIMATED_EARNINGS": {"microsValue": "2500000"}}
                }}),
                json!({"footer": {"matchingRowCount": "1"}}),
            ],
            calls: AtomicUsize::new(0),
        };
        let credential = Credential {
            access_token: "ya29.token".into(),
            refresh_token: None,
            expiry: chrono::Utc::now(),
            scopes: vec![],
        };
        let request = build(&["MONTH"], &["ESTIMATED_EARNINGS"]).expect("request");

        let rows = execute(&source, &credential, &request).await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let earnings = aggregate(&rows, "MONTH", "ESTIMATED_EARNINGS", "USD").expect("aggregate");
        assert_eq!(present(&earnings, "202010").expect("present"), "$2.50");
    }
}
