use crate::error::AppError;
use crate::models::{DimensionFilter, ReportRequest, SortCondition};
use crate::report::ReportSource;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

const OPERATION: &str = "network report";

pub struct AdMobReports {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    report_spec: WireSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpec<'a> {
    date_range: WireDateRange,
    dimensions: &'a [String],
    metrics: &'a [String],
    localization_settings: WireLocalization<'a>,
    #[serde(skip_serializing_if = "is_empty_slice")]
    sort_conditions: &'a [SortCondition],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimension_filters: Vec<WireDimensionFilter<'a>>,
}

fn is_empty_slice<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDateRange {
    start_date: WireDate,
    end_date: WireDate,
}

#[derive(Debug, Serialize)]
struct WireDate {
    year: i32,
    month: u32,
    day: u32,
}

impl From<NaiveDate> for WireDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireLocalization<'a> {
    currency_code: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDimensionFilter<'a> {
    dimension: &'a str,
    matches_any: WireStringList<'a>,
}

#[derive(Debug, Serialize)]
struct WireStringList<'a> {
    values: &'a [String],
}

impl<'a> From<&'a DimensionFilter> for WireDimensionFilter<'a> {
    fn from(filter: &'a DimensionFilter) -> Self {
        Self {
            dimension: &filter.dimension,
            matches_any: WireStringList {
                values: &filter.matches_any,
            },
        }
    }
}

impl AdMobReports {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn generate_url(&self, publisher_id: &str) -> String {
        format!(
            "{}/v1/accounts/{}/networkReport:generate",
            self.base_url.trim_end_matches('/'),
            publisher_id
        )
    }

    fn request_body(request: &ReportRequest) -> GenerateRequest<'_> {
        let spec = &request.spec;
        GenerateRequest {
            report_spec: WireSpec {
                date_range: WireDateRange {
                    start_date: spec.date_range.start.into(),
                    end_date: spec.date_range.end.into(),
                },
                dimensions: &spec.dimensions,
                metrics: &spec.metrics,
                localization_settings: WireLocalization {
                    currency_code: &spec.localization.currency_code,
                    language_code: &spec.localization.language_code,
                },
                sort_conditions: &spec.sort_conditions,
                dimension_filters: spec.dimension_filters.iter().map(Into::into).collect(),
            },
        }
    }
}

#[async_trait]
impl ReportSource for AdMobReports {
    async fn generate(
        &self,
        access_token: &str,
        request: &ReportRequest,
    ) -> Result<Vec<Value>, AppError> {
        let url = self.generate_url(&request.publisher_id);
        tracing::debug!(url = %url, "requesting network report");

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| AppError::remote_transport(OPERATION, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::remote_transport(OPERATION, e))?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(300).collect();
            return Err(AppError::Remote(format!(
                "{OPERATION} failed with HTTP status {}: {excerpt}",
                status.as_u16()
            )));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::Remote(format!("{OPERATION} response is not JSON: {e}")))?;
        match parsed {
            Value::Array(items) => Ok(items),
            _ => Err(AppError::Remote(format!(
                "{OPERATION} response is not a JSON array"
            ))),
        }
    }
}
