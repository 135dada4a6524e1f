use crate::auth::google::GoogleOAuth;
use crate::auth::{AuthorizationCodeProvider, CredentialStore};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{DateRange, Earnings, Localization, ReportRequest};
use crate::report::admob::AdMobReports;
use crate::report::{aggregate, build_report_request, execute};
use reqwest::Client;

/// Wires the credential store and the report pipeline from one config.
pub struct EarningsService<P> {
    cfg: AppConfig,
    store: CredentialStore<GoogleOAuth, P>,
    reports: AdMobReports,
}

impl<P> EarningsService<P>
where
    P: AuthorizationCodeProvider + Send + Sync,
{
    pub fn new(cfg: AppConfig, codes: P) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(cfg.http.connect_timeout())
            .timeout(cfg.http.timeout())
            .build()
            .map_err(|e| AppError::Config(format!("cannot build HTTP client: {e}")))?;

        let oauth = GoogleOAuth::new(
            client.clone(),
            cfg.client_secrets_path()?,
            cfg.oauth.redirect_uri.clone(),
        );
        let store = CredentialStore::new(
            cfg.token_path()?,
            vec![cfg.oauth.scope.clone()],
            oauth,
            codes,
        );
        let reports = AdMobReports::new(client, cfg.http.api_base_url.clone());

        Ok(Self {
            cfg,
            store,
            reports,
        })
    }

    pub fn report_request(&self) -> Result<ReportRequest, AppError> {
        let report = &self.cfg.report;
        let request = build_report_request(
            &self.cfg.publisher_id,
            DateRange {
                start: report.start_date,
                end: report.end_date,
            },
            &report.dimensions,
            &report.metrics,
            Localization {
                currency_code: report.currency_code.clone(),
                language_code: report.language_code.clone(),
            },
            &report.sort_conditions,
            &report.dimension_filters,
        )?;

        if !request.spec.dimensions.contains(&report.group_by) {
            return Err(AppError::Config(format!(
                "group_by dimension '{}' is not among the requested dimensions",
                report.group_by
            )));
        }
        if !request.spec.metrics.contains(&report.metric) {
            return Err(AppError::Config(format!(
                "metric '{}' is not among the requested metrics",
                report.metric
            )));
        }
        Ok(request)
    }

    /// Authenticates, fetches the report and folds it into per-key totals.
    pub async fn earnings(&self) -> Result<Earnings, AppError> {
        let request = self.report_request()?;
        let credential = self.store.acquire().await?;
        let rows = execute(&self.reports, &credential, &request).await?;

        let earnings = aggregate(
            &rows,
            &self.cfg.report.group_by,
            &self.cfg.report.metric,
            &request.spec.localization.currency_code,
        )?;
        tracing::info!(
            keys = earnings.totals.len(),
            total = earnings.grand_total(),
            "earnings aggregated"
        );
        Ok(earnings)
    }
}
