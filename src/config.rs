use crate::error::AppError;
use crate::models::{DimensionFilter, SortCondition};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVICE_NAME: &str = "admob-earnings";
pub const HOME_ENV: &str = "ADMOB_EARNINGS_HOME";
const ENV_PREFIX: &str = "ADMOB_EARNINGS";

pub const ADMOB_REPORT_SCOPE: &str = "https://www.googleapis.com/auth/admob.report";
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "admob-tools", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".admob-earnings"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub publisher_id: String,
    pub oauth: OAuthSettings,
    pub report: ReportSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub scope: String,
    pub redirect_uri: Option<String>,
    pub client_secrets_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub currency_code: String,
    pub language_code: String,
    pub group_by: String,
    pub metric: String,
    pub display_key: String,
    pub sort_conditions: Vec<SortCondition>,
    pub dimension_filters: Vec<DimensionFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub api_base_url: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            publisher_id: String::new(),
            oauth: OAuthSettings::default(),
            report: ReportSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            scope: ADMOB_REPORT_SCOPE.into(),
            redirect_uri: None,
            client_secrets_path: None,
            token_path: None,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or_default(),
            dimensions: vec!["MONTH".into(), "APP".into(), "PLATFORM".into()],
            metrics: vec!["ESTIMATED_EARNINGS".into()],
            currency_code: "USD".into(),
            language_code: "en-US".into(),
            group_by: "MONTH".into(),
            metric: "ESTIMATED_EARNINGS".into(),
            display_key: "202010".into(),
            sort_conditions: vec![],
            dimension_filters: vec![],
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://admob.googleapis.com".into(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl AppConfig {
    pub fn client_secrets_path(&self) -> Result<PathBuf, AppError> {
        match &self.oauth.client_secrets_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("client_secrets.json")),
        }
    }

    pub fn token_path(&self) -> Result<PathBuf, AppError> {
        match &self.oauth.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("token.json")),
        }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from(&config_path()?)
}

/// Layers the TOML file (optional) and `ADMOB_EARNINGS_*` environment
/// overrides on top of the built-in defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let settings = config::Config::builder()
        .add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(false),
        )
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let mut parsed: AppConfig = settings.try_deserialize()?;
    parsed.publisher_id = parsed.publisher_id.trim().to_string();
    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

/// OAuth client identity from a Google Cloud console `client_secrets.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecretsEntry>,
    web: Option<ClientSecretsEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsEntry {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "cannot read client secrets {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&raw).map_err(|reason| {
            AppError::Config(format!(
                "invalid client secrets {}: {reason}",
                path.display()
            ))
        })
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let entry = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client entry".to_string())?;

        let client_id = entry.client_id.trim().to_string();
        let client_secret = entry.client_secret.trim().to_string();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err("client_id and client_secret must not be empty".into());
        }

        Ok(Self {
            client_id,
            client_secret,
            auth_uri: entry.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URI.into()),
            token_uri: entry.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.into()),
            redirect_uris: entry.redirect_uris,
        })
    }

    /// Configured override, then the bundle's first redirect, then out-of-band.
    pub fn resolve_redirect_uri(&self, configured: Option<&str>) -> String {
        configured
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .or_else(|| self.redirect_uris.first().cloned())
            .unwrap_or_else(|| OOB_REDIRECT_URI.to_string())
    }
}
