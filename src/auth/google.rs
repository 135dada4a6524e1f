use crate::auth::{TokenEndpoint, TokenGrant};
use crate::config::ClientSecrets;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;
use url::Url;

/// Google's OAuth2 authorization server, configured from a client secrets
/// bundle that is read at most once, and only when a grant is needed.
pub struct GoogleOAuth {
    client: Client,
    secrets_path: PathBuf,
    redirect_override: Option<String>,
    loaded: OnceLock<LoadedSecrets>,
}

struct LoadedSecrets {
    secrets: ClientSecrets,
    redirect_uri: String,
}

impl GoogleOAuth {
    pub fn new(client: Client, secrets_path: PathBuf, redirect_override: Option<String>) -> Self {
        Self {
            client,
            secrets_path,
            redirect_override,
            loaded: OnceLock::new(),
        }
    }

    fn secrets(&self) -> Result<&LoadedSecrets, AppError> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded);
        }
        let secrets = ClientSecrets::load(&self.secrets_path)?;
        let redirect_uri = secrets.resolve_redirect_uri(self.redirect_override.as_deref());
        tracing::debug!(path = %self.secrets_path.display(), "client secrets loaded");
        Ok(self.loaded.get_or_init(|| LoadedSecrets {
            secrets,
            redirect_uri,
        }))
    }

    async fn post_token_form(
        &self,
        operation: &'static str,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenGrant, AppError> {
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::authorization_transport(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::authorization_transport(operation, e))?;

        if !status.is_success() {
            return Err(AppError::Authorization(format!(
                "{operation} failed ({}): {}",
                status.as_u16(),
                oauth_error_detail(&body)
            )));
        }

        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| {
            AppError::Authorization(format!("{operation} response invalid: {e}"))
        })?;
        if grant.access_token.trim().is_empty() {
            return Err(AppError::Authorization(format!(
                "{operation} response missing access_token"
            )));
        }
        Ok(grant)
    }
}

fn oauth_error_detail(body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed.get("error").and_then(Value::as_str);
    let description = parsed.get("error_description").and_then(Value::as_str);
    match (code, description) {
        (Some(code), Some(description)) => format!("{code}: {description}"),
        (Some(code), None) => code.to_string(),
        (None, Some(description)) => description.to_string(),
        (None, None) => body.chars().take(200).collect(),
    }
}

#[async_trait]
impl TokenEndpoint for GoogleOAuth {
    fn authorization_url(&self, scopes: &[String]) -> Result<Url, AppError> {
        let LoadedSecrets {
            secrets,
            redirect_uri,
        } = self.secrets()?;
        let mut url = Url::parse(&secrets.auth_uri).map_err(|e| {
            AppError::Config(format!("invalid auth_uri '{}': {e}", secrets.auth_uri))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AppError> {
        let LoadedSecrets {
            secrets,
            redirect_uri,
        } = self.secrets()?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ];
        self.post_token_form("token exchange", &secrets.token_uri, &form)
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let secrets = &self.secrets()?.secrets;
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ];
        self.post_token_form("token refresh", &secrets.token_uri, &form)
            .await
    }
}
