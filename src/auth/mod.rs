use crate::error::AppError;
use crate::models::{Credential, CredentialStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use url::Url;

pub mod google;
pub mod token_file;

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Successful response from an OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    fn expiry_from(&self, issued_at: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        if lifetime <= 0 {
            return Err(AppError::Authorization(format!(
                "token response has invalid expires_in {lifetime}"
            )));
        }
        Duration::try_seconds(lifetime)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::Authorization(format!(
                    "token response has invalid expires_in {lifetime}"
                ))
            })
    }

    fn granted_scopes(&self) -> Option<Vec<String>> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()?
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        (!scopes.is_empty()).then_some(scopes)
    }

    fn into_credential(
        self,
        issued_at: DateTime<Utc>,
        requested: &[String],
    ) -> Result<Credential, AppError> {
        Ok(Credential {
            expiry: self.expiry_from(issued_at)?,
            scopes: self.granted_scopes().unwrap_or_else(|| requested.to_vec()),
            refresh_token: self.refresh_token.filter(|t| !t.trim().is_empty()),
            access_token: self.access_token,
        })
    }

    fn refreshed(
        self,
        previous: Credential,
        issued_at: DateTime<Utc>,
    ) -> Result<Credential, AppError> {
        Ok(Credential {
            expiry: self.expiry_from(issued_at)?,
            scopes: self.granted_scopes().unwrap_or(previous.scopes),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.trim().is_empty())
                .or(previous.refresh_token),
            access_token: self.access_token,
        })
    }
}

/// The remote authorization server.
#[async_trait]
pub trait TokenEndpoint {
    fn authorization_url(&self, scopes: &[String]) -> Result<Url, AppError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AppError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;
}

/// Supplies the authorization code the operator obtains out-of-band.
pub trait AuthorizationCodeProvider {
    fn authorization_code(&self, authorization_url: &Url) -> Result<String, AppError>;
}

/// Prints the consent URL to stderr and reads the code from stdin.
pub struct ConsolePrompt;

impl AuthorizationCodeProvider for ConsolePrompt {
    fn authorization_code(&self, authorization_url: &Url) -> Result<String, AppError> {
        let mut stderr = io::stderr();
        writeln!(stderr, "Please go to this URL: {authorization_url}\n")?;
        write!(stderr, "Enter the authorization code: ")?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let code = line.trim();
        if code.is_empty() {
            return Err(AppError::Authorization(
                "no authorization code was entered".into(),
            ));
        }
        Ok(code.to_string())
    }
}

/// Produces a currently valid credential, bootstrapping or refreshing as
/// needed and persisting every credential it hands out.
pub struct CredentialStore<E, P> {
    path: PathBuf,
    scopes: Vec<String>,
    endpoint: E,
    codes: P,
}

impl<E, P> CredentialStore<E, P>
where
    E: TokenEndpoint + Send + Sync,
    P: AuthorizationCodeProvider + Send + Sync,
{
    pub fn new(path: PathBuf, scopes: Vec<String>, endpoint: E, codes: P) -> Self {
        Self {
            path,
            scopes,
            endpoint,
            codes,
        }
    }

    pub async fn acquire(&self) -> Result<Credential, AppError> {
        let credential = match token_file::load(&self.path)? {
            Some(stored) => self.revalidate(stored).await?,
            None => self.bootstrap().await?,
        };
        if credential.status_at(Utc::now()) != CredentialStatus::Valid {
            return Err(AppError::Authorization(format!(
                "authorization server issued a credential that is already expired ({})",
                credential.expiry
            )));
        }

        token_file::save(&self.path, &credential)?;
        Ok(credential)
    }

    async fn revalidate(&self, stored: Credential) -> Result<Credential, AppError> {
        for scope in &self.scopes {
            if !stored.has_scope(scope) {
                tracing::warn!(scope = %scope, "stored credential was not granted a required scope");
            }
        }

        let now = Utc::now();
        if stored.status_at(now) == CredentialStatus::Valid {
            tracing::debug!(expiry = %stored.expiry, "stored credential is valid");
            return Ok(stored);
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Err(AppError::Authorization(format!(
                "stored credential expired at {} and has no refresh token; delete {} to re-authorize",
                stored.expiry,
                self.path.display()
            )));
        };

        tracing::info!(expired_at = %stored.expiry, "refreshing access token");
        let grant = self.endpoint.refresh(&refresh_token).await?;
        let refreshed = grant.refreshed(stored, now)?;
        tracing::info!(expiry = %refreshed.expiry, "access token refreshed");
        Ok(refreshed)
    }

    async fn bootstrap(&self) -> Result<Credential, AppError> {
        tracing::info!(path = %self.path.display(), "no stored credential; starting consent flow");
        let url = self.endpoint.authorization_url(&self.scopes)?;
        let code = self.codes.authorization_code(&url)?;

        let issued_at = Utc::now();
        let grant = self.endpoint.exchange_code(&code).await?;
        let credential = grant.into_credential(issued_at, &self.scopes)?;
        if credential.refresh_token.is_none() {
            tracing::warn!("authorization server issued no refresh token; consent will be needed again after expiry");
        }
        Ok(credential)
    }
}
