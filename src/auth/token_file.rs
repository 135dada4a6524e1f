//! Versioned on-disk record for the OAuth credential.
//!
//! The file holds live token material: it is written 0600 on Unix through a
//! sibling temp file and a rename, so a crash never leaves a half-written
//! record behind.

use crate::error::AppError;
use crate::models::Credential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    version: u32,
    access_token: String,
    refresh_token: Option<String>,
    expiry: DateTime<Utc>,
    #[serde(default)]
    scopes: Vec<String>,
}

impl From<&Credential> for TokenRecord {
    fn from(credential: &Credential) -> Self {
        Self {
            version: RECORD_VERSION,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            expiry: credential.expiry,
            scopes: credential.scopes.clone(),
        }
    }
}

fn unusable(path: &Path, reason: impl Into<String>) -> AppError {
    AppError::CredentialFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads the persisted credential. A missing file is `Ok(None)`; a file that
/// exists but does not parse as a supported record is an error.
pub fn load(path: &Path) -> Result<Option<Credential>, AppError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unusable(path, format!("cannot read: {e}"))),
    };

    warn_if_shared(path);

    let record: TokenRecord =
        serde_json::from_str(&raw).map_err(|e| unusable(path, format!("invalid JSON: {e}")))?;
    if record.version != RECORD_VERSION {
        return Err(unusable(
            path,
            format!("unsupported record version {}", record.version),
        ));
    }
    if record.access_token.trim().is_empty() {
        return Err(unusable(path, "empty access_token"));
    }

    Ok(Some(Credential {
        access_token: record.access_token,
        refresh_token: record.refresh_token.filter(|t| !t.trim().is_empty()),
        expiry: record.expiry,
        scopes: record.scopes,
    }))
}

pub fn save(path: &Path, credential: &Credential) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&TokenRecord::from(credential))?;
    let temp_path = temp_path_for(path);
    let written = write_private(&temp_path, json.as_bytes())
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            tracing::debug!(
                path = %temp_path.display(),
                error = %cleanup,
                "could not remove temporary credential file"
            );
        }
        return Err(e.into());
    }
    tracing::debug!(path = %path.display(), "credential persisted");
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "token.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = open_private(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "credential file is accessible by other users; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_shared(_path: &Path) {}
