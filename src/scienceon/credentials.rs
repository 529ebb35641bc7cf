use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::token::TokenIssuer;
use crate::config::Secret;

const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("cannot access credentials file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid credentials JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("credentials file is missing '{0}'")]
    MissingField(&'static str),

    #[error("auth_key must be 32 bytes, got {0}")]
    AuthKeyLength(usize),

    #[error("token request failed: {0}")]
    TokenRequest(String),

    #[error("token request network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("access token expired at {0} even after renewal")]
    Expired(NaiveDateTime),
}

/// Why the stored access token cannot be used as is.
#[derive(Debug, PartialEq, Eq)]
enum Staleness {
    NoToken,
    NoExpiry,
    BadExpiry(String),
    Expired(NaiveDateTime),
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::NoToken => f.write_str("no access_token"),
            Staleness::NoExpiry => f.write_str("no access_token_expire"),
            Staleness::BadExpiry(raw) => write!(f, "unreadable access_token_expire '{raw}'"),
            Staleness::Expired(at) => write!(f, "expired at {at}"),
        }
    }
}

/// The credentials file as a flat JSON object. Unknown keys survive a rewrite.
struct CredentialsFile {
    fields: Map<String, Value>,
}

impl CredentialsFile {
    fn read(path: &Path) -> Result<Self, CredentialError> {
        let text = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self, CredentialError> {
        let fields: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self { fields })
    }

    fn write(&self, path: &Path) -> Result<(), CredentialError> {
        let text = serde_json::to_string_pretty(&self.fields)?;
        std::fs::write(path, text).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&str, CredentialError> {
        self.field(key).ok_or(CredentialError::MissingField(key))
    }

    fn staleness(&self, now: NaiveDateTime) -> Option<Staleness> {
        if self.field("access_token").is_none() {
            return Some(Staleness::NoToken);
        }
        let Some(raw) = self.field("access_token_expire") else {
            return Some(Staleness::NoExpiry);
        };
        match parse_expiry(raw) {
            None => Some(Staleness::BadExpiry(raw.to_string())),
            Some(at) if is_expired(at, now) => Some(Staleness::Expired(at)),
            Some(_) => None,
        }
    }
}

/// ScienceON API credentials. Renewed at most once, at load time; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub access_token: Secret,
    pub expires_at: NaiveDateTime,
}

impl Credentials {
    /// Reads the credentials file. A missing, undated or (nearly) expired access
    /// token is replaced by a freshly issued one, which is written back to `path`.
    pub async fn load(path: &Path, issuer: &TokenIssuer) -> Result<Self, CredentialError> {
        let mut file = CredentialsFile::read(path)?;
        let now = Local::now().naive_local();

        if let Some(staleness) = file.staleness(now) {
            warn!(%staleness, "ScienceON access token unusable, requesting a new one");
            let issued = issuer
                .issue(
                    file.required("client_id")?,
                    file.required("auth_key")?,
                    file.required("mac_address")?,
                    now,
                )
                .await?;
            file.fields.extend(issued);
            file.write(path)?;
            info!(path = %path.display(), "credentials file updated");
        }

        Self::from_file(&file, now)
    }

    fn from_file(file: &CredentialsFile, now: NaiveDateTime) -> Result<Self, CredentialError> {
        let client_id = file.required("client_id")?;
        let access_token = file.required("access_token")?;
        let expires_at = file
            .field("access_token_expire")
            .and_then(parse_expiry)
            .ok_or(CredentialError::MissingField("access_token_expire"))?;
        if is_expired(expires_at, now) {
            return Err(CredentialError::Expired(expires_at));
        }

        Ok(Self {
            client_id: client_id.to_string(),
            access_token: Secret::new(access_token),
            expires_at,
        })
    }
}

/// Tokens within a minute of expiry count as expired.
fn is_expired(at: NaiveDateTime, now: NaiveDateTime) -> bool {
    now >= at - TimeDelta::seconds(EXPIRY_MARGIN_SECS)
}

fn parse_expiry(raw: &str) -> Option<NaiveDateTime> {
    let without_fraction = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(without_fraction, EXPIRY_FORMAT).ok()
}
