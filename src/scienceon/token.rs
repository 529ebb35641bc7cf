use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::credentials::CredentialError;

const TOKEN_URL: &str = "https://apigateway.kisti.re.kr/tokenrequest.do";
const ACCOUNTS_IV: &[u8; 16] = b"jvHJ1EFA0IXBrxxz";

type AccountsCipher = cbc::Encryptor<aes::Aes256>;

#[derive(Serialize)]
struct Accounts<'a> {
    datetime: String,
    mac_address: &'a str,
}

/// Requests a fresh access token from the ScienceON gateway.
pub struct TokenIssuer {
    http: Client,
    url: String,
}

impl TokenIssuer {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url: TOKEN_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }

    /// Returns the gateway's token fields (`access_token`, `access_token_expire`, ...)
    /// to be merged into the credentials file.
    pub async fn issue(
        &self,
        client_id: &str,
        auth_key: &str,
        mac_address: &str,
        now: NaiveDateTime,
    ) -> Result<Map<String, Value>, CredentialError> {
        let accounts = encrypt_accounts(auth_key, mac_address, now)?;
        let response = self
            .http
            .get(&self.url)
            .header("User-Agent", crate::USER_AGENT)
            .query(&[("client_id", client_id), ("accounts", accounts.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CredentialError::TokenRequest(format!(
                "HTTP {status}: {}",
                snippet(&body)
            )));
        }

        let fields = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err(CredentialError::TokenRequest(snippet(&body))),
        };
        if !fields.get("access_token").is_some_and(Value::is_string) {
            return Err(CredentialError::TokenRequest(snippet(&body)));
        }
        info!(client_id, "ScienceON access token issued");
        Ok(fields)
    }
}

/// AES-256-CBC over `{"datetime":..,"mac_address":..}`, URL-safe base64.
fn encrypt_accounts(
    auth_key: &str,
    mac_address: &str,
    now: NaiveDateTime,
) -> Result<String, CredentialError> {
    let plain = serde_json::to_string(&Accounts {
        datetime: now.format("%Y%m%d%H%M%S").to_string(),
        mac_address,
    })?;
    let cipher = AccountsCipher::new_from_slices(auth_key.as_bytes(), ACCOUNTS_IV)
        .map_err(|_| CredentialError::AuthKeyLength(auth_key.len()))?;
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    Ok(URL_SAFE.encode(encrypted))
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    body[..body.floor_char_boundary(200)].to_string()
}
