use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, info};

use super::{build_http, decode_json, ensure_success, join_url, ApiError, Credentials};
use crate::domain::DailyEnergyDocument;

pub const DEFAULT_API_URL: &str = "https://plus.caruna.fi";

/// Entry point of the API that issues a bearer token at login.
#[derive(Debug, Clone)]
pub struct TokenApi {
    api_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

impl TokenApi {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into(),
            timeout,
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<TokenSession, ApiError> {
        let http = build_http(self.timeout)?;
        let url = join_url(&self.api_url, "api/authenticate");

        let resp = http
            .post(&url)
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let resp = ensure_success(resp)
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?;
        let login: LoginResponse = decode_json(resp).await?;

        let token = login
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Auth("login response carried no token".to_string()))?;

        info!(username = %credentials.username, "obtained Caruna API token");

        Ok(TokenSession {
            http,
            api_url: self.api_url.clone(),
            token,
        })
    }
}

/// Session handle plus access token. There is no logout; the token expires
/// on its own.
pub struct TokenSession {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl fmt::Debug for TokenSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSession")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TokenSession {
    /// Hourly energy for a single calendar day.
    pub async fn energy_day(
        &self,
        customer_number: &str,
        metering_point: &str,
        day: Date,
    ) -> Result<DailyEnergyDocument, ApiError> {
        let url = join_url(
            &self.api_url,
            &format!("api/customers/{customer_number}/assets/{metering_point}/energy"),
        );
        let year = day.year().to_string();
        let month = u8::from(day.month()).to_string();
        let dom = day.day().to_string();

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&[
                ("year", year.as_str()),
                ("month", month.as_str()),
                ("day", dom.as_str()),
                ("timespan", "daily"),
            ])
            .send()
            .await?;

        let doc: DailyEnergyDocument = decode_json(ensure_success(resp).await?).await?;
        debug!(%day, results = doc.results.len(), "fetched daily energy document");
        Ok(doc)
    }
}
