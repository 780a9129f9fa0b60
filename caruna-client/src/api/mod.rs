//! Typed HTTP clients for the two Caruna API flavours.
//!
//! * [`session`]: portal login with a cookie session, one bulk series query
//!   for the whole range, explicit logout.
//! * [`token`]: login returning a bearer token, one energy query per day.

use std::{fmt, time::Duration};

use serde::de::DeserializeOwned;

pub mod session;
pub mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod stub;

pub use session::{Session, SessionApi};
pub use token::{TokenApi, TokenSession};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Upstream login credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<reqwest::Client, ApiError> {
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(timeout)
        .user_agent(concat!("caruna-client/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    Err(ApiError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let url = resp.url().to_string();
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url,
        message: e.to_string(),
    })
}
