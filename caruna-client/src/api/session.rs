use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info};

use super::{build_http, decode_json, ensure_success, join_url, ApiError, Credentials};
use crate::domain::{DateRange, HourlySeriesRecord};

pub const DEFAULT_PORTAL_URL: &str = "https://energiaseuranta.caruna.fi";
pub const DEFAULT_AUTH_URL: &str = "https://authentication2.caruna.fi";

/// Entry point of the portal API that authenticates with a cookie session.
#[derive(Debug, Clone)]
pub struct SessionApi {
    portal_url: String,
    auth_url: String,
    timeout: Duration,
}

impl SessionApi {
    pub fn new(portal_url: impl Into<String>, auth_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            portal_url: portal_url.into(),
            auth_url: auth_url.into(),
            timeout,
        }
    }

    /// Log in and return a session whose cookie jar carries the login.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let http = build_http(self.timeout)?;
        let url = join_url(&self.auth_url, "portal/login");

        let resp = http
            .post(&url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::Auth(format!(
                    "portal rejected credentials for '{}'",
                    credentials.username
                )));
            }
            _ => {
                let err = ensure_success(resp).await.err();
                return Err(ApiError::Auth(
                    err.map(|e| e.to_string()).unwrap_or_else(|| "login failed".to_string()),
                ));
            }
        }

        info!(username = %credentials.username, "logged in to Caruna portal");

        Ok(Session {
            http,
            portal_url: self.portal_url.clone(),
            auth_url: self.auth_url.clone(),
        })
    }
}

/// An authenticated portal session. Release it with [`Session::logout`].
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    portal_url: String,
    auth_url: String,
}

impl Session {
    /// Hourly consumption series for the whole range in one request.
    pub async fn consumption_hours(
        &self,
        customer_number: &str,
        metering_point: &str,
        range: &DateRange,
    ) -> Result<Vec<HourlySeriesRecord>, ApiError> {
        let url = join_url(
            &self.portal_url,
            &format!("api/meteringPoints/ELECTRICITY/{metering_point}/series"),
        );
        let start = range.start().to_string();
        let end = range.end().to_string();

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("products", "EL_ENERGY_CONSUMPTION"),
                ("resolution", "MONTHS_AS_HOURS"),
                ("customerNumber", customer_number),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
            ])
            .send()
            .await?;

        let records: Vec<HourlySeriesRecord> = decode_json(ensure_success(resp).await?).await?;
        debug!(records = records.len(), %range, "fetched hourly series");
        Ok(records)
    }

    pub async fn logout(self) -> Result<(), ApiError> {
        let url = join_url(&self.auth_url, "portal/logout");
        let resp = self.http.get(&url).send().await?;
        ensure_success(resp).await?;
        info!("logged out of Caruna portal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub;
    use time::macros::date;

    fn api(base: &str) -> SessionApi {
        SessionApi::new(base, base, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn login_fetch_logout_round_trip() {
        let server = stub::spawn(|req| match req.path() {
            "/portal/login" => (200, "{}".to_string()),
            "/api/meteringPoints/ELECTRICITY/mp-1/series" => (
                200,
                r#"[{"year":2024,"month":3,"day":1,"hour":0,"utcOffset":2,"hourlyMeasured":true,
                    "values":{"EL_ENERGY_CONSUMPTION#0":{"valueAsFloat":0.5,"statusAsSerieStatus":"OK"}}}]"#
                    .to_string(),
            ),
            "/portal/logout" => (200, String::new()),
            _ => (404, "not found".to_string()),
        })
        .await;

        let range = DateRange::new(date!(2024-03-01), date!(2024-03-02)).unwrap();
        let session = api(&server.base_url)
            .login(&Credentials::new("alice", "secret"))
            .await
            .unwrap();
        let records = session.consumption_hours("c-1", "mp-1", &range).await.unwrap();
        session.logout().await.unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].hourly_measured);

        let reqs = server.recorded();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].method, "POST");
        assert!(reqs[0].body.contains("username=alice"));
        assert!(reqs[1].target.contains("customerNumber=c-1"));
        assert!(reqs[1].target.contains("startDate=2024-03-01"));
        assert!(reqs[1].target.contains("endDate=2024-03-02"));
        assert_eq!(reqs[2].path(), "/portal/logout");
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let server = stub::spawn(|_| (401, "nope".to_string())).await;

        let err = api(&server.base_url)
            .login(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn malformed_series_is_decode_error() {
        let server = stub::spawn(|req| match req.path() {
            "/portal/login" => (200, "{}".to_string()),
            _ => (200, r#"{"unexpected":"shape"}"#.to_string()),
        })
        .await;

        let range = DateRange::new(date!(2024-03-01), date!(2024-03-01)).unwrap();
        let session = api(&server.base_url)
            .login(&Credentials::new("alice", "secret"))
            .await
            .unwrap();
        let err = session.consumption_hours("c-1", "mp-1", &range).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
