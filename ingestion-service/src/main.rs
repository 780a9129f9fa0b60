//! Obtain hourly consumption data from the Caruna API and load it into
//! InfluxDB.
//!
//! Usage:
//!   caruna-ingest [--startdate YYYY-MM-DD] [--enddate YYYY-MM-DD]
//!
//! Without dates the previous day through today is fetched. Secrets come from
//! the environment (or a `.env` file), tunables from `INGESTION_CONFIG`.

use anyhow::Result;
use caruna_client::{domain::local_today, DateRange};
use caruna_ingest::{config::AppConfig, observability, run_ingest};
use clap::Parser;
use time::Date;

#[derive(Parser, Debug)]
#[command(name = "caruna-ingest")]
#[command(
    about = "Obtain hourly consumption data from the Caruna API and load it into InfluxDB. \
             If no start/end date are provided, it will obtain the previous day's data."
)]
struct Args {
    /// Start date in ISO format (default: yesterday)
    #[arg(long)]
    startdate: Option<String>,

    /// End date in ISO format (default: today)
    #[arg(long)]
    enddate: Option<String>,
}

/// Validate the requested range, then run one ingestion. Nothing is fetched
/// or written unless the range is valid.
async fn execute(args: &Args, cfg: &AppConfig, today: Date) -> Result<u64> {
    let range = DateRange::resolve(args.startdate.as_deref(), args.enddate.as_deref(), today)
        .map_err(|e| {
            tracing::error!(error = %e, "invalid date range");
            e
        })?;

    Ok(run_ingest(cfg, range).await?)
}

// Single-threaded so the local UTC offset can be read for "today".
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    observability::init_tracing();
    let metrics = observability::init_metrics();
    dotenvy::dotenv().ok();

    // Load configuration
    let cfg = AppConfig::load()?;

    let result = execute(&args, &cfg, local_today()).await;
    if let Some(handle) = &metrics {
        observability::log_metrics(handle);
    }
    result?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use caruna_client::{api::stub, domain::DateRangeError};
    use caruna_ingest::config::{ApiVariant, FileConfig};
    use time::macros::date;

    fn config(base_url: &str) -> AppConfig {
        let vars: HashMap<&str, String> = [
            ("CARUNA_CUSTOMER_NUM", "c-1"),
            ("CARUNA_METERING_POINT_NUM", "mp-1"),
            ("CARUNA_USERNAME", "alice"),
            ("CARUNA_PASSWORD", "secret"),
            ("INFLUX_URL", base_url),
            ("INFLUX_TOKEN", "tok"),
            ("INFLUX_BUCKET", "energy"),
            ("INFLUX_ORG", "home"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();

        let mut file = FileConfig::default();
        file.upstream.variant = ApiVariant::Token;
        file.upstream.api_url = base_url.to_string();
        file.upstream.timeout_secs = 5;
        file.writer.timeout_secs = 5;

        AppConfig::from_lookup(|k| vars.get(k).cloned(), file).unwrap()
    }

    #[tokio::test]
    async fn invalid_startdate_stops_before_any_request() {
        let server = stub::spawn(|_| (200, r#"{"token":"t"}"#.to_string())).await;
        let cfg = config(&server.base_url);
        let args = Args::try_parse_from(["caruna-ingest", "--startdate", "2024-13-40"]).unwrap();

        let err = execute(&args, &cfg, date!(2024-03-10)).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<DateRangeError>(),
            Some(&DateRangeError::InvalidStart("2024-13-40".to_string()))
        );
        assert!(server.recorded().is_empty());
    }

    #[tokio::test]
    async fn inverted_range_stops_before_any_request() {
        let server = stub::spawn(|_| (200, r#"{"token":"t"}"#.to_string())).await;
        let cfg = config(&server.base_url);
        let args =
            Args::try_parse_from(["caruna-ingest", "--startdate", "2024-03-02", "--enddate", "2024-03-01"]).unwrap();

        assert!(execute(&args, &cfg, date!(2024-03-10)).await.is_err());
        assert!(server.recorded().is_empty());
    }

    #[test]
    fn parses_both_dates() {
        let args = Args::try_parse_from(["caruna-ingest", "--startdate", "2024-03-01", "--enddate", "2024-03-02"]).unwrap();
        assert_eq!(args.startdate.as_deref(), Some("2024-03-01"));
        assert_eq!(args.enddate.as_deref(), Some("2024-03-02"));
    }

    #[test]
    fn dates_are_optional() {
        let args = Args::try_parse_from(["caruna-ingest"]).unwrap();
        assert!(args.startdate.is_none());
        assert!(args.enddate.is_none());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Args::try_parse_from(["caruna-ingest", "--since", "2024-03-01"]).is_err());
    }
}
