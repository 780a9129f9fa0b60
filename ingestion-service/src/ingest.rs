use std::sync::Arc;

use caruna_client::{ConsumptionPoint, DateRange, RawConsumptionRecord};
use tracing::info;

use crate::{
    config::AppConfig,
    pipeline::{Pipeline, PipelineError},
    sinks::InfluxDbSink,
    sources::UpstreamSource,
    transform::{ConsumptionMapping, ConsumptionValidation},
};

/// Fetch, reshape and write one validated date range. Returns the number of
/// points written.
pub async fn run_ingest(cfg: &AppConfig, range: DateRange) -> Result<u64, PipelineError> {
    let source = UpstreamSource::from_config(cfg, range);
    info!(variant = %source.variant(), %range, days = range.span_days() + 1, "starting ingestion");

    let pipeline: Pipeline<_, RawConsumptionRecord, ConsumptionPoint, _> = Pipeline {
        source,
        mapper: Arc::new(ConsumptionMapping::new(
            &cfg.caruna.metering_point,
            &cfg.caruna.customer_number,
        )),
        transforms: vec![Arc::new(ConsumptionValidation)],
        sink: InfluxDbSink::new(&cfg.influx, &cfg.writer),
    };

    let written = pipeline.run().await?;
    info!(written, "ingestion finished");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use caruna_client::api::stub;
    use time::{macros::datetime, Duration};

    use crate::config::{ApiVariant, FileConfig};

    fn hour_value(hour: i64) -> f64 {
        if hour == 0 {
            0.1
        } else {
            (hour + 1) as f64
        }
    }

    fn day_document(day: u8) -> String {
        let entries: Vec<String> = (0..24)
            .map(|h| {
                format!(
                    r#"{{"timestamp":"2024-03-{day:02}T{h:02}:00:00Z","consumption":{}}}"#,
                    hour_value(h)
                )
            })
            .collect();
        format!(r#"{{"results":[{{"data":[{}]}}]}}"#, entries.join(","))
    }

    fn config(upstream_url: &str, influx_url: &str, variant: ApiVariant) -> AppConfig {
        let vars: HashMap<&str, String> = [
            ("CARUNA_CUSTOMER_NUM", "c-1"),
            ("CARUNA_METERING_POINT_NUM", "mp-1"),
            ("CARUNA_USERNAME", "alice"),
            ("CARUNA_PASSWORD", "secret"),
            ("INFLUX_URL", influx_url),
            ("INFLUX_TOKEN", "tok"),
            ("INFLUX_BUCKET", "energy"),
            ("INFLUX_ORG", "home"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();

        let mut file = FileConfig::default();
        file.upstream.variant = variant;
        file.upstream.api_url = upstream_url.to_string();
        file.upstream.portal_url = upstream_url.to_string();
        file.upstream.auth_url = upstream_url.to_string();
        file.upstream.timeout_secs = 5;
        file.writer.timeout_secs = 5;

        AppConfig::from_lookup(|k| vars.get(k).cloned(), file).unwrap()
    }

    #[tokio::test]
    async fn token_variant_two_days_yield_48_writes() {
        let upstream = stub::spawn(|req| {
            if req.path() == "/api/authenticate" {
                (200, r#"{"token":"t"}"#.to_string())
            } else if req.target.contains("day=1&") {
                (200, day_document(1))
            } else if req.target.contains("day=2&") {
                (200, day_document(2))
            } else {
                (404, "not found".to_string())
            }
        })
        .await;
        let influx = stub::spawn(|_| (204, String::new())).await;

        let cfg = config(&upstream.base_url, &influx.base_url, ApiVariant::Token);
        let range = DateRange::resolve(Some("2024-03-01"), Some("2024-03-02"), time::macros::date!(2024-03-10)).unwrap();

        let written = run_ingest(&cfg, range).await.unwrap();
        assert_eq!(written, 48);

        let writes = influx.recorded();
        assert_eq!(writes.len(), 48);

        let start = datetime!(2024-03-01 00:00:00 UTC);
        for (i, w) in writes.iter().enumerate() {
            let hour = (i % 24) as i64;
            let expected_ts = (start + Duration::hours(i as i64)).unix_timestamp_nanos();
            let expected = format!("hourlyConsumption value={} {expected_ts}", hour_value(hour));
            assert_eq!(w.body, expected);
        }
    }

    #[tokio::test]
    async fn session_variant_writes_tagged_points_and_logs_out() {
        let upstream = stub::spawn(|req| match req.path() {
            "/portal/login" | "/portal/logout" => (200, "{}".to_string()),
            _ => (
                200,
                r#"[
                    {"year":2024,"month":3,"day":1,"hour":0,"utcOffset":2,"hourlyMeasured":true,
                     "values":{"EL_ENERGY_CONSUMPTION#0":{"valueAsFloat":0.5,"statusAsSerieStatus":"OK"}}},
                    {"year":2024,"month":3,"day":1,"hour":1,"utcOffset":2,"hourlyMeasured":false,
                     "values":{}},
                    {"year":2024,"month":3,"day":1,"hour":2,"utcOffset":2,"hourlyMeasured":true,
                     "values":{"EL_ENERGY_CONSUMPTION#0":{"valueAsFloat":"0.0","statusAsSerieStatus":"ESTIMATED"}}}
                ]"#
                .to_string(),
            ),
        })
        .await;
        let influx = stub::spawn(|_| (204, String::new())).await;

        let cfg = config(&upstream.base_url, &influx.base_url, ApiVariant::Session);
        let range = DateRange::resolve(Some("2024-03-01"), Some("2024-03-01"), time::macros::date!(2024-03-10)).unwrap();

        let written = run_ingest(&cfg, range).await.unwrap();
        assert_eq!(written, 2);

        let writes = influx.recorded();
        let first_ts = datetime!(2024-03-01 00:00:00 +02:00).unix_timestamp_nanos();
        assert_eq!(
            writes[0].body,
            format!("carunaAPI,customer_number=c-1,metering_point=mp-1,status=OK consumption=0.5 {first_ts}")
        );
        assert!(writes[1].body.contains("status=ESTIMATED consumption=0 "));

        let last = upstream.recorded().pop().unwrap();
        assert_eq!(last.path(), "/portal/logout");
    }

    #[tokio::test]
    async fn upstream_failure_writes_nothing() {
        let upstream = stub::spawn(|_| (401, "denied".to_string())).await;
        let influx = stub::spawn(|_| (204, String::new())).await;

        let cfg = config(&upstream.base_url, &influx.base_url, ApiVariant::Token);
        let range = DateRange::resolve(Some("2024-03-01"), Some("2024-03-02"), time::macros::date!(2024-03-10)).unwrap();

        let err = run_ingest(&cfg, range).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
        assert!(influx.recorded().is_empty());
    }
}
