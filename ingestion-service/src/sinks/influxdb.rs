use std::time::{Duration, SystemTime};

use caruna_client::ConsumptionPoint;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    config::{InfluxConfig, WriterSettings},
    pipeline::{Envelope, PipelineError, Sink},
};

/// Line breaks would end the point early; they become escaped spaces.
fn escape_with(s: &str, special: &[char], out: &mut String) {
    for ch in s.chars() {
        match ch {
            '\n' | '\r' => out.push_str("\\ "),
            c if c == '\\' || special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

/// Escape a measurement name: commas and spaces.
fn escape_measurement(s: &str, out: &mut String) {
    escape_with(s, &[',', ' '], out);
}

/// Escape tag keys, tag values and field keys: commas, spaces and equals.
fn escape_ident(s: &str, out: &mut String) {
    escape_with(s, &[',', ' ', '='], out);
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    escape_ident(key, out);
    out.push('=');
    escape_ident(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

pub trait LineProtocol {
    fn write_line(&self, out: &mut String);
}

impl LineProtocol for ConsumptionPoint {
    fn write_line(&self, out: &mut String) {
        escape_measurement(&self.measurement, out);

        // tags, sorted by key
        for (k, v) in &self.tags {
            if !v.is_empty() {
                push_tag(out, k, v);
            }
        }

        // fields
        out.push(' ');
        let mut first = true;
        for (k, v) in &self.fields {
            push_field_f64(out, &mut first, k, *v);
        }

        // timestamp (nanos)
        out.push(' ');
        out.push_str(&self.ts.unix_timestamp_nanos().to_string());
    }
}

/// Writes each point with its own request to the InfluxDB v2 write API.
pub struct InfluxDbSink {
    url: String,
    token: String,
    org: String,
    bucket: String,
    max_retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl InfluxDbSink {
    pub fn new(influx: &InfluxConfig, writer: &WriterSettings) -> Self {
        Self {
            url: influx.url.clone(),
            token: influx.token.clone(),
            org: influx.org.clone(),
            bucket: influx.bucket.clone(),
            max_retries: writer.max_retries,
            retry_backoff: Duration::from_millis(writer.retry_backoff_ms),
            timeout: Duration::from_secs(writer.timeout_secs),
        }
    }

    fn connect(&self) -> Result<reqwest::Client, PipelineError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Sink(format!("failed to build InfluxDB client: {e}")))
    }

    fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.url.trim_end_matches('/'))
    }

    async fn send_line(&self, client: &reqwest::Client, line: &str) -> Result<(), String> {
        let resp = client
            .post(self.write_url())
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .bearer_auth(&self.token)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line.to_string())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(format!("status {status}: {body}"))
    }

    async fn write_point(
        &self,
        client: &reqwest::Client,
        env: &Envelope<ConsumptionPoint>,
    ) -> Result<(), PipelineError> {
        let mut line = String::with_capacity(160);
        env.payload.write_line(&mut line);

        let mut attempt: u32 = 0;
        loop {
            match self.send_line(client, &line).await {
                Ok(()) => {
                    metrics::counter!("influxdb_written_points_total").increment(1);
                    if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
                        metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                    }
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    warn!(error = %e, attempt, "InfluxDB write failed, retrying with backoff");
                    metrics::counter!("influxdb_write_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    metrics::counter!("influxdb_write_errors_total").increment(1);
                    return Err(PipelineError::Sink(format!("InfluxDB write failed: {e}")));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<ConsumptionPoint> for InfluxDbSink {
    async fn run<S>(&self, mut input: S) -> Result<u64, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ConsumptionPoint>, PipelineError>> + Send + Unpin + 'static,
    {
        let client = self.connect()?;
        info!(bucket = %self.bucket, org = %self.org, "opened InfluxDB writer");

        let mut written: u64 = 0;
        while let Some(item) = input.next().await {
            let env = item?;
            self.write_point(&client, &env).await?;
            written += 1;
            debug!(measurement = %env.payload.measurement, ts = %env.payload.ts, "point written");
        }

        drop(client);
        info!(written, bucket = %self.bucket, "closed InfluxDB writer");

        Ok(written)
    }
}
