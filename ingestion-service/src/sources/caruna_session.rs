use caruna_client::{
    api::{Credentials, SessionApi},
    DateRange, RawConsumptionRecord,
};
use tracing::{info, warn};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Session-flavoured upstream: log in, fetch the whole range in one query,
/// log out.
///
/// Logout runs whether or not the fetch succeeded. A failed logout is only
/// logged so it never hides the fetch error.
#[derive(Debug, Clone)]
pub struct CarunaSessionSource {
    api: SessionApi,
    credentials: Credentials,
    customer_number: String,
    metering_point: String,
    range: DateRange,
}

impl CarunaSessionSource {
    pub fn new(
        api: SessionApi,
        credentials: Credentials,
        customer_number: impl Into<String>,
        metering_point: impl Into<String>,
        range: DateRange,
    ) -> Self {
        Self {
            api,
            credentials,
            customer_number: customer_number.into(),
            metering_point: metering_point.into(),
            range,
        }
    }
}

#[async_trait::async_trait]
impl Source<RawConsumptionRecord> for CarunaSessionSource {
    async fn stream(&self) -> EnvelopeStream<RawConsumptionRecord> {
        let this = self.clone();
        let s = async_stream::try_stream! {
            let session = this.api.login(&this.credentials).await.map_err(|e| {
                metrics::counter!("upstream_errors_total").increment(1);
                PipelineError::Source(format!("login failed: {e}"))
            })?;

            let fetched = session
                .consumption_hours(&this.customer_number, &this.metering_point, &this.range)
                .await;

            if let Err(e) = session.logout().await {
                warn!(error = %e, "logout failed, continuing");
            }

            let records = fetched.map_err(|e| {
                metrics::counter!("upstream_errors_total").increment(1);
                PipelineError::Source(format!("consumption query failed: {e}"))
            })?;

            info!(records = records.len(), range = %this.range, "received hourly series");
            metrics::counter!("upstream_records_total").increment(records.len() as u64);

            for record in records {
                yield Envelope::new(RawConsumptionRecord::Hourly(record));
            }
        };

        Box::pin(s)
    }
}
