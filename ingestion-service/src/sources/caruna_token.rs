use caruna_client::{
    api::{Credentials, TokenApi},
    DateRange, RawConsumptionRecord,
};
use tracing::{debug, info};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Token-flavoured upstream: log in once, then query one document per day of
/// the range, end day included.
///
/// Every day is fetched before the first record is emitted, so a failure on
/// any day aborts the run before anything reaches the sink.
#[derive(Debug, Clone)]
pub struct CarunaTokenSource {
    api: TokenApi,
    credentials: Credentials,
    customer_number: String,
    metering_point: String,
    range: DateRange,
}

impl CarunaTokenSource {
    pub fn new(
        api: TokenApi,
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
impl Source<RawConsumptionRecord> for CarunaTokenSource {
    async fn stream(&self) -> EnvelopeStream<RawConsumptionRecord> {
        let this = self.clone();
        let s = async_stream::try_stream! {
            let session = this.api.login(&this.credentials).await.map_err(|e| {
                metrics::counter!("upstream_errors_total").increment(1);
                PipelineError::Source(format!("login failed: {e}"))
            })?;

            let mut documents = Vec::new();
            for day in this.range.days() {
                let doc = session
                    .energy_day(&this.customer_number, &this.metering_point, day)
                    .await
                    .map_err(|e| {
                        metrics::counter!("upstream_errors_total").increment(1);
                        PipelineError::Source(format!("energy query for {day} failed: {e}"))
                    })?;
                debug!(%day, "fetched day");
                documents.push(doc);
            }

            info!(days = documents.len(), range = %this.range, "received daily energy documents");

            for doc in documents {
                for entry in doc.into_entries() {
                    metrics::counter!("upstream_records_total").increment(1);
                    yield Envelope::new(RawConsumptionRecord::Daily(entry));
                }
            }
        };

        Box::pin(s)
    }
}
