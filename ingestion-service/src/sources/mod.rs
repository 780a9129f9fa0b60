pub mod caruna_session;
pub mod caruna_token;

pub use caruna_session::CarunaSessionSource;
pub use caruna_token::CarunaTokenSource;

use caruna_client::{
    api::{SessionApi, TokenApi},
    DateRange, RawConsumptionRecord,
};

use crate::{
    config::{ApiVariant, AppConfig},
    pipeline::{EnvelopeStream, Source},
};

/// "Fetch consumption for a range", with the upstream protocol picked by
/// configuration.
pub enum UpstreamSource {
    Session(CarunaSessionSource),
    Token(CarunaTokenSource),
}

impl UpstreamSource {
    pub fn from_config(cfg: &AppConfig, range: DateRange) -> Self {
        let caruna = &cfg.caruna;
        let upstream = &cfg.upstream;

        match upstream.variant {
            ApiVariant::Session => Self::Session(CarunaSessionSource::new(
                SessionApi::new(&upstream.portal_url, &upstream.auth_url, upstream.timeout()),
                caruna.credentials(),
                &caruna.customer_number,
                &caruna.metering_point,
                range,
            )),
            ApiVariant::Token => Self::Token(CarunaTokenSource::new(
                TokenApi::new(&upstream.api_url, upstream.timeout()),
                caruna.credentials(),
                &caruna.customer_number,
                &caruna.metering_point,
                range,
            )),
        }
    }

    pub fn variant(&self) -> ApiVariant {
        match self {
            Self::Session(_) => ApiVariant::Session,
            Self::Token(_) => ApiVariant::Token,
        }
    }
}

#[async_trait::async_trait]
impl Source<RawConsumptionRecord> for UpstreamSource {
    async fn stream(&self) -> EnvelopeStream<RawConsumptionRecord> {
        match self {
            Self::Session(s) => s.stream().await,
            Self::Token(s) => s.stream().await,
        }
    }
}
