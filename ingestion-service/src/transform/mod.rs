use caruna_client::{
    domain::{HourlyEnergyEntry, HourlySeriesRecord},
    ConsumptionPoint, RawConsumptionRecord,
};
use time::{
    macros::{datetime, format_description},
    Date, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use crate::pipeline::{Envelope, PipelineError, Transform};

pub const SESSION_MEASUREMENT: &str = "carunaAPI";
pub const TOKEN_MEASUREMENT: &str = "hourlyConsumption";

fn transform_err(msg: impl Into<String>) -> PipelineError {
    PipelineError::Transform(msg.into())
}

/// Timestamp of a series record: calendar hour at a fixed whole-hour offset.
pub fn series_timestamp(r: &HourlySeriesRecord) -> Result<OffsetDateTime, PipelineError> {
    let bad = |what: &str, v: i64| transform_err(format!("invalid {what} {v} in series record"));

    let year = i32::try_from(r.year).map_err(|_| bad("year", r.year))?;
    let month = u8::try_from(r.month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(|| bad("month", r.month))?;
    let day = u8::try_from(r.day).map_err(|_| bad("day", r.day))?;
    let hour = u8::try_from(r.hour).map_err(|_| bad("hour", r.hour))?;
    let offset_hours = i8::try_from(r.utc_offset).map_err(|_| bad("utcOffset", r.utc_offset))?;

    let offset = UtcOffset::from_hms(offset_hours, 0, 0).map_err(|e| transform_err(e.to_string()))?;
    let date = Date::from_calendar_date(year, month, day).map_err(|e| transform_err(e.to_string()))?;
    let at = date.with_hms(hour, 0, 0).map_err(|e| transform_err(e.to_string()))?;

    Ok(at.assume_offset(offset))
}

/// Parse an entry timestamp like `2024-03-01T13:00:00Z`.
///
/// The trailing zone marker is dropped and the remainder is read as UTC.
pub fn entry_timestamp(raw: &str) -> Result<OffsetDateTime, PipelineError> {
    let trimmed = raw.trim();
    let naive = trimmed
        .strip_suffix(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed);

    PrimitiveDateTime::parse(
        naive,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| transform_err(format!("invalid timestamp '{raw}': {e}")))
}

/// Map a session-API series record. Records without `hourlyMeasured` are
/// skipped.
pub fn map_series_record(
    r: &HourlySeriesRecord,
    metering_point: &str,
    customer_number: &str,
) -> Result<Option<ConsumptionPoint>, PipelineError> {
    if !r.hourly_measured {
        return Ok(None);
    }

    let series = r
        .consumption()
        .ok_or_else(|| transform_err("hourly record without consumption series"))?;
    let value = series
        .value_as_float
        .ok_or_else(|| transform_err("consumption series without valueAsFloat"))?;

    let mut point = ConsumptionPoint::new(SESSION_MEASUREMENT, series_timestamp(r)?)
        .field("consumption", value)
        .tag("metering_point", metering_point)
        .tag("customer_number", customer_number);
    if let Some(status) = &series.status_as_serie_status {
        point = point.tag("status", status.as_str());
    }

    Ok(Some(point))
}

/// Map a token-API hourly entry. Only a missing/null reading is skipped; zero
/// is a real reading.
pub fn map_energy_entry(e: &HourlyEnergyEntry) -> Result<Option<ConsumptionPoint>, PipelineError> {
    let Some(value) = e.consumption else {
        return Ok(None);
    };

    let point = ConsumptionPoint::new(TOKEN_MEASUREMENT, entry_timestamp(&e.timestamp)?).field("value", value);
    Ok(Some(point))
}

/// Turns raw upstream records into points.
#[derive(Debug, Clone)]
pub struct ConsumptionMapping {
    metering_point: String,
    customer_number: String,
}

impl ConsumptionMapping {
    pub fn new(metering_point: impl Into<String>, customer_number: impl Into<String>) -> Self {
        Self {
            metering_point: metering_point.into(),
            customer_number: customer_number.into(),
        }
    }

    pub fn map(&self, raw: &RawConsumptionRecord) -> Result<Option<ConsumptionPoint>, PipelineError> {
        match raw {
            RawConsumptionRecord::Hourly(r) => map_series_record(r, &self.metering_point, &self.customer_number),
            RawConsumptionRecord::Daily(e) => map_energy_entry(e),
        }
    }
}

#[async_trait::async_trait]
impl Transform<RawConsumptionRecord, ConsumptionPoint> for ConsumptionMapping {
    async fn apply(
        &self,
        input: Envelope<RawConsumptionRecord>,
    ) -> Result<Option<Envelope<ConsumptionPoint>>, PipelineError> {
        match self.map(&input.payload)? {
            Some(point) => Ok(Some(input.map(point))),
            None => {
                metrics::counter!("transform_skipped_records_total").increment(1);
                Ok(None)
            }
        }
    }
}

/// Pure validation of a `ConsumptionPoint`.
///
/// Rules:
/// - every field must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_consumption(point: &ConsumptionPoint) -> Result<(), PipelineError> {
    for (name, value) in &point.fields {
        if !value.is_finite() {
            return Err(transform_err(format!("field {name} is not finite")));
        }
        if *value < 0.0 {
            return Err(transform_err(format!("field {name} must be non-negative")));
        }
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if point.ts < min_ts || point.ts > max_ts {
        return Err(transform_err("timestamp out of allowed range"));
    }

    Ok(())
}

#[derive(Clone, Default)]
pub struct ConsumptionValidation;

#[async_trait::async_trait]
impl Transform<ConsumptionPoint, ConsumptionPoint> for ConsumptionValidation {
    async fn apply(
        &self,
        input: Envelope<ConsumptionPoint>,
    ) -> Result<Option<Envelope<ConsumptionPoint>>, PipelineError> {
        match validate_consumption(&input.payload) {
            Ok(()) => Ok(Some(input)),
            Err(e) => {
                metrics::counter!("validation_consumption_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
