use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

/// Key of the hourly energy consumption series in a series record.
pub const CONSUMPTION_SERIES_KEY: &str = "EL_ENERGY_CONSUMPTION#0";

/// A record as delivered by either upstream API flavour.
#[derive(Debug, Clone, PartialEq)]
pub enum RawConsumptionRecord {
    /// One hour from the session API's bulk series query.
    Hourly(HourlySeriesRecord),
    /// One hour from a per-day energy document of the token API.
    Daily(HourlyEnergyEntry),
}

/// One hour of the session API's `series` response.
///
/// The calendar components arrive either as JSON numbers or as numeric
/// strings depending on the portal release.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlySeriesRecord {
    #[serde(deserialize_with = "lenient_i64")]
    pub year: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub month: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub day: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub hour: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub utc_offset: i64,
    #[serde(default)]
    pub hourly_measured: bool,
    #[serde(default)]
    pub values: HashMap<String, SeriesValue>,
}

impl HourlySeriesRecord {
    pub fn consumption(&self) -> Option<&SeriesValue> {
        self.values.get(CONSUMPTION_SERIES_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesValue {
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub value_as_float: Option<f64>,
    #[serde(default)]
    pub status_as_serie_status: Option<String>,
}

/// Response body of the token API's daily energy endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyEnergyDocument {
    #[serde(default)]
    pub results: Vec<DailyEnergyResult>,
}

impl DailyEnergyDocument {
    /// Hourly entries across all result blocks, in document order.
    pub fn into_entries(self) -> impl Iterator<Item = HourlyEnergyEntry> {
        self.results.into_iter().flat_map(|r| r.data)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyEnergyResult {
    #[serde(default)]
    pub data: Vec<HourlyEnergyEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HourlyEnergyEntry {
    /// ISO-8601 timestamp with a trailing zone marker, e.g. `2024-03-01T00:00:00Z`.
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub consumption: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(v) => Ok(v),
        NumberOrString::Float(v) if v.fract() == 0.0 => Ok(v as i64),
        NumberOrString::Float(v) => Err(D::Error::custom(format!("expected an integer, got {v}"))),
        NumberOrString::Str(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid integer '{s}': {e}"))),
    }
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Int(v)) => Ok(Some(v as f64)),
        Some(NumberOrString::Float(v)) => Ok(Some(v)),
        Some(NumberOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid number '{s}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_record_accepts_numeric_strings() {
        let json = r#"{
            "year": "2024", "month": 3, "day": "1", "hour": 13, "utcOffset": "2",
            "hourlyMeasured": true,
            "values": {
                "EL_ENERGY_CONSUMPTION#0": { "valueAsFloat": "0.42", "statusAsSerieStatus": "OK" }
            }
        }"#;

        let rec: HourlySeriesRecord = serde_json::from_str(json).unwrap();
        assert_eq!((rec.year, rec.month, rec.day, rec.hour, rec.utc_offset), (2024, 3, 1, 13, 2));
        assert!(rec.hourly_measured);

        let value = rec.consumption().unwrap();
        assert_eq!(value.value_as_float, Some(0.42));
        assert_eq!(value.status_as_serie_status.as_deref(), Some("OK"));
    }

    #[test]
    fn series_record_without_flag_is_not_hourly_measured() {
        let json = r#"{ "year": 2024, "month": 3, "day": 1, "hour": 0, "utcOffset": 2 }"#;
        let rec: HourlySeriesRecord = serde_json::from_str(json).unwrap();
        assert!(!rec.hourly_measured);
        assert!(rec.consumption().is_none());
    }

    #[test]
    fn series_record_rejects_non_numeric_hour() {
        let json = r#"{ "year": 2024, "month": 3, "day": 1, "hour": "noon", "utcOffset": 2 }"#;
        assert!(serde_json::from_str::<HourlySeriesRecord>(json).is_err());
    }

    #[test]
    fn daily_document_flattens_entries_and_keeps_nulls() {
        let json = r#"{
            "results": [
                { "data": [
                    { "timestamp": "2024-03-01T00:00:00Z", "consumption": 0.0 },
                    { "timestamp": "2024-03-01T01:00:00Z", "consumption": null },
                    { "timestamp": "2024-03-01T02:00:00Z" }
                ] },
                { "data": [ { "timestamp": "2024-03-01T03:00:00Z", "consumption": 1.5 } ] }
            ]
        }"#;

        let doc: DailyEnergyDocument = serde_json::from_str(json).unwrap();
        let entries: Vec<HourlyEnergyEntry> = doc.into_entries().collect();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].consumption, Some(0.0));
        assert_eq!(entries[1].consumption, None);
        assert_eq!(entries[2].consumption, None);
        assert_eq!(entries[3].consumption, Some(1.5));
    }
}
