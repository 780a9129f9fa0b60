use std::collections::BTreeMap;

use time::OffsetDateTime;

/// One time-series point ready to be written.
///
/// Fields and tags are kept in ordered maps so two points built from the same
/// record encode to the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionPoint {
    pub measurement: String,
    pub fields: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub ts: OffsetDateTime,
}

impl ConsumptionPoint {
    pub fn new(measurement: impl Into<String>, ts: OffsetDateTime) -> Self {
        Self {
            measurement: measurement.into(),
            fields: BTreeMap::new(),
            tags: BTreeMap::new(),
            ts,
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
