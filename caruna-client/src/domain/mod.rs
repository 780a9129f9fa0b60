pub mod consumption_point;
pub mod date_range;
pub mod raw_records;

pub use consumption_point::ConsumptionPoint;
pub use date_range::{local_today, parse_iso_date, DateRange, DateRangeError, MAX_RANGE_DAYS};
pub use raw_records::{
    DailyEnergyDocument, HourlyEnergyEntry, HourlySeriesRecord, RawConsumptionRecord, SeriesValue,
    CONSUMPTION_SERIES_KEY,
};
