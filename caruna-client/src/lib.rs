pub mod api;
pub mod domain;

pub use domain::{ConsumptionPoint, DateRange, RawConsumptionRecord};
