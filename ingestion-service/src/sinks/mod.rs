pub mod influxdb;

pub use influxdb::{InfluxDbSink, LineProtocol};
