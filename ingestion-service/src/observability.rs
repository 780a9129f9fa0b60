use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "caruna_ingest=info,caruna_client=info";

/// `RUST_LOG` wins when set and parsable; otherwise both crates log at info.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .with_target(false)
        .init();
}

/// Install the process-wide Prometheus recorder. A batch run has no scrape
/// endpoint, so the handle is used to log a snapshot once the run ends.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

/// Sample lines of a rendered exposition, without comments or blank lines.
fn metric_lines(rendered: &str) -> impl Iterator<Item = &str> {
    rendered
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

pub fn log_metrics(handle: &PrometheusHandle) {
    let rendered = handle.render();
    for sample in metric_lines(&rendered) {
        info!(sample, "run metric");
    }
}
