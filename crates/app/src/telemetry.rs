//! Log and metric setup for the HireHub server.

use std::fmt::Write as _;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::time::UtcTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use hirehub_util::AppConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static STARTED: OnceLock<Instant> = OnceLock::new();

const VERSION: &str = env!("CARGO_PKG_VERSION");

const COUNTERS: &[(&str, &str)] = &[
    ("documents_written_total", "Committed document writes by collection and op"),
    ("mutations_rejected_total", "Document writes rejected before commit by reason"),
    ("sse_ring_miss_total", "Reconnects replayed from the change log instead of the ring"),
    ("sse_resync_total", "Change stream clients told to reload their data"),
    ("db_ttl_deleted_total", "Change log rows removed by the TTL sweep"),
    ("db_busy_total", "SQLite busy conditions hit by maintenance by op"),
];

const HISTOGRAMS: &[(&str, &str)] = &[
    ("view_build_seconds", "Time to load collections and build a view by view"),
    ("db_checkpoint_seconds", "WAL checkpoint duration"),
];

/// JSON lines in production, pretty output otherwise. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());
    let format = if config.environment.is_production() {
        format.json().boxed()
    } else {
        format.pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()?;

    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = VERSION,
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once per process and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    for (name, help) in COUNTERS {
        describe_counter!(*name, *help);
    }
    for (name, help) in HISTOGRAMS {
        describe_histogram!(*name, *help);
    }
    describe_gauge!("sse_clients", "Connected change stream clients");
    STARTED.get_or_init(Instant::now);

    *recorder = Some(handle.clone());
    Ok(handle)
}

/// Renders recorded metrics plus build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    let uptime = STARTED
        .get()
        .map(|started| started.elapsed().as_secs_f64())
        .unwrap_or_default();
    let _ = writeln!(body, "# TYPE hirehub_build_info gauge");
    let _ = writeln!(body, "hirehub_build_info{{version=\"{VERSION}\"}} 1");
    let _ = writeln!(body, "# TYPE hirehub_uptime_seconds gauge");
    let _ = writeln!(body, "hirehub_uptime_seconds {uptime}");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_install_once_and_render_build_gauges() {
        let first = init_metrics().expect("first init");
        let second = init_metrics().expect("second init");
        metrics::counter!("documents_written_total", "collection" => "jobs", "op" => "created")
            .increment(1);

        let body = render_metrics(&second);
        assert!(body.contains(&format!("hirehub_build_info{{version=\"{VERSION}\"}} 1")));
        assert!(body.contains("hirehub_uptime_seconds "));
        assert!(first.render().contains("documents_written_total"));
    }
}
