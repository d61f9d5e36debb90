//! # Observability
//!
//! Tracing + Prometheus metrics for the backpressure subsystem.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact)
//! - Prometheus exporter with described `backpressure_*` series and
//!   millisecond histogram buckets
//! - Admission/dispatch metric helpers and in-memory latency statistics
//!
//! ## Usage
//!
//! ```ignore
//! use observability::{metrics, ObservabilityConfig};
//!
//! observability::init_with_config(ObservabilityConfig {
//!     metrics_port: Some(9100),
//!     ..ObservabilityConfig::default()
//! })?;
//!
//! let accepted = manager.submit(op);
//! metrics::record_submission(priority, accepted);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{LatencyWindow, RunningStats};

/// Bucket bounds for the `_ms` histograms (cycle duration, queue wait)
const LATENCY_BUCKETS_MS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0,
];

/// Bucket bounds for operations processed per cycle
const CYCLE_PROCESSED_BUCKETS: &[f64] = &[0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = no exporter)
    pub metrics_port: Option<u16>,
    /// Default log level when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human-readable
    Pretty,
    /// Compact single line
    #[default]
    Compact,
}

/// Install the tracing subscriber and, if a port is set, the Prometheus exporter
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install only the Prometheus exporter
///
/// For processes where tracing was already set up elsewhere (e.g. the CLI).
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}

/// Install the global recorder on `0.0.0.0:port` and describe every series
fn install_exporter(port: u16) -> Result<()> {
    exporter_builder()?
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;

    metrics::describe_metrics();
    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// Exporter with histogram buckets sized for per-cycle latencies
fn exporter_builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), LATENCY_BUCKETS_MS)
        .context("Invalid latency buckets")?
        .set_buckets_for_metric(
            Matcher::Full("backpressure_cycle_processed".to_string()),
            CYCLE_PROCESSED_BUCKETS,
        )
        .context("Invalid cycle buckets")
}
