use std::env;

use opentelemetry::trace::{TraceError, TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::env::parse_env_or;

pub const OTLP_URL_ENVVAR: &str = "TRELLIS_OTLP_URL";
pub const SVC_LABEL_ENVVAR: &str = "TRELLIS_SVC_LABEL";
pub const LOG_ANSI_ENVVAR: &str = "TRELLIS_LOG_ANSI";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("opentelemetry: {0}")]
    OpenTelemetry(#[from] TraceError),

    #[error("subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    whoami: String,
    otel_url: Option<String>,
    ansi: bool,
}

impl LoggerConfig {
    /// Creates a new instance with whoami set and colored output unless disabled by env.
    pub fn new(whoami: String) -> Self {
        Self {
            whoami,
            otel_url: None,
            ansi: parse_env_or(LOG_ANSI_ENVVAR, true),
        }
    }

    pub fn with_base_name(s: &str) -> Self {
        Self::new(get_whoami_string(s))
    }

    pub fn set_otlp_url(&mut self, url: String) {
        self.otel_url = Some(url);
    }

    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("(trellis-service)")
    }
}

/// Initializes the logging subsystem with the provided config.
///
/// Must be called from within a tokio runtime if an OTLP endpoint is configured, since the batch
/// exporter spawns onto it.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    let filt = tracing_subscriber::EnvFilter::from_default_env();

    // Stdout logging.
    let stdout_sub = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(config.ansi)
        .with_filter(filt);

    // OpenTelemetry output.
    if let Some(otel_url) = &config.otel_url {
        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(otel_url);

        let tp = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        let tt = tp.tracer("trellis-log");
        opentelemetry::global::set_tracer_provider(tp);
        let otel_sub = tracing_opentelemetry::layer().with_tracer(tt);

        tracing_subscriber::registry()
            .with(stdout_sub)
            .with(otel_sub)
            .try_init()?;
    } else {
        tracing_subscriber::registry().with(stdout_sub).try_init()?;
    }

    info!(whoami = %config.whoami, "logging started");
    Ok(())
}

/// Shuts down the logging subsystem, flushing any spans still buffered for export.
pub fn finalize() {
    info!("shutting down logging");
    opentelemetry::global::shutdown_tracer_provider();
}

/// Gets the OTLP URL from the standard envvar.
pub fn get_otlp_url_from_env() -> Option<String> {
    env::var(OTLP_URL_ENVVAR).ok()
}

/// Gets the service label from the standard envvar, which should be included
/// in the whoami string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
