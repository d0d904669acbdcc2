//! Telemetry setup for OpenTelemetry integration
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name (default: entitlement-daemon)
//!
//! # Example
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=entitlement-dev \
//!     ./entitlement-daemon
//! ```

use anyhow::Result;
use tracing_subscriber::{Layer, Registry};

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Build the export layer when an endpoint is configured.
///
/// Runs before the subscriber exists, so diagnostics go to stderr.
pub fn layer() -> Result<Option<BoxedLayer>> {
    match std::env::var(ENDPOINT_VAR) {
        Ok(endpoint) => layer_for(&endpoint),
        Err(_) => Ok(None),
    }
}

#[cfg(not(feature = "telemetry"))]
fn layer_for(endpoint: &str) -> Result<Option<BoxedLayer>> {
    eprintln!(
        "{} is set to {} but feature 'telemetry' is not enabled; rebuild with --features telemetry",
        ENDPOINT_VAR, endpoint
    );
    Ok(None)
}

#[cfg(feature = "telemetry")]
fn layer_for(endpoint: &str) -> Result<Option<BoxedLayer>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "entitlement-daemon".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed()))
}
