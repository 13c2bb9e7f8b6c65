//! Log and trace subscriber setup for the server binary.

#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Clone, Debug, Default)]
pub struct TelemetryOptions {
    pub json_logs: bool,
    pub otel: bool,
    pub otel_endpoint: Option<String>,
}

/// Flushes pending spans when dropped.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

#[cfg(feature = "otel")]
impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

pub fn init_tracing(
    service_name: &str,
    options: &TelemetryOptions,
) -> Result<TelemetryGuard, Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = if options.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    #[cfg(feature = "otel")]
    if options.otel {
        let provider = otlp_provider(service_name, options.otel_endpoint.as_deref())?;
        let tracer = provider.tracer(service_name.to_string());
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
        return Ok(TelemetryGuard {
            provider: Some(provider),
        });
    }

    #[cfg(not(feature = "otel"))]
    if options.otel || options.otel_endpoint.is_some() {
        return Err(format!("{service_name}: OTLP export requires `--features otel`").into());
    }

    registry.try_init()?;
    Ok(TelemetryGuard::default())
}

#[cfg(feature = "otel")]
fn otlp_provider(
    service_name: &str,
    endpoint: Option<&str>,
) -> Result<opentelemetry_sdk::trace::SdkTracerProvider, Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig as _;

    let mut exporter = opentelemetry_otlp::SpanExporter::builder().with_http();
    if let Some(endpoint) = endpoint {
        exporter = exporter.with_endpoint(endpoint.to_string());
    }
    let exporter = exporter.build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
