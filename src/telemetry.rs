use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use once_cell::sync::Lazy;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
};
use tonic::metadata::MetadataMap;
use tracing::{Span, field, info, info_span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_OTLP_ENDPOINT: &str = "https://api.honeycomb.io:443";

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

/// Where and how spans are exported, read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub environment: String,
    pub endpoint: String,
    /// Export is off when this is `None`.
    pub honeycomb_api_key: Option<String>,
}

impl TelemetrySettings {
    pub fn from_env() -> Self {
        let environment = match std::env::var("ROCKET_PROFILE").as_deref() {
            Ok("production") | Ok("release") => "production".to_string(),
            Ok(profile) if !profile.is_empty() => profile.to_string(),
            _ => "development".to_string(),
        };

        let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string());

        let honeycomb_api_key = std::env::var("HONEYCOMB_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Self {
            environment,
            endpoint,
            honeycomb_api_key,
        }
    }

    pub fn exports_spans(&self) -> bool {
        self.honeycomb_api_key.is_some()
    }
}

/// Span covering one HTTP request. Error fields start empty and are filled by
/// `AppError::record_on` when the request fails.
pub fn http_request_span(method: &str, path: &str, school: Option<&str>) -> Span {
    info_span!(
        "http_request",
        otel.name = format!("{} {}", method, path),
        http.method = method,
        http.uri = path,
        http.route = field::Empty,
        http.status_code = field::Empty,
        http.duration_ms = field::Empty,
        timetable.school = school,
        error = field::Empty,
        error.type = field::Empty,
        error.message = field::Empty,
        otel.status_code = field::Empty,
    )
}

/// The `http_request` span opened for `request` by `TelemetryFairing`.
pub fn request_span<'r>(request: &'r Request<'_>) -> &'r Span {
    let (span, _): &(Span, Instant) =
        request.local_cache(|| (http_request_span("UNKNOWN", "", None), Instant::now()));
    span
}

/// Opens an `http_request` span per request and closes it with the matched
/// route, status and duration.
pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request tracing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let school = request
            .query_value::<&str>("school")
            .and_then(Result::ok)
            .map(str::to_string);

        let span = http_request_span(&method, &path, school.as_deref());

        request.local_cache(|| (span, Instant::now()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let (span, start_time): &(Span, Instant) = request
            .local_cache(|| (http_request_span("UNKNOWN", "", None), Instant::now()));

        let duration = start_time.elapsed();
        let status = response.status();

        if let Some(route) = request.route() {
            span.record("http.route", field::display(&route.uri));
        }
        span.record("http.status_code", status.code);
        span.record("http.duration_ms", duration.as_millis() as i64);
        if status.code >= 500 {
            span.record("otel.status_code", "ERROR");
        }

        let _entered = span.enter();
        info!(
            status = status.code,
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }
}

fn resource(settings: &TelemetrySettings) -> Resource {
    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, settings.environment.clone()),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(
    settings: &TelemetrySettings,
    api_key: &str,
) -> anyhow::Result<SdkTracerProvider> {
    let mut metadata = MetadataMap::new();
    metadata.insert(
        "x-honeycomb-team",
        api_key
            .parse()
            .context("HONEYCOMB_API_KEY is not a valid header value")?,
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.endpoint.clone())
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()
        .context("Failed to build OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource(settings))
        .with_batch_exporter(exporter)
        .build())
}

pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

/// Installs the global subscriber: `RUST_LOG`-filtered fmt output, plus an
/// OTLP layer when an API key is configured.
pub fn init_tracing() -> anyhow::Result<()> {
    let settings = TelemetrySettings::from_env();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if !settings.exports_spans() {
        registry
            .try_init()
            .context("Failed to install tracing subscriber")?;
        info!(environment = %settings.environment, "Span export disabled");
        return Ok(());
    }

    let api_key = settings.honeycomb_api_key.as_deref().unwrap_or_default();
    let tracer_provider = init_tracer_provider(&settings, api_key)?;
    let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));

    registry
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Ok(mut guard) = TELEMETRY_GUARD.lock() {
        *guard = Some(OtelGuard { tracer_provider });
    }
    info!(
        environment = %settings.environment,
        endpoint = %settings.endpoint,
        "Exporting spans over OTLP"
    );

    Ok(())
}

pub fn shutdown_telemetry() {
    println!("Shutting down telemetry...");

    let guard = match TELEMETRY_GUARD.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    drop(guard);
}
