//! Logs, traces and metrics.
//!
//! Logs always go to stdout. OTLP export of logs and traces starts when
//! `telemetry.otlp_endpoint` is set, the Prometheus recorder when
//! `telemetry.prometheus` is.
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use metrics::{Unit, counter, gauge, histogram};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle,
};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Telemetry;

pub const REQUESTS_TOTAL: &str = "profiles_http_requests_total";
pub const REQUEST_DURATION: &str = "profiles_http_request_duration_seconds";
pub const ACCOUNTS_CREATED: &str = "profiles_accounts_created_total";
pub const AUTHENTICATIONS: &str = "profiles_authentications_total";
const PROCESS_MEMORY: &str = "process_memory_used_bytes";
const PROCESS_CPU: &str = "process_cpu_usage";

/// Route label of requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

const SERVICE_NAME: &str = "profiles";

/// Exporters started by [`init`]. Call [`Guard::shutdown`] before exiting
/// so buffered spans and logs are flushed.
#[derive(Default)]
pub struct Guard {
    tracer: Option<SdkTracerProvider>,
    logger: Option<SdkLoggerProvider>,
}

impl Guard {
    pub fn shutdown(self) {
        if let Some(tracer) = self.tracer {
            if let Err(err) = tracer.shutdown() {
                tracing::error!(error = %err, "cannot flush traces");
            }
        }
        if let Some(logger) = self.logger {
            if let Err(err) = logger.shutdown() {
                tracing::error!(error = %err, "cannot flush logs");
            }
        }
    }
}

fn resource() -> Resource {
    Resource::builder().with_service_name(SERVICE_NAME).build()
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init(
    config: Option<&Telemetry>,
    default_filter: &str,
) -> Result<Guard, Box<dyn std::error::Error>> {
    let endpoint = config.and_then(|c| c.otlp_endpoint.as_deref());
    let mut guard = Guard::default();

    let otel_logs = match endpoint {
        Some(endpoint) => {
            let exporter = LogExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;
            let provider = SdkLoggerProvider::builder()
                .with_resource(resource())
                .with_batch_exporter(exporter)
                .build();
            let layer = OpenTelemetryTracingBridge::new(&provider);
            guard.logger = Some(provider);
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(otel_logs)
        .try_init()?;

    if let Some(endpoint) = endpoint {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource())
            .build();
        global::set_tracer_provider(provider.clone());
        guard.tracer = Some(provider);

        tracing::info!(%endpoint, "exporting traces and logs");
    }

    Ok(guard)
}

fn prometheus() -> Result<PrometheusBuilder, BuildError> {
    const LATENCY_BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(REQUEST_DURATION.to_owned()),
        LATENCY_BUCKETS,
    )
}

fn describe() {
    metrics::describe_counter!(REQUESTS_TOTAL, "HTTP requests answered.");
    metrics::describe_histogram!(
        REQUEST_DURATION,
        Unit::Seconds,
        "Time spent answering HTTP requests."
    );
    metrics::describe_counter!(ACCOUNTS_CREATED, "Accounts created.");
    metrics::describe_counter!(
        AUTHENTICATIONS,
        "Credential checks, by outcome."
    );
    metrics::describe_gauge!(
        PROCESS_MEMORY,
        Unit::Bytes,
        "Resident memory of the process."
    );
    metrics::describe_gauge!(
        PROCESS_CPU,
        Unit::Percent,
        "CPU usage of the process."
    );
}

/// Install the Prometheus recorder and sample process usage every
/// `interval`.
///
/// Must be called inside a Tokio runtime.
pub fn setup_metrics_recorder(
    interval: Duration,
) -> Result<PrometheusHandle, BuildError> {
    let handle = prometheus()?.install_recorder()?;
    describe();

    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );

            let Some(process) = system.process(pid) else {
                continue;
            };
            gauge!(PROCESS_MEMORY).set(process.memory() as f64);
            gauge!(PROCESS_CPU).set(f64::from(process.cpu_usage()));
        }
    });

    Ok(handle)
}

/// `GET /metrics` in the Prometheus exposition format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    )
}

/// Route template of a request, such as `/hello-view/{id}`.
///
/// Raw paths are never used as labels, so `/hello-view/1` and
/// `/hello-view/2` share a series.
fn route_of(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_owned()
}

/// Record a span, a counter and a latency histogram for every request.
pub async fn track(req: Request, next: Next) -> Response {
    let route = route_of(&req);
    let method = req.method().to_string();
    let mut span =
        global::tracer(SERVICE_NAME).start(format!("{method} {route}"));
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    span.set_attributes([
        KeyValue::new("http.route", route.clone()),
        KeyValue::new("http.request.method", method.clone()),
        KeyValue::new("http.response.status_code", i64::from(status)),
    ]);
    span.end();

    let labels = [
        ("method", method),
        ("route", route),
        ("status", status.to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION, &labels).record(elapsed);

    response
}
