use crate::handler::middleware::clientaddr::ClientAddr;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::CONTENT_LENGTH, Request},
    middleware::Next,
    response::Response,
};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tracing::field::{Field, Visit};
use tracing::{info, Event, Subscriber};
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const ACCESS_LOG_TARGET: &str = "http.access";

/// Renders `http.access` events as a single pipe separated line and every
/// other event with the default formatter.
#[derive(Clone, Default)]
pub struct AccessLogEventFormat<T = SystemTime> {
    timer: T,
}

impl<T: FormatTime> AccessLogEventFormat<T> {
    pub fn new(timer: T) -> Self {
        Self { timer }
    }
}

#[derive(Default)]
struct AccessLine {
    client_ip: String,
    method: String,
    status: String,
    body_len: String,
    latency: String,
    uri: String,
}

impl AccessLine {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "client_ip" => self.client_ip = value,
            "method" => self.method = value,
            "status" => self.status = value,
            "body_len" => self.body_len = value,
            "latency_ms" => self.latency = format!("{}ms", value),
            "uri" => self.uri = value,
            _ => {}
        }
    }

    fn column(value: &str) -> &str {
        if value.is_empty() {
            "-"
        } else {
            value
        }
    }
}

impl Visit for AccessLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set(field.name(), value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.set(field.name(), format!("{value:.3}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        self.set(field.name(), rendered.trim_matches('"').to_string());
    }
}

impl<S, N, T> FormatEvent<S, N> for AccessLogEventFormat<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
    T: FormatTime + Clone,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != ACCESS_LOG_TARGET {
            return format::Format::default()
                .with_timer(self.timer.clone())
                .with_target(true)
                .format_event(ctx, writer, event);
        }

        let mut line = AccessLine::default();
        event.record(&mut line);
        self.timer.format_time(&mut writer)?;
        writeln!(
            writer,
            " {} {} | {} | {} | {} | {} | {} | {}",
            metadata.level(),
            ACCESS_LOG_TARGET,
            AccessLine::column(&line.client_ip),
            AccessLine::column(&line.method),
            AccessLine::column(&line.status),
            AccessLine::column(&line.body_len),
            AccessLine::column(&line.latency),
            AccessLine::column(&line.uri),
        )
    }
}

/// Exact paths, or prefixes when the pattern ends with `*`.
pub fn should_skip_logging(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern,
    })
}

pub async fn log_requests(
    State(skip_paths): State<Arc<Vec<String>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if should_skip_logging(&path, &skip_paths) {
        return next.run(req).await;
    }

    let started_at = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().to_string();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client_ip = ClientAddr::from_headers(req.headers(), peer).ip();

    let response = next.run(req).await;

    let body_len = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let latency_ms = started_at.elapsed().as_secs_f64() * 1_000.0;

    info!(
        target: "http.access",
        client_ip = %client_ip,
        method = method.as_str(),
        status = response.status().as_u16(),
        body_len = body_len.as_str(),
        latency_ms,
        uri = uri.as_str(),
    );
    response
}
