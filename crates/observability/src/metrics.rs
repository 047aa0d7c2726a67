//! Prometheus-kompatible Metriken fuer UniLink
//!
//! Registrierte Metriken:
//! - `unilink_online_principals` – Gauge: Principals mit offener Verbindung
//! - `unilink_queue_size` – Gauge: Wartende in der Matchmaking-Queue
//! - `unilink_active_calls` – Gauge: Calls mit Status pending/ongoing
//! - `unilink_signaling_sessions` – Gauge: Offene Signaling-Sessions
//! - `unilink_calls_total` – Counter: Call-Ereignisse (outcome)
//! - `unilink_signals_total` – Counter: Weitergeleitete Signale (kind, delivered)
//! - `unilink_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `unilink_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle UniLink-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Metrik-Handles.
#[derive(Clone)]
pub struct CallMetrics {
    pub registry: Arc<Registry>,

    // Koordinator-Zustand
    pub online_principals: IntGauge,
    pub queue_size: IntGauge,
    pub active_calls: IntGauge,
    pub signaling_sessions: IntGauge,

    // Ereignisse
    pub calls_total: IntCounterVec,
    pub signals_total: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl CallMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let online_principals = IntGauge::with_opts(Opts::new(
            "unilink_online_principals",
            "Anzahl Principals mit offener Signaling-Verbindung",
        ))?;
        registry.register(Box::new(online_principals.clone()))?;

        let queue_size = IntGauge::with_opts(Opts::new(
            "unilink_queue_size",
            "Anzahl wartender Principals in der Matchmaking-Queue",
        ))?;
        registry.register(Box::new(queue_size.clone()))?;

        let active_calls = IntGauge::with_opts(Opts::new(
            "unilink_active_calls",
            "Anzahl Calls mit Status pending oder ongoing",
        ))?;
        registry.register(Box::new(active_calls.clone()))?;

        let signaling_sessions = IntGauge::with_opts(Opts::new(
            "unilink_signaling_sessions",
            "Anzahl offener Signaling-Sessions",
        ))?;
        registry.register(Box::new(signaling_sessions.clone()))?;

        let calls_total = IntCounterVec::new(
            Opts::new("unilink_calls_total", "Call-Ereignisse nach Ergebnis"),
            &["outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let signals_total = IntCounterVec::new(
            Opts::new(
                "unilink_signals_total",
                "Weitergeleitete Signaling-Nachrichten",
            ),
            &["kind", "delivered"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("unilink_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "unilink_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            online_principals,
            queue_size,
            active_calls,
            signaling_sessions,
            calls_total,
            signals_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt ein Call-Ereignis (`created`, `matched`, `accepted`, `rejected`, `completed`)
    pub fn call_ereignis(&self, outcome: &str) {
        self.calls_total.with_label_values(&[outcome]).inc();
    }

    /// Zaehlt ein weitergeleitetes Signal
    pub fn signal(&self, kind: &str, zugestellt: bool) {
        let delivered = if zugestellt { "true" } else { "false" };
        self.signals_total.with_label_values(&[kind, delivered]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: CallMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<CallMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = CallMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn gauges_setzen() {
        let metriken = CallMetrics::neu().unwrap();
        metriken.online_principals.set(3);
        metriken.queue_size.set(1);
        assert_eq!(metriken.online_principals.get(), 3);
        assert_eq!(metriken.queue_size.get(), 1);
    }

    #[test]
    fn signal_zaehlt_nach_labels() {
        let metriken = CallMetrics::neu().unwrap();
        metriken.signal("offer", true);
        metriken.signal("offer", true);
        metriken.signal("ice_candidate", false);

        assert_eq!(
            metriken
                .signals_total
                .with_label_values(&["offer", "true"])
                .get(),
            2
        );
        assert_eq!(
            metriken
                .signals_total
                .with_label_values(&["ice_candidate", "false"])
                .get(),
            1
        );
    }

    #[test]
    fn export_enthaelt_call_metriken() {
        let metriken = CallMetrics::neu().unwrap();
        metriken.active_calls.set(2);
        metriken.call_ereignis("completed");

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("unilink_active_calls 2"));
        assert!(output.contains("unilink_calls_total{outcome=\"completed\"} 1"));
        assert!(output.contains("# HELP"));
    }

    #[test]
    fn getrennte_instanzen_teilen_nichts() {
        let a = CallMetrics::neu().unwrap();
        let b = CallMetrics::neu().unwrap();
        a.call_ereignis("created");
        assert_eq!(b.calls_total.with_label_values(&["created"]).get(), 0);
    }

    #[tokio::test]
    async fn metrics_route_liefert_textformat() {
        let metriken = CallMetrics::neu().unwrap();
        metriken.queue_size.set(4);

        let antwort = metrics_router(metriken)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(antwort.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(antwort.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("unilink_queue_size 4"));
    }
}
