//! unilink-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::Router;
use config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use unilink_auth::{CredentialStore, Identitaet};
use unilink_observability::{
    health_router, http_metriken, metrics_router, request_timing_layer, CallMetrics, HealthState,
};
use unilink_signaling::{InMemoryBlockStore, InMemoryPresenceStore, PresenceStore, SignalingState};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken und Credential-Store aufbauen
    /// 2. Presence-Store zuruecksetzen (alle offline)
    /// 3. Hintergrund-Bereinigung starten
    /// 4. HTTP-Listener oeffnen (WebSocket, REST, Health, Metriken)
    /// 5. Auf Ctrl-C warten, Verbindungen beenden lassen
    pub async fn starten(self) -> Result<()> {
        let config = self.config;
        tracing::info!(
            server_name = %config.server.name,
            adresse = %config.bind_adresse(),
            "Server startet"
        );

        let metriken = CallMetrics::neu()?;

        let credentials = CredentialStore::neu();
        credentials_hinterlegen(&credentials, &config).await;
        CredentialStore::cleanup_task_starten(&credentials);

        let presence_store = Arc::new(InMemoryPresenceStore::neu());
        let zurueckgesetzt = presence_store
            .reset_all_offline()
            .await
            .map_err(|e| anyhow::anyhow!("Presence-Store nicht zuruecksetzbar: {e}"))?;
        tracing::info!(anzahl = zurueckgesetzt, "Presence-Store zurueckgesetzt");

        let state = SignalingState::neu(
            config.signaling_config(),
            credentials,
            presence_store,
            Arc::new(InMemoryBlockStore::neu()),
            metriken.clone(),
        );

        bereinigung_starten(Arc::clone(&state), &config);

        let health = HealthState::neu();
        let app = app_bauen(Arc::clone(&state), health.clone(), metriken, &config);

        let listener = tokio::net::TcpListener::bind(config.bind_adresse()).await?;
        health.bereit_setzen(true);
        tracing::info!(adresse = %config.bind_adresse(), "HTTP-Listener bereit");

        let shutdown_state = Arc::clone(&state);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Ctrl-C-Handler nicht installierbar");
                }
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                health.bereit_setzen(false);
                shutdown_state.herunterfahren();
            })
            .await?;

        tracing::info!(
            aktive_calls = state.calls.anzahl_aktiv(),
            "Server beendet"
        );
        Ok(())
    }
}

/// Hinterlegt die statischen Credentials aus der Konfiguration
pub async fn credentials_hinterlegen(store: &CredentialStore, config: &ServerConfig) {
    for (token, eintrag) in &config.auth.tokens {
        store
            .statisch_hinterlegen(
                token.clone(),
                Identitaet::neu(eintrag.principal_id.as_str(), eintrag.display_name.clone()),
            )
            .await;
    }
    if !config.auth.tokens.is_empty() {
        tracing::info!(
            anzahl = config.auth.tokens.len(),
            "Statische Credentials hinterlegt"
        );
    }
}

/// Baut die vollstaendige HTTP-Anwendung
pub fn app_bauen(
    state: Arc<SignalingState>,
    health: HealthState,
    metriken: CallMetrics,
    config: &ServerConfig,
) -> Router {
    let mut app = unilink_signaling::router(state).merge(health_router(health));
    if config.observability.aktiviert {
        app = app.merge(metrics_router(metriken.clone()));
    }

    app.layer(middleware::from_fn_with_state(metriken, http_metriken))
        .layer(request_timing_layer())
        .layer(cors_layer(&config.netzwerk.cors_origins))
}

/// CORS: entweder spezifische Origins oder alle
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// Ergebnis eines Bereinigungslaufs
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bereinigung {
    pub sessions_geschlossen: usize,
    pub calls_entfernt: usize,
}

/// Ein Bereinigungslauf: inaktive Sessions schliessen, Verlauf kuerzen
pub fn bereinigen(state: &SignalingState, verlauf_behalten: usize) -> Bereinigung {
    let ergebnis = Bereinigung {
        sessions_geschlossen: state.relay.idle_sweep(state.config.session_idle()).len(),
        calls_entfernt: state.calls.prune_history(verlauf_behalten),
    };
    state.gauges_aktualisieren();
    ergebnis
}

/// Startet die periodische Bereinigung im Hintergrund
fn bereinigung_starten(state: Arc<SignalingState>, config: &ServerConfig) {
    let intervall = Duration::from_secs(config.signaling.sweep_intervall_sek.max(1));
    let behalten = config.signaling.verlauf_behalten;
    let mut shutdown_rx = state.shutdown_empfaenger();

    tokio::spawn(async move {
        let mut takt = tokio::time::interval(intervall);
        loop {
            tokio::select! {
                _ = takt.tick() => {
                    let ergebnis = bereinigen(&state, behalten);
                    if ergebnis != Bereinigung::default() {
                        tracing::debug!(
                            sessions = ergebnis.sessions_geschlossen,
                            calls = ergebnis.calls_entfernt,
                            "Bereinigung abgeschlossen"
                        );
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
}
