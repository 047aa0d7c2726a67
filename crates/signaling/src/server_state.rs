//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Komponenten und externen Kollaborateure, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use unilink_auth::Authenticator;
use unilink_calls::{CallRegistry, MatchQueue};
use unilink_observability::CallMetrics;

use crate::presence::PresenceRegistry;
use crate::relay::SignalingRelay;
use crate::store::{BlockStore, PresenceStore};

/// Verhalten bei einer zweiten Verbindung desselben Principals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZweiteVerbindung {
    /// Die aeltere Verbindung wird beendet
    #[default]
    Ersetzen,
    /// Die neue Verbindung wird abgewiesen
    Ablehnen,
}

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer Verbindungen ohne eingehenden Frame
    pub verbindungs_timeout_sek: u64,
    /// Sessions ohne Nachricht laenger als dies werden geschlossen
    pub session_idle_sek: u64,
    pub zweite_verbindung: ZweiteVerbindung,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            session_idle_sek: 3600,
            zweite_verbindung: ZweiteVerbindung::Ersetzen,
        }
    }
}

impl SignalingConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_sek.max(1))
    }

    pub fn verbindungs_timeout(&self) -> Duration {
        Duration::from_secs(self.verbindungs_timeout_sek.max(1))
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_sek)
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
///
/// Presence, Queue, Calls und Relay sind selbst `Clone` und teilen ihren
/// inneren Zustand; die externen Kollaborateure liegen hinter Trait-Objekten.
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Credential -> Principal
    pub auth: Arc<dyn Authenticator>,
    /// Dauerhaftes Online-Flag
    pub presence_store: Arc<dyn PresenceStore>,
    /// Gegenseitige Sperrlisten
    pub block_store: Arc<dyn BlockStore>,
    pub presence: PresenceRegistry,
    pub queue: MatchQueue,
    pub calls: CallRegistry,
    pub relay: SignalingRelay,
    pub metriken: CallMetrics,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(
        config: SignalingConfig,
        auth: Arc<dyn Authenticator>,
        presence_store: Arc<dyn PresenceStore>,
        block_store: Arc<dyn BlockStore>,
        metriken: CallMetrics,
    ) -> Arc<Self> {
        let calls = CallRegistry::neu();
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config: Arc::new(config),
            auth,
            presence_store,
            block_store,
            presence: PresenceRegistry::neu(),
            queue: MatchQueue::neu(),
            relay: SignalingRelay::neu(calls.clone()),
            calls,
            metriken,
            shutdown_tx,
        })
    }

    /// Empfaenger fuer das Shutdown-Signal (eine Kopie pro Verbindung)
    pub fn shutdown_empfaenger(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signalisiert allen Verbindungen, sich zu beenden
    pub fn herunterfahren(&self) {
        tracing::info!("Shutdown an alle Verbindungen signalisiert");
        self.shutdown_tx.send_replace(true);
    }

    /// Aktualisiert die Zustands-Gauges
    pub fn gauges_aktualisieren(&self) {
        self.metriken
            .online_principals
            .set(self.presence.online_anzahl() as i64);
        self.metriken.queue_size.set(self.queue.size() as i64);
        self.metriken.active_calls.set(self.calls.anzahl_aktiv() as i64);
        self.metriken
            .signaling_sessions
            .set(self.relay.anzahl() as i64);
    }
}
