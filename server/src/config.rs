//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unilink_signaling::{SignalingConfig, ZweiteVerbindung};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Presence, Relay und Verbindungen
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken)
    pub observability: ObservabilityEinstellungen,
    /// Statische Credentials
    pub auth: AuthEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "UniLink Koordinator".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer HTTP, WebSocket, `/health` und `/metrics`
    pub port: u16,
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec![],
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Groesse der Send-Queue pro Verbindung (volle Queue verwirft)
    pub send_queue_groesse: usize,
    pub keepalive_sek: u64,
    /// Verbindung ohne eingehenden Frame wird danach getrennt
    pub verbindungs_timeout_sek: u64,
    /// Sessions ohne Nachricht laenger als dies werden geschlossen
    pub session_idle_sek: u64,
    /// Intervall der Hintergrund-Bereinigung
    pub sweep_intervall_sek: u64,
    /// Anzahl terminaler Calls, die pro Principal im Verlauf bleiben
    pub verlauf_behalten: usize,
    /// `"ersetzen"` oder `"ablehnen"`
    pub zweite_verbindung: ZweiteVerbindung,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let basis = SignalingConfig::default();
        Self {
            send_queue_groesse: basis.send_queue_groesse,
            keepalive_sek: basis.keepalive_sek,
            verbindungs_timeout_sek: basis.verbindungs_timeout_sek,
            session_idle_sek: basis.session_idle_sek,
            sweep_intervall_sek: 60,
            verlauf_behalten: 50,
            zweite_verbindung: basis.zweite_verbindung,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Stellt `/metrics` bereit
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

/// Ein fest hinterlegtes Credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEintrag {
    pub principal_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Statische Credentials fuer Entwicklungs-Deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Credential -> Principal
    pub tokens: BTreeMap<String, TokenEintrag>,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Laufzeit-Konfiguration fuer den Signaling-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        let s = &self.signaling;
        SignalingConfig {
            send_queue_groesse: s.send_queue_groesse,
            keepalive_sek: s.keepalive_sek,
            verbindungs_timeout_sek: s.verbindungs_timeout_sek,
            session_idle_sek: s.session_idle_sek,
            zweite_verbindung: s.zweite_verbindung,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.port, 8000);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.signaling.send_queue_groesse, 64);
        assert_eq!(cfg.signaling.verlauf_behalten, 50);
        assert_eq!(cfg.signaling.zweite_verbindung, ZweiteVerbindung::Ersetzen);
        assert!(cfg.observability.aktiviert);
        assert!(cfg.auth.tokens.is_empty());
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:8000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Test"

            [netzwerk]
            port = 9000

            [signaling]
            keepalive_sek = 10
            zweite_verbindung = "ablehnen"

            [auth.tokens]
            "dev-alice" = { principal_id = "alice", display_name = "Alice" }
            "dev-bob" = { principal_id = "bob" }
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Test");
        assert_eq!(cfg.netzwerk.port, 9000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.signaling.verbindungs_timeout_sek, 90);

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.keepalive_sek, 10);
        assert_eq!(signaling.zweite_verbindung, ZweiteVerbindung::Ablehnen);

        assert_eq!(cfg.auth.tokens.len(), 2);
        assert_eq!(cfg.auth.tokens["dev-alice"].display_name.as_deref(), Some("Alice"));
        assert_eq!(cfg.auth.tokens["dev-bob"].principal_id, "bob");
    }

    #[test]
    fn unbekannte_richtlinie_ist_fehler() {
        let toml = r#"
            [signaling]
            zweite_verbindung = "beide"
        "#;
        assert!(toml::from_str::<ServerConfig>(toml).is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/unilink.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, 8000);
    }
}
