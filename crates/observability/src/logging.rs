//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `UL_LOG_LEVEL`: Filter-Ausdruck (z.B. `info` oder `unilink_signaling=debug`)
//! - `UL_LOG_FORMAT`: Format (text/json)
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "UL_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "UL_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` stammen aus der Konfiguration und werden nur
/// verwendet, wenn die Umgebungsvariablen nicht gesetzt sind.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let aus_env = std::env::var(ENV_LOG_FORMAT).ok();
    let format = log_format_waehlen(aus_env.as_deref(), format);

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Waehlt das Log-Format: Umgebung vor Konfiguration, unbekannte Werte -> `text`
pub fn log_format_waehlen<'a>(aus_env: Option<&'a str>, aus_config: &'a str) -> &'a str {
    let gewaehlt = aus_env.unwrap_or(aus_config);
    if log_format_gueltig(gewaehlt) {
        gewaehlt
    } else {
        "text"
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
