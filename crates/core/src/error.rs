//! Fehlertaxonomie des Call-Koordinators
//!
//! Strukturelle Fehler (Authentifizierung, NichtGefunden, ZugriffVerweigert)
//! werden an der Verbindungsgrenze abgewiesen. Nachrichtenbezogene Fehler
//! gehen als `error`-Frame an den Absender zurueck, die Verbindung bleibt offen.
//! Zustellfehler an einen nicht angehaengten Peer sind kein Fehler, sondern
//! ein `false`-Ergebnis von `relay`.

use thiserror::Error;

/// Globaler Result-Alias fuer den Koordinator
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Alle Fehler, die Koordinator-Operationen melden koennen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// Credential fehlt oder ist ungueltig
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    /// Unbekannter Call oder Principal
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Principal ist kein Teilnehmer des Calls
    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    /// Zweiter aktiver Call o.ae.
    #[error("Konflikt: {0}")]
    Konflikt(String),

    /// Lifecycle-Operation im aktuellen Status nicht erlaubt
    #[error("Ungueltiger Uebergang: '{aktion}' ist im Status '{status}' nicht erlaubt")]
    UngueltigerUebergang { status: String, aktion: &'static str },

    /// Envelope nicht parsebar oder unbekannter Typ
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl CoordinatorError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn verweigert(msg: impl Into<String>) -> Self {
        Self::ZugriffVerweigert(msg.into())
    }

    pub fn konflikt(msg: impl Into<String>) -> Self {
        Self::Konflikt(msg.into())
    }

    pub fn ungueltige_nachricht(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Maschinenlesbarer Fehler-Code fuer `error`-Frames und REST-Antworten
    pub fn fehler_code(&self) -> &'static str {
        match self {
            Self::Authentifizierung(_) => "AUTHENTICATION_ERROR",
            Self::NichtGefunden(_) => "NOT_FOUND",
            Self::ZugriffVerweigert(_) => "FORBIDDEN",
            Self::Konflikt(_) => "CONFLICT",
            Self::UngueltigerUebergang { .. } => "INVALID_TRANSITION",
            Self::UngueltigeNachricht(_) => "MALFORMED_MESSAGE",
            Self::Intern(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-Statuscode fuer die Call-REST-Schnittstelle
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Authentifizierung(_) => 401,
            Self::ZugriffVerweigert(_) => 403,
            Self::NichtGefunden(_) => 404,
            Self::Konflikt(_) => 409,
            Self::UngueltigerUebergang { .. } => 409,
            Self::UngueltigeNachricht(_) => 422,
            Self::Intern(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CoordinatorError::UngueltigerUebergang {
            status: "completed".into(),
            aktion: "accept",
        };
        assert_eq!(
            e.to_string(),
            "Ungueltiger Uebergang: 'accept' ist im Status 'completed' nicht erlaubt"
        );
    }

    #[test]
    fn http_status_zuordnung() {
        assert_eq!(CoordinatorError::konflikt("x").http_status(), 409);
        assert_eq!(CoordinatorError::verweigert("x").http_status(), 403);
        assert_eq!(CoordinatorError::nicht_gefunden("x").http_status(), 404);
        assert_eq!(
            CoordinatorError::Authentifizierung("x".into()).http_status(),
            401
        );
    }
}
