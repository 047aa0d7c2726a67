//! Fehlertypen fuer den Signaling-Service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use unilink_auth::AuthError;
use unilink_core::CoordinatorError;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Authentifizierungsfehler
    #[error("Authentifizierungsfehler: {0}")]
    Auth(#[from] AuthError),

    /// Fehler aus Lifecycle, Queue oder Relay
    #[error(transparent)]
    Koordinator(#[from] CoordinatorError),

    /// Zweite Verbindung bei Richtlinie `ablehnen`
    #[error("Principal ist bereits verbunden")]
    BereitsVerbunden,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Abbildung auf die Fehlertaxonomie des Koordinators
    pub fn als_koordinator_fehler(&self) -> CoordinatorError {
        match self {
            Self::Auth(AuthError::Intern(msg)) => CoordinatorError::intern(msg.clone()),
            Self::Auth(e) => CoordinatorError::Authentifizierung(e.to_string()),
            Self::Koordinator(e) => e.clone(),
            Self::BereitsVerbunden => CoordinatorError::konflikt(self.to_string()),
            Self::Intern(msg) => CoordinatorError::intern(msg.clone()),
        }
    }
}

/// JSON-Fehlerantwort der REST-Routen: `{"code": ..., "detail": ...}`
impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let fehler = self.als_koordinator_fehler();
        let status =
            StatusCode::from_u16(fehler.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(fehler = %fehler, "REST-Anfrage fehlgeschlagen");
        }
        let body = serde_json::json!({
            "code": fehler.fehler_code(),
            "detail": fehler.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_fehler_wird_401() {
        let fehler = SignalingError::from(AuthError::CredentialUngueltig);
        assert_eq!(fehler.als_koordinator_fehler().http_status(), 401);
        assert_eq!(fehler.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn koordinator_status_bleibt_erhalten() {
        let fehler = SignalingError::from(CoordinatorError::konflikt("belegt"));
        assert_eq!(fehler.into_response().status(), StatusCode::CONFLICT);

        let fehler = SignalingError::from(CoordinatorError::verweigert("fremd"));
        assert_eq!(fehler.into_response().status(), StatusCode::FORBIDDEN);
    }
}
