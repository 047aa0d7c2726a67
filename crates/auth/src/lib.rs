//! unilink-auth – Schnittstelle zum Auth-Kollaborateur
//!
//! Der Koordinator verwaltet keine Benutzerkonten. Er braucht nur eine
//! Funktion Credential -> Principal. Dieses Crate stellt dafuer bereit:
//! - `Authenticator`-Trait (die Schnittstelle)
//! - `CredentialStore`: In-Memory-Implementierung mit TTL und Cleanup-Task

pub mod credential;
pub mod error;

use async_trait::async_trait;
use unilink_core::PrincipalId;

// Bequeme Re-Exporte
pub use credential::{Credential, CredentialStore};
pub use error::{AuthError, AuthResult};

/// Ergebnis einer erfolgreichen Authentifizierung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identitaet {
    pub principal_id: PrincipalId,
    /// Anzeigename fuer `match_found`/`incoming_call` (optional)
    pub display_name: Option<String>,
}

impl Identitaet {
    pub fn neu(principal_id: impl Into<PrincipalId>, display_name: Option<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            display_name,
        }
    }
}

/// Validiert ein Credential und liefert den zugehoerigen Principal
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authentifizieren(&self, credential: &str) -> AuthResult<Identitaet>;
}

/// Entfernt ein optionales `Bearer `-Praefix und Leerraum
pub fn credential_normalisieren(roh: &str) -> Option<&str> {
    let ohne_praefix = roh.strip_prefix("Bearer ").unwrap_or(roh).trim();
    if ohne_praefix.is_empty() {
        None
    } else {
        Some(ohne_praefix)
    }
}
