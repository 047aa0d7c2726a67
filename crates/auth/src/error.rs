//! Fehlertypen fuer die Credential-Validierung

use thiserror::Error;
use unilink_core::CoordinatorError;

/// Alle moeglichen Fehler bei der Authentifizierung
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Kein Credential angegeben")]
    CredentialFehlt,

    #[error("Credential ungueltig")]
    CredentialUngueltig,

    #[error("Credential abgelaufen")]
    CredentialAbgelaufen,

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

impl From<AuthError> for CoordinatorError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Intern(msg) => CoordinatorError::Intern(msg),
            andere => CoordinatorError::Authentifizierung(andere.to_string()),
        }
    }
}

/// Result-Alias fuer die Authentifizierung
pub type AuthResult<T> = Result<T, AuthError>;
