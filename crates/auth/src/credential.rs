//! Credential-Store fuer UniLink
//!
//! Haelt ausgestellte Credentials im Speicher (HashMap mit TTL). Ein
//! Hintergrund-Task bereinigt abgelaufene Eintraege automatisch.
//! Statisch konfigurierte Credentials (Entwicklungsbetrieb) laufen nie ab.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};
use crate::{credential_normalisieren, Authenticator, Identitaet};

/// Standard-Lebensdauer ausgestellter Credentials: 30 Minuten
const CREDENTIAL_TTL_SEKUNDEN: i64 = 30 * 60;

/// Intervall fuer den automatischen Cleanup-Task: 5 Minuten
const CLEANUP_INTERVALL: Duration = Duration::from_secs(5 * 60);

/// Ein ausgestelltes Credential
#[derive(Debug, Clone)]
pub struct Credential {
    /// Der Token-String (URL-sicheres Base64)
    pub token: String,
    pub identitaet: Identitaet,
    pub erstellt_am: DateTime<Utc>,
    /// `None` = laeuft nie ab
    pub laeuft_ab_am: Option<DateTime<Utc>>,
}

impl Credential {
    /// Gibt `true` zurueck wenn das Credential noch gueltig ist
    pub fn ist_gueltig(&self) -> bool {
        self.laeuft_ab_am.map_or(true, |ablauf| Utc::now() < ablauf)
    }
}

/// In-Memory Credential-Store mit TTL-Unterstuetzung
#[derive(Debug, Default)]
pub struct CredentialStore {
    /// token -> Credential
    credentials: RwLock<HashMap<String, Credential>>,
}

impl CredentialStore {
    /// Erstellt einen neuen leeren Store
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Startet den Cleanup-Task fuer einen bestehenden Store
    pub fn cleanup_task_starten(store: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store_klon = Arc::clone(store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVALL).await;
                let entfernt = store_klon.cleanup_abgelaufene().await;
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Credentials bereinigt");
                }
            }
        })
    }

    /// Stellt ein neues Credential mit Standard-TTL aus
    pub async fn ausstellen(&self, identitaet: Identitaet) -> Credential {
        let jetzt = Utc::now();
        let credential = Credential {
            token: token_generieren(),
            identitaet,
            erstellt_am: jetzt,
            laeuft_ab_am: Some(jetzt + chrono::Duration::seconds(CREDENTIAL_TTL_SEKUNDEN)),
        };

        self.credentials
            .write()
            .await
            .insert(credential.token.clone(), credential.clone());
        tracing::debug!(principal = %credential.identitaet.principal_id, "Credential ausgestellt");
        credential
    }

    /// Hinterlegt ein fest konfiguriertes Credential ohne Ablaufzeit
    pub async fn statisch_hinterlegen(&self, token: impl Into<String>, identitaet: Identitaet) {
        let token = token.into();
        let credential = Credential {
            token: token.clone(),
            identitaet,
            erstellt_am: Utc::now(),
            laeuft_ab_am: None,
        };
        self.credentials.write().await.insert(token, credential);
    }

    /// Validiert einen Token und gibt das Credential zurueck
    pub async fn validieren(&self, token: &str) -> AuthResult<Credential> {
        let credentials = self.credentials.read().await;
        match credentials.get(token) {
            None => Err(AuthError::CredentialUngueltig),
            Some(c) if !c.ist_gueltig() => Err(AuthError::CredentialAbgelaufen),
            Some(c) => Ok(c.clone()),
        }
    }

    /// Widerruft ein Credential
    pub async fn widerrufen(&self, token: &str) -> bool {
        self.credentials.write().await.remove(token).is_some()
    }

    /// Bereinigt abgelaufene Credentials und gibt deren Anzahl zurueck
    pub async fn cleanup_abgelaufene(&self) -> usize {
        let mut credentials = self.credentials.write().await;
        let vorher = credentials.len();
        credentials.retain(|_, c| c.ist_gueltig());
        vorher - credentials.len()
    }

    /// Anzahl gueltiger Credentials
    pub async fn anzahl_gueltige(&self) -> usize {
        let credentials = self.credentials.read().await;
        credentials.values().filter(|c| c.ist_gueltig()).count()
    }
}

#[async_trait]
impl Authenticator for CredentialStore {
    async fn authentifizieren(&self, credential: &str) -> AuthResult<Identitaet> {
        let token = credential_normalisieren(credential).ok_or(AuthError::CredentialFehlt)?;
        let gefunden = self.validieren(token).await?;
        Ok(gefunden.identitaet)
    }
}

/// Generiert einen kryptografisch sicheren Token (URL-sicheres Base64, 32 Bytes)
pub fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identitaet {
        Identitaet::neu("alice", Some("Alice".into()))
    }

    #[tokio::test]
    async fn credential_ausstellen_und_validieren() {
        let store = CredentialStore::neu();
        let credential = store.ausstellen(alice()).await;
        assert!(credential.ist_gueltig());

        let validiert = store.validieren(&credential.token).await.unwrap();
        assert_eq!(validiert.identitaet.principal_id.as_str(), "alice");
    }

    #[tokio::test]
    async fn ungueltiges_credential_gibt_fehler() {
        let store = CredentialStore::neu();
        let ergebnis = store.validieren("kein_gueltiger_token").await;
        assert!(matches!(ergebnis, Err(AuthError::CredentialUngueltig)));
    }

    #[tokio::test]
    async fn authentifizieren_mit_bearer_praefix() {
        let store = CredentialStore::neu();
        store.statisch_hinterlegen("dev-token", alice()).await;

        let identitaet = store.authentifizieren("Bearer dev-token").await.unwrap();
        assert_eq!(identitaet, alice());
    }

    #[tokio::test]
    async fn leeres_credential_fehlt() {
        let store = CredentialStore::neu();
        let ergebnis = store.authentifizieren("   ").await;
        assert!(matches!(ergebnis, Err(AuthError::CredentialFehlt)));
    }

    #[tokio::test]
    async fn widerrufenes_credential_ist_ungueltig() {
        let store = CredentialStore::neu();
        let credential = store.ausstellen(alice()).await;

        assert!(store.widerrufen(&credential.token).await);
        let ergebnis = store.validieren(&credential.token).await;
        assert!(matches!(ergebnis, Err(AuthError::CredentialUngueltig)));
    }

    #[tokio::test]
    async fn abgelaufene_werden_bereinigt() {
        let store = CredentialStore::neu();
        store.statisch_hinterlegen("dauerhaft", alice()).await;
        {
            let mut credentials = store.credentials.write().await;
            credentials.insert(
                "alt".into(),
                Credential {
                    token: "alt".into(),
                    identitaet: alice(),
                    erstellt_am: Utc::now() - chrono::Duration::hours(2),
                    laeuft_ab_am: Some(Utc::now() - chrono::Duration::hours(1)),
                },
            );
        }

        assert!(matches!(
            store.validieren("alt").await,
            Err(AuthError::CredentialAbgelaufen)
        ));
        assert_eq!(store.cleanup_abgelaufene().await, 1);
        assert_eq!(store.anzahl_gueltige().await, 1);
    }

    #[test]
    fn token_sind_eindeutig() {
        assert_ne!(token_generieren(), token_generieren());
    }
}
