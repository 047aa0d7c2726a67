//! Presence-Registry – Wer hat gerade eine offene Signaling-Verbindung?
//!
//! Die Registry ist die Quelle der Wahrheit fuer "online". Pro Principal gibt
//! es hoechstens einen Eintrag. `connect` ersetzt einen vorhandenen Eintrag
//! (die letzte Verbindung gewinnt) und gibt den alten zurueck, damit der
//! Aufrufer entscheiden kann, ob er die alte Verbindung beendet.
//!
//! Operationen auf unbekannte Principals sind No-Ops.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use unilink_core::{ConnectionId, PrincipalId};

use crate::broadcast::ClientSender;

// ---------------------------------------------------------------------------
// PresenceEntry
// ---------------------------------------------------------------------------

/// Presence-Info einer verbundenen Principal-Verbindung
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub principal_id: PrincipalId,
    pub display_name: Option<String>,
    pub verbindung: ClientSender,
    pub joined_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn neu(verbindung: ClientSender, display_name: Option<String>) -> Self {
        Self {
            principal_id: verbindung.principal.clone(),
            display_name,
            verbindung,
            joined_at: Utc::now(),
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.verbindung.conn_id
    }
}

// ---------------------------------------------------------------------------
// PresenceRegistry
// ---------------------------------------------------------------------------

/// Verwaltet den Online-Status aller verbundenen Principals
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<DashMap<PrincipalId, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert eine Verbindung als online
    ///
    /// Gibt den verdraengten Eintrag zurueck, falls der Principal schon
    /// verbunden war.
    pub fn connect(&self, eintrag: PresenceEntry) -> Option<PresenceEntry> {
        let principal = eintrag.principal_id.clone();
        let conn = eintrag.conn_id();
        let alt = self.inner.insert(principal.clone(), eintrag);

        match &alt {
            Some(vorher) => tracing::info!(
                principal = %principal,
                conn = %conn,
                alte_conn = %vorher.conn_id(),
                "Principal online (Verbindung ersetzt)"
            ),
            None => tracing::info!(principal = %principal, conn = %conn, "Principal online"),
        }
        alt
    }

    /// Registriert eine Verbindung nur, wenn der Principal noch nicht online ist
    ///
    /// Pruefen und Eintragen geschehen unter derselben Sperre. Gibt `false`
    /// zurueck, wenn bereits eine Verbindung eingetragen ist.
    pub fn connect_wenn_frei(&self, eintrag: PresenceEntry) -> bool {
        let principal = eintrag.principal_id.clone();
        let conn = eintrag.conn_id();
        match self.inner.entry(principal.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(frei) => {
                frei.insert(eintrag);
                tracing::info!(principal = %principal, conn = %conn, "Principal online");
                true
            }
        }
    }

    /// Entfernt den Eintrag eines Principals, egal welche Verbindung ihn haelt
    pub fn disconnect(&self, principal: &PrincipalId) -> Option<PresenceEntry> {
        let entfernt = self.inner.remove(principal).map(|(_, e)| e);
        if entfernt.is_some() {
            tracing::info!(principal = %principal, "Principal offline");
        }
        entfernt
    }

    /// Entfernt den Eintrag nur, wenn er noch zu dieser Verbindung gehoert
    ///
    /// Eine bereits ersetzte Verbindung darf beim Schliessen nicht die
    /// neuere Verbindung austragen. Gibt `true` zurueck, wenn entfernt wurde.
    pub fn disconnect_connection(&self, principal: &PrincipalId, conn_id: ConnectionId) -> bool {
        let entfernt = self
            .inner
            .remove_if(principal, |_, e| e.conn_id() == conn_id)
            .is_some();
        if entfernt {
            tracing::info!(principal = %principal, conn = %conn_id, "Principal offline");
        }
        entfernt
    }

    pub fn is_online(&self, principal: &PrincipalId) -> bool {
        self.inner.contains_key(principal)
    }

    /// Handle auf die aktuelle Verbindung eines Principals
    pub fn connection_for(&self, principal: &PrincipalId) -> Option<ClientSender> {
        self.inner.get(principal).map(|e| e.verbindung.clone())
    }

    /// Gibt die Anzahl der online Principals zurueck
    pub fn online_anzahl(&self) -> usize {
        self.inner.len()
    }

    /// Alle Eintraege, aelteste Verbindung zuerst
    pub fn alle_online(&self) -> Vec<PresenceEntry> {
        let mut eintraege: Vec<PresenceEntry> = self.inner.iter().map(|e| e.clone()).collect();
        eintraege.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.principal_id.cmp(&b.principal_id))
        });
        eintraege
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use unilink_protocol::ServerMessage;

    fn verbindung(id: &str) -> (PresenceEntry, mpsc::Receiver<ServerMessage>) {
        let (sender, rx) = ClientSender::neu(PrincipalId::new(id), 8);
        (PresenceEntry::neu(sender, None), rx)
    }

    #[tokio::test]
    async fn verbinden_und_trennen() {
        let reg = PresenceRegistry::neu();
        let (eintrag, _rx) = verbindung("U1");
        let p = eintrag.principal_id.clone();

        assert!(reg.connect(eintrag).is_none());
        assert!(reg.is_online(&p));
        assert_eq!(reg.online_anzahl(), 1);

        assert!(reg.disconnect(&p).is_some());
        assert!(!reg.is_online(&p));
        assert!(reg.connection_for(&p).is_none());
    }

    #[tokio::test]
    async fn letzte_verbindung_gewinnt() {
        let reg = PresenceRegistry::neu();
        let (erste, _rx1) = verbindung("U1");
        let (zweite, mut rx2) = verbindung("U1");
        let erste_conn = erste.conn_id();
        let zweite_conn = zweite.conn_id();

        reg.connect(erste);
        let verdraengt = reg.connect(zweite).unwrap();
        assert_eq!(verdraengt.conn_id(), erste_conn);
        assert_eq!(reg.online_anzahl(), 1);

        let aktuell = reg.connection_for(&PrincipalId::new("U1")).unwrap();
        assert!(aktuell.senden(ServerMessage::Pong));
        assert_eq!(rx2.try_recv().unwrap(), ServerMessage::Pong);
        assert_eq!(
            reg.connection_for(&PrincipalId::new("U1")).unwrap().conn_id,
            zweite_conn
        );
    }

    #[tokio::test]
    async fn alte_verbindung_traegt_neue_nicht_aus() {
        let reg = PresenceRegistry::neu();
        let (erste, _rx1) = verbindung("U1");
        let (zweite, _rx2) = verbindung("U1");
        let erste_conn = erste.conn_id();
        let p = PrincipalId::new("U1");

        reg.connect(erste);
        reg.connect(zweite);

        assert!(!reg.disconnect_connection(&p, erste_conn));
        assert!(reg.is_online(&p));
    }

    #[tokio::test]
    async fn unbekannte_principals_sind_no_ops() {
        let reg = PresenceRegistry::neu();
        let p = PrincipalId::new("niemand");
        assert!(reg.disconnect(&p).is_none());
        assert!(!reg.disconnect_connection(&p, ConnectionId::new()));
        assert!(!reg.is_online(&p));
    }

    #[tokio::test]
    async fn connect_wenn_frei_verdraengt_nicht() {
        let reg = PresenceRegistry::neu();
        let (erste, _rx1) = verbindung("U1");
        let (zweite, _rx2) = verbindung("U1");
        let erste_conn = erste.conn_id();
        let p = PrincipalId::new("U1");

        assert!(reg.connect_wenn_frei(erste));
        assert!(!reg.connect_wenn_frei(zweite));
        assert_eq!(reg.connection_for(&p).unwrap().conn_id, erste_conn);

        reg.disconnect_connection(&p, erste_conn);
        let (dritte, _rx3) = verbindung("U1");
        assert!(reg.connect_wenn_frei(dritte));
    }
}
