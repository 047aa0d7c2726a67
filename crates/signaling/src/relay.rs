//! Signaling-Relay – Bindet zwei Verbindungen an einen Call
//!
//! Pro Call existiert hoechstens eine `SignalingSession`. Sie entsteht beim
//! ersten `attach` eines Teilnehmers und verschwindet, sobald kein Teilnehmer
//! mehr angehaengt ist oder sie explizit geschlossen wird.
//!
//! ## Zustellung
//! `relay` leitet eine Nachricht nur an den *anderen* Teilnehmer weiter und
//! nur, wenn dieser gerade angehaengt ist. Ist er es nicht, wird die Nachricht
//! verworfen und `false` zurueckgegeben. Es gibt keine Pufferung.
//!
//! ## Session-Zustand
//! ```text
//! new --offer--> connecting --answer--> connected
//!                                          |
//!            (letzter Teilnehmer weg) --> closed (Session wird verworfen)
//! ```

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use unilink_calls::CallRegistry;
use unilink_core::{CallId, ConnectionId, CoordinatorError, PrincipalId, Result};
use unilink_protocol::{ClientMessage, ServerMessage};

use crate::broadcast::ClientSender;

// ---------------------------------------------------------------------------
// SignalingSession
// ---------------------------------------------------------------------------

/// Verbindungszustand einer Signaling-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Connecting,
    Connected,
    Closed,
}

/// Signaling-Zustand eines Calls
#[derive(Debug, Clone)]
pub struct SignalingSession {
    pub call_id: CallId,
    pub participant_a: PrincipalId,
    pub participant_b: PrincipalId,
    pub last_offer: Option<Value>,
    pub last_answer: Option<Value>,
    pub candidate_count: u64,
    pub connection_state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Aktuell angehaengte Verbindungen der Teilnehmer
    angehaengt: HashMap<PrincipalId, ClientSender>,
}

impl SignalingSession {
    fn neu(call_id: CallId, a: PrincipalId, b: PrincipalId) -> Self {
        let jetzt = Utc::now();
        Self {
            call_id,
            participant_a: a,
            participant_b: b,
            last_offer: None,
            last_answer: None,
            candidate_count: 0,
            connection_state: SessionState::New,
            created_at: jetzt,
            updated_at: jetzt,
            angehaengt: HashMap::new(),
        }
    }

    pub fn ist_teilnehmer(&self, principal: &PrincipalId) -> bool {
        &self.participant_a == principal || &self.participant_b == principal
    }

    fn gegenueber(&self, principal: &PrincipalId) -> &PrincipalId {
        if &self.participant_a == principal {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }

    pub fn ist_angehaengt(&self, principal: &PrincipalId) -> bool {
        self.angehaengt.contains_key(principal)
    }

    pub fn angehaengte_anzahl(&self) -> usize {
        self.angehaengt.len()
    }

    fn beruehren(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut attached: Vec<PrincipalId> = self.angehaengt.keys().cloned().collect();
        attached.sort();
        SessionSnapshot {
            call_id: self.call_id,
            participants: [self.participant_a.clone(), self.participant_b.clone()],
            attached,
            connection_state: self.connection_state,
            has_offer: self.last_offer.is_some(),
            has_answer: self.last_answer.is_some(),
            candidate_count: self.candidate_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Oeffentliche Sicht auf eine Session (REST, Logs)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub call_id: CallId,
    pub participants: [PrincipalId; 2],
    pub attached: Vec<PrincipalId>,
    pub connection_state: SessionState,
    pub has_offer: bool,
    pub has_answer: bool,
    pub candidate_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SignalingRelay
// ---------------------------------------------------------------------------

/// Verwaltet alle Signaling-Sessions
///
/// Thread-safe via Arc + DashMap. Jede Operation auf einer Session haelt
/// waehrend ihrer gesamten Dauer die Schreibsperre dieses Eintrags.
#[derive(Clone)]
pub struct SignalingRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    calls: CallRegistry,
    sessions: DashMap<CallId, SignalingSession>,
    /// Principal -> Call, an den er zuletzt angehaengt wurde
    zuordnung: DashMap<PrincipalId, CallId>,
}

impl SignalingRelay {
    pub fn neu(calls: CallRegistry) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                calls,
                sessions: DashMap::new(),
                zuordnung: DashMap::new(),
            }),
        }
    }

    /// Haengt eine Verbindung an die Session eines Calls an
    ///
    /// Prueft, dass der Call existiert (`NichtGefunden`), der Principal
    /// Teilnehmer ist (`ZugriffVerweigert`) und der Call noch aktiv ist.
    /// Ersetzt eine bereits angehaengte Verbindung desselben Principals.
    /// Ist der andere Teilnehmer bereits angehaengt, erhaelt er
    /// `connection_ready`.
    pub fn attach(
        &self,
        call_id: &CallId,
        principal: &PrincipalId,
        verbindung: ClientSender,
    ) -> Result<SessionSnapshot> {
        self.anhaengen(call_id, principal, verbindung, true)
            .map(|(snapshot, _)| snapshot)
    }

    /// Wie `attach`, laesst aber eine offene Verbindung des Principals stehen
    ///
    /// Gibt `true` zurueck, wenn `verbindung` angehaengt wurde.
    pub fn attach_falls_frei(
        &self,
        call_id: &CallId,
        principal: &PrincipalId,
        verbindung: ClientSender,
    ) -> Result<bool> {
        self.anhaengen(call_id, principal, verbindung, false)
            .map(|(_, angehaengt)| angehaengt)
    }

    fn anhaengen(
        &self,
        call_id: &CallId,
        principal: &PrincipalId,
        verbindung: ClientSender,
        ersetzen: bool,
    ) -> Result<(SessionSnapshot, bool)> {
        let call = self
            .inner
            .calls
            .get(call_id)
            .ok_or_else(|| CoordinatorError::nicht_gefunden(format!("Call {call_id}")))?;
        if !call.ist_teilnehmer(principal) {
            return Err(CoordinatorError::verweigert(format!(
                "{principal} ist kein Teilnehmer von Call {call_id}"
            )));
        }
        if call.status.ist_terminal() {
            return Err(CoordinatorError::UngueltigerUebergang {
                status: call.status.to_string(),
                aktion: "attach",
            });
        }

        let mut session = self.inner.sessions.entry(*call_id).or_insert_with(|| {
            tracing::info!(call_id = %call_id, "Signaling-Session eroeffnet");
            SignalingSession::neu(
                *call_id,
                call.initiator_id.clone(),
                call.receiver_id.clone(),
            )
        });

        let belegt = session
            .angehaengt
            .get(principal)
            .is_some_and(|vorhanden| !vorhanden.ist_geschlossen());
        if belegt && !ersetzen {
            let snapshot = session.snapshot();
            drop(session);
            self.inner.zuordnung.insert(principal.clone(), *call_id);
            return Ok((snapshot, false));
        }

        let conn = verbindung.conn_id;
        session.angehaengt.insert(principal.clone(), verbindung);
        session.beruehren();

        let peer = session.gegenueber(principal).clone();
        if let Some(peer_sender) = session.angehaengt.get(&peer) {
            peer_sender.senden(ServerMessage::ConnectionReady {
                call_id: *call_id,
                user_id: principal.clone(),
            });
        }
        let snapshot = session.snapshot();
        drop(session);

        self.inner.zuordnung.insert(principal.clone(), *call_id);
        tracing::debug!(call_id = %call_id, principal = %principal, conn = %conn, "Verbindung angehaengt");
        Ok((snapshot, true))
    }

    /// Leitet eine Signaling-Nachricht an den anderen Teilnehmer weiter
    ///
    /// Aktualisiert den Session-Zustand auch dann, wenn der Peer nicht
    /// angehaengt ist. Gibt `true` zurueck, wenn die Nachricht in die
    /// Send-Queue des Peers eingereiht wurde.
    pub fn relay(
        &self,
        call_id: &CallId,
        von: &PrincipalId,
        nachricht: &ClientMessage,
    ) -> Result<bool> {
        let mut session = self.inner.sessions.get_mut(call_id).ok_or_else(|| {
            CoordinatorError::nicht_gefunden(format!("Keine Signaling-Session fuer Call {call_id}"))
        })?;
        if !session.ist_teilnehmer(von) {
            return Err(CoordinatorError::verweigert(format!(
                "{von} ist kein Teilnehmer von Call {call_id}"
            )));
        }

        let weiter = match nachricht {
            ClientMessage::Offer { offer } => {
                session.last_offer = Some(offer.clone());
                session.connection_state = SessionState::Connecting;
                ServerMessage::Offer {
                    offer: offer.clone(),
                    from: von.clone(),
                }
            }
            ClientMessage::Answer { answer } => {
                session.last_answer = Some(answer.clone());
                session.connection_state = SessionState::Connected;
                ServerMessage::Answer {
                    answer: answer.clone(),
                    from: von.clone(),
                }
            }
            ClientMessage::IceCandidate { candidate } => {
                session.candidate_count += 1;
                ServerMessage::IceCandidate {
                    candidate: candidate.clone(),
                    from: von.clone(),
                }
            }
            ClientMessage::ChatMessage { text, timestamp } => ServerMessage::ChatMessage {
                from: von.clone(),
                text: text.clone(),
                timestamp: timestamp.clone(),
            },
            ClientMessage::ConnectionState { state } => ServerMessage::ConnectionState {
                user_id: von.clone(),
                state: state.clone(),
            },
            andere => {
                return Err(CoordinatorError::ungueltige_nachricht(format!(
                    "'{}' ist keine Signaling-Nachricht",
                    andere.typ_name()
                )))
            }
        };
        session.beruehren();

        let peer = session.gegenueber(von).clone();
        let zugestellt = session
            .angehaengt
            .get(&peer)
            .map(|sender| sender.senden(weiter))
            .unwrap_or(false);

        tracing::trace!(
            call_id = %call_id,
            von = %von,
            art = nachricht.typ_name(),
            zugestellt,
            "Signal weitergeleitet"
        );
        Ok(zugestellt)
    }

    /// Call, an den ein Principal zuletzt angehaengt wurde
    pub fn call_von(&self, principal: &PrincipalId) -> Option<CallId> {
        self.inner.zuordnung.get(principal).map(|c| *c)
    }

    /// Entfernt einen Teilnehmer aus der Session, unabhaengig von der Verbindung
    pub fn detach(&self, call_id: &CallId, principal: &PrincipalId) -> bool {
        self.detach_intern(call_id, principal, None, None)
    }

    /// Entfernt einen Teilnehmer nur, wenn er noch ueber diese Verbindung angehaengt ist
    ///
    /// Ist `ersatz` eine andere, offene Verbindung desselben Principals, tritt
    /// sie an die Stelle der entfernten. Der Peer wird dann nicht
    /// benachrichtigt, der Teilnehmer bleibt erreichbar.
    pub fn detach_connection(
        &self,
        call_id: &CallId,
        principal: &PrincipalId,
        conn_id: ConnectionId,
        ersatz: Option<ClientSender>,
    ) -> bool {
        let ersatz = ersatz.filter(|e| e.conn_id != conn_id && !e.ist_geschlossen());
        self.detach_intern(call_id, principal, Some(conn_id), ersatz)
    }

    fn detach_intern(
        &self,
        call_id: &CallId,
        principal: &PrincipalId,
        nur_conn: Option<ConnectionId>,
        ersatz: Option<ClientSender>,
    ) -> bool {
        let leer = {
            let Some(mut session) = self.inner.sessions.get_mut(call_id) else {
                return false;
            };
            let passt = match (session.angehaengt.get(principal), nur_conn) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(sender), Some(conn)) => sender.conn_id == conn,
            };
            if !passt {
                return false;
            }
            session.beruehren();

            if let Some(ersatz) = ersatz {
                tracing::debug!(
                    call_id = %call_id,
                    principal = %principal,
                    conn = %ersatz.conn_id,
                    "Verbindung abgehaengt, Presence-Verbindung uebernimmt"
                );
                session.angehaengt.insert(principal.clone(), ersatz);
                return true;
            }

            session.angehaengt.remove(principal);

            // Der verbleibende Teilnehmer erfaehrt vom Verlust
            let peer = session.gegenueber(principal).clone();
            if let Some(peer_sender) = session.angehaengt.get(&peer) {
                peer_sender.senden(ServerMessage::UserDisconnected {
                    user_id: principal.clone(),
                });
            }
            session.angehaengt.is_empty()
        };

        self.inner
            .zuordnung
            .remove_if(principal, |_, call| call == call_id);

        if leer {
            self.inner.sessions.remove_if(call_id, |_, s| s.angehaengt.is_empty());
            tracing::info!(call_id = %call_id, "Signaling-Session geschlossen (keine Teilnehmer)");
        }
        tracing::debug!(call_id = %call_id, principal = %principal, "Verbindung abgehaengt");
        true
    }

    /// Schliesst eine Session sofort
    ///
    /// Alle noch angehaengten Verbindungen erhalten optional `hinweis`.
    /// Gibt den letzten Zustand der Session zurueck.
    pub fn schliessen(
        &self,
        call_id: &CallId,
        hinweis: Option<&ServerMessage>,
    ) -> Option<SessionSnapshot> {
        let (_, mut session) = self.inner.sessions.remove(call_id)?;
        session.connection_state = SessionState::Closed;
        session.beruehren();

        for (principal, sender) in session.angehaengt.iter() {
            if let Some(nachricht) = hinweis {
                sender.senden(nachricht.clone());
            }
            self.inner
                .zuordnung
                .remove_if(principal, |_, call| call == call_id);
        }

        tracing::info!(call_id = %call_id, "Signaling-Session geschlossen");
        Some(session.snapshot())
    }

    /// Alle aktuell angehaengten Verbindungen einer Session
    pub fn angehaengte(&self, call_id: &CallId) -> Vec<ClientSender> {
        self.inner
            .sessions
            .get(call_id)
            .map(|s| s.angehaengt.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ist der Principal ueber irgendeine Verbindung an irgendeine Session angehaengt?
    pub fn ist_angehaengt(&self, principal: &PrincipalId) -> bool {
        self.inner
            .sessions
            .iter()
            .any(|s| s.ist_angehaengt(principal))
    }

    /// Schliesst Sessions ohne Aktivitaet seit `max_idle`
    ///
    /// Angehaengte Verbindungen erhalten einen `error`-Frame. Gibt die
    /// geschlossenen Call-IDs zurueck.
    pub fn idle_sweep(&self, max_idle: Duration) -> Vec<CallId> {
        let grenze = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::hours(1));
        let veraltet: Vec<CallId> = self
            .inner
            .sessions
            .iter()
            .filter(|s| s.updated_at < grenze)
            .map(|s| *s.key())
            .collect();

        let hinweis = ServerMessage::fehler_text(
            "SESSION_IDLE",
            "Signaling-Session wegen Inaktivitaet geschlossen",
        );
        let geschlossen: Vec<CallId> = veraltet
            .into_iter()
            .filter(|id| self.schliessen(id, Some(&hinweis)).is_some())
            .collect();

        if !geschlossen.is_empty() {
            tracing::info!(anzahl = geschlossen.len(), "Inaktive Signaling-Sessions geschlossen");
        }
        geschlossen
    }

    pub fn snapshot(&self, call_id: &CallId) -> Option<SessionSnapshot> {
        self.inner.sessions.get(call_id).map(|s| s.snapshot())
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.inner.sessions.iter().map(|s| s.snapshot()).collect()
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Setzt `updated_at` einer Session zurueck (nur fuer Tests des Idle-Sweeps)
    #[cfg(test)]
    fn altern(&self, call_id: &CallId, um: chrono::Duration) {
        if let Some(mut s) = self.inner.sessions.get_mut(call_id) {
            s.updated_at = s.updated_at - um;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
