//! Verbindungs-Handles und Verteilung an mehrere Empfaenger
//!
//! Jede offene Verbindung besitzt eine begrenzte Send-Queue. Der
//! `ClientSender` ist das Handle darauf: Senden blockiert nie, bei voller
//! Queue wird die Nachricht verworfen. Ein langsamer Empfaenger bremst so
//! niemals den Absender.
//!
//! Zusaetzlich traegt das Handle ein `CancellationToken`, ueber das eine
//! Verbindung von aussen beendet werden kann (Verdraengung durch eine neuere
//! Verbindung desselben Principals).

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unilink_core::{ConnectionId, PrincipalId};
use unilink_protocol::ServerMessage;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer verbundenen Signaling-Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub principal: PrincipalId,
    pub conn_id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    abbruch: CancellationToken,
}

impl ClientSender {
    /// Erstellt ein Handle samt Empfangsseite der Send-Queue
    ///
    /// Die Verbindung liest aus dem Receiver und schreibt auf den Socket.
    pub fn neu(
        principal: PrincipalId,
        queue_groesse: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        let sender = Self {
            principal,
            conn_id: ConnectionId::new(),
            tx,
            abbruch: CancellationToken::new(),
        };
        (sender, rx)
    }

    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    principal = %self.principal,
                    conn = %self.conn_id,
                    "Send-Queue voll, Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    principal = %self.principal,
                    conn = %self.conn_id,
                    "Send-Queue geschlossen (Client getrennt)"
                );
                false
            }
        }
    }

    /// Fordert die Verbindung auf, sich zu beenden
    pub fn schliessen(&self) {
        self.abbruch.cancel();
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.abbruch.is_cancelled() || self.tx.is_closed()
    }

    /// Token, auf das der Verbindungs-Task wartet
    pub fn abbruch_token(&self) -> CancellationToken {
        self.abbruch.clone()
    }
}

/// Sendet eine Nachricht an mehrere Verbindungen, jede hoechstens einmal
///
/// Dieselbe Verbindung kann sowohl ueber die Presence als auch ueber die
/// Relay-Session erreichbar sein. Gibt die Anzahl erfolgreicher Sendungen zurueck.
pub fn an_alle_einmal<'a>(
    empfaenger: impl IntoIterator<Item = &'a ClientSender>,
    nachricht: &ServerMessage,
) -> usize {
    let mut gesehen = HashSet::new();
    let mut gesendet = 0;
    for sender in empfaenger {
        if !gesehen.insert(sender.conn_id) {
            continue;
        }
        if sender.senden(nachricht.clone()) {
            gesendet += 1;
        }
    }
    gesendet
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
