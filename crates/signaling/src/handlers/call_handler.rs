//! Call-Handler – Direktanruf, Annehmen, Ablehnen, Auflegen, Trennung
//!
//! Die Funktionen hier werden sowohl von der WebSocket-Verbindung als auch
//! von den REST-Routen genutzt. Beide Wege laufen ueber dieselbe
//! `CallRegistry`, die Invariante "ein aktiver Call pro Principal" gilt also
//! fuer jeden Einstiegspunkt.

use std::sync::Arc;
use unilink_calls::{Call, CallStatus};
use unilink_core::{CallId, CoordinatorError, PrincipalId, Result};
use unilink_protocol::{PeerInfo, ServerMessage};

use crate::broadcast::{an_alle_einmal, ClientSender};
use crate::server_state::SignalingState;

// ---------------------------------------------------------------------------
// Benachrichtigung
// ---------------------------------------------------------------------------

/// Alle Verbindungen, ueber die ein Teilnehmer im Kontext eines Calls erreichbar ist
fn verbindungen_von(
    state: &SignalingState,
    call_id: &CallId,
    principal: &PrincipalId,
) -> Vec<ClientSender> {
    let mut senders: Vec<ClientSender> = state
        .relay
        .angehaengte(call_id)
        .into_iter()
        .filter(|s| &s.principal == principal)
        .collect();
    senders.extend(state.presence.connection_for(principal));
    senders
}

/// Sendet eine Nachricht an einen Teilnehmer (jede Verbindung hoechstens einmal)
pub fn teilnehmer_benachrichtigen(
    state: &SignalingState,
    call_id: &CallId,
    principal: &PrincipalId,
    nachricht: &ServerMessage,
) -> usize {
    an_alle_einmal(&verbindungen_von(state, call_id, principal), nachricht)
}

/// Sendet eine Nachricht an beide Teilnehmer eines Calls
pub fn beide_benachrichtigen(state: &SignalingState, call: &Call, nachricht: &ServerMessage) {
    let mut senders = verbindungen_von(state, &call.id, &call.initiator_id);
    senders.extend(verbindungen_von(state, &call.id, &call.receiver_id));
    an_alle_einmal(&senders, nachricht);
}

/// `call_ended`-Hinweis fuer einen terminalen Call
pub fn call_ended(call: &Call) -> ServerMessage {
    ServerMessage::CallEnded {
        call_id: call.id,
        status: call.status.to_string(),
        duration_seconds: call.duration_seconds,
    }
}

/// Haengt die Presence-Verbindungen beider Teilnehmer an die Session des Calls
///
/// Ein Teilnehmer, der bereits ueber eine offene Verbindung angehaengt ist
/// (etwa ueber `/ws/webrtc/{call_id}`), bleibt unberuehrt.
pub fn verbindungen_anhaengen(state: &SignalingState, call: &Call) {
    for principal in [&call.initiator_id, &call.receiver_id] {
        let Some(sender) = state.presence.connection_for(principal) else {
            continue;
        };
        if let Err(e) = state.relay.attach_falls_frei(&call.id, principal, sender) {
            tracing::warn!(
                call_id = %call.id,
                principal = %principal,
                fehler = %e,
                "Verbindung konnte nicht angehaengt werden"
            );
        }
    }
}

fn ergebnis_zaehlen(state: &SignalingState, call: &Call) {
    let outcome = match call.status {
        CallStatus::Pending => "created",
        CallStatus::Ongoing => "accepted",
        CallStatus::Rejected => "rejected",
        CallStatus::Completed => "completed",
    };
    state.metriken.call_ereignis(outcome);
    state.gauges_aktualisieren();
}

/// Laedt einen Call und prueft die Teilnahme des Principals
fn call_fuer_teilnehmer(
    state: &SignalingState,
    call_id: &CallId,
    principal: &PrincipalId,
) -> Result<Call> {
    let call = state
        .calls
        .get(call_id)
        .ok_or_else(|| CoordinatorError::nicht_gefunden(format!("Call {call_id}")))?;
    if !call.ist_teilnehmer(principal) {
        return Err(CoordinatorError::verweigert(format!(
            "{principal} ist kein Teilnehmer von Call {call_id}"
        )));
    }
    Ok(call)
}

/// Wie `call_fuer_teilnehmer`, aber nur fuer den Empfaenger
fn call_fuer_empfaenger(
    state: &SignalingState,
    call_id: &CallId,
    principal: &PrincipalId,
) -> Result<Call> {
    let call = call_fuer_teilnehmer(state, call_id, principal)?;
    if &call.receiver_id != principal {
        return Err(CoordinatorError::verweigert(
            "Nur der Empfaenger darf einen Call annehmen oder ablehnen",
        ));
    }
    Ok(call)
}

// ---------------------------------------------------------------------------
// Operationen
// ---------------------------------------------------------------------------

/// Startet einen Direktanruf
///
/// Der Empfaenger muss online sein und darf nicht in der gegenseitigen
/// Sperrliste des Anrufers stehen. Der Empfaenger erhaelt `incoming_call`.
pub async fn anruf_starten(
    state: &Arc<SignalingState>,
    initiator: &PrincipalId,
    display_name: Option<String>,
    receiver: &PrincipalId,
) -> Result<Call> {
    if !state.presence.is_online(receiver) {
        return Err(CoordinatorError::nicht_gefunden(format!(
            "{receiver} ist nicht online"
        )));
    }
    let ausgeschlossen = state.block_store.excluded_for(initiator).await?;
    if ausgeschlossen.contains(receiver) {
        return Err(CoordinatorError::verweigert(format!(
            "{receiver} ist fuer {initiator} gesperrt"
        )));
    }

    let call = state.calls.create(initiator, receiver)?;

    state.queue.dequeue(initiator);
    state.queue.dequeue(receiver);
    verbindungen_anhaengen(state, &call);

    teilnehmer_benachrichtigen(
        state,
        &call.id,
        receiver,
        &ServerMessage::IncomingCall {
            call_id: call.id,
            call_token: call.call_token.clone(),
            caller: PeerInfo::neu(initiator.clone(), display_name),
        },
    );

    tracing::info!(
        call_id = %call.id,
        initiator = %initiator,
        receiver = %receiver,
        "Direktanruf gestartet"
    );
    ergebnis_zaehlen(state, &call);
    Ok(call)
}

/// Nimmt einen eingehenden Call an (nur der Empfaenger)
pub fn anruf_annehmen(
    state: &Arc<SignalingState>,
    principal: &PrincipalId,
    call_id: &CallId,
) -> Result<Call> {
    call_fuer_empfaenger(state, call_id, principal)?;
    let call = state.calls.accept(call_id)?;

    state.queue.dequeue(&call.initiator_id);
    state.queue.dequeue(&call.receiver_id);
    verbindungen_anhaengen(state, &call);

    teilnehmer_benachrichtigen(
        state,
        &call.id,
        &call.initiator_id,
        &ServerMessage::CallAccepted {
            call_id: call.id,
            by: principal.clone(),
        },
    );
    ergebnis_zaehlen(state, &call);
    Ok(call)
}

/// Lehnt einen eingehenden Call ab (nur der Empfaenger) und schliesst die Session
pub fn anruf_ablehnen(
    state: &Arc<SignalingState>,
    principal: &PrincipalId,
    call_id: &CallId,
) -> Result<Call> {
    call_fuer_empfaenger(state, call_id, principal)?;
    let call = state.calls.reject(call_id)?;

    teilnehmer_benachrichtigen(
        state,
        &call.id,
        &call.initiator_id,
        &ServerMessage::CallRejected {
            call_id: call.id,
            by: principal.clone(),
        },
    );
    state.relay.schliessen(&call.id, None);
    ergebnis_zaehlen(state, &call);
    Ok(call)
}

/// Legt auf: beendet einen laufenden oder lehnt einen wartenden Call ab
///
/// Beide Seiten erhalten `call_ended`, danach wird die Session geschlossen.
pub fn anruf_beenden(
    state: &Arc<SignalingState>,
    principal: &PrincipalId,
    call_id: &CallId,
) -> Result<Call> {
    call_fuer_teilnehmer(state, call_id, principal)?;
    let call = state.calls.auflegen(call_id)?;

    beide_benachrichtigen(state, &call, &call_ended(&call));
    state.relay.schliessen(&call.id, None);

    tracing::info!(call_id = %call.id, von = %principal, status = %call.status, "Call aufgelegt");
    ergebnis_zaehlen(state, &call);
    Ok(call)
}

/// Terminiert den aktiven Call eines nicht mehr erreichbaren Principals
///
/// Der verbliebene Teilnehmer erhaelt `call_ended`.
pub fn trennung_verarbeiten(state: &Arc<SignalingState>, principal: &PrincipalId) -> Option<Call> {
    let call = state.calls.beenden_wegen_trennung(principal)?;

    if let Some(peer) = call.gegenueber(principal) {
        teilnehmer_benachrichtigen(state, &call.id, peer, &call_ended(&call));
    }
    state.relay.schliessen(&call.id, None);
    ergebnis_zaehlen(state, &call);
    Some(call)
}
