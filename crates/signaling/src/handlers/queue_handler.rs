//! Queue-Handler – join_queue, leave_queue und Match-Uebergabe
//!
//! Ein erfolgreicher Match legt den Call ueber dieselbe `create`-Operation
//! an wie ein Direktanruf, haengt beide Verbindungen an die neue Session und
//! schickt beiden Seiten `match_found`.

use std::sync::Arc;
use unilink_calls::{MatchErgebnis, QueueEntry};
use unilink_core::{CoordinatorError, PrincipalId, Result};
use unilink_protocol::{PeerInfo, ServerMessage};

use crate::dispatcher::DispatcherContext;
use crate::handlers::call_handler;
use crate::server_state::SignalingState;

/// Verarbeitet `join_queue`
///
/// Antwortet mit `queue_joined` (kein Partner) oder `match_found`.
pub async fn handle_join_queue(
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<Option<ServerMessage>> {
    let principal = &ctx.principal;
    if state.calls.active_call(principal).is_some() {
        return Err(CoordinatorError::konflikt(
            "Waehrend eines aktiven Calls ist Matchmaking nicht moeglich",
        ));
    }

    let mut ausgeschlossen = state.block_store.excluded_for(principal).await?;
    // Partner, deren Call-Anlage gescheitert ist; werden am Ende wieder eingereiht
    let mut zurueckgelegt: Vec<QueueEntry> = Vec::new();

    let antwort = loop {
        let eintrag = QueueEntry::neu(principal.clone(), ctx.display_name.clone());
        match state.queue.match_or_enqueue(eintrag, &ausgeschlossen) {
            MatchErgebnis::Wartend { position } => {
                tracing::debug!(principal = %principal, position, "In Queue eingereiht");
                break Ok(Some(ServerMessage::QueueJoined {
                    queue_position: position,
                }));
            }
            MatchErgebnis::Gefunden(partner) => {
                match match_uebergeben(ctx, state, &partner) {
                    Ok(nachricht) => break Ok(Some(nachricht)),
                    Err(Uebergabe::PartnerBelegt) => {
                        ausgeschlossen.insert(partner.principal_id.clone());
                        zurueckgelegt.push(partner);
                    }
                    Err(Uebergabe::PartnerWeg) => {
                        ausgeschlossen.insert(partner.principal_id.clone());
                    }
                    Err(Uebergabe::Fehler(e)) => {
                        zurueckgelegt.push(partner);
                        break Err(e);
                    }
                }
            }
        }
    };

    for partner in zurueckgelegt {
        state.queue.enqueue(partner);
    }
    state.gauges_aktualisieren();
    antwort
}

/// Grund, warum ein Match nicht in einen Call ueberfuehrt werden konnte
enum Uebergabe {
    /// Partner hat inzwischen einen anderen aktiven Call
    PartnerBelegt,
    /// Partner ist nicht mehr verbunden
    PartnerWeg,
    /// Fehler auf Seiten des Anfragenden
    Fehler(CoordinatorError),
}

/// Legt den Call fuer einen Match an und benachrichtigt beide Seiten
fn match_uebergeben(
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
    partner: &QueueEntry,
) -> std::result::Result<ServerMessage, Uebergabe> {
    let principal = &ctx.principal;
    let partner_id = &partner.principal_id;

    // Partner hat die Verbindung zwischen Einreihen und Match verloren
    if !state.presence.is_online(partner_id) && !state.relay.ist_angehaengt(partner_id) {
        tracing::debug!(partner = %partner_id, "Match-Partner nicht mehr verbunden");
        return Err(Uebergabe::PartnerWeg);
    }

    let call = match state.calls.create(principal, partner_id) {
        Ok(call) => call,
        Err(e @ CoordinatorError::Konflikt(_)) => {
            if state.calls.active_call(principal).is_some() {
                return Err(Uebergabe::Fehler(e));
            }
            tracing::debug!(partner = %partner_id, "Match-Partner bereits im Call");
            return Err(Uebergabe::PartnerBelegt);
        }
        Err(e) => return Err(Uebergabe::Fehler(e)),
    };

    call_handler::verbindungen_anhaengen(state, &call);

    call_handler::teilnehmer_benachrichtigen(
        state,
        &call.id,
        partner_id,
        &ServerMessage::MatchFound {
            call_id: call.id,
            call_token: call.call_token.clone(),
            matched_user: PeerInfo::neu(principal.clone(), ctx.display_name.clone()),
        },
    );

    tracing::info!(
        call_id = %call.id,
        principal = %principal,
        partner = %partner_id,
        "Match gefunden, Call angelegt"
    );
    state.metriken.call_ereignis("matched");

    Ok(ServerMessage::MatchFound {
        call_id: call.id,
        call_token: call.call_token,
        matched_user: partner.peer_info(),
    })
}

/// Verarbeitet `leave_queue`
pub fn handle_leave_queue(principal: &PrincipalId, state: &Arc<SignalingState>) -> ServerMessage {
    if state.queue.dequeue(principal) {
        tracing::debug!(principal = %principal, "Queue verlassen");
    }
    state.gauges_aktualisieren();
    ServerMessage::QueueLeft
}
