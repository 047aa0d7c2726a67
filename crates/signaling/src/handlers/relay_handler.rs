//! Relay-Handler – offer, answer, ice_candidate, chat_message, connection_state
//!
//! Bestimmt die Ziel-Session der Verbindung und reicht die Nachricht an das
//! Relay weiter. Ist der Peer nicht angehaengt, erhaelt der Absender einen
//! `error`-Frame, die Verbindung bleibt offen.

use std::sync::Arc;
use unilink_core::{CallId, CoordinatorError, Result};
use unilink_protocol::{ClientMessage, ServerMessage};

use crate::dispatcher::{DispatcherContext, VerbindungsArt};
use crate::server_state::SignalingState;

/// Fehler-Code fuer nicht zugestellte Signale
pub const PEER_NICHT_VERBUNDEN: &str = "PEER_NOT_ATTACHED";

/// Ziel-Call einer Verbindung
///
/// Call-gebundene Verbindungen haben ihn fest, Principal-Verbindungen nutzen
/// die Session, an die sie zuletzt angehaengt wurden.
pub fn ziel_call(ctx: &DispatcherContext, state: &SignalingState) -> Result<CallId> {
    match ctx.art {
        VerbindungsArt::CallGebunden(call_id) => Ok(call_id),
        VerbindungsArt::Principal => state.relay.call_von(&ctx.principal).ok_or_else(|| {
            CoordinatorError::nicht_gefunden("Keine aktive Signaling-Session")
        }),
    }
}

/// Leitet eine Signaling-Nachricht an den Peer weiter
pub fn handle_signal(
    nachricht: &ClientMessage,
    ctx: &DispatcherContext,
    state: &Arc<SignalingState>,
) -> Result<Option<ServerMessage>> {
    let call_id = ziel_call(ctx, state)?;
    let zugestellt = state.relay.relay(&call_id, &ctx.principal, nachricht)?;
    state.metriken.signal(nachricht.typ_name(), zugestellt);

    if zugestellt {
        Ok(None)
    } else {
        tracing::debug!(
            call_id = %call_id,
            principal = %ctx.principal,
            art = nachricht.typ_name(),
            "Peer nicht angehaengt, Signal verworfen"
        );
        Ok(Some(ServerMessage::fehler_text(
            PEER_NICHT_VERBUNDEN,
            format!("'{}' nicht zugestellt: Peer nicht verbunden", nachricht.typ_name()),
        )))
    }
}
