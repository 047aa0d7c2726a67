//! Message-Dispatcher – Routet Client-Nachrichten an die richtigen Handler
//!
//! Der Dispatcher empfaengt Text-Frames einer Verbindung, parst sie,
//! bestimmt den Handler und gibt die Antwort an den Absender zurueck.
//! Fehler werden als `error`-Frame beantwortet; die Verbindung bleibt offen.
//!
//! ## Verbindungsarten
//! - `Principal`: eine Verbindung pro Principal (`/ws`). Presence, Queue,
//!   Direktanrufe und Relay in die zuletzt angehaengte Session.
//! - `CallGebunden`: eine Verbindung pro Call-Teilnehmer (`/ws/webrtc/{call_id}`).
//!   Nur Relay und `end_call` fuer genau diesen Call.
//!
//! Auf- und Abbau beider Arten laufen ueber `verbindung_eroeffnen` und
//! `client_cleanup`, unabhaengig davon, warum die Verbindung endet.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use unilink_core::{CallId, CoordinatorError, PrincipalId, Result};
use unilink_protocol::{parse_client_message, ClientMessage, ServerMessage};

use crate::broadcast::ClientSender;
use crate::error::{SignalingError, SignalingResult};
use crate::handlers::{call_handler, queue_handler, relay_handler};
use crate::presence::PresenceEntry;
use crate::server_state::{SignalingState, ZweiteVerbindung};

/// Art der Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsArt {
    Principal,
    CallGebunden(CallId),
}

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    pub principal: PrincipalId,
    pub display_name: Option<String>,
    /// Handle auf die eigene Send-Queue
    pub verbindung: ClientSender,
    pub art: VerbindungsArt,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Registriert eine frisch authentifizierte Verbindung
    ///
    /// Principal-Verbindungen werden in der Presence eingetragen (unter
    /// Beachtung der Richtlinie fuer zweite Verbindungen) und an eine
    /// eventuell laufende Session wieder angehaengt. Call-gebundene
    /// Verbindungen werden an ihren Call angehaengt; Fehler dabei sind
    /// strukturell und beenden die Verbindung, bevor Zustand entsteht.
    pub async fn verbindung_eroeffnen(&self, ctx: &DispatcherContext) -> SignalingResult<()> {
        match ctx.art {
            VerbindungsArt::Principal => self.principal_eroeffnen(ctx).await?,
            VerbindungsArt::CallGebunden(call_id) => {
                self.state
                    .relay
                    .attach(&call_id, &ctx.principal, ctx.verbindung.clone())?;
                tracing::info!(
                    call_id = %call_id,
                    principal = %ctx.principal,
                    conn = %ctx.verbindung.conn_id,
                    "Call-Verbindung angehaengt"
                );
            }
        }
        self.state.gauges_aktualisieren();
        Ok(())
    }

    async fn principal_eroeffnen(&self, ctx: &DispatcherContext) -> SignalingResult<()> {
        let principal = &ctx.principal;

        let eintrag = PresenceEntry::neu(ctx.verbindung.clone(), ctx.display_name.clone());
        match self.state.config.zweite_verbindung {
            ZweiteVerbindung::Ablehnen => {
                if !self.state.presence.connect_wenn_frei(eintrag) {
                    tracing::warn!(principal = %principal, "Zweite Verbindung abgelehnt");
                    return Err(SignalingError::BereitsVerbunden);
                }
            }
            ZweiteVerbindung::Ersetzen => {
                if let Some(alt) = self.state.presence.connect(eintrag) {
                    alt.verbindung.senden(ServerMessage::fehler_text(
                        "CONNECTION_REPLACED",
                        "Verbindung durch eine neuere Verbindung ersetzt",
                    ));
                    alt.verbindung.schliessen();
                }
            }
        }

        if let Err(e) = self.state.presence_store.set_online(principal, true).await {
            tracing::warn!(principal = %principal, fehler = %e, "Presence-Store nicht aktualisiert");
        }

        // Wiederverbindung waehrend eines aktiven Calls; eine offene
        // Call-Verbindung behaelt Vorrang
        if let Some(call) = self.state.calls.active_call(principal) {
            if let Err(e) =
                self.state
                    .relay
                    .attach_falls_frei(&call.id, principal, ctx.verbindung.clone())
            {
                tracing::debug!(call_id = %call.id, fehler = %e, "Wiederanhaengen fehlgeschlagen");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Nachrichten
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Text-Frame und gibt die Antwort an den Absender zurueck
    ///
    /// Ein Panic im Handler wird abgefangen und als interner Fehler beantwortet,
    /// die Lese-Schleife der Verbindung laeuft weiter.
    pub async fn text_verarbeiten(
        &self,
        text: &str,
        ctx: &DispatcherContext,
    ) -> Option<ServerMessage> {
        let nachricht = match parse_client_message(text) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(principal = %ctx.principal, fehler = %e, "Ungueltige Nachricht");
                return Some(ServerMessage::fehler(&e));
            }
        };

        match AssertUnwindSafe(self.dispatch(nachricht, ctx))
            .catch_unwind()
            .await
        {
            Ok(antwort) => antwort,
            Err(_) => {
                tracing::error!(principal = %ctx.principal, "Handler-Panic abgefangen");
                Some(ServerMessage::fehler(&CoordinatorError::intern(
                    "Nachricht konnte nicht verarbeitet werden",
                )))
            }
        }
    }

    /// Verarbeitet eine geparste Nachricht
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll.
    pub async fn dispatch(
        &self,
        nachricht: ClientMessage,
        ctx: &DispatcherContext,
    ) -> Option<ServerMessage> {
        let typ = nachricht.typ_name();
        tracing::trace!(principal = %ctx.principal, typ, "Nachricht empfangen");

        match self.dispatch_intern(nachricht, ctx).await {
            Ok(antwort) => antwort,
            Err(e) => {
                tracing::debug!(principal = %ctx.principal, typ, fehler = %e, "Nachricht abgewiesen");
                Some(ServerMessage::fehler(&e))
            }
        }
    }

    async fn dispatch_intern(
        &self,
        nachricht: ClientMessage,
        ctx: &DispatcherContext,
    ) -> Result<Option<ServerMessage>> {
        let state = &self.state;
        match nachricht {
            // ---------------------------------------------------------------
            // Keepalive
            // ---------------------------------------------------------------
            ClientMessage::Ping => Ok(Some(ServerMessage::Pong)),
            ClientMessage::Pong => Ok(None),

            // ---------------------------------------------------------------
            // Signaling
            // ---------------------------------------------------------------
            ref signal @ (ClientMessage::Offer { .. }
            | ClientMessage::Answer { .. }
            | ClientMessage::IceCandidate { .. }
            | ClientMessage::ChatMessage { .. }
            | ClientMessage::ConnectionState { .. }) => {
                relay_handler::handle_signal(signal, ctx, state)
            }

            ClientMessage::EndCall => {
                let call_id = match ctx.art {
                    VerbindungsArt::CallGebunden(call_id) => call_id,
                    VerbindungsArt::Principal => state
                        .calls
                        .active_call(&ctx.principal)
                        .map(|c| c.id)
                        .ok_or_else(|| CoordinatorError::nicht_gefunden("Kein aktiver Call"))?,
                };
                // Beide Seiten (inkl. Absender) erhalten `call_ended`
                call_handler::anruf_beenden(state, &ctx.principal, &call_id)?;
                Ok(None)
            }

            // ---------------------------------------------------------------
            // Nur auf Principal-Verbindungen
            // ---------------------------------------------------------------
            andere if matches!(ctx.art, VerbindungsArt::CallGebunden(_)) => {
                Err(CoordinatorError::ungueltige_nachricht(format!(
                    "'{}' ist auf einer Call-Verbindung nicht erlaubt",
                    andere.typ_name()
                )))
            }

            ClientMessage::JoinQueue => queue_handler::handle_join_queue(ctx, state).await,
            ClientMessage::LeaveQueue => Ok(Some(queue_handler::handle_leave_queue(
                &ctx.principal,
                state,
            ))),

            ClientMessage::CallInitiate { receiver_id } => {
                let call = call_handler::anruf_starten(
                    state,
                    &ctx.principal,
                    ctx.display_name.clone(),
                    &receiver_id,
                )
                .await?;
                Ok(Some(ServerMessage::CallCreated {
                    call_id: call.id,
                    call_token: call.call_token,
                    receiver_id,
                }))
            }

            ClientMessage::CallAccept { call_id } => {
                call_handler::anruf_annehmen(state, &ctx.principal, &call_id)?;
                Ok(Some(ServerMessage::CallAccepted {
                    call_id,
                    by: ctx.principal.clone(),
                }))
            }

            ClientMessage::CallReject { call_id } => {
                call_handler::anruf_ablehnen(state, &ctx.principal, &call_id)?;
                Ok(Some(ServerMessage::CallRejected {
                    call_id,
                    by: ctx.principal.clone(),
                }))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verbindungsabbau
    // -----------------------------------------------------------------------

    /// Bereinigt alle Ressourcen einer Verbindung beim Trennen
    ///
    /// Reihenfolge: Relay abhaengen, Presence austragen, Queue verlassen,
    /// aktiven Call terminieren. Der Call wird nur terminiert, wenn der
    /// Principal ueber keine andere Verbindung mehr erreichbar ist.
    pub async fn client_cleanup(&self, ctx: &DispatcherContext) {
        let state = &self.state;
        let principal = &ctx.principal;
        let conn = ctx.verbindung.conn_id;

        // 1. Relay
        let call_id = match ctx.art {
            VerbindungsArt::CallGebunden(call_id) => Some(call_id),
            VerbindungsArt::Principal => state.relay.call_von(principal),
        };
        if let Some(call_id) = call_id {
            let ersatz = state.presence.connection_for(principal);
            state.relay.detach_connection(&call_id, principal, conn, ersatz);
        }

        // 2. Presence und 3. Queue (nur wenn diese Verbindung die aktuelle war)
        if ctx.art == VerbindungsArt::Principal
            && state.presence.disconnect_connection(principal, conn)
        {
            if let Err(e) = state.presence_store.set_online(principal, false).await {
                tracing::warn!(principal = %principal, fehler = %e, "Presence-Store nicht aktualisiert");
            }
            state.queue.dequeue(principal);
        }

        // 4. Lifecycle
        if !state.presence.is_online(principal) && !state.relay.ist_angehaengt(principal) {
            if let Some(call) = call_handler::trennung_verarbeiten(state, principal) {
                tracing::info!(
                    call_id = %call.id,
                    principal = %principal,
                    status = %call.status,
                    "Call nach Verbindungsabbruch terminiert"
                );
            }
        }

        state.gauges_aktualisieren();
        tracing::debug!(principal = %principal, conn = %conn, "Verbindungs-Ressourcen bereinigt");
    }
}
