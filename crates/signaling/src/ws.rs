//! WebSocket-Endpunkte
//!
//! - `GET /ws?token=…` – Principal-Verbindung (Presence, Queue, Calls, Relay)
//! - `GET /ws/webrtc/{call_id}?token=…` – Call-gebundene Signaling-Verbindung
//!
//! Das Credential kommt aus dem Query-Parameter `token` oder aus
//! `Authorization: Bearer …`. Ungueltige Credentials und strukturelle
//! Attach-Fehler schliessen den Socket mit Code 1008, bevor Zustand entsteht.

use axum::{
    extract::{ws::WebSocket, Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use unilink_auth::{AuthError, Identitaet};
use unilink_core::{CallId, CoordinatorError};

use crate::broadcast::ClientSender;
use crate::connection::{mit_richtlinienverstoss_schliessen, ClientConnection};
use crate::dispatcher::{DispatcherContext, MessageDispatcher, VerbindungsArt};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Query-Parameter der WebSocket-Endpunkte
#[derive(Debug, Default, Deserialize)]
pub struct VerbindungsParameter {
    #[serde(default)]
    pub token: Option<String>,
}

/// Credential aus Query oder `Authorization`-Header (Query hat Vorrang)
pub fn credential_aus(params: &VerbindungsParameter, headers: &HeaderMap) -> Option<String> {
    params
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
}

/// Authentifiziert ein optionales Credential gegen den Auth-Kollaborateur
pub async fn authentifizieren(
    state: &SignalingState,
    credential: Option<String>,
) -> SignalingResult<Identitaet> {
    let credential = credential.ok_or(AuthError::CredentialFehlt)?;
    Ok(state.auth.authentifizieren(&credential).await?)
}

/// `GET /ws`
pub async fn ws_principal(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
    Query(params): Query<VerbindungsParameter>,
    headers: HeaderMap,
) -> Response {
    let ergebnis = authentifizieren(&state, credential_aus(&params, &headers))
        .await
        .map(|identitaet| (identitaet, VerbindungsArt::Principal));
    ws.on_upgrade(move |socket| verbindung_bedienen(socket, state, ergebnis))
}

/// `GET /ws/webrtc/{call_id}`
pub async fn ws_call(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
    Path(call_id): Path<String>,
    Query(params): Query<VerbindungsParameter>,
    headers: HeaderMap,
) -> Response {
    let ergebnis = match authentifizieren(&state, credential_aus(&params, &headers)).await {
        Ok(identitaet) => CallId::from_str(&call_id)
            .map(|id| (identitaet, VerbindungsArt::CallGebunden(id)))
            .map_err(|_| {
                SignalingError::from(CoordinatorError::nicht_gefunden(format!("Call {call_id}")))
            }),
        Err(e) => Err(e),
    };
    ws.on_upgrade(move |socket| verbindung_bedienen(socket, state, ergebnis))
}

/// Registriert die Verbindung und startet die Verarbeitungsschleife
async fn verbindung_bedienen(
    socket: WebSocket,
    state: Arc<SignalingState>,
    ergebnis: SignalingResult<(Identitaet, VerbindungsArt)>,
) {
    let (identitaet, art) = match ergebnis {
        Ok(v) => v,
        Err(e) => {
            tracing::info!(fehler = %e, "WebSocket-Verbindung abgewiesen");
            mit_richtlinienverstoss_schliessen(socket, e.als_koordinator_fehler().fehler_code())
                .await;
            return;
        }
    };

    let (verbindung, ausgehend) = ClientSender::neu(
        identitaet.principal_id.clone(),
        state.config.send_queue_groesse,
    );
    let ctx = DispatcherContext {
        principal: identitaet.principal_id,
        display_name: identitaet.display_name,
        verbindung,
        art,
    };

    let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
    if let Err(e) = dispatcher.verbindung_eroeffnen(&ctx).await {
        tracing::info!(principal = %ctx.principal, fehler = %e, "Verbindung nicht registriert");
        mit_richtlinienverstoss_schliessen(socket, e.als_koordinator_fehler().fehler_code()).await;
        return;
    }

    ClientConnection::neu(state, ctx, ausgehend)
        .verarbeiten(socket)
        .await;
}
