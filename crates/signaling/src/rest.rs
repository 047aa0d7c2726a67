//! REST-Schnittstelle fuer Calls und Signaling-Sessions
//!
//! Alle Routen verlangen `Authorization: Bearer <credential>`. Die
//! Schreib-Routen laufen ueber dieselben Handler wie die WebSocket-Nachrichten,
//! verbundene Teilnehmer werden also genauso benachrichtigt.
//!
//! Fehler werden als `{"code": …, "detail": …}` mit 401/403/404/409/422
//! beantwortet.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use unilink_auth::{AuthError, Identitaet};
use unilink_calls::Call;
use unilink_core::{CallId, CoordinatorError, PrincipalId};
use unilink_protocol::PeerInfo;

use crate::error::SignalingResult;
use crate::handlers::call_handler;
use crate::relay::SessionSnapshot;
use crate::server_state::SignalingState;

/// Standardanzahl der Eintraege in `/calls/history`
pub const VERLAUF_STANDARD_LIMIT: usize = 20;
const VERLAUF_MAX_LIMIT: usize = 100;
/// Hoechstzahl der Eintraege in `/calls/available`
pub const VERFUEGBAR_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Request-/Response-Typen
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub receiver_id: PrincipalId,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerlaufParameter {
    pub limit: Option<usize>,
}

/// Antwort fuer `/calls/active` und `/calls/pending`
#[derive(Debug, Serialize, Deserialize)]
pub struct CallAntwort {
    pub call: Option<Call>,
}

#[derive(Debug, Serialize)]
pub struct AktiveVerbindungen {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSnapshot>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Baut den Router der Call-REST-Routen
pub fn rest_router() -> Router<Arc<SignalingState>> {
    Router::new()
        .route("/calls/available", get(verfuegbar))
        .route("/calls/initiate", post(initiate))
        .route("/calls/active", get(aktiver_call))
        .route("/calls/pending", get(wartender_call))
        .route("/calls/history", get(verlauf))
        .route("/calls/:call_id/accept", post(annehmen))
        .route("/calls/:call_id/reject", post(ablehnen))
        .route("/calls/:call_id/end", post(beenden))
        .route(
            "/ws/webrtc/connection-state/:call_id",
            get(verbindungszustand),
        )
        .route("/ws/webrtc/active-connections", get(aktive_verbindungen))
}

/// Authentifiziert eine REST-Anfrage ueber den Bearer-Header
async fn identitaet(headers: &HeaderMap, state: &SignalingState) -> SignalingResult<Identitaet> {
    let credential = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::CredentialFehlt)?;
    Ok(state.auth.authentifizieren(credential).await?)
}

fn call_id_parsen(roh: &str) -> Result<CallId, CoordinatorError> {
    CallId::from_str(roh).map_err(|_| CoordinatorError::nicht_gefunden(format!("Call {roh}")))
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Online-Principals, die der Aufrufer direkt anrufen kann
///
/// Ausgenommen sind der Aufrufer selbst, gegenseitig gesperrte Principals und
/// alle, die gerade einen aktiven Call haben.
async fn verfuegbar(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
) -> SignalingResult<Json<Vec<PeerInfo>>> {
    let wer = identitaet(&headers, &state).await?;
    let ausgeschlossen = state.block_store.excluded_for(&wer.principal_id).await?;

    let verfuegbar: Vec<PeerInfo> = state
        .presence
        .alle_online()
        .into_iter()
        .filter(|e| e.principal_id != wer.principal_id)
        .filter(|e| !ausgeschlossen.contains(&e.principal_id))
        .filter(|e| state.calls.active_call(&e.principal_id).is_none())
        .take(VERFUEGBAR_LIMIT)
        .map(|e| PeerInfo::neu(e.principal_id, e.display_name))
        .collect();
    Ok(Json(verfuegbar))
}

async fn initiate(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Json(anfrage): Json<InitiateRequest>,
) -> SignalingResult<(StatusCode, Json<Call>)> {
    let wer = identitaet(&headers, &state).await?;
    let call = call_handler::anruf_starten(
        &state,
        &wer.principal_id,
        wer.display_name,
        &anfrage.receiver_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

async fn annehmen(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> SignalingResult<Json<Call>> {
    let wer = identitaet(&headers, &state).await?;
    let call_id = call_id_parsen(&call_id)?;
    Ok(Json(call_handler::anruf_annehmen(
        &state,
        &wer.principal_id,
        &call_id,
    )?))
}

async fn ablehnen(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> SignalingResult<Json<Call>> {
    let wer = identitaet(&headers, &state).await?;
    let call_id = call_id_parsen(&call_id)?;
    Ok(Json(call_handler::anruf_ablehnen(
        &state,
        &wer.principal_id,
        &call_id,
    )?))
}

async fn beenden(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> SignalingResult<Json<Call>> {
    let wer = identitaet(&headers, &state).await?;
    let call_id = call_id_parsen(&call_id)?;
    Ok(Json(call_handler::anruf_beenden(
        &state,
        &wer.principal_id,
        &call_id,
    )?))
}

async fn aktiver_call(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
) -> SignalingResult<Json<CallAntwort>> {
    let wer = identitaet(&headers, &state).await?;
    Ok(Json(CallAntwort {
        call: state.calls.active_call(&wer.principal_id),
    }))
}

async fn wartender_call(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
) -> SignalingResult<Json<CallAntwort>> {
    let wer = identitaet(&headers, &state).await?;
    Ok(Json(CallAntwort {
        call: state.calls.pending_for(&wer.principal_id),
    }))
}

async fn verlauf(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Query(params): Query<VerlaufParameter>,
) -> SignalingResult<Json<Vec<Call>>> {
    let wer = identitaet(&headers, &state).await?;
    let limit = params
        .limit
        .unwrap_or(VERLAUF_STANDARD_LIMIT)
        .clamp(1, VERLAUF_MAX_LIMIT);
    Ok(Json(state.calls.history(&wer.principal_id, limit)))
}

async fn verbindungszustand(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> SignalingResult<Json<SessionSnapshot>> {
    let wer = identitaet(&headers, &state).await?;
    let call_id = call_id_parsen(&call_id)?;
    let snapshot = state.relay.snapshot(&call_id).ok_or_else(|| {
        CoordinatorError::nicht_gefunden(format!("Keine Signaling-Session fuer Call {call_id}"))
    })?;
    if !snapshot.participants.contains(&wer.principal_id) {
        return Err(CoordinatorError::verweigert(format!(
            "{} ist kein Teilnehmer von Call {call_id}",
            wer.principal_id
        ))
        .into());
    }
    Ok(Json(snapshot))
}

async fn aktive_verbindungen(
    State(state): State<Arc<SignalingState>>,
    headers: HeaderMap,
) -> SignalingResult<Json<AktiveVerbindungen>> {
    identitaet(&headers, &state).await?;
    let sessions = state.relay.snapshots();
    Ok(Json(AktiveVerbindungen {
        active_sessions: sessions.len(),
        sessions,
    }))
}
