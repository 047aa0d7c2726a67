//! unilink-signaling – Presence, Matchmaking-Uebergabe und WebRTC-Signaling
//!
//! Dieser Crate implementiert den Verbindungs-Teil des Call-Koordinators:
//! WebSocket-Verbindungen, Presence, die Weitergabe von Signaling-Nachrichten
//! zwischen den beiden Teilnehmern eines Calls und die Call-REST-Routen.
//!
//! ## Architektur
//!
//! ```text
//! axum Router (ws::ws_principal, ws::ws_call, rest)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Frames lesen, Send-Queue leeren, Keepalive, Timeout
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- queue_handler  (join_queue, leave_queue, Match-Uebergabe)
//!     +-- call_handler   (initiate, accept, reject, end, Trennung)
//!     +-- relay_handler  (offer, answer, ice_candidate, chat, state)
//!
//! PresenceRegistry – Wer ist verbunden, ueber welche Verbindung
//! SignalingRelay   – Sessions pro Call, angehaengte Verbindungen
//! CallRegistry / MatchQueue – aus unilink-calls
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod presence;
pub mod relay;
pub mod rest;
pub mod server_state;
pub mod store;
pub mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;

// Bequeme Re-Exporte
pub use broadcast::ClientSender;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher, VerbindungsArt};
pub use error::{SignalingError, SignalingResult};
pub use presence::{PresenceEntry, PresenceRegistry};
pub use relay::{SessionSnapshot, SessionState, SignalingRelay};
pub use server_state::{SignalingConfig, SignalingState, ZweiteVerbindung};
pub use store::{BlockStore, InMemoryBlockStore, InMemoryPresenceStore, PresenceStore};

/// Alle Signaling-Routen (WebSocket und REST) mit angehaengtem State
pub fn router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_principal))
        .route("/ws/webrtc/:call_id", get(ws::ws_call))
        .merge(rest::rest_router())
        .with_state(state)
}
