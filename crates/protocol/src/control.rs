//! Control-Protokoll (WebSocket, JSON)
//!
//! Definiert alle Nachrichten, die ueber eine Signaling-Verbindung zwischen
//! Client und Koordinator ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht ist ein JSON-Objekt mit Pflichtfeld `type`
//! - Tagged Enums fuer typsichere Nachrichtentypen
//! - SDP- und ICE-Payloads bleiben opake `serde_json::Value`s und werden
//!   unveraendert weitergereicht
//! - Die aelteren `webrtc_*`-Schreibweisen werden beim Einlesen akzeptiert,
//!   ausgehend wird immer die kanonische Form verwendet

use serde::{Deserialize, Serialize};
use serde_json::Value;
use unilink_core::{CallId, CallToken, CoordinatorError, PrincipalId};

// ---------------------------------------------------------------------------
// Gemeinsame Strukturen
// ---------------------------------------------------------------------------

/// Oeffentliche Identitaet eines Gegenuebers (fuer `match_found`, `incoming_call`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl PeerInfo {
    pub fn neu(id: PrincipalId, display_name: Option<String>) -> Self {
        Self { id, display_name }
    }
}

// ---------------------------------------------------------------------------
// Client -> Koordinator
// ---------------------------------------------------------------------------

/// Alle Nachrichten, die ein Client senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // Matchmaking
    JoinQueue,
    LeaveQueue,

    // Direkter Anruf
    CallInitiate { receiver_id: PrincipalId },
    CallAccept { call_id: CallId },
    CallReject { call_id: CallId },

    // Signaling (wird an den Peer weitergereicht)
    #[serde(alias = "webrtc_offer")]
    Offer { offer: Value },
    #[serde(alias = "webrtc_answer")]
    Answer { answer: Value },
    #[serde(alias = "webrtc_ice")]
    IceCandidate { candidate: Value },
    ChatMessage {
        #[serde(alias = "message")]
        text: String,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    ConnectionState { state: String },
    EndCall,

    // Keepalive
    Ping,
    Pong,
}

impl ClientMessage {
    /// Kanonischer Typname (fuer Logs und Metrik-Labels)
    pub fn typ_name(&self) -> &'static str {
        match self {
            Self::JoinQueue => "join_queue",
            Self::LeaveQueue => "leave_queue",
            Self::CallInitiate { .. } => "call_initiate",
            Self::CallAccept { .. } => "call_accept",
            Self::CallReject { .. } => "call_reject",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::ChatMessage { .. } => "chat_message",
            Self::ConnectionState { .. } => "connection_state",
            Self::EndCall => "end_call",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// Alle Typnamen, die `ClientMessage` akzeptiert (inkl. Aliase)
const BEKANNTE_TYPEN: &[&str] = &[
    "join_queue",
    "leave_queue",
    "call_initiate",
    "call_accept",
    "call_reject",
    "offer",
    "webrtc_offer",
    "answer",
    "webrtc_answer",
    "ice_candidate",
    "webrtc_ice",
    "chat_message",
    "connection_state",
    "end_call",
    "ping",
    "pong",
];

/// Parst einen eingehenden Text-Frame
///
/// Unterscheidet zwischen kaputtem JSON, fehlendem/unbekanntem `type` und
/// fehlenden Payload-Feldern. Alle Faelle ergeben `UngueltigeNachricht`.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, CoordinatorError> {
    let wert: Value = serde_json::from_str(text)
        .map_err(|_| CoordinatorError::ungueltige_nachricht("Ungueltiges JSON"))?;

    let typ = match wert.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(_) => {
            return Err(CoordinatorError::ungueltige_nachricht(
                "Feld 'type' muss ein String sein",
            ))
        }
        None => return Err(CoordinatorError::ungueltige_nachricht("Feld 'type' fehlt")),
    };

    if !BEKANNTE_TYPEN.contains(&typ.as_str()) {
        return Err(CoordinatorError::ungueltige_nachricht(format!(
            "Unbekannter Nachrichtentyp: {typ}"
        )));
    }

    serde_json::from_value(wert).map_err(|e| {
        CoordinatorError::ungueltige_nachricht(format!("Ungueltige Nutzdaten fuer '{typ}': {e}"))
    })
}

// ---------------------------------------------------------------------------
// Koordinator -> Client
// ---------------------------------------------------------------------------

/// Alle Nachrichten, die der Koordinator an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // Matchmaking
    QueueJoined {
        queue_position: usize,
    },
    QueueLeft,
    MatchFound {
        call_id: CallId,
        call_token: CallToken,
        matched_user: PeerInfo,
    },

    // Direkter Anruf
    CallCreated {
        call_id: CallId,
        call_token: CallToken,
        receiver_id: PrincipalId,
    },
    IncomingCall {
        call_id: CallId,
        call_token: CallToken,
        caller: PeerInfo,
    },
    CallAccepted {
        call_id: CallId,
        by: PrincipalId,
    },
    CallRejected {
        call_id: CallId,
        by: PrincipalId,
    },

    // Signaling
    ConnectionReady {
        call_id: CallId,
        user_id: PrincipalId,
    },
    Offer {
        offer: Value,
        from: PrincipalId,
    },
    Answer {
        answer: Value,
        from: PrincipalId,
    },
    IceCandidate {
        candidate: Value,
        from: PrincipalId,
    },
    ChatMessage {
        from: PrincipalId,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
    ConnectionState {
        user_id: PrincipalId,
        state: String,
    },

    // Beendigung / Peer-Verlust
    UserDisconnected {
        user_id: PrincipalId,
    },
    CallEnded {
        call_id: CallId,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<i64>,
    },

    // Keepalive
    Ping,
    Pong,

    // Fehler
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    /// Erstellt einen `error`-Frame aus einem Koordinator-Fehler
    pub fn fehler(fehler: &CoordinatorError) -> Self {
        Self::Error {
            code: fehler.fehler_code().to_string(),
            message: fehler.to_string(),
        }
    }

    /// Erstellt einen `error`-Frame mit freiem Text
    pub fn fehler_text(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_queue_ohne_nutzdaten() {
        let msg = parse_client_message(r#"{"type":"join_queue"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinQueue);
    }

    #[test]
    fn zusaetzliche_felder_werden_ignoriert() {
        let msg = parse_client_message(r#"{"type":"end_call","receiver_id":"U2"}"#).unwrap();
        assert_eq!(msg, ClientMessage::EndCall);
    }

    #[test]
    fn webrtc_aliase_werden_akzeptiert() {
        let offer =
            parse_client_message(r#"{"type":"webrtc_offer","offer":{"sdp":"v=0"}}"#).unwrap();
        assert_eq!(
            offer,
            ClientMessage::Offer {
                offer: json!({"sdp": "v=0"})
            }
        );

        let ice = parse_client_message(r#"{"type":"webrtc_ice","candidate":{"c":1}}"#).unwrap();
        assert_eq!(ice.typ_name(), "ice_candidate");

        let answer = parse_client_message(r#"{"type":"webrtc_answer","answer":"x"}"#).unwrap();
        assert_eq!(answer.typ_name(), "answer");
    }

    #[test]
    fn chat_akzeptiert_altes_feld_message() {
        let msg =
            parse_client_message(r#"{"type":"chat_message","message":"hallo","timestamp":5}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::ChatMessage {
                text: "hallo".into(),
                timestamp: Some(json!(5)),
            }
        );
    }

    #[test]
    fn kaputtes_json_ist_ungueltig() {
        let err = parse_client_message("{nope").unwrap_err();
        assert_eq!(err.fehler_code(), "MALFORMED_MESSAGE");
    }

    #[test]
    fn fehlender_typ_ist_ungueltig() {
        let err = parse_client_message(r#"{"offer":{}}"#).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn unbekannter_typ_wird_benannt() {
        let err = parse_client_message(r#"{"type":"teleport"}"#).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn fehlende_nutzdaten_sind_ungueltig() {
        let err = parse_client_message(r#"{"type":"offer"}"#).unwrap_err();
        assert_eq!(err.fehler_code(), "MALFORMED_MESSAGE");
    }

    #[test]
    fn weitergeleitetes_offer_format() {
        let msg = ServerMessage::Offer {
            offer: json!({"sdp": "v=0..."}),
            from: PrincipalId::new("U1"),
        };
        let wert: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            wert,
            json!({"type": "offer", "offer": {"sdp": "v=0..."}, "from": "U1"})
        );
    }

    #[test]
    fn match_found_format() {
        let call_id = CallId(uuid::Uuid::nil());
        let msg = ServerMessage::MatchFound {
            call_id,
            call_token: CallToken::new("tok"),
            matched_user: PeerInfo::neu(PrincipalId::new("U2"), None),
        };
        let wert: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(wert["type"], "match_found");
        assert_eq!(wert["call_token"], "tok");
        assert_eq!(wert["matched_user"]["id"], "U2");
        assert!(wert["matched_user"].get("display_name").is_none());
    }

    #[test]
    fn fehler_frame_aus_koordinator_fehler() {
        let msg = ServerMessage::fehler(&CoordinatorError::konflikt("Bereits in einem Call"));
        let decoded = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        match decoded {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "CONFLICT");
                assert!(message.contains("Bereits in einem Call"));
            }
            andere => panic!("Erwartet Error, erhalten {andere:?}"),
        }
    }
}
