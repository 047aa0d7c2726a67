//! unilink-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert den JSON-Umschlag aller Nachrichten, die ueber eine
//! Signaling-Verbindung zwischen Client und Koordinator ausgetauscht werden.

pub mod control;

pub use control::{parse_client_message, ClientMessage, PeerInfo, ServerMessage};
