//! unilink-core – Gemeinsame Typen und Fehlertaxonomie
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen UniLink-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{CoordinatorError, Result};
pub use types::{CallId, CallToken, ConnectionId, PrincipalId};
