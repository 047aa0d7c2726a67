//! unilink-calls – Call-Lifecycle und Matchmaking
//!
//! Dieses Crate ist transportunabhaengig und implementiert:
//! - `CallRegistry`: die autoritative State Machine aller Calls
//!   (pending -> ongoing/rejected, ongoing -> completed) inkl. der
//!   Invariante "hoechstens ein aktiver Call pro Principal"
//! - `MatchQueue`: Warteschlange fuer zufaellige, ausschlussbewusste Paarung
//!
//! Beide Strukturen sind `Clone` und teilen ihren inneren Zustand. Jede
//! oeffentliche Operation nimmt genau einen Lock, Pruefen und Aendern
//! geschehen also atomar gegenueber anderen Aufrufern.

pub mod lifecycle;
pub mod matchmaking;

// Bequeme Re-Exporte
pub use lifecycle::{Call, CallRegistry, CallStatus};
pub use matchmaking::{MatchErgebnis, MatchQueue, QueueEntry};
