//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Die Schleife
//! wartet gleichzeitig auf eingehende Frames, auf die eigene Send-Queue,
//! auf den Keepalive-Takt, auf den Verbindungs-Timeout, auf eine
//! Verdraengung durch eine neuere Verbindung und auf das Shutdown-Signal.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` ein `ping`
//! - Kommt `verbindungs_timeout_sek` lang kein Frame, wird getrennt
//!
//! Egal warum die Schleife endet: danach laeuft immer `client_cleanup`.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use unilink_core::CoordinatorError;
use unilink_protocol::ServerMessage;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Warum die Verbindungs-Schleife beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrennGrund {
    /// Client hat geschlossen oder der Stream ist zu Ende
    Client,
    /// Lese- oder Schreibfehler auf dem Socket
    Fehler,
    /// Kein eingehender Frame innerhalb des Timeouts
    Timeout,
    /// Durch eine neuere Verbindung desselben Principals ersetzt
    Ersetzt,
    /// Server faehrt herunter
    Shutdown,
}

type WsSender = SplitSink<WebSocket, Message>;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    ctx: DispatcherContext,
    ausgehend: mpsc::Receiver<ServerMessage>,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    ///
    /// `ausgehend` ist die Empfangsseite der Send-Queue aus `ctx.verbindung`.
    pub fn neu(
        state: Arc<SignalingState>,
        ctx: DispatcherContext,
        ausgehend: mpsc::Receiver<ServerMessage>,
    ) -> Self {
        Self {
            state,
            ctx,
            ausgehend,
        }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird; die Verbindung muss vorher
    /// ueber `MessageDispatcher::verbindung_eroeffnen` registriert worden sein.
    pub async fn verarbeiten(mut self, socket: WebSocket) -> TrennGrund {
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let ctx = self.ctx.clone();
        let (mut ws_tx, mut ws_rx) = socket.split();

        let keepalive = self.state.config.keepalive();
        let timeout_dauer = self.state.config.verbindungs_timeout();
        let mut ping_takt = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
        ping_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let abbruch = ctx.verbindung.abbruch_token();
        let mut shutdown_rx = self.state.shutdown_empfaenger();
        let mut letzter_frame = Instant::now();

        tracing::info!(
            principal = %ctx.principal,
            conn = %ctx.verbindung.conn_id,
            art = ?ctx.art,
            "Verbindung geoeffnet"
        );

        let bereits_beendet = *shutdown_rx.borrow();
        let grund = if bereits_beendet {
            TrennGrund::Shutdown
        } else {
            loop {
                tokio::select! {
                    eingehend = ws_rx.next() => {
                        match eingehend {
                            Some(Ok(Message::Text(text))) => {
                                letzter_frame = Instant::now();
                                if let Some(antwort) = dispatcher.text_verarbeiten(&text, &ctx).await {
                                    if !senden(&mut ws_tx, &antwort).await {
                                        break TrennGrund::Fehler;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                letzter_frame = Instant::now();
                                let fehler = ServerMessage::fehler(&CoordinatorError::ungueltige_nachricht(
                                    "Binaer-Frames werden nicht unterstuetzt",
                                ));
                                if !senden(&mut ws_tx, &fehler).await {
                                    break TrennGrund::Fehler;
                                }
                            }
                            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                                letzter_frame = Instant::now();
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!(principal = %ctx.principal, "Verbindung vom Client getrennt");
                                break TrennGrund::Client;
                            }
                            Some(Err(e)) => {
                                tracing::warn!(principal = %ctx.principal, fehler = %e, "Frame-Lesefehler");
                                break TrennGrund::Fehler;
                            }
                        }
                    }

                    // Ausgehende Nachricht aus der Send-Queue
                    Some(nachricht) = self.ausgehend.recv() => {
                        if !senden(&mut ws_tx, &nachricht).await {
                            break TrennGrund::Fehler;
                        }
                    }

                    _ = ping_takt.tick() => {
                        if !senden(&mut ws_tx, &ServerMessage::Ping).await {
                            break TrennGrund::Fehler;
                        }
                    }

                    _ = tokio::time::sleep_until(letzter_frame + timeout_dauer) => {
                        tracing::info!(
                            principal = %ctx.principal,
                            timeout_sek = timeout_dauer.as_secs(),
                            "Verbindungs-Timeout"
                        );
                        break TrennGrund::Timeout;
                    }

                    _ = abbruch.cancelled() => {
                        tracing::info!(principal = %ctx.principal, "Verbindung ersetzt");
                        break TrennGrund::Ersetzt;
                    }

                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break TrennGrund::Shutdown;
                        }
                    }
                }
            }
        };

        // Bereits eingereihte Nachrichten (z.B. der Ersetzt-Hinweis) noch zustellen
        if grund != TrennGrund::Fehler {
            while let Ok(nachricht) = self.ausgehend.try_recv() {
                if !senden(&mut ws_tx, &nachricht).await {
                    break;
                }
            }
        }
        if grund == TrennGrund::Shutdown {
            let abschied =
                ServerMessage::fehler_text("SERVER_SHUTDOWN", "Server wird heruntergefahren");
            let _ = senden(&mut ws_tx, &abschied).await;
        }

        dispatcher.client_cleanup(&ctx).await;

        if grund != TrennGrund::Fehler {
            let code = match grund {
                TrennGrund::Shutdown => close_code::AWAY,
                TrennGrund::Timeout | TrennGrund::Ersetzt => close_code::POLICY,
                _ => close_code::NORMAL,
            };
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: Cow::Borrowed(""),
                })))
                .await;
        }

        tracing::info!(
            principal = %ctx.principal,
            conn = %ctx.verbindung.conn_id,
            grund = ?grund,
            "Verbindungs-Task beendet"
        );
        grund
    }
}

/// Serialisiert und sendet eine Nachricht; `false` bei Socket-Fehler
async fn senden(ws_tx: &mut WsSender, nachricht: &ServerMessage) -> bool {
    let json = match nachricht.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(fehler = %e, "Nachricht nicht serialisierbar");
            return true;
        }
    };
    match ws_tx.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
            false
        }
    }
}

/// Schliesst einen noch nicht registrierten Socket mit Policy-Violation (1008)
pub async fn mit_richtlinienverstoss_schliessen(mut socket: WebSocket, grund: &str) {
    // Close-Reason ist auf 123 Bytes begrenzt
    let grund: String = grund.chars().take(100).collect();
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Cow::Owned(grund),
        })))
        .await;
}
