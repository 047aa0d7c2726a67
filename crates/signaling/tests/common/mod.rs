//! Gemeinsame Helfer fuer die Signaling-Integrationstests
//!
//! Verbindungen werden ohne Socket simuliert: jeder Client ist ein
//! `DispatcherContext` samt Empfangsseite seiner Send-Queue.

#![allow(dead_code)]

use std::sync::Arc;
use tokio::sync::mpsc;
use unilink_auth::{CredentialStore, Identitaet};
use unilink_core::{CallId, PrincipalId};
use unilink_observability::CallMetrics;
use unilink_protocol::{ClientMessage, ServerMessage};
use unilink_signaling::{
    ClientSender, DispatcherContext, InMemoryBlockStore, InMemoryPresenceStore, MessageDispatcher,
    SignalingConfig, SignalingState, VerbindungsArt,
};

pub struct Umgebung {
    pub state: Arc<SignalingState>,
    pub dispatcher: MessageDispatcher,
    pub credentials: Arc<CredentialStore>,
    pub presence_store: Arc<InMemoryPresenceStore>,
    pub block_store: Arc<InMemoryBlockStore>,
}

pub struct Client {
    pub ctx: DispatcherContext,
    pub rx: mpsc::Receiver<ServerMessage>,
}

pub fn p(id: &str) -> PrincipalId {
    PrincipalId::new(id)
}

impl Umgebung {
    pub async fn neu() -> Self {
        Self::mit_config(SignalingConfig::default()).await
    }

    pub async fn mit_config(config: SignalingConfig) -> Self {
        let credentials = CredentialStore::neu();
        for id in ["U1", "U2", "U3"] {
            credentials
                .statisch_hinterlegen(
                    format!("token-{id}"),
                    Identitaet::neu(id, Some(format!("Name {id}"))),
                )
                .await;
        }
        let presence_store = Arc::new(InMemoryPresenceStore::neu());
        let block_store = Arc::new(InMemoryBlockStore::neu());
        let state = SignalingState::neu(
            config,
            credentials.clone(),
            presence_store.clone(),
            block_store.clone(),
            CallMetrics::neu().unwrap(),
        );
        Self {
            dispatcher: MessageDispatcher::neu(state.clone()),
            state,
            credentials,
            presence_store,
            block_store,
        }
    }

    fn client(&self, id: &str, art: VerbindungsArt) -> Client {
        let (verbindung, rx) = ClientSender::neu(p(id), self.state.config.send_queue_groesse);
        Client {
            ctx: DispatcherContext {
                principal: p(id),
                display_name: Some(format!("Name {id}")),
                verbindung,
                art,
            },
            rx,
        }
    }

    /// Oeffnet eine Principal-Verbindung (`/ws`)
    pub async fn verbinden(&self, id: &str) -> Client {
        let client = self.client(id, VerbindungsArt::Principal);
        self.dispatcher
            .verbindung_eroeffnen(&client.ctx)
            .await
            .expect("Verbindung muss registriert werden");
        client
    }

    /// Baut eine Call-gebundene Verbindung, ohne sie zu registrieren
    pub fn call_client(&self, id: &str, call_id: CallId) -> Client {
        self.client(id, VerbindungsArt::CallGebunden(call_id))
    }

    pub async fn senden(&self, client: &Client, nachricht: ClientMessage) -> Option<ServerMessage> {
        self.dispatcher.dispatch(nachricht, &client.ctx).await
    }

    pub async fn text(&self, client: &Client, text: &str) -> Option<ServerMessage> {
        self.dispatcher.text_verarbeiten(text, &client.ctx).await
    }

    pub async fn trennen(&self, client: &Client) {
        self.dispatcher.client_cleanup(&client.ctx).await;
    }
}

impl Client {
    /// Alle bisher eingereihten Nachrichten
    pub fn empfangen(&mut self) -> Vec<ServerMessage> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            nachrichten.push(n);
        }
        nachrichten
    }
}

pub fn fehler_code(nachricht: &Option<ServerMessage>) -> Option<&str> {
    match nachricht {
        Some(ServerMessage::Error { code, .. }) => Some(code.as_str()),
        _ => None,
    }
}
