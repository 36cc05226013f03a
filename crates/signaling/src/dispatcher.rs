//! Signal-Dispatcher – Routet Relay-Nachrichten in die Anruf-Maschine
//!
//! Jede eingehende Nachricht wird genau einer Uebergangsfunktion der
//! `CallEngine` zugeordnet; unerwartete Nachrichten werden geloggt und
//! verworfen. Der Dispatcher pflegt nebenbei das Presence-Roster und
//! reichert eingehende Anrufe mit dem Anzeigenamen an.

use crate::presence::PresenceRoster;
use std::sync::Arc;
use tincan_call::CallEngine;
use tincan_core::types::Peer;
use tincan_protocol::SignalMessage;
use tokio::sync::mpsc;

/// Zentraler Nachrichten-Dispatcher der Client-Seite
pub struct SignalDispatcher {
    engine: Arc<CallEngine>,
    roster: PresenceRoster,
}

impl SignalDispatcher {
    pub fn neu(engine: Arc<CallEngine>, roster: PresenceRoster) -> Self {
        Self { engine, roster }
    }

    /// Verarbeitet den Eingangs-Strom bis er versiegt
    pub async fn ausfuehren(&self, mut eingang: mpsc::UnboundedReceiver<SignalMessage>) {
        while let Some(msg) = eingang.recv().await {
            self.verarbeiten(msg).await;
        }
        tracing::info!("Eingangs-Strom beendet, Dispatcher stoppt");
    }

    /// Ordnet eine Nachricht ihrem Zustandsuebergang zu
    pub async fn verarbeiten(&self, msg: SignalMessage) {
        match msg {
            SignalMessage::Registered { socket_id } => {
                self.roster.eigene_id_setzen(socket_id.clone());
                self.engine.handle_registered(socket_id);
            }

            SignalMessage::ActiveUsers(users) => {
                let peers = self.roster.aktualisieren(users);
                self.engine.handle_roster(peers);
            }

            SignalMessage::CallReceived { from, offer } => {
                // Anzeigename aus dem Roster, Fallback auf die Kennung
                let peer = self
                    .roster
                    .peer(&from)
                    .unwrap_or_else(|| Peer::neu(from.clone(), from.as_str()));
                if let Err(e) = self.engine.handle_incoming_call(peer, offer).await {
                    tracing::debug!(fehler = %e, "Eingehender Anruf nicht angenommen");
                }
            }

            SignalMessage::CallAccepted { answer, .. } => {
                if let Err(e) = self.engine.handle_answer(answer).await {
                    tracing::warn!(fehler = %e, "Antwort nicht verarbeitbar");
                }
            }

            SignalMessage::CallRejected { from, .. } => match from {
                Some(von) => {
                    let _ = self.engine.handle_reject(von).await;
                }
                None => tracing::warn!("call-rejected ohne Absender verworfen"),
            },

            SignalMessage::Candidate { candidate, .. } => {
                let _ = self.engine.handle_remote_candidate(candidate).await;
            }

            SignalMessage::EndCall { from, .. } => {
                self.engine.handle_remote_hangup(from).await;
            }

            SignalMessage::UserDisconnected { socket_id } => {
                self.roster.entfernen(&socket_id);
                self.engine.handle_peer_disconnected(socket_id).await;
                self.engine.handle_roster(self.roster.alle());
            }

            SignalMessage::CallFailed { error, .. } => {
                self.engine.handle_call_failed(error).await;
            }

            // Client->Relay-Nachrichten haben hier nichts verloren
            SignalMessage::Register { .. } | SignalMessage::CallUser { .. } => {
                tracing::warn!(
                    typ = msg.typ_name(),
                    "Unerwartete Client-Nachricht vom Relay verworfen"
                );
            }
        }
    }
}
