//! SignalingChannel – Persistente WebSocket-Verbindung zum Relay
//!
//! Duenner Duplex-Transport ohne Geschaeftslogik: ausgehende
//! `SignalMessage`s werden als JSON-Textframes gesendet, eingehende
//! geparst und weitergereicht. Unlesbare Frames werden mit Warnung
//! verworfen – Zustellgarantien gibt es ohnehin keine.
//!
//! ## Reconnect
//! Bricht die Verbindung ab, verbindet die Schleife mit exponentiellem
//! Backoff neu und meldet die Identitaet nach JEDEM Connect erneut an
//! (das Relay vergibt dann eine frische Sitzungskennung, die per
//! `registered` hereinkommt).

use crate::error::{SignalingError, SignalingResult};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tincan_protocol::SignalMessage;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Konfiguration der Relay-Verbindung
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// WebSocket-URL des Relays (ws:// oder wss://)
    pub url: String,
    /// Anzeigename fuer die Registrierung
    pub user_name: String,
    /// Minimales Reconnect-Intervall
    pub reconnect_min: Duration,
    /// Maximales Reconnect-Intervall
    pub reconnect_max: Duration,
}

impl SignalingConfig {
    pub fn neu(url: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_name: user_name.into(),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Duplex-Kanal zum Signaling-Relay
pub struct SignalingChannel {
    ausgang_tx: mpsc::UnboundedSender<SignalMessage>,
    eingang_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<SignalMessage>>>,
    verbunden_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
}

impl SignalingChannel {
    /// Startet die Verbindungs-Schleife (verbindet sofort im Hintergrund)
    pub fn verbinden(config: SignalingConfig) -> Self {
        let (ausgang_tx, ausgang_rx) = mpsc::unbounded_channel();
        let (eingang_tx, eingang_rx) = mpsc::unbounded_channel();
        let (verbunden_tx, verbunden_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(verbindungs_schleife(
            config,
            ausgang_rx,
            eingang_tx,
            verbunden_tx,
            stop_rx,
        ));

        Self {
            ausgang_tx,
            eingang_rx: parking_lot::Mutex::new(Some(eingang_rx)),
            verbunden_rx,
            stop_tx,
        }
    }

    /// Reiht eine Nachricht zum Versand ein
    pub fn send(&self, msg: SignalMessage) -> SignalingResult<()> {
        self.ausgang_tx
            .send(msg)
            .map_err(|_| SignalingError::KanalGeschlossen)
    }

    /// Klon des Ausgangs-Senders (fuer die Anruf-Maschine)
    pub fn sender(&self) -> mpsc::UnboundedSender<SignalMessage> {
        self.ausgang_tx.clone()
    }

    /// Uebernimmt den Eingangs-Strom (genau einmal, fuer den Dispatcher)
    pub fn eingang_uebernehmen(&self) -> Option<mpsc::UnboundedReceiver<SignalMessage>> {
        self.eingang_rx.lock().take()
    }

    /// Beobachtet den Verbindungsstatus (true = Relay erreichbar)
    pub fn verbunden_beobachten(&self) -> watch::Receiver<bool> {
        self.verbunden_rx.clone()
    }

    /// Trennt die Verbindung endgueltig (kein Reconnect mehr)
    pub fn trennen(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Ergebnis einer einzelnen WebSocket-Sitzung
#[derive(Debug, PartialEq, Eq)]
enum SitzungsEnde {
    Gestoppt,
    Getrennt,
}

async fn verbindungs_schleife(
    config: SignalingConfig,
    mut ausgang_rx: mpsc::UnboundedReceiver<SignalMessage>,
    eingang_tx: mpsc::UnboundedSender<SignalMessage>,
    verbunden_tx: watch::Sender<bool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut backoff = config.reconnect_min;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                tracing::info!(url = %config.url, "Mit Relay verbunden");
                let _ = verbunden_tx.send(true);
                backoff = config.reconnect_min;

                let (mut sink, mut strom) = ws.split();

                // Identitaet nach jedem Connect neu anmelden
                let register = SignalMessage::Register {
                    user_id: config.user_name.clone(),
                    socket_id: None,
                };
                match serde_json::to_string(&register) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            tracing::warn!(fehler = %e, "Registrierung nicht sendbar");
                        }
                    }
                    Err(e) => tracing::error!(fehler = %e, "Registrierung nicht serialisierbar"),
                }

                let ende = sitzung_fahren(
                    &mut sink,
                    &mut strom,
                    &mut ausgang_rx,
                    &eingang_tx,
                    &mut stop_rx,
                )
                .await;
                let _ = verbunden_tx.send(false);

                if ende == SitzungsEnde::Gestoppt {
                    let _ = sink.close().await;
                    break;
                }
                tracing::warn!("Relay-Verbindung verloren, Reconnect folgt");
            }
            Err(e) => {
                tracing::warn!(url = %config.url, fehler = %e, "Relay nicht erreichbar");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }

    tracing::debug!("Verbindungs-Schleife beendet");
}

async fn sitzung_fahren<S, R>(
    sink: &mut S,
    strom: &mut R,
    ausgang_rx: &mut mpsc::UnboundedReceiver<SignalMessage>,
    eingang_tx: &mpsc::UnboundedSender<SignalMessage>,
    stop_rx: &mut watch::Receiver<bool>,
) -> SitzungsEnde
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    return SitzungsEnde::Gestoppt;
                }
            }

            msg = ausgang_rx.recv() => {
                let Some(msg) = msg else { return SitzungsEnde::Gestoppt };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        tracing::trace!(typ = msg.typ_name(), "Nachricht gesendet");
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                            return SitzungsEnde::Getrennt;
                        }
                    }
                    Err(e) => tracing::error!(fehler = %e, "Nachricht nicht serialisierbar"),
                }
            }

            frame = strom.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SignalMessage>(&text) {
                            Ok(msg) => {
                                tracing::trace!(typ = msg.typ_name(), "Nachricht empfangen");
                                let _ = eingang_tx.send(msg);
                            }
                            Err(e) => {
                                tracing::warn!(fehler = %e, "Unlesbare Relay-Nachricht verworfen");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SitzungsEnde::Getrennt,
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary: beantwortet tungstenite selbst bzw. irrelevant
                    }
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Lesefehler auf der Relay-Verbindung");
                        return SitzungsEnde::Getrennt;
                    }
                }
            }
        }
    }
}
