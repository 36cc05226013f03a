//! PeerLink – Seam zur Peer-Verbindung
//!
//! Die Zustandsmaschine spricht nie direkt mit WebRTC, sondern mit
//! diesem Trait. Produktiv steckt dahinter `WebRtcLink`; Tests haengen
//! einen geskripteten Link ein. Pro Sitzung existiert hoechstens ein
//! Link (ein Verhandlungskontext), erzeugt von der Factory beim
//! Anrufaufbau und geschlossen beim Teardown.

use crate::error::CallResult;
use async_trait::async_trait;
use std::sync::Arc;
use tincan_audio::MediaTrack;
use tincan_core::types::{TrackId, TrackKind};
use tincan_protocol::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Zustaende
// ---------------------------------------------------------------------------

/// Signalisierungs-Zustand der Peer-Verbindung (SDP-Sicht)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalisierungsZustand {
    Stabil,
    LokalesAngebot,
    RemoteAngebot,
    Geschlossen,
}

impl SignalisierungsZustand {
    /// Ob gerade eine Angebot/Antwort-Runde offen ist
    pub fn mitten_in_verhandlung(&self) -> bool {
        matches!(
            self,
            SignalisierungsZustand::LokalesAngebot | SignalisierungsZustand::RemoteAngebot
        )
    }
}

/// Verbindungszustand der Peer-Verbindung (Transport-Sicht)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkZustand {
    Neu,
    Verbindet,
    Verbunden,
    Getrennt,
    Fehlgeschlagen,
    Geschlossen,
}

/// ICE-Verbindungszustand – wird nur geloggt, ausser Fehlschlag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceZustand {
    Neu,
    Prueft,
    Verbunden,
    Abgeschlossen,
    Getrennt,
    Fehlgeschlagen,
    Geschlossen,
}

/// Ereignisse des Links an die Zustandsmaschine
#[derive(Debug)]
pub enum LinkEvent {
    /// Lokaler ICE-Kandidat entdeckt
    LokalerKandidat(IceCandidate),
    /// Remote-Track eingetroffen
    RemoteTrack { track: Arc<MediaTrack> },
    /// Verbindungszustand hat sich geaendert
    Verbindungszustand(LinkZustand),
    /// ICE-Zustand hat sich geaendert
    Ice(IceZustand),
}

// ---------------------------------------------------------------------------
// ICE-Konfiguration
// ---------------------------------------------------------------------------

/// STUN-Konfiguration der Peer-Verbindung
///
/// TURN-Relays sind bewusst nicht abgebildet; restriktive NATs koennen
/// damit scheitern.
#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_server: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_server: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Ein Sender fuer einen ausgehenden Track auf der Peer-Verbindung
#[async_trait]
pub trait TrackSender: Send + Sync {
    /// Eindeutige Kennung des Senders auf diesem Link
    fn sender_id(&self) -> u64;

    /// Art des gebundenen Tracks
    fn kind(&self) -> TrackKind;

    /// ID des aktuell gebundenen Tracks
    fn gebundener_track(&self) -> Option<TrackId>;

    /// Tauscht den gebundenen Track aus (billig, keine Neuverhandlung)
    async fn replace_track(&self, track: Arc<MediaTrack>) -> CallResult<()>;
}

/// Die Peer-Verbindung aus Sicht der Zustandsmaschine
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> CallResult<SessionDescription>;

    async fn create_answer(&self) -> CallResult<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> CallResult<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> CallResult<()>;

    /// Wendet einen Remote-ICE-Kandidaten an
    ///
    /// Darf erst nach gesetzter Remote-Beschreibung aufgerufen werden –
    /// die Warteschlangen-Disziplin dafuer liegt bei der
    /// Zustandsmaschine, nicht beim Link.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()>;

    /// Fordert Audio- und Video-Empfang im Angebot an (recvonly)
    async fn add_recv_transceivers(&self) -> CallResult<()>;

    /// Bindet einen neuen ausgehenden Track (strukturelle SDP-Aenderung)
    async fn add_track(&self, track: Arc<MediaTrack>) -> CallResult<Arc<dyn TrackSender>>;

    /// Entfernt einen Sender (strukturelle SDP-Aenderung)
    async fn remove_track(&self, sender: &dyn TrackSender) -> CallResult<()>;

    /// Alle aktuell gebundenen Sender
    async fn senders(&self) -> Vec<Arc<dyn TrackSender>>;

    fn signaling_state(&self) -> SignalisierungsZustand;

    /// Schliesst die Verbindung (idempotent)
    async fn close(&self) -> CallResult<()>;
}

/// Erzeugt pro Anruf einen frischen Link samt Event-Strom
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    async fn erstellen(
        &self,
    ) -> CallResult<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>)>;
}
