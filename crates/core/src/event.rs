//! Anruf-Ereignisse fuer die Einbettung (UI, CLI)
//!
//! Die Engine versendet diese Events ueber einen tokio broadcast-Kanal.
//! Subscriber duerfen Events verpassen (Lagged) – der Sitzungs-Store ist
//! die verbindliche Quelle des aktuellen Zustands, Events sind nur die
//! Benachrichtigung darueber.

use crate::types::{Peer, PeerId, TrackKind};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse die der Anruf-Stack an die Einbettung meldet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallEvent {
    // --- Relay-Ereignisse ---
    /// Beim Relay registriert, Sitzungskennung zugewiesen
    Registriert { peer_id: PeerId },
    /// Das Presence-Roster hat sich geaendert
    RosterAktualisiert { peers: Vec<Peer> },

    // --- Anruf-Ereignisse ---
    /// Eingehender Anruf wartet auf Annahme/Ablehnung
    EingehenderAnruf { von: Peer },
    /// Anruf steht, Medien fliessen
    AnrufVerbunden { peer_id: PeerId },
    /// Gegenseite hat den Anruf abgelehnt
    AnrufAbgelehnt { peer_id: PeerId },
    /// Anruf beendet (Auflegen, Disconnect, Verbindungsverlust)
    AnrufBeendet {
        peer_id: Option<PeerId>,
        grund: String,
    },
    /// Anruf fehlgeschlagen (Medien, SDP, Transport)
    AnrufFehlgeschlagen { fehler: String },

    // --- Medien-Ereignisse ---
    /// Remote-Track eingetroffen
    RemoteTrack { peer_id: PeerId, kind: TrackKind },
    /// Rauschunterdrueckung nicht verfuegbar, Anrufe laufen unbearbeitet
    SuppressorDegradiert { grund: String },
}
