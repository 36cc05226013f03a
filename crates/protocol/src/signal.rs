//! Signaling-Nachrichten (Relay-Verbindung)
//!
//! Definiert alle Nachrichten die ueber die persistente Relay-Verbindung
//! zwischen den Clients ausgetauscht werden.
//!
//! ## Design
//! - Tagged Enum: `{"type": "...", "payload": {...}}` – ein Nachrichtentyp
//!   pro Zustandsuebergang der Anruf-Maschine
//! - JSON-Serialisierung via serde (Signalisierung, nicht zeitkritisch)
//! - Zustellung ist weder garantiert noch dedupliziert – alle Handler
//!   muessen Verlust und Duplikate tolerieren (idempotent sein)
//! - Richtungsabhaengige Felder (`to` beim Senden, `from` beim Empfang,
//!   das Relay schreibt um) sind optional modelliert

use serde::{Deserialize, Serialize};
use tincan_core::types::PeerId;

// ---------------------------------------------------------------------------
// Payload-Typen
// ---------------------------------------------------------------------------

/// Eintrag im Presence-Roster des Relays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Selbstgewaehlter Anzeigename
    pub user_id: String,
    /// Vom Relay vergebene Sitzungskennung
    pub socket_id: PeerId,
}

/// Art einer Sitzungsbeschreibung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// SDP-Angebot oder -Antwort
///
/// Wire-Format entspricht dem Browser-`RTCSessionDescription`-JSON:
/// `{"type": "offer"|"answer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Ein ICE-Kandidat (entdeckter Netzwerkpfad)
///
/// Wire-Format entspricht dem Browser-`RTCIceCandidateInit`-JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

// ---------------------------------------------------------------------------
// Signaling-Nachrichten
// ---------------------------------------------------------------------------

/// Alle Nachrichten der Relay-Verbindung
///
/// Jede eingehende Nachricht entspricht genau einem Uebergang der
/// Anruf-Zustandsmaschine; unerwartete Nachrichten werden dort geloggt
/// und verworfen statt implizit ignoriert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Client -> Relay: Identitaet anmelden (nach jedem Connect erneut!)
    Register {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket_id: Option<PeerId>,
    },

    /// Relay -> Client: Anmeldung bestaetigt, Sitzungskennung zugewiesen
    Registered { socket_id: PeerId },

    /// Relay -> Client: aktuelles Presence-Roster
    ActiveUsers(Vec<User>),

    /// Client -> Relay -> Client: Anruf mit SDP-Angebot
    CallUser {
        to: PeerId,
        offer: SessionDescription,
    },

    /// Relay -> Client: eingehender Anruf
    CallReceived {
        from: PeerId,
        offer: SessionDescription,
    },

    /// Anruf angenommen, SDP-Antwort (`to` beim Senden, `from` beim Empfang)
    CallAccepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
        answer: SessionDescription,
    },

    /// Anruf abgelehnt
    CallRejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
    },

    /// ICE-Kandidat (Trickle)
    #[serde(rename = "ice-candidate")]
    Candidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
        candidate: IceCandidate,
    },

    /// Anruf beendet (Auflegen)
    EndCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<PeerId>,
    },

    /// Relay -> Client: ein Teilnehmer hat die Verbindung verloren
    UserDisconnected { socket_id: PeerId },

    /// Anruf fehlgeschlagen (`to` beim Senden, `error` beim Empfang)
    CallFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl SignalMessage {
    /// Wire-Name des Nachrichtentyps (fuer Logging)
    pub fn typ_name(&self) -> &'static str {
        match self {
            SignalMessage::Register { .. } => "register",
            SignalMessage::Registered { .. } => "registered",
            SignalMessage::ActiveUsers(_) => "active-users",
            SignalMessage::CallUser { .. } => "call-user",
            SignalMessage::CallReceived { .. } => "call-received",
            SignalMessage::CallAccepted { .. } => "call-accepted",
            SignalMessage::CallRejected { .. } => "call-rejected",
            SignalMessage::Candidate { .. } => "ice-candidate",
            SignalMessage::EndCall { .. } => "end-call",
            SignalMessage::UserDisconnected { .. } => "user-disconnected",
            SignalMessage::CallFailed { .. } => "call-failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_namen_stimmen() {
        let msg = SignalMessage::CallUser {
            to: PeerId::neu("sock-b"),
            offer: SessionDescription::offer("v=0"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "call-user");
        assert_eq!(json["payload"]["offer"]["type"], "offer");

        let msg = SignalMessage::Candidate {
            to: Some(PeerId::neu("sock-b")),
            from: None,
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["payload"]["candidate"]["sdpMid"], "0");
        assert_eq!(json["payload"]["candidate"]["sdpMLineIndex"], 0);
    }

    #[test]
    fn alle_typ_namen_rundlauf() {
        let nachrichten = vec![
            SignalMessage::Register {
                user_id: "alice".into(),
                socket_id: None,
            },
            SignalMessage::Registered {
                socket_id: PeerId::neu("s1"),
            },
            SignalMessage::ActiveUsers(vec![User {
                user_id: "bob".into(),
                socket_id: PeerId::neu("s2"),
            }]),
            SignalMessage::CallRejected {
                to: None,
                from: Some(PeerId::neu("s2")),
            },
            SignalMessage::EndCall {
                to: Some(PeerId::neu("s2")),
                from: None,
            },
            SignalMessage::UserDisconnected {
                socket_id: PeerId::neu("s2"),
            },
            SignalMessage::CallFailed {
                to: None,
                error: Some("kaputt".into()),
            },
        ];

        for msg in nachrichten {
            let json = serde_json::to_string(&msg).unwrap();
            let zurueck: SignalMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(msg, zurueck);
            assert!(json.contains(msg.typ_name()));
        }
    }

    #[test]
    fn eingehende_nachricht_mit_from() {
        // So schreibt das Relay eine weitergeleitete Antwort um
        let json = r#"{
            "type": "call-accepted",
            "payload": {
                "from": "sock-b",
                "answer": {"type": "answer", "sdp": "v=0"}
            }
        }"#;
        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        match msg {
            SignalMessage::CallAccepted { from, to, answer } => {
                assert_eq!(from, Some(PeerId::neu("sock-b")));
                assert_eq!(to, None);
                assert_eq!(answer.kind, SdpKind::Answer);
            }
            other => panic!("Falsche Variante: {:?}", other),
        }
    }

    #[test]
    fn unbekannter_typ_ist_fehler() {
        let json = r#"{"type": "kaffee-kochen", "payload": {}}"#;
        assert!(serde_json::from_str::<SignalMessage>(json).is_err());
    }
}
