//! Dispatcher-Tests: eine Nachricht, ein Zustandsuebergang

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tincan_audio::{
    AudioContext, AudioContextConfig, AudioPipeline, AudioResult, CaptureConstraints, MediaSource,
    MediaStream, MediaTrack,
};
use tincan_call::{
    AnrufZustand, CallDecider, CallEngine, CallResult, LinkEvent, PeerLink, PeerLinkFactory,
    SignalisierungsZustand, TrackSender,
};
use tincan_core::types::{Peer, PeerId, TrackId, TrackKind};
use tincan_protocol::{IceCandidate, SessionDescription, SignalMessage, User};
use tincan_signaling::{PresenceRoster, SignalDispatcher};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Minimale Fakes
// ---------------------------------------------------------------------------

struct StummerSender {
    id: u64,
    kind: TrackKind,
    gebunden: parking_lot::Mutex<TrackId>,
}

#[async_trait]
impl TrackSender for StummerSender {
    fn sender_id(&self) -> u64 {
        self.id
    }
    fn kind(&self) -> TrackKind {
        self.kind
    }
    fn gebundener_track(&self) -> Option<TrackId> {
        Some(*self.gebunden.lock())
    }
    async fn replace_track(&self, track: Arc<MediaTrack>) -> CallResult<()> {
        *self.gebunden.lock() = track.id();
        Ok(())
    }
}

#[derive(Default)]
struct StummerLink {
    naechste_id: AtomicU64,
    sender: parking_lot::Mutex<Vec<Arc<StummerSender>>>,
}

#[async_trait]
impl PeerLink for StummerLink {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        Ok(SessionDescription::offer("sdp-angebot"))
    }
    async fn create_answer(&self) -> CallResult<SessionDescription> {
        Ok(SessionDescription::answer("sdp-antwort"))
    }
    async fn set_local_description(&self, _: SessionDescription) -> CallResult<()> {
        Ok(())
    }
    async fn set_remote_description(&self, _: SessionDescription) -> CallResult<()> {
        Ok(())
    }
    async fn add_ice_candidate(&self, _: IceCandidate) -> CallResult<()> {
        Ok(())
    }
    async fn add_recv_transceivers(&self) -> CallResult<()> {
        Ok(())
    }
    async fn add_track(&self, track: Arc<MediaTrack>) -> CallResult<Arc<dyn TrackSender>> {
        let sender = Arc::new(StummerSender {
            id: self.naechste_id.fetch_add(1, Ordering::SeqCst),
            kind: track.kind(),
            gebunden: parking_lot::Mutex::new(track.id()),
        });
        self.sender.lock().push(Arc::clone(&sender));
        Ok(sender)
    }
    async fn remove_track(&self, sender: &dyn TrackSender) -> CallResult<()> {
        self.sender.lock().retain(|s| s.id != sender.sender_id());
        Ok(())
    }
    async fn senders(&self) -> Vec<Arc<dyn TrackSender>> {
        self.sender
            .lock()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TrackSender>)
            .collect()
    }
    fn signaling_state(&self) -> SignalisierungsZustand {
        SignalisierungsZustand::Stabil
    }
    async fn close(&self) -> CallResult<()> {
        Ok(())
    }
}

struct StummeFactory;

#[async_trait]
impl PeerLinkFactory for StummeFactory {
    async fn erstellen(
        &self,
    ) -> CallResult<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>)> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok((Arc::new(StummerLink::default()), rx))
    }
}

struct StummeQuelle;

#[async_trait]
impl MediaSource for StummeQuelle {
    async fn acquire(&self, _: &CaptureConstraints) -> AudioResult<MediaStream> {
        let (_w, audio) = MediaTrack::neu(TrackKind::Audio, "stumm");
        Ok(MediaStream::neu(vec![audio]))
    }
}

struct ImmerAnnehmen;

#[async_trait]
impl CallDecider for ImmerAnnehmen {
    async fn entscheiden(&self, _: &Peer) -> bool {
        true
    }
}

fn engine_bauen() -> (Arc<CallEngine>, mpsc::UnboundedReceiver<SignalMessage>) {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let pipeline = Arc::new(AudioPipeline::neu(
        AudioContext::neu(AudioContextConfig::default()),
        None,
    ));
    let engine = CallEngine::neu(
        signal_tx,
        Arc::new(StummeFactory),
        Arc::new(StummeQuelle),
        pipeline,
        Arc::new(ImmerAnnehmen),
        CaptureConstraints::nur_audio(),
    );
    (engine, signal_rx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registered_setzt_eigene_kennung() {
    let (engine, _rx) = engine_bauen();
    let roster = PresenceRoster::neu();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), roster.clone());

    dispatcher
        .verarbeiten(SignalMessage::Registered {
            socket_id: PeerId::neu("sock-ich"),
        })
        .await;

    assert_eq!(engine.eigene_id(), Some(PeerId::neu("sock-ich")));
    assert_eq!(roster.eigene_id(), Some(PeerId::neu("sock-ich")));
}

#[tokio::test]
async fn active_users_aktualisiert_roster_ohne_eigenen_eintrag() {
    let (engine, _rx) = engine_bauen();
    let roster = PresenceRoster::neu();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), roster.clone());
    let mut events = engine.events_abonnieren();

    dispatcher
        .verarbeiten(SignalMessage::Registered {
            socket_id: PeerId::neu("sock-ich"),
        })
        .await;
    let _ = events.try_recv();

    dispatcher
        .verarbeiten(SignalMessage::ActiveUsers(vec![
            User {
                user_id: "ich".into(),
                socket_id: PeerId::neu("sock-ich"),
            },
            User {
                user_id: "bob".into(),
                socket_id: PeerId::neu("sock-b"),
            },
        ]))
        .await;

    assert_eq!(roster.anzahl(), 1);
    match events.try_recv() {
        Ok(tincan_core::CallEvent::RosterAktualisiert { peers }) => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].display_name, "bob");
        }
        andere => panic!("RosterAktualisiert erwartet, war {:?}", andere),
    }
}

#[tokio::test]
async fn call_received_nimmt_namen_aus_dem_roster() {
    let (engine, _rx) = engine_bauen();
    let roster = PresenceRoster::neu();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), roster.clone());
    let mut events = engine.events_abonnieren();

    dispatcher
        .verarbeiten(SignalMessage::ActiveUsers(vec![User {
            user_id: "alice".into(),
            socket_id: PeerId::neu("sock-a"),
        }]))
        .await;
    let _ = events.try_recv();

    dispatcher
        .verarbeiten(SignalMessage::CallReceived {
            from: PeerId::neu("sock-a"),
            offer: SessionDescription::offer("sdp-angebot"),
        })
        .await;

    // Annahme lief durch, Event traegt den Anzeigenamen
    assert_eq!(engine.session().zustand(), AnrufZustand::Verbunden);
    match events.try_recv() {
        Ok(tincan_core::CallEvent::EingehenderAnruf { von }) => {
            assert_eq!(von.display_name, "alice");
        }
        andere => panic!("EingehenderAnruf erwartet, war {:?}", andere),
    }
}

#[tokio::test]
async fn user_disconnected_beendet_laufenden_anruf() {
    let (engine, _rx) = engine_bauen();
    let roster = PresenceRoster::neu();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), roster.clone());

    dispatcher
        .verarbeiten(SignalMessage::CallReceived {
            from: PeerId::neu("sock-a"),
            offer: SessionDescription::offer("sdp-angebot"),
        })
        .await;
    assert_eq!(engine.session().zustand(), AnrufZustand::Verbunden);

    dispatcher
        .verarbeiten(SignalMessage::UserDisconnected {
            socket_id: PeerId::neu("sock-a"),
        })
        .await;

    assert_eq!(engine.session().zustand(), AnrufZustand::Geschlossen);
    assert_eq!(roster.anzahl(), 0);
}

#[tokio::test]
async fn ausgehende_nachrichtentypen_werden_verworfen() {
    let (engine, _rx) = engine_bauen();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), PresenceRoster::neu());

    // Darf nichts tun ausser loggen
    dispatcher
        .verarbeiten(SignalMessage::Register {
            user_id: "alice".into(),
            socket_id: None,
        })
        .await;
    assert_eq!(engine.session().zustand(), AnrufZustand::Leerlauf);
}
