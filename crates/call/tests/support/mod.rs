//! Geskriptete Fakes fuer die Engine- und Binding-Tests
//!
//! `FakeLink` zeichnet alle Link-Operationen in Reihenfolge auf und
//! laesst sich gezielt scheitern lassen; `FakeQuelle` liefert Streams
//! ohne echte Geraete.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tincan_audio::{
    AudioContext, AudioContextConfig, AudioError, AudioPipeline, AudioResult, CaptureConstraints,
    MediaSource, MediaStream, MediaTrack, MediaTrackWriter,
};
use tincan_call::{
    CallDecider, CallEngine, CallError, CallResult, LinkEvent, PeerLink, PeerLinkFactory,
    SignalisierungsZustand, TrackSender,
};
use tincan_core::types::{Peer, TrackId, TrackKind};
use tincan_protocol::{IceCandidate, SessionDescription, SignalMessage};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// FakeSender
// ---------------------------------------------------------------------------

pub struct FakeSender {
    id: u64,
    kind: TrackKind,
    pub gebunden: parking_lot::Mutex<TrackId>,
    pub ersatz_schlaegt_fehl: AtomicBool,
    pub ersetzungen: AtomicUsize,
}

impl FakeSender {
    pub fn neu(id: u64, kind: TrackKind, track: TrackId) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            gebunden: parking_lot::Mutex::new(track),
            ersatz_schlaegt_fehl: AtomicBool::new(false),
            ersetzungen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TrackSender for FakeSender {
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
        if self.ersatz_schlaegt_fehl.load(Ordering::SeqCst) {
            return Err(CallError::Verhandlung("Track abgelaufen".into()));
        }
        *self.gebunden.lock() = track.id();
        self.ersetzungen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeLink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLink {
    pub lokale_beschreibungen: parking_lot::Mutex<Vec<SessionDescription>>,
    pub remote_beschreibungen: parking_lot::Mutex<Vec<SessionDescription>>,
    /// Angewendete Kandidaten, in Anwendungs-Reihenfolge
    pub kandidaten: parking_lot::Mutex<Vec<IceCandidate>>,
    pub sender_liste: parking_lot::Mutex<Vec<Arc<FakeSender>>>,
    pub signaling: parking_lot::Mutex<Option<SignalisierungsZustand>>,
    pub recv_transceiver: AtomicUsize,
    pub entfernte_sender: AtomicUsize,
    pub geschlossen: AtomicBool,
    pub fehler_bei_set_remote: AtomicBool,
    pub fehler_bei_offer: AtomicBool,
    naechste_sender_id: AtomicU64,
    angebote: AtomicUsize,
}

impl FakeLink {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self {
            naechste_sender_id: AtomicU64::new(1),
            ..Default::default()
        })
    }

    pub fn signaling_setzen(&self, zustand: SignalisierungsZustand) {
        *self.signaling.lock() = Some(zustand);
    }

    pub fn sender_mit_kind(&self, kind: TrackKind) -> Option<Arc<FakeSender>> {
        self.sender_liste
            .lock()
            .iter()
            .find(|s| s.kind == kind)
            .cloned()
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        if self.fehler_bei_offer.load(Ordering::SeqCst) {
            return Err(CallError::Verhandlung("create_offer fehlgeschlagen".into()));
        }
        let n = self.angebote.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!("sdp-angebot-{}", n)))
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        Ok(SessionDescription::answer("sdp-antwort"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> CallResult<()> {
        self.lokale_beschreibungen.lock().push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> CallResult<()> {
        if self.fehler_bei_set_remote.load(Ordering::SeqCst) {
            return Err(CallError::Verhandlung("SDP nicht anwendbar".into()));
        }
        self.remote_beschreibungen.lock().push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        if candidate.candidate == "defekt" {
            return Err(CallError::IceAnwendung("Kandidat defekt".into()));
        }
        self.kandidaten.lock().push(candidate);
        Ok(())
    }

    async fn add_recv_transceivers(&self) -> CallResult<()> {
        self.recv_transceiver.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_track(&self, track: Arc<MediaTrack>) -> CallResult<Arc<dyn TrackSender>> {
        let sender = FakeSender::neu(
            self.naechste_sender_id.fetch_add(1, Ordering::SeqCst),
            track.kind(),
            track.id(),
        );
        self.sender_liste.lock().push(Arc::clone(&sender));
        Ok(sender)
    }

    async fn remove_track(&self, sender: &dyn TrackSender) -> CallResult<()> {
        self.sender_liste
            .lock()
            .retain(|s| s.id != sender.sender_id());
        self.entfernte_sender.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn senders(&self) -> Vec<Arc<dyn TrackSender>> {
        self.sender_liste
            .lock()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TrackSender>)
            .collect()
    }

    fn signaling_state(&self) -> SignalisierungsZustand {
        self.signaling
            .lock()
            .unwrap_or(SignalisierungsZustand::Stabil)
    }

    async fn close(&self) -> CallResult<()> {
        self.geschlossen.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeLinkFactory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLinkFactory {
    pub links: parking_lot::Mutex<Vec<Arc<FakeLink>>>,
    pub event_sender: parking_lot::Mutex<Vec<mpsc::UnboundedSender<LinkEvent>>>,
    pub fehler: AtomicBool,
}

impl FakeLinkFactory {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn link(&self, index: usize) -> Arc<FakeLink> {
        Arc::clone(&self.links.lock()[index])
    }

    pub fn letzter_link(&self) -> Arc<FakeLink> {
        Arc::clone(self.links.lock().last().expect("kein Link erstellt"))
    }

    /// Speist ein Link-Ereignis in die Event-Schleife der Engine
    pub fn ereignis(&self, index: usize, event: LinkEvent) {
        let _ = self.event_sender.lock()[index].send(event);
    }
}

#[async_trait]
impl PeerLinkFactory for FakeLinkFactory {
    async fn erstellen(
        &self,
    ) -> CallResult<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>)> {
        if self.fehler.load(Ordering::SeqCst) {
            return Err(CallError::Verhandlung("Factory scheitert".into()));
        }
        let link = FakeLink::neu();
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().push(Arc::clone(&link));
        self.event_sender.lock().push(tx);
        Ok((link, rx))
    }
}

// ---------------------------------------------------------------------------
// FakeQuelle & Entscheider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeQuelle {
    pub aufrufe: AtomicUsize,
    pub fehler: AtomicBool,
    /// Writer am Leben halten, sonst schliessen die Pipes sofort
    produzenten: parking_lot::Mutex<Vec<MediaTrackWriter>>,
    streams: parking_lot::Mutex<Vec<MediaStream>>,
}

impl FakeQuelle {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn letzter_stream(&self) -> Option<MediaStream> {
        self.streams.lock().last().cloned()
    }
}

#[async_trait]
impl MediaSource for FakeQuelle {
    async fn acquire(&self, constraints: &CaptureConstraints) -> AudioResult<MediaStream> {
        self.aufrufe.fetch_add(1, Ordering::SeqCst);
        if self.fehler.load(Ordering::SeqCst) {
            return Err(AudioError::Erfassung("Mikrofon verweigert".into()));
        }

        let (wa, audio) = MediaTrack::neu(TrackKind::Audio, "fake-mikro");
        let mut tracks = vec![audio];
        let mut produzenten = vec![wa];
        if constraints.video.is_some() {
            let (wv, video) = MediaTrack::neu(TrackKind::Video, "fake-kamera");
            tracks.push(video);
            produzenten.push(wv);
        }

        let stream = MediaStream::neu(tracks);
        self.produzenten.lock().extend(produzenten);
        self.streams.lock().push(stream.clone());
        Ok(stream)
    }
}

/// Entscheider mit fester Antwort
pub struct FesteEntscheidung(pub bool);

#[async_trait]
impl CallDecider for FesteEntscheidung {
    async fn entscheiden(&self, _von: &Peer) -> bool {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Testumgebung
// ---------------------------------------------------------------------------

pub struct TestUmgebung {
    pub engine: Arc<CallEngine>,
    pub signal_rx: mpsc::UnboundedReceiver<SignalMessage>,
    pub factory: Arc<FakeLinkFactory>,
    pub quelle: Arc<FakeQuelle>,
}

impl TestUmgebung {
    /// Naechste ausgehende Signalnachricht (ohne zu warten)
    pub fn naechste_nachricht(&mut self) -> Option<SignalMessage> {
        self.signal_rx.try_recv().ok()
    }

    /// Alle anliegenden ausgehenden Nachrichten
    pub fn alle_nachrichten(&mut self) -> Vec<SignalMessage> {
        let mut liste = Vec::new();
        while let Ok(msg) = self.signal_rx.try_recv() {
            liste.push(msg);
        }
        liste
    }
}

/// Baut eine Engine mit Fakes und degradierter Pipeline
pub fn umgebung(annehmen: bool) -> TestUmgebung {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let factory = FakeLinkFactory::neu();
    let quelle = FakeQuelle::neu();
    let pipeline = Arc::new(AudioPipeline::neu(
        AudioContext::neu(AudioContextConfig::default()),
        None,
    ));

    let engine = CallEngine::neu(
        signal_tx,
        Arc::clone(&factory) as Arc<dyn PeerLinkFactory>,
        Arc::clone(&quelle) as Arc<dyn MediaSource>,
        pipeline,
        Arc::new(FesteEntscheidung(annehmen)),
        CaptureConstraints::audio_und_video(),
    );

    TestUmgebung {
        engine,
        signal_rx,
        factory,
        quelle,
    }
}

/// Ein Kandidat mit durchnummerierter Kennung
pub fn kandidat(n: usize) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2130706431 192.0.2.1 5000{} typ host", n, n),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    }
}
