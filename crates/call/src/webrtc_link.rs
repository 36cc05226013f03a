//! WebRtcLink – Produktive PeerLink-Implementierung
//!
//! Kapselt eine `RTCPeerConnection` aus dem webrtc-Crate. Ausgehende
//! Tracks werden pro Sender von einer Pumpe gespeist: PCM-Frames aus
//! der Track-Pipe werden Opus-kodiert und als Samples geschrieben,
//! Video-Payloads gehen unveraendert durch. Eingehende Tracks werden
//! RTP-gelesen, Audio dekodiert und als `MediaTrack` an die
//! Zustandsmaschine gereicht.

use crate::error::{CallError, CallResult};
use crate::link::{
    IceConfig, IceZustand, LinkEvent, LinkZustand, PeerLink, PeerLinkFactory,
    SignalisierungsZustand, TrackSender,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tincan_audio::{
    AudioError, AudioFrame, MediaFrame, MediaTrack, MediaTrackWriter, OpusDecoder, OpusEncoder,
    VideoFrame,
};
use tincan_core::types::{TrackId, TrackKind};
use tincan_protocol::{IceCandidate, SdpKind, SessionDescription};
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Abtastrate der Audio-Naht (Opus dekodiert immer zu 48kHz)
const SAMPLE_RATE: u32 = 48_000;

fn webrtc_fehler(e: webrtc::Error) -> CallError {
    CallError::Verhandlung(e.to_string())
}

fn nach_rtc(desc: &SessionDescription) -> CallResult<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    }
    .map_err(|e| CallError::Verhandlung(format!("SDP ungueltig: {}", e)))
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Erzeugt pro Anruf eine frische RTCPeerConnection
pub struct WebRtcLinkFactory {
    ice: IceConfig,
}

impl WebRtcLinkFactory {
    pub fn neu(ice: IceConfig) -> Self {
        Self { ice }
    }
}

#[async_trait]
impl PeerLinkFactory for WebRtcLinkFactory {
    async fn erstellen(
        &self,
    ) -> CallResult<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>)> {
        let (link, events) = WebRtcLink::neu(&self.ice).await?;
        Ok((link as Arc<dyn PeerLink>, events))
    }
}

// ---------------------------------------------------------------------------
// WebRtcLink
// ---------------------------------------------------------------------------

/// PeerLink ueber eine echte RTCPeerConnection
pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    sender: tokio::sync::Mutex<Vec<Arc<WebRtcTrackSender>>>,
    naechste_sender_id: AtomicU64,
}

impl WebRtcLink {
    /// Baut die Peer-Verbindung auf und registriert alle Handler
    pub async fn neu(
        ice: &IceConfig,
    ) -> CallResult<(Arc<Self>, mpsc::UnboundedReceiver<LinkEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(webrtc_fehler)?;
        let mut registry = Registry::new();
        registry =
            register_default_interceptors(registry, &mut media_engine).map_err(webrtc_fehler)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice.stun_server.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await.map_err(webrtc_fehler)?);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Lokale ICE-Kandidaten (Trickle)
        let tx = event_tx.clone();
        pc.on_ice_candidate(Box::new(move |kandidat: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let Some(kandidat) = kandidat else {
                    tracing::debug!("ICE-Sammlung abgeschlossen");
                    return;
                };
                match kandidat.to_json() {
                    Ok(init) => {
                        let _ = tx.send(LinkEvent::LokalerKandidat(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }));
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Lokaler Kandidat nicht serialisierbar");
                    }
                }
            })
        }));

        // Verbindungszustand
        let tx = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |zustand: RTCPeerConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                let z = match zustand {
                    RTCPeerConnectionState::New => LinkZustand::Neu,
                    RTCPeerConnectionState::Connecting => LinkZustand::Verbindet,
                    RTCPeerConnectionState::Connected => LinkZustand::Verbunden,
                    RTCPeerConnectionState::Disconnected => LinkZustand::Getrennt,
                    RTCPeerConnectionState::Failed => LinkZustand::Fehlgeschlagen,
                    RTCPeerConnectionState::Closed => LinkZustand::Geschlossen,
                    _ => return,
                };
                let _ = tx.send(LinkEvent::Verbindungszustand(z));
            })
        }));

        // ICE-Verbindungszustand
        let tx = event_tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |zustand: RTCIceConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                let z = match zustand {
                    RTCIceConnectionState::New => IceZustand::Neu,
                    RTCIceConnectionState::Checking => IceZustand::Prueft,
                    RTCIceConnectionState::Connected => IceZustand::Verbunden,
                    RTCIceConnectionState::Completed => IceZustand::Abgeschlossen,
                    RTCIceConnectionState::Disconnected => IceZustand::Getrennt,
                    RTCIceConnectionState::Failed => IceZustand::Fehlgeschlagen,
                    RTCIceConnectionState::Closed => IceZustand::Geschlossen,
                    _ => return,
                };
                let _ = tx.send(LinkEvent::Ice(z));
            })
        }));

        // Eingehende Tracks
        let tx = event_tx.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let tx = tx.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                tracing::info!(kind = %kind, "Remote-Track empfangen");
                let (writer, media_track) = MediaTrack::neu(kind, "remote");
                let _ = tx.send(LinkEvent::RemoteTrack {
                    track: Arc::clone(&media_track),
                });
                tokio::spawn(remote_track_pumpe(track, writer, kind));
            })
        }));

        Ok((
            Arc::new(Self {
                pc,
                sender: tokio::sync::Mutex::new(Vec::new()),
                naechste_sender_id: AtomicU64::new(1),
            }),
            event_rx,
        ))
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> CallResult<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(webrtc_fehler)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        let answer = self.pc.create_answer(None).await.map_err(webrtc_fehler)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> CallResult<()> {
        self.pc
            .set_local_description(nach_rtc(&desc)?)
            .await
            .map_err(webrtc_fehler)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> CallResult<()> {
        self.pc
            .set_remote_description(nach_rtc(&desc)?)
            .await
            .map_err(webrtc_fehler)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| CallError::IceAnwendung(e.to_string()))
    }

    async fn add_recv_transceivers(&self) -> CallResult<()> {
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            self.pc
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(webrtc_fehler)?;
        }
        Ok(())
    }

    async fn add_track(&self, track: Arc<MediaTrack>) -> CallResult<Arc<dyn TrackSender>> {
        let statisch = lokalen_track_bauen(&track);
        let rtp_sender = self
            .pc
            .add_track(Arc::clone(&statisch) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(webrtc_fehler)?;

        let pumpe = pumpe_starten(Arc::clone(&track), statisch)?;
        let sender = Arc::new(WebRtcTrackSender {
            id: self.naechste_sender_id.fetch_add(1, Ordering::Relaxed),
            kind: track.kind(),
            rtp_sender,
            aktiv: parking_lot::Mutex::new(AktiverTrack {
                track_id: track.id(),
                pumpe,
            }),
        });

        self.sender.lock().await.push(Arc::clone(&sender));
        tracing::debug!(kind = %track.kind(), track = %track.id(), "Track gebunden");
        Ok(sender)
    }

    async fn remove_track(&self, sender: &dyn TrackSender) -> CallResult<()> {
        let mut liste = self.sender.lock().await;
        let Some(pos) = liste.iter().position(|s| s.id == sender.sender_id()) else {
            return Ok(());
        };
        let s = liste.remove(pos);
        drop(liste);

        s.aktiv.lock().pumpe.abort();
        self.pc.remove_track(&s.rtp_sender).await.map_err(webrtc_fehler)
    }

    async fn senders(&self) -> Vec<Arc<dyn TrackSender>> {
        self.sender
            .lock()
            .await
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn TrackSender>)
            .collect()
    }

    fn signaling_state(&self) -> SignalisierungsZustand {
        match self.pc.signaling_state() {
            RTCSignalingState::Stable => SignalisierungsZustand::Stabil,
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalisierungsZustand::LokalesAngebot
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalisierungsZustand::RemoteAngebot
            }
            RTCSignalingState::Closed => SignalisierungsZustand::Geschlossen,
            _ => SignalisierungsZustand::Stabil,
        }
    }

    async fn close(&self) -> CallResult<()> {
        for s in self.sender.lock().await.drain(..) {
            s.aktiv.lock().pumpe.abort();
        }
        self.pc.close().await.map_err(webrtc_fehler)
    }
}

// ---------------------------------------------------------------------------
// Sender & Pumpen
// ---------------------------------------------------------------------------

struct AktiverTrack {
    track_id: TrackId,
    pumpe: tokio::task::JoinHandle<()>,
}

/// Ein gebundener ausgehender Track samt Pumpe
pub struct WebRtcTrackSender {
    id: u64,
    kind: TrackKind,
    rtp_sender: Arc<RTCRtpSender>,
    aktiv: parking_lot::Mutex<AktiverTrack>,
}

#[async_trait]
impl TrackSender for WebRtcTrackSender {
    fn sender_id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn gebundener_track(&self) -> Option<TrackId> {
        Some(self.aktiv.lock().track_id)
    }

    async fn replace_track(&self, track: Arc<MediaTrack>) -> CallResult<()> {
        if track.kind() != self.kind {
            return Err(CallError::Verhandlung(format!(
                "Track-Art {} passt nicht zum {}-Sender",
                track.kind(),
                self.kind
            )));
        }

        let statisch = lokalen_track_bauen(&track);
        let pumpe = pumpe_starten(Arc::clone(&track), Arc::clone(&statisch))?;

        if let Err(e) = self
            .rtp_sender
            .replace_track(Some(statisch as Arc<dyn TrackLocal + Send + Sync>))
            .await
        {
            pumpe.abort();
            return Err(CallError::Verhandlung(format!(
                "replace_track fehlgeschlagen: {}",
                e
            )));
        }

        let alte = {
            let mut aktiv = self.aktiv.lock();
            aktiv.track_id = track.id();
            std::mem::replace(&mut aktiv.pumpe, pumpe)
        };
        alte.abort();

        tracing::debug!(kind = %self.kind, track = %track.id(), "Track ersetzt");
        Ok(())
    }
}

/// Baut den statischen Sample-Track zum MediaTrack
fn lokalen_track_bauen(track: &Arc<MediaTrack>) -> Arc<TrackLocalStaticSample> {
    let caps = match track.kind() {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: SAMPLE_RATE,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90_000,
            ..Default::default()
        },
    };
    Arc::new(TrackLocalStaticSample::new(
        caps,
        track.id().inner().to_string(),
        "tincan".to_owned(),
    ))
}

/// Startet die Pumpe: Frame-Pipe -> (Opus) -> write_sample
fn pumpe_starten(
    track: Arc<MediaTrack>,
    ziel: Arc<TrackLocalStaticSample>,
) -> CallResult<tokio::task::JoinHandle<()>> {
    let mut frames = track
        .frames_uebernehmen()
        .ok_or(CallError::Audio(AudioError::TrackBelegt.to_string()))?;
    let kind = track.kind();

    Ok(tokio::spawn(async move {
        let mut encoder = match kind {
            TrackKind::Audio => match OpusEncoder::neu(SAMPLE_RATE, 1) {
                Ok(enc) => Some(enc),
                Err(e) => {
                    tracing::error!(fehler = %e, "Opus-Encoder nicht erstellbar, Pumpe endet");
                    return;
                }
            },
            TrackKind::Video => None,
        };

        while let Some(frame) = frames.recv().await {
            let sample = match frame {
                MediaFrame::Audio(audio) => {
                    let Some(enc) = encoder.as_mut() else { continue };
                    if audio.samples.len() != enc.frame_size() * audio.channels as usize {
                        tracing::trace!(
                            laenge = audio.samples.len(),
                            "Frame passt nicht zur Opus-Frame-Groesse, verworfen"
                        );
                        continue;
                    }
                    let dauer = audio.dauer();
                    match enc.encode(&audio.samples) {
                        Ok(bytes) => Sample {
                            data: bytes.into(),
                            duration: dauer,
                            ..Default::default()
                        },
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Opus-Encode fehlgeschlagen");
                            continue;
                        }
                    }
                }
                MediaFrame::Video(video) => Sample {
                    data: video.data,
                    duration: video.duration,
                    ..Default::default()
                },
            };

            if let Err(e) = ziel.write_sample(&sample).await {
                tracing::debug!(fehler = %e, "write_sample fehlgeschlagen, Pumpe endet");
                break;
            }
        }
        tracing::debug!(kind = %kind, "Track-Pumpe beendet");
    }))
}

/// Liest RTP vom Remote-Track und speist die MediaTrack-Pipe
async fn remote_track_pumpe(track: Arc<TrackRemote>, writer: MediaTrackWriter, kind: TrackKind) {
    let mut decoder = match kind {
        TrackKind::Audio => match OpusDecoder::neu(SAMPLE_RATE, 1) {
            Ok(dec) => Some(dec),
            Err(e) => {
                tracing::warn!(fehler = %e, "Opus-Decoder nicht erstellbar, Audio bleibt roh");
                None
            }
        },
        TrackKind::Video => None,
    };

    loop {
        let (paket, _) = match track.read_rtp().await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(fehler = %e, "RTP-Lesen beendet");
                break;
            }
        };
        if paket.payload.is_empty() {
            continue;
        }

        let frame = match (kind, decoder.as_mut()) {
            (TrackKind::Audio, Some(dec)) => match dec.decode(&paket.payload) {
                Ok(samples) => MediaFrame::Audio(AudioFrame {
                    samples,
                    sample_rate: SAMPLE_RATE,
                    channels: 1,
                }),
                Err(e) => {
                    tracing::warn!(fehler = %e, "Opus-Decode fehlgeschlagen, PLC");
                    match dec.decode_plc() {
                        Ok(samples) => MediaFrame::Audio(AudioFrame {
                            samples,
                            sample_rate: SAMPLE_RATE,
                            channels: 1,
                        }),
                        Err(_) => continue,
                    }
                }
            },
            // Ohne Decoder sind Audio-Payloads wertlos
            (TrackKind::Audio, None) => continue,
            (TrackKind::Video, _) => MediaFrame::Video(VideoFrame {
                data: paket.payload.clone(),
                duration: Duration::from_millis(33),
            }),
        };

        match writer.schreiben(frame) {
            Ok(()) => {}
            Err(AudioError::PufferVoll) => {
                tracing::trace!("Remote-Pipe voll, Frame verworfen");
            }
            Err(_) => break,
        }
    }
    tracing::debug!(kind = %kind, "Remote-Track-Pumpe beendet");
}
