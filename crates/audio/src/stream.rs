//! Medien-Stream- und Track-Modell
//!
//! Ein `MediaTrack` ist ein Handle auf einen Frame-Fluss mit genau einem
//! Produzenten (`MediaTrackWriter`) und genau einem Konsumenten. Der
//! Konsument uebernimmt die Frame-Pipe per `frames_uebernehmen()` –
//! danach ist der Track "verliehen" und kann nicht erneut konsumiert
//! werden.
//!
//! ## Lebensende
//! `stop()` setzt das Beendet-Flag. Der Produzent sieht das Flag beim
//! naechsten Schreibversuch, stellt die Erzeugung ein und laesst seinen
//! Sender fallen; damit schliesst die Pipe und der Konsument laeuft
//! leer. Kein Abbruch mitten im Frame.

use crate::error::{AudioError, AudioResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tincan_core::types::{StreamId, TrackId, TrackKind};
use tokio::sync::mpsc;

/// Kapazitaet der Frame-Pipe pro Track (bei 20ms-Frames gut 1 Sekunde)
const FRAME_PIPE_KAPAZITAET: usize = 64;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Ein PCM-Audio-Frame (f32, normalisiert -1.0..1.0, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    /// Frame-Dauer aus Sample-Anzahl und Abtastrate
    pub fn dauer(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let samples_pro_kanal = self.samples.len() as u64 / self.channels as u64;
        Duration::from_micros(samples_pro_kanal * 1_000_000 / self.sample_rate as u64)
    }
}

/// Ein bereits kodierter Video-Frame (Payload + Anzeigedauer)
///
/// Video wird unveraendert durchgereicht – die Pipeline bearbeitet nur Audio.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Bytes,
    pub duration: Duration,
}

/// Ein Medien-Frame auf einer Track-Pipe
#[derive(Debug, Clone)]
pub enum MediaFrame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl MediaFrame {
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaFrame::Audio(_) => TrackKind::Audio,
            MediaFrame::Video(_) => TrackKind::Video,
        }
    }
}

// ---------------------------------------------------------------------------
// MediaTrack
// ---------------------------------------------------------------------------

/// Konsumenten-Handle eines Medien-Tracks
///
/// Wird per `Arc` geteilt; die Frame-Pipe selbst hat aber genau einen
/// Konsumenten (Leihgabe-Semantik).
pub struct MediaTrack {
    id: TrackId,
    kind: TrackKind,
    label: String,
    beendet: Arc<AtomicBool>,
    frames: Mutex<Option<mpsc::Receiver<MediaFrame>>>,
}

/// Produzenten-Handle eines Medien-Tracks
pub struct MediaTrackWriter {
    tx: mpsc::Sender<MediaFrame>,
    beendet: Arc<AtomicBool>,
}

impl MediaTrack {
    /// Erstellt ein neues Track-Paar (Produzent, Konsumenten-Handle)
    pub fn neu(kind: TrackKind, label: impl Into<String>) -> (MediaTrackWriter, Arc<MediaTrack>) {
        let (tx, rx) = mpsc::channel(FRAME_PIPE_KAPAZITAET);
        let beendet = Arc::new(AtomicBool::new(false));

        let writer = MediaTrackWriter {
            tx,
            beendet: Arc::clone(&beendet),
        };
        let track = Arc::new(MediaTrack {
            id: TrackId::new(),
            kind,
            label: label.into(),
            beendet,
            frames: Mutex::new(Some(rx)),
        });

        (writer, track)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Uebernimmt die Frame-Pipe (genau ein Konsument)
    ///
    /// Gibt `None` zurueck wenn die Pipe bereits uebernommen wurde.
    pub fn frames_uebernehmen(&self) -> Option<mpsc::Receiver<MediaFrame>> {
        self.frames.lock().take()
    }

    /// Beendet den Track: Produzent stellt ein, Pipe laeuft leer
    pub fn stop(&self) {
        if !self.beendet.swap(true, Ordering::SeqCst) {
            tracing::debug!(track = %self.id, kind = %self.kind, "Track beendet");
        }
        // Nicht uebernommene Pipe verwerfen, damit der Produzent sofort
        // einen geschlossenen Kanal sieht
        self.frames.lock().take();
    }

    pub fn ist_beendet(&self) -> bool {
        self.beendet.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("beendet", &self.ist_beendet())
            .finish()
    }
}

impl MediaTrackWriter {
    /// Schreibt einen Frame in die Pipe
    ///
    /// Bei voller Pipe wird der Frame verworfen (`PufferVoll`) – der
    /// Produzent darf niemals blockieren. Nach `stop()` kommt
    /// `TrackBeendet` zurueck und der Produzent soll sich beenden.
    pub fn schreiben(&self, frame: MediaFrame) -> AudioResult<()> {
        if self.beendet.load(Ordering::SeqCst) {
            return Err(AudioError::TrackBeendet);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(AudioError::PufferVoll),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AudioError::TrackBeendet),
        }
    }

    pub fn ist_beendet(&self) -> bool {
        self.beendet.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// MediaStream
// ---------------------------------------------------------------------------

/// Ein Buendel zusammengehoeriger Tracks (hier: hoechstens ein Audio-
/// und ein Video-Track)
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: StreamId,
    tracks: Vec<Arc<MediaTrack>>,
}

impl MediaStream {
    pub fn neu(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            id: StreamId::new(),
            tracks,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn audio_track(&self) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_track(&self) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == TrackKind::Video)
    }

    /// Beendet alle Tracks des Streams (Hardware-Freigabe)
    pub fn stop_alle(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Derselbe Stream mit einem zusaetzlichen Track
    pub fn mit_track(&self, track: Arc<MediaTrack>) -> MediaStream {
        let mut tracks = self.tracks.clone();
        tracks.push(track);
        MediaStream {
            id: self.id,
            tracks,
        }
    }

    /// Derselbe Stream mit ausgetauschtem Audio-Track
    ///
    /// Behaelt die Stream-ID; der alte Audio-Track gehoert ab jetzt dem
    /// Aufrufer (typisch: dem Verarbeitungsgraphen).
    pub fn mit_audio_ersetzt(&self, audio: Arc<MediaTrack>) -> MediaStream {
        let mut tracks: Vec<Arc<MediaTrack>> = self
            .tracks
            .iter()
            .filter(|t| t.kind() != TrackKind::Audio)
            .cloned()
            .collect();
        tracks.insert(0, audio);
        MediaStream {
            id: self.id,
            tracks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_frame(n: usize) -> MediaFrame {
        MediaFrame::Audio(AudioFrame {
            samples: vec![0.1; n],
            sample_rate: 48_000,
            channels: 1,
        })
    }

    #[tokio::test]
    async fn frames_fliessen_durch_die_pipe() {
        let (writer, track) = MediaTrack::neu(TrackKind::Audio, "mikro");
        let mut rx = track.frames_uebernehmen().expect("Pipe frei");

        writer.schreiben(audio_frame(960)).unwrap();
        let frame = rx.recv().await.expect("Frame erwartet");
        assert_eq!(frame.kind(), TrackKind::Audio);
    }

    #[test]
    fn pipe_nur_einmal_uebernehmbar() {
        let (_writer, track) = MediaTrack::neu(TrackKind::Audio, "mikro");
        assert!(track.frames_uebernehmen().is_some());
        assert!(track.frames_uebernehmen().is_none());
    }

    #[test]
    fn stop_beendet_produzent() {
        let (writer, track) = MediaTrack::neu(TrackKind::Audio, "mikro");
        assert!(!track.ist_beendet());

        track.stop();
        assert!(track.ist_beendet());
        assert!(matches!(
            writer.schreiben(audio_frame(960)),
            Err(AudioError::TrackBeendet)
        ));
    }

    #[test]
    fn stop_ist_idempotent() {
        let (_writer, track) = MediaTrack::neu(TrackKind::Video, "kamera");
        track.stop();
        track.stop();
        assert!(track.ist_beendet());
    }

    #[test]
    fn volle_pipe_verwirft_statt_zu_blockieren() {
        let (writer, track) = MediaTrack::neu(TrackKind::Audio, "mikro");
        let _rx = track.frames_uebernehmen().unwrap();

        let mut voll_gesehen = false;
        for _ in 0..(FRAME_PIPE_KAPAZITAET + 8) {
            if matches!(writer.schreiben(audio_frame(960)), Err(AudioError::PufferVoll)) {
                voll_gesehen = true;
            }
        }
        assert!(voll_gesehen, "Ueberlauf muss PufferVoll melden");
    }

    #[test]
    fn stream_findet_tracks_nach_art() {
        let (_wa, audio) = MediaTrack::neu(TrackKind::Audio, "mikro");
        let (_wv, video) = MediaTrack::neu(TrackKind::Video, "kamera");
        let stream = MediaStream::neu(vec![audio.clone(), video.clone()]);

        assert_eq!(stream.audio_track().unwrap().id(), audio.id());
        assert_eq!(stream.video_track().unwrap().id(), video.id());
    }

    #[test]
    fn audio_ersetzen_behaelt_stream_id_und_video() {
        let (_wa, audio) = MediaTrack::neu(TrackKind::Audio, "mikro");
        let (_wv, video) = MediaTrack::neu(TrackKind::Video, "kamera");
        let stream = MediaStream::neu(vec![audio, video.clone()]);

        let (_wb, bearbeitet) = MediaTrack::neu(TrackKind::Audio, "suppressed");
        let neuer = stream.mit_audio_ersetzt(bearbeitet.clone());

        assert_eq!(neuer.id(), stream.id());
        assert_eq!(neuer.audio_track().unwrap().id(), bearbeitet.id());
        assert_eq!(neuer.video_track().unwrap().id(), video.id());
    }

    #[test]
    fn frame_dauer_20ms() {
        let frame = AudioFrame {
            samples: vec![0.0; 960],
            sample_rate: 48_000,
            channels: 1,
        };
        assert_eq!(frame.dauer(), Duration::from_millis(20));
    }
}
