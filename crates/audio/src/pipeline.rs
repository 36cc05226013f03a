//! AudioPipeline – Aufbau und Abbau des Verarbeitungsgraphen
//!
//! Die Pipeline besitzt pro aktivem Capture-Stream genau einen Graphen
//! (Quelle -> Suppressor -> Senke) und verleiht dessen bearbeiteten
//! Audio-Track an die Anruf-Schicht.
//!
//! ## Lebenszyklus
//! - `initialisieren()` laedt das Suppressor-Modul genau einmal pro
//!   Sitzung (lazy, unabhaengig vom Anruf-Lebenszyklus). Fehlschlag
//!   setzt das Degradiert-Flag, wirft aber nie zu `attach`-Aufrufern.
//! - `attach()` baut den Graphen und gibt den bearbeiteten Track
//!   zurueck – oder degradiert den unveraenderten Roh-Track.
//! - `detach()` stoppt nur den Graphen; der AudioContext bleibt offen
//!   und wird fuer den naechsten Anruf derselben Sitzung wiederverwendet.
//!
//! Die Frame-Verarbeitung selbst laeuft auf einem eigenen Worker-Task;
//! die Orchestrierung blockiert nur auf Auf- und Abbau, nie auf
//! einzelnen Samples.

use crate::dsp::AudioProcessor;
use crate::engine::AudioContext;
use crate::error::{AudioError, AudioResult};
use crate::module::SuppressorModule;
use crate::stream::{MediaFrame, MediaStream, MediaTrack, MediaTrackWriter};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tincan_core::types::TrackKind;
use tokio::sync::mpsc;

/// Zustand des Suppressor-Moduls
enum ModulZustand {
    /// `initialisieren()` lief noch nicht – attach reicht durch
    NichtGeladen,
    /// Modul geladen, Graphen werden gebaut
    Bereit(Arc<SuppressorModule>),
    /// Laden fehlgeschlagen – attach reicht dauerhaft durch
    Degradiert,
}

/// Handle auf einen laufenden Verarbeitungsgraphen
///
/// Gehoert exklusiv der Pipeline; der bearbeitete Track ist an die
/// Anruf-Schicht nur verliehen.
pub struct AudioGraphHandle {
    raw_track: Arc<MediaTrack>,
    processed_track: Arc<MediaTrack>,
    worker: tokio::task::JoinHandle<()>,
}

impl AudioGraphHandle {
    pub fn raw_track(&self) -> &Arc<MediaTrack> {
        &self.raw_track
    }

    pub fn processed_track(&self) -> &Arc<MediaTrack> {
        &self.processed_track
    }
}

/// Audio-Pipeline einer Sitzung
pub struct AudioPipeline {
    context: Arc<AudioContext>,
    modul_pfad: Option<PathBuf>,
    modul: RwLock<ModulZustand>,
    graph: Mutex<Option<AudioGraphHandle>>,
}

impl AudioPipeline {
    /// Erstellt die Pipeline (laedt noch nichts)
    pub fn neu(context: Arc<AudioContext>, modul_pfad: Option<PathBuf>) -> Self {
        Self {
            context,
            modul_pfad,
            modul: RwLock::new(ModulZustand::NichtGeladen),
            graph: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<AudioContext> {
        &self.context
    }

    /// Laedt das Suppressor-Modul (einmalig, idempotent)
    ///
    /// Fehlschlaege degradieren die Pipeline statt einen Fehler zu
    /// werfen – der Anruf laeuft dann unbearbeitet weiter.
    pub async fn initialisieren(&self) {
        if !matches!(*self.modul.read(), ModulZustand::NichtGeladen) {
            return;
        }

        let pfad = match &self.modul_pfad {
            Some(p) => p.clone(),
            None => {
                tracing::warn!("Kein Suppressor-Modul konfiguriert, Pipeline degradiert");
                *self.modul.write() = ModulZustand::Degradiert;
                return;
            }
        };

        match SuppressorModule::laden(&pfad).await {
            Ok(modul) => {
                tracing::info!(
                    pfad = %pfad.display(),
                    baender = modul.band_gewichte().len(),
                    "Suppressor-Modul geladen"
                );
                *self.modul.write() = ModulZustand::Bereit(Arc::new(modul));
            }
            Err(e) => {
                tracing::warn!(
                    pfad = %pfad.display(),
                    fehler = %e,
                    "Suppressor-Modul laedt nicht, Pipeline degradiert"
                );
                *self.modul.write() = ModulZustand::Degradiert;
            }
        }
    }

    /// Ob die Pipeline ohne Suppressor arbeitet
    ///
    /// Vor `initialisieren()` gilt die Pipeline ebenfalls als
    /// degradiert – attach reicht dann durch.
    pub fn ist_degradiert(&self) -> bool {
        !matches!(*self.modul.read(), ModulZustand::Bereit(_))
    }

    /// Baut den Graphen fuer einen Capture-Stream
    ///
    /// Gibt genau einen Audio-Track zurueck: den bearbeiteten wenn das
    /// Modul bereit ist, sonst den unveraenderten Roh-Track. Welcher es
    /// wird, entscheidet allein das Degradiert-Flag zum Aufrufzeitpunkt.
    /// Im Graph-Fall uebernimmt der Graph die Frame-Pipe des Roh-Tracks –
    /// der Roh-Track ist damit aus dem Verkehr gezogen und nur noch die
    /// Quelle des Graphen. Video-Tracks bleiben unberuehrt.
    pub fn attach(&self, stream: &MediaStream) -> AudioResult<Arc<MediaTrack>> {
        if self.context.ist_geschlossen() {
            return Err(AudioError::ContextGeschlossen);
        }

        let raw = stream
            .audio_track()
            .ok_or(AudioError::KeinAudioTrack)?
            .clone();

        let modul = match &*self.modul.read() {
            ModulZustand::Bereit(m) => Arc::clone(m),
            _ => {
                tracing::debug!(track = %raw.id(), "Pipeline degradiert, Roh-Track unveraendert");
                return Ok(raw);
            }
        };

        let mut graph = self.graph.lock();
        if graph.is_some() {
            return Err(AudioError::GraphAktiv);
        }

        let frames = raw.frames_uebernehmen().ok_or(AudioError::TrackBelegt)?;
        let (writer, processed) = MediaTrack::neu(TrackKind::Audio, "suppressed");

        let worker = tokio::spawn(verarbeitungs_schleife(
            frames,
            writer,
            modul.suppressor(),
            Arc::clone(&processed),
            Arc::clone(&self.context),
        ));

        tracing::info!(
            roh = %raw.id(),
            bearbeitet = %processed.id(),
            "Verarbeitungsgraph aufgebaut"
        );

        *graph = Some(AudioGraphHandle {
            raw_track: raw,
            processed_track: Arc::clone(&processed),
            worker,
        });

        Ok(processed)
    }

    /// Baut den Graphen ab, laesst den AudioContext offen
    ///
    /// Zwischen zwei Anrufen derselben Sitzung laeuft nur dieser Pfad;
    /// die Erfassung selbst stoppt der Anruf-Teardown ueber die
    /// Stream-Tracks.
    pub fn detach(&self) {
        let handle = self.graph.lock().take();
        if let Some(handle) = handle {
            handle.processed_track.stop();
            handle.worker.abort();
            tracing::info!(
                roh = %handle.raw_track.id(),
                "Verarbeitungsgraph abgebaut"
            );
        }
    }

    /// Ob gerade ein Graph aktiv ist
    pub fn ist_aktiv(&self) -> bool {
        self.graph.lock().is_some()
    }
}

/// Worker-Schleife: Quelle -> Suppressor -> Senke
///
/// Laeuft auf einem eigenen Task; endet wenn die Quelle versiegt, die
/// Senke beendet wurde oder der Kontext schliesst.
async fn verarbeitungs_schleife(
    mut frames: mpsc::Receiver<MediaFrame>,
    senke: MediaTrackWriter,
    mut suppressor: crate::dsp::NoiseSuppressor,
    processed: Arc<MediaTrack>,
    context: Arc<AudioContext>,
) {
    let mut verworfen: u64 = 0;

    while let Some(frame) = frames.recv().await {
        if processed.ist_beendet() || context.ist_geschlossen() {
            break;
        }

        let frame = match frame {
            MediaFrame::Audio(mut audio) => {
                suppressor.process(&mut audio.samples);
                MediaFrame::Audio(audio)
            }
            // Nicht-Audio auf der Quelle: unveraendert weiterreichen
            andere => andere,
        };

        match senke.schreiben(frame) {
            Ok(()) => {}
            Err(AudioError::PufferVoll) => {
                verworfen += 1;
                if verworfen.is_power_of_two() {
                    tracing::warn!(verworfen, "Senke voll, Frames verworfen");
                }
            }
            Err(_) => break,
        }
    }

    tracing::debug!(verworfen, "Verarbeitungs-Worker beendet");
}
