//! Fehlertypen fuer die Audio-Pipeline

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Pipeline
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Kein Audio-Track im Stream")]
    KeinAudioTrack,

    #[error("Track-Frames bereits von einem Konsumenten uebernommen")]
    TrackBelegt,

    #[error("Track ist beendet")]
    TrackBeendet,

    #[error("Frame-Puffer voll")]
    PufferVoll,

    #[error("Audio-Context ist geschlossen")]
    ContextGeschlossen,

    #[error("Verarbeitungsgraph bereits aktiv")]
    GraphAktiv,

    #[error("Suppressor-Modul: {0}")]
    SuppressorModul(String),

    #[error("Medien-Erfassung fehlgeschlagen: {0}")]
    Erfassung(String),

    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
