//! Fehlertypen der Anruf-Verhandlung

use crate::session::AnrufZustand;
use thiserror::Error;
use tincan_audio::AudioError;

/// Alle moeglichen Fehler der Anruf-Verhandlung
#[derive(Debug, Error)]
pub enum CallError {
    /// Kamera/Mikrofon verweigert oder nicht vorhanden – Anruf bricht
    /// ab bevor irgendeine Signalisierung passiert
    #[error("Medien-Erfassung fehlgeschlagen: {0}")]
    MedienErfassung(String),

    /// Operation im falschen Zustand – wird geloggt und verworfen,
    /// unterbricht den Benutzer nicht
    #[error("Operation '{operation}' im Zustand {zustand:?} nicht erlaubt")]
    UngueltigerZustand {
        operation: &'static str,
        zustand: AnrufZustand,
    },

    /// Neuer Anrufversuch waehrend ein Uebergang laeuft – schlaegt
    /// sofort fehl statt zu warten
    #[error("Anruf laeuft bereits")]
    AnrufLaeuft,

    /// SDP-Erstellung oder -Anwendung fehlgeschlagen – Anruf wird
    /// abgebrochen, die Gegenseite erhaelt `call-failed`
    #[error("Verhandlung fehlgeschlagen: {0}")]
    Verhandlung(String),

    /// Defekter oder verspaeteter ICE-Kandidat – wird verworfen, nie fatal
    #[error("ICE-Kandidat nicht anwendbar: {0}")]
    IceAnwendung(String),

    /// Signalisierungs- oder Verbindungsverlust – erzwingt Teardown
    #[error("Transportverlust: {0}")]
    Transportverlust(String),

    #[error("Audiofehler: {0}")]
    Audio(String),
}

impl From<AudioError> for CallError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Erfassung(msg) => CallError::MedienErfassung(msg),
            andere => CallError::Audio(andere.to_string()),
        }
    }
}

pub type CallResult<T> = Result<T, CallError>;
