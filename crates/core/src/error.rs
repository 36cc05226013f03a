//! Fehlertypen fuer Tincan
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`
//! bzw. ueber die String-Varianten an der Crate-Grenze.

use thiserror::Error;

/// Globaler Result-Alias fuer Tincan
pub type Result<T> = std::result::Result<T, TincanError>;

/// Alle moeglichen Fehler im Tincan-System
#[derive(Debug, Error)]
pub enum TincanError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Signalisierung ---
    #[error("Signalisierungsfehler: {0}")]
    Signalisierung(String),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Anruf ---
    #[error("Anruffehler: {0}")]
    Anruf(String),

    // --- Audio & Medien ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    #[error("Medienfehler: {0}")]
    Medien(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TincanError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = TincanError::Signalisierung("Relay nicht erreichbar".into());
        assert_eq!(
            e.to_string(),
            "Signalisierungsfehler: Relay nicht erreichbar"
        );
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(TincanError::Zeitlimit("test".into()).ist_wiederholbar());
        assert!(!TincanError::Konfiguration("test".into()).ist_wiederholbar());
    }
}
