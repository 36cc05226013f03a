//! Capture-Constraints fuer die Medien-Erfassung
//!
//! Diese Werte gehen unveraendert an den `MediaSource`-Collaborator.
//! Die eingebaute Rauschunterdrueckung der Erfassung bleibt AUS – das
//! geladene Suppressor-Modul ersetzt sie, doppelte Unterdrueckung
//! erzeugt Artefakte. Echo-Cancellation und Auto-Gain bleiben an.

use serde::{Deserialize, Serialize};

/// Constraints fuer den Audio-Anteil der Erfassung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    /// Gewuenschtes Eingabegeraet (None = Standard)
    pub device_id: Option<String>,
    /// Echo-Unterdrueckung der Erfassung
    pub echo_cancellation: bool,
    /// Eingebaute Rauschunterdrueckung der Erfassung
    pub noise_suppression: bool,
    /// Automatische Pegelanpassung der Erfassung
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain_control: true,
        }
    }
}

/// Constraints fuer den Video-Anteil der Erfassung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConstraints {
    /// Gewuenschtes Kamerageraet (None = Standard)
    pub device_id: Option<String>,
    /// Gewuenschte Breite
    pub width_ideal: u32,
    /// Gewuenschte Hoehe
    pub height_ideal: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            width_ideal: 1280,
            height_ideal: 720,
        }
    }
}

/// Vollstaendige Capture-Constraints eines Anrufs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CaptureConstraints {
    pub audio: AudioConstraints,
    /// None = reiner Audio-Anruf
    pub video: Option<VideoConstraints>,
}

impl CaptureConstraints {
    /// Audio und Video mit Standardgeraeten
    pub fn audio_und_video() -> Self {
        Self {
            audio: AudioConstraints::default(),
            video: Some(VideoConstraints::default()),
        }
    }

    /// Nur Audio
    pub fn nur_audio() -> Self {
        Self {
            audio: AudioConstraints::default(),
            video: None,
        }
    }
}
