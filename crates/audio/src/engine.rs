//! AudioContext – Geteilter Kontext der Audio-Verarbeitung
//!
//! Der Kontext lebt so lange wie die gesamte Sitzung, nicht ein
//! einzelner Anruf: zwischen Anrufen laeuft nur `detach()` auf der
//! Pipeline, `schliessen()` gehoert ausschliesslich zum prozessweiten
//! Teardown. Verarbeitungs-Worker pruefen das Geschlossen-Flag und
//! beenden sich dann von selbst.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Konfiguration des Audio-Contexts
#[derive(Debug, Clone)]
pub struct AudioContextConfig {
    /// Abtastrate der Verarbeitung
    pub sample_rate: u32,
    /// Frame-Groesse in Samples (20ms bei 48kHz = 960)
    pub frame_size: usize,
    /// Kanalanzahl
    pub channels: u16,
}

impl Default for AudioContextConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_size: 960,
            channels: 1,
        }
    }
}

/// Geteilter Kontext der Audio-Verarbeitung
pub struct AudioContext {
    config: AudioContextConfig,
    geschlossen: AtomicBool,
}

impl AudioContext {
    /// Erstellt einen neuen Kontext
    pub fn neu(config: AudioContextConfig) -> Arc<Self> {
        tracing::info!(
            sample_rate = config.sample_rate,
            frame_size = config.frame_size,
            "AudioContext erstellt"
        );
        Arc::new(Self {
            config,
            geschlossen: AtomicBool::new(false),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }

    /// Schliesst den Kontext endgueltig (nur prozessweiter Teardown)
    pub fn schliessen(&self) {
        if !self.geschlossen.swap(true, Ordering::SeqCst) {
            tracing::info!("AudioContext geschlossen");
        }
    }
}
