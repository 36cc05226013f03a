//! DSP-Bausteine der Audio-Pipeline
//!
//! Alle Prozessoren implementieren das `AudioProcessor`-Trait und
//! arbeiten in-place auf f32-PCM-Frames.

pub mod suppressor;

pub use suppressor::{NoiseSuppressor, SuppressionLevel};

/// Gemeinsames Trait fuer alle DSP-Prozessoren
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Frame in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck
    fn reset(&mut self);

    /// Ob der Prozessor aktiv ist
    fn is_enabled(&self) -> bool;

    /// Aktiviert oder deaktiviert den Prozessor
    fn set_enabled(&mut self, enabled: bool);
}
