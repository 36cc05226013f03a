//! MediaSource – Seam zur Geraete-Erfassung
//!
//! Die eigentliche Erfassung (Mikrofon, Kamera, Geraeteauswahl) gehoert
//! der Einbettung. Dieses Crate konsumiert nur das Ergebnis: einen
//! `MediaStream` mit laufenden Frame-Produzenten.

use crate::constraints::CaptureConstraints;
use crate::error::AudioResult;
use crate::stream::MediaStream;
use async_trait::async_trait;

/// Liefert rohe Capture-Streams nach Constraints
///
/// Implementierungen: echte Geraete-Erfassung in der Einbettung,
/// synthetische Quellen in Tests und im CLI-Client. Ein Fehlschlag
/// (Geraet verweigert/fehlt) bricht den Anruf ab, bevor irgendeine
/// Signalisierung passiert.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &CaptureConstraints) -> AudioResult<MediaStream>;
}
