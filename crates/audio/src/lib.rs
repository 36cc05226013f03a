//! tincan-audio – Audio-Pipeline fuer ausgehende Anruf-Medien
//!
//! Baut aus einem rohen Capture-Stream einen Verarbeitungsgraphen
//! (Quelle -> Suppressor -> Senke) und liefert genau einen bearbeiteten
//! Audio-Track an die Anruf-Schicht:
//! - Stream/Track-Modell mit Frame-Pipes (Single-Consumer)
//! - Rauschunterdrueckung via geladenes Suppressor-Modul (spektrale
//!   Subtraktion mit Band-Gewichten)
//! - Degradierter Betrieb: laedt das Modul nicht, laeuft der Anruf
//!   unbearbeitet weiter
//! - Opus Encoding/Decoding fuer die Transport-Naht
//!
//! Die eigentliche Geraete-Erfassung ist bewusst NICHT Teil dieses
//! Crates – sie kommt ueber den `MediaSource`-Seam von der Einbettung.

pub mod codec;
pub mod constraints;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod module;
pub mod pipeline;
pub mod source;
pub mod stream;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{OpusDecoder, OpusEncoder};
pub use constraints::{AudioConstraints, CaptureConstraints, VideoConstraints};
pub use dsp::AudioProcessor;
pub use engine::{AudioContext, AudioContextConfig};
pub use error::{AudioError, AudioResult};
pub use module::SuppressorModule;
pub use pipeline::{AudioGraphHandle, AudioPipeline};
pub use source::MediaSource;
pub use stream::{AudioFrame, MediaFrame, MediaStream, MediaTrack, MediaTrackWriter, VideoFrame};
