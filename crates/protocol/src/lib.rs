//! tincan-protocol – Nachrichten-Kontrakt des Signaling-Relays
//!
//! Definiert alle JSON-Nachrichten die ueber die persistente
//! Relay-Verbindung zwischen den Clients ausgetauscht werden, sowie die
//! SDP- und ICE-Payload-Typen. Das Relay selbst leitet nur weiter; die
//! gesamte Anruf-Logik sitzt in den Clients.

pub mod signal;

// Bequeme Re-Exporte der wichtigsten Typen
pub use signal::{IceCandidate, SdpKind, SessionDescription, SignalMessage, User};
