//! tincan-signaling – Relay-Verbindung und Nachrichten-Dispatch
//!
//! Dieser Crate haelt die persistente WebSocket-Verbindung zum
//! Signaling-Relay und speist eingehende Nachrichten als explizite
//! Zustandsuebergaenge in die Anruf-Maschine.
//!
//! ## Architektur
//!
//! ```text
//! SignalingChannel (WebSocket, Reconnect + Re-Registrierung)
//!     |  eingehende SignalMessages
//!     v
//! SignalDispatcher
//!     |  eine Nachricht = genau ein Uebergang
//!     v
//! CallEngine (tincan-call)
//!
//! PresenceRoster – wer ist gerade am Relay erreichbar
//! ```
//!
//! Zustellgarantien gibt das Relay keine: Verlust und Duplikate muss
//! die Anruf-Maschine tolerieren, dieser Crate reicht nur durch.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod presence;

// Bequeme Re-Exporte
pub use channel::{SignalingChannel, SignalingConfig};
pub use dispatcher::SignalDispatcher;
pub use error::SignalingError;
pub use presence::PresenceRoster;
