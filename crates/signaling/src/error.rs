//! Fehlertypen der Relay-Verbindung

use thiserror::Error;

/// Alle moeglichen Fehler der Signaling-Schicht
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Relay-URL ungueltig: {0}")]
    UngueltigeUrl(String),

    #[error("Signalkanal geschlossen")]
    KanalGeschlossen,

    #[error("WebSocket-Fehler: {0}")]
    WebSocket(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type SignalingResult<T> = Result<T, SignalingError>;
