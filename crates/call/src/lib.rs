//! tincan-call – Anruf-Verhandlung
//!
//! Dieser Crate implementiert die Anruf-Zustandsmaschine: Angebot/
//! Antwort/ICE-Austausch ueber das Signaling-Relay, Sitzungs-Store,
//! Track-Binding und die WebRTC-Anbindung.
//!
//! ## Architektur
//!
//! ```text
//! SignalDispatcher (tincan-signaling)
//!     |  eine eingehende Nachricht = ein Zustandsuebergang
//!     v
//! CallEngine (Zustandsmaschine)
//!     |  Leerlauf -> AngebotAusstehend -> WartetAufAntwort -> Verbunden
//!     |  Leerlauf -> AngebotEmpfangen -> Beantwortung -> Verbunden
//!     |  Verbunden <-> Neuverhandlung, alles -> Geschlossen
//!     |
//!     +-- CallSessionStore      (genau eine Sitzung, beobachtbar)
//!     +-- TrackBindingManager   (replace vs. add vs. remove)
//!     +-- PeerLink              (Seam; produktiv: WebRtcLink)
//!     +-- AudioPipeline         (tincan-audio, verliehener Track)
//! ```
//!
//! ICE-Kandidaten die vor der Remote-Beschreibung eintreffen werden in
//! Ankunftsreihenfolge gepuffert und nach dem Setzen der Beschreibung
//! in derselben Reihenfolge angewendet.

pub mod binding;
pub mod engine;
pub mod error;
pub mod link;
pub mod session;
pub mod webrtc_link;

// Bequeme Re-Exporte
pub use binding::{ReconcileBericht, TrackBindingManager};
pub use engine::{CallDecider, CallEngine};
pub use error::{CallError, CallResult};
pub use link::{
    IceConfig, IceZustand, LinkEvent, LinkZustand, PeerLink, PeerLinkFactory,
    SignalisierungsZustand, TrackSender,
};
pub use session::{AnrufZustand, CallSession, CallSessionStore};
pub use webrtc_link::{WebRtcLink, WebRtcLinkFactory};
