//! Anruf-Sitzung – Zustand und beobachtbarer Store
//!
//! Es gibt hoechstens eine nicht-leerlaufende Sitzung zur Zeit (kein
//! Mehrfachanruf). Der Store ist die einzige Quelle der Wahrheit ueber
//! den Sitzungszustand; alle Komponenten lesen hier, Events sind nur
//! die Benachrichtigung.
//!
//! ## Zustandsmaschine
//! ```text
//! Leerlauf -> AngebotAusstehend -> WartetAufAntwort -> Verbunden
//! Leerlauf -> AngebotEmpfangen  -> Beantwortung     -> Verbunden
//! Verbunden <-> Neuverhandlung
//! * -> Geschlossen   (Auflegen, Remote-Disconnect, fataler Fehler)
//! ```
//!
//! Das "Verhandlung laeuft"-Flag steckt im Zustandswert selbst – die
//! `*Ausstehend`/`Neuverhandlung`-Zustaende SIND das Flag.

use tincan_audio::MediaStream;
use tincan_core::types::PeerId;
use tokio::sync::watch;

/// Zustand der Anruf-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnrufZustand {
    /// Kein Anruf
    #[default]
    Leerlauf,
    /// Ausgehend: Medien und Angebot werden aufgebaut
    AngebotAusstehend,
    /// Ausgehend: Angebot gesendet, Antwort steht aus
    WartetAufAntwort,
    /// Eingehend: Angebot liegt vor, Entscheidung steht aus
    AngebotEmpfangen,
    /// Eingehend: angenommen, Antwort wird aufgebaut
    Beantwortung,
    /// Anruf steht
    Verbunden,
    /// Zweite Angebot/Antwort-Runde mitten im Anruf
    Neuverhandlung,
    /// Endzustand einer Sitzung; der naechste Anruf ersetzt sie
    Geschlossen,
}

impl AnrufZustand {
    /// Ob gerade ein Anruf laeuft oder aufgebaut wird
    pub fn ist_aktiv(&self) -> bool {
        !matches!(self, AnrufZustand::Leerlauf | AnrufZustand::Geschlossen)
    }

    /// Ob eine Verhandlungsrunde in Flug ist (Angebots-Sturm-Schutz)
    pub fn verhandlung_laeuft(&self) -> bool {
        matches!(
            self,
            AnrufZustand::AngebotAusstehend
                | AnrufZustand::WartetAufAntwort
                | AnrufZustand::Beantwortung
                | AnrufZustand::Neuverhandlung
        )
    }
}

/// Die eine Anruf-Sitzung
///
/// Entsteht bei Anrufstart oder -annahme, wird bei Auflegen/Fehlschlag/
/// Remote-Disconnect zerstoert (Felder geleert, Zustand `Geschlossen`).
#[derive(Debug, Clone, Default)]
pub struct CallSession {
    pub zustand: AnrufZustand,
    pub remote_peer: Option<PeerId>,
    pub lokaler_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
}

/// Beobachtbarer Store der einen Sitzung
pub struct CallSessionStore {
    tx: watch::Sender<CallSession>,
}

impl CallSessionStore {
    pub fn neu() -> Self {
        let (tx, _) = watch::channel(CallSession::default());
        Self { tx }
    }

    /// Momentaufnahme der Sitzung
    pub fn lesen(&self) -> CallSession {
        self.tx.borrow().clone()
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> AnrufZustand {
        self.tx.borrow().zustand
    }

    /// Atomarer Lese-Schreib-Zugriff auf die Sitzung
    pub fn aendern<F: FnOnce(&mut CallSession)>(&self, f: F) {
        self.tx.send_modify(f);
    }

    /// Abonniert Sitzungsaenderungen
    pub fn abonnieren(&self) -> watch::Receiver<CallSession> {
        self.tx.subscribe()
    }
}

impl Default for CallSessionStore {
    fn default() -> Self {
        Self::neu()
    }
}
