//! CallEngine – Die Anruf-Zustandsmaschine
//!
//! Jede eingehende Signaling-Nachricht entspricht genau einer
//! Uebergangsfunktion dieser Maschine; unpassende Nachrichten werden
//! geloggt und verworfen (Duplikat-/Verlusttoleranz). Das "Verhandlung
//! laeuft"-Flag steckt im Zustandswert selbst.
//!
//! ## Nebenlaeufigkeit
//! Uebergaenge sind gegenseitig ausschliessend: der Zustandswechsel am
//! Anfang jedes Aufbaus ist atomar (Store), neue Anrufversuche in einem
//! aktiven Zustand schlagen sofort mit `AnrufLaeuft` fehl statt zu
//! warten. ICE-Anwendung ist strikt gegen das Setzen der Remote-
//! Beschreibung geordnet: der Kontext-Mutex wird ueber den gesamten
//! Flush gehalten, neue Kandidaten reihen sich dahinter ein.
//!
//! ## Ressourcen
//! Erfassungsgeraet und AudioContext gehoeren der Sitzung, nicht dem
//! Anruf: `teardown()` stoppt die lokalen Tracks und baut den Graphen
//! ab (`detach`), laesst den AudioContext aber fuer den naechsten
//! Anruf offen.

use crate::binding::TrackBindingManager;
use crate::error::{CallError, CallResult};
use crate::link::{IceZustand, LinkEvent, LinkZustand, PeerLink, PeerLinkFactory};
use crate::session::{AnrufZustand, CallSession, CallSessionStore};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tincan_audio::{AudioPipeline, CaptureConstraints, MediaSource, MediaStream, MediaTrack};
use tincan_core::event::CallEvent;
use tincan_core::types::{Peer, PeerId};
use tincan_protocol::{IceCandidate, SessionDescription, SignalMessage};
use tokio::sync::{broadcast, mpsc, watch};

/// Groesse des Broadcast-Kanals fuer Anruf-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Entscheidet ueber Annahme eines eingehenden Anrufs
///
/// Externer Collaborator (UI, CLI-Prompt, Auto-Annahme in Tests).
#[async_trait::async_trait]
pub trait CallDecider: Send + Sync {
    async fn entscheiden(&self, von: &Peer) -> bool;
}

/// Verhandlungskontext eines Anrufs
///
/// Hoechstens einer pro Sitzung; entsteht beim Anrufaufbau und wird
/// beim Teardown geraeumt.
struct NegotiationContext {
    link: Arc<dyn PeerLink>,
    /// Ob die Remote-Beschreibung bereits gesetzt wurde
    remote_beschreibung_gesetzt: bool,
    /// FIFO frueher Remote-Kandidaten (Ankunftsreihenfolge)
    ice_warteschlange: VecDeque<IceCandidate>,
    /// Lokale Kandidaten ohne bekanntes Gegenueber
    lokale_kandidaten: Vec<IceCandidate>,
    /// Stoppt die Link-Event-Schleife
    stop_tx: watch::Sender<bool>,
}

/// Die Anruf-Zustandsmaschine
pub struct CallEngine {
    selbst: Weak<CallEngine>,
    eigene_id: parking_lot::RwLock<Option<PeerId>>,
    store: CallSessionStore,
    kontext: tokio::sync::Mutex<Option<NegotiationContext>>,
    /// Remote-Kandidaten die eintreffen bevor ein Kontext existiert
    fruehe_kandidaten: parking_lot::Mutex<VecDeque<IceCandidate>>,
    signal_tx: mpsc::UnboundedSender<SignalMessage>,
    events: broadcast::Sender<CallEvent>,
    link_factory: Arc<dyn PeerLinkFactory>,
    media_source: Arc<dyn MediaSource>,
    pipeline: Arc<AudioPipeline>,
    decider: Arc<dyn CallDecider>,
    binding: TrackBindingManager,
    constraints: CaptureConstraints,
}

impl CallEngine {
    /// Erstellt die Engine
    pub fn neu(
        signal_tx: mpsc::UnboundedSender<SignalMessage>,
        link_factory: Arc<dyn PeerLinkFactory>,
        media_source: Arc<dyn MediaSource>,
        pipeline: Arc<AudioPipeline>,
        decider: Arc<dyn CallDecider>,
        constraints: CaptureConstraints,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Arc::new_cyclic(|selbst| Self {
            selbst: selbst.clone(),
            eigene_id: parking_lot::RwLock::new(None),
            store: CallSessionStore::neu(),
            kontext: tokio::sync::Mutex::new(None),
            fruehe_kandidaten: parking_lot::Mutex::new(VecDeque::new()),
            signal_tx,
            events,
            link_factory,
            media_source,
            pipeline,
            decider,
            binding: TrackBindingManager::neu(),
            constraints,
        })
    }

    /// Abonniert Anruf-Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Der beobachtbare Sitzungs-Store
    pub fn session(&self) -> &CallSessionStore {
        &self.store
    }

    /// Die eigene Relay-Kennung (nach Registrierung)
    pub fn eigene_id(&self) -> Option<PeerId> {
        self.eigene_id.read().clone()
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }

    fn senden(&self, msg: SignalMessage) {
        if self.signal_tx.send(msg).is_err() {
            tracing::warn!("Signalkanal geschlossen, Nachricht verworfen");
        }
    }

    // -----------------------------------------------------------------------
    // Relay-Uebergaenge
    // -----------------------------------------------------------------------

    /// `registered` – Relay hat die Sitzungskennung zugewiesen
    pub fn handle_registered(&self, peer_id: PeerId) {
        tracing::info!(peer_id = %peer_id, "Beim Relay registriert");
        *self.eigene_id.write() = Some(peer_id.clone());
        self.emit(CallEvent::Registriert { peer_id });
    }

    /// `active-users` – Roster weiterreichen
    pub fn handle_roster(&self, peers: Vec<Peer>) {
        self.emit(CallEvent::RosterAktualisiert { peers });
    }

    // -----------------------------------------------------------------------
    // Ausgehender Anruf
    // -----------------------------------------------------------------------

    /// Startet einen Anruf zu `ziel`
    ///
    /// Nur aus dem Leerlauf (bzw. nach einer geschlossenen Sitzung)
    /// gueltig; sonst `AnrufLaeuft`. Schlaegt die Medien-Erfassung
    /// fehl, bricht der Anruf ab bevor irgendetwas gesendet wurde.
    pub async fn initiate_call(&self, ziel: PeerId) -> CallResult<()> {
        self.uebergang_neuer_anruf(AnrufZustand::AngebotAusstehend, &ziel, "initiate_call")?;
        tracing::info!(ziel = %ziel, "Anruf wird aufgebaut");

        match self.anruf_aufbauen(&ziel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(fehler = %e, "Anrufaufbau fehlgeschlagen");
                self.emit(CallEvent::AnrufFehlgeschlagen {
                    fehler: e.to_string(),
                });
                self.ressourcen_freigeben().await;
                self.fruehe_kandidaten.lock().clear();
                self.store.aendern(|s| *s = CallSession::default());
                Err(e)
            }
        }
    }

    async fn anruf_aufbauen(&self, ziel: &PeerId) -> CallResult<()> {
        let ausgehend = self.medien_aufbauen().await?;
        let link = self.kontext_aufbauen().await?;

        link.add_recv_transceivers().await?;
        self.binding.reconcile(&link, ausgehend.tracks()).await?;

        let offer = link.create_offer().await?;
        link.set_local_description(offer.clone()).await?;

        self.store
            .aendern(|s| s.zustand = AnrufZustand::WartetAufAntwort);
        self.senden(SignalMessage::CallUser {
            to: ziel.clone(),
            offer,
        });
        tracing::info!(ziel = %ziel, "Angebot gesendet, warte auf Antwort");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Eingehender Anruf
    // -----------------------------------------------------------------------

    /// `call-received` – eingehender Anruf
    ///
    /// Verlangt eine explizite Annahme-Entscheidung. Ablehnung sendet
    /// `call-rejected` und bleibt im Leerlauf. Ein Angebot der aktuellen
    /// Gegenseite mitten im Anruf ist eine Neuverhandlung und wird ohne
    /// neue Medien beantwortet; Anrufe Dritter im besetzten Zustand
    /// werden abgelehnt.
    pub async fn handle_incoming_call(
        &self,
        von: Peer,
        offer: SessionDescription,
    ) -> CallResult<()> {
        {
            let s = self.store.lesen();
            if s.zustand == AnrufZustand::Verbunden && s.remote_peer.as_ref() == Some(&von.id) {
                return self.neuverhandlung_beantworten(offer).await;
            }
        }

        if let Err(e) =
            self.uebergang_neuer_anruf(AnrufZustand::AngebotEmpfangen, &von.id, "handle_incoming_call")
        {
            tracing::info!(von = %von.id, "Eingehender Anruf im besetzten Zustand abgelehnt");
            self.senden(SignalMessage::CallRejected {
                to: Some(von.id),
                from: None,
            });
            return Err(e);
        }

        tracing::info!(von = %von.id, name = %von.display_name, "Eingehender Anruf");
        self.emit(CallEvent::EingehenderAnruf { von: von.clone() });

        if !self.decider.entscheiden(&von).await {
            tracing::info!(von = %von.id, "Anruf abgelehnt");
            self.senden(SignalMessage::CallRejected {
                to: Some(von.id),
                from: None,
            });
            self.store.aendern(|s| *s = CallSession::default());
            self.fruehe_kandidaten.lock().clear();
            return Ok(());
        }

        self.store.aendern(|s| s.zustand = AnrufZustand::Beantwortung);

        match self.annahme_aufbauen(&von.id, offer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Die Gegenseite ist bekannt: Fehlschlag melden
                tracing::warn!(fehler = %e, "Annahme fehlgeschlagen");
                self.senden(SignalMessage::CallFailed {
                    to: Some(von.id),
                    error: Some(e.to_string()),
                });
                self.emit(CallEvent::AnrufFehlgeschlagen {
                    fehler: e.to_string(),
                });
                self.ressourcen_freigeben().await;
                self.fruehe_kandidaten.lock().clear();
                self.store.aendern(|s| *s = CallSession::default());
                Err(e)
            }
        }
    }

    async fn annahme_aufbauen(&self, von: &PeerId, offer: SessionDescription) -> CallResult<()> {
        let ausgehend = self.medien_aufbauen().await?;
        let link = self.kontext_aufbauen().await?;

        link.set_remote_description(offer).await?;
        {
            let mut kontext = self.kontext.lock().await;
            if let Some(ctx) = kontext.as_mut() {
                ctx.remote_beschreibung_gesetzt = true;
            }
        }

        self.binding.reconcile(&link, ausgehend.tracks()).await?;

        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;

        self.store.aendern(|s| s.zustand = AnrufZustand::Verbunden);
        self.senden(SignalMessage::CallAccepted {
            to: Some(von.clone()),
            from: None,
            answer,
        });
        self.warteschlange_anwenden().await;
        self.lokale_kandidaten_flushen().await;

        tracing::info!(von = %von, "Anruf angenommen und verbunden");
        self.emit(CallEvent::AnrufVerbunden {
            peer_id: von.clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Antwort & Kandidaten
    // -----------------------------------------------------------------------

    /// `call-accepted` – Antwort der Gegenseite
    ///
    /// Nur gueltig waehrend `WartetAufAntwort` (bzw. `Neuverhandlung`).
    /// Ausserhalb davon: Duplikat oder veraltete Nachricht – loggen und
    /// verwerfen.
    pub async fn handle_answer(&self, answer: SessionDescription) -> CallResult<()> {
        let zustand = self.store.zustand();
        if !matches!(
            zustand,
            AnrufZustand::WartetAufAntwort | AnrufZustand::Neuverhandlung
        ) {
            tracing::debug!(?zustand, "Antwort ausserhalb der Verhandlung ignoriert");
            return Ok(());
        }

        let link = self.link("handle_answer").await?;
        if let Err(e) = link.set_remote_description(answer).await {
            self.verhandlung_abbrechen(&e).await;
            return Err(e);
        }

        {
            let mut kontext = self.kontext.lock().await;
            if let Some(ctx) = kontext.as_mut() {
                ctx.remote_beschreibung_gesetzt = true;
            }
        }
        self.warteschlange_anwenden().await;
        self.lokale_kandidaten_flushen().await;

        let remote = self.store.lesen().remote_peer;
        self.store.aendern(|s| s.zustand = AnrufZustand::Verbunden);

        if zustand == AnrufZustand::WartetAufAntwort {
            if let Some(peer_id) = remote {
                tracing::info!(peer = %peer_id, "Anruf verbunden");
                self.emit(CallEvent::AnrufVerbunden { peer_id });
            }
        } else {
            tracing::debug!("Neuverhandlung abgeschlossen");
        }
        Ok(())
    }

    /// `ice-candidate` – Remote-Kandidat
    ///
    /// Mit gesetzter Remote-Beschreibung sofort anwenden, sonst in
    /// Ankunftsreihenfolge einreihen. Defekte Kandidaten werden mit
    /// Warnung verworfen, niemals fatal.
    pub async fn handle_remote_candidate(&self, kandidat: IceCandidate) -> CallResult<()> {
        if kandidat.candidate.trim().is_empty() {
            tracing::warn!("Leerer ICE-Kandidat verworfen");
            return Ok(());
        }

        let mut kontext = self.kontext.lock().await;
        match kontext.as_mut() {
            Some(ctx) if ctx.remote_beschreibung_gesetzt => {
                let link = Arc::clone(&ctx.link);
                // Lock wird gehalten: Anwendung bleibt gegen den Flush geordnet
                if let Err(e) = link.add_ice_candidate(kandidat).await {
                    tracing::warn!(fehler = %e, "ICE-Kandidat nicht anwendbar, verworfen");
                }
            }
            Some(ctx) => {
                tracing::trace!("Kandidat vor Remote-Beschreibung eingereiht");
                ctx.ice_warteschlange.push_back(kandidat);
            }
            None => {
                drop(kontext);
                tracing::trace!("Kandidat vor Kontextaufbau eingereiht");
                self.fruehe_kandidaten.lock().push_back(kandidat);
            }
        }
        Ok(())
    }

    /// Wendet die gepufferten Remote-Kandidaten in Ankunftsreihenfolge an
    async fn warteschlange_anwenden(&self) {
        let mut kontext = self.kontext.lock().await;
        let Some(ctx) = kontext.as_mut() else { return };

        while let Some(kandidat) = ctx.ice_warteschlange.pop_front() {
            if let Err(e) = ctx.link.add_ice_candidate(kandidat).await {
                tracing::warn!(fehler = %e, "Gepufferter ICE-Kandidat verworfen");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ablehnung, Auflegen, Fehlschlag
    // -----------------------------------------------------------------------

    /// `call-rejected` – Gegenseite lehnt ab; zurueck in den Leerlauf
    pub async fn handle_reject(&self, von: PeerId) -> CallResult<()> {
        let s = self.store.lesen();
        let passt = matches!(
            s.zustand,
            AnrufZustand::AngebotAusstehend | AnrufZustand::WartetAufAntwort
        ) && s.remote_peer.as_ref() == Some(&von);

        if !passt {
            tracing::debug!(von = %von, "Unpassende Ablehnung ignoriert");
            return Ok(());
        }

        tracing::info!(von = %von, "Anruf wurde abgelehnt");
        self.ressourcen_freigeben().await;
        self.store.aendern(|s| *s = CallSession::default());
        self.fruehe_kandidaten.lock().clear();
        self.emit(CallEvent::AnrufAbgelehnt { peer_id: von });
        Ok(())
    }

    /// `end-call` – Gegenseite legt auf
    pub async fn handle_remote_hangup(&self, von: Option<PeerId>) {
        let s = self.store.lesen();
        if !s.zustand.ist_aktiv() {
            return;
        }
        if let (Some(v), Some(r)) = (&von, &s.remote_peer) {
            if v != r {
                tracing::debug!(von = %v, "end-call eines Dritten ignoriert");
                return;
            }
        }
        self.teardown("Gegenseite hat aufgelegt").await;
    }

    /// `user-disconnected` – Teilnehmer hat das Relay verloren
    pub async fn handle_peer_disconnected(&self, socket_id: PeerId) {
        let s = self.store.lesen();
        if s.zustand.ist_aktiv() && s.remote_peer.as_ref() == Some(&socket_id) {
            self.teardown("Gegenseite hat die Verbindung verloren").await;
        }
    }

    /// `call-failed` – Gegenseite meldet Fehlschlag
    pub async fn handle_call_failed(&self, fehler: Option<String>) {
        if !self.store.zustand().ist_aktiv() {
            return;
        }
        let grund = fehler.unwrap_or_else(|| "unbekannter Fehler".into());
        tracing::warn!(grund = %grund, "Gegenseite meldet Anruf-Fehlschlag");
        self.emit(CallEvent::AnrufFehlgeschlagen {
            fehler: grund.clone(),
        });
        self.teardown(&grund).await;
    }

    /// Verlust des Signalisierungstransports – erzwingt Teardown
    pub async fn handle_transport_loss(&self, grund: &str) {
        if self.store.zustand().ist_aktiv() {
            tracing::warn!(grund, "Signalisierung verloren, Anruf wird beendet");
            self.teardown(grund).await;
        }
    }

    // -----------------------------------------------------------------------
    // Neuverhandlung
    // -----------------------------------------------------------------------

    /// Stoesst eine frische Angebot/Antwort-Runde an
    ///
    /// No-op wenn bereits eine Verhandlung laeuft oder kein Anruf steht
    /// (Schutz vor Angebots-Stuermen). Medien werden nicht neu erfasst.
    pub async fn request_renegotiation(&self) -> CallResult<()> {
        let mut gestartet = false;
        self.store.aendern(|s| {
            if s.zustand == AnrufZustand::Verbunden {
                s.zustand = AnrufZustand::Neuverhandlung;
                gestartet = true;
            }
        });
        if !gestartet {
            tracing::debug!(
                zustand = ?self.store.zustand(),
                "Neuverhandlung unterdrueckt"
            );
            return Ok(());
        }

        let Some(ziel) = self.store.lesen().remote_peer else {
            return Ok(());
        };
        tracing::info!(ziel = %ziel, "Neuverhandlung gestartet");

        let link = self.link("request_renegotiation").await?;
        let ergebnis: CallResult<SessionDescription> = async {
            let offer = link.create_offer().await?;
            link.set_local_description(offer.clone()).await?;
            Ok(offer)
        }
        .await;

        match ergebnis {
            Ok(offer) => {
                self.senden(SignalMessage::CallUser { to: ziel, offer });
                Ok(())
            }
            Err(e) => {
                self.verhandlung_abbrechen(&e).await;
                Err(e)
            }
        }
    }

    /// Beantwortet ein Neuverhandlungs-Angebot der aktuellen Gegenseite
    async fn neuverhandlung_beantworten(&self, offer: SessionDescription) -> CallResult<()> {
        tracing::debug!("Neuverhandlungs-Angebot der Gegenseite");
        let link = self.link("neuverhandlung_beantworten").await?;

        let ergebnis: CallResult<SessionDescription> = async {
            link.set_remote_description(offer).await?;
            let answer = link.create_answer().await?;
            link.set_local_description(answer.clone()).await?;
            Ok(answer)
        }
        .await;

        match ergebnis {
            Ok(answer) => {
                let to = self.store.lesen().remote_peer;
                self.senden(SignalMessage::CallAccepted {
                    to,
                    from: None,
                    answer,
                });
                Ok(())
            }
            Err(e) => {
                self.verhandlung_abbrechen(&e).await;
                Err(e)
            }
        }
    }

    /// Gleicht die gewuenschten ausgehenden Tracks ab (Geraetewechsel)
    ///
    /// Ein reiner Austausch loest keine Angebot/Antwort-Runde aus; erst
    /// strukturelle Aenderungen (Add/Remove) stossen die Neuverhandlung
    /// an – ausser die Verbindung steckt ohnehin mitten in einer.
    pub async fn reconcile_tracks(
        &self,
        gewuenscht: &[Arc<MediaTrack>],
    ) -> CallResult<crate::binding::ReconcileBericht> {
        let link = self.link("reconcile_tracks").await?;
        let bericht = self.binding.reconcile(&link, gewuenscht).await?;
        if bericht.neuverhandlung_noetig {
            self.request_renegotiation().await?;
        }
        Ok(bericht)
    }

    // -----------------------------------------------------------------------
    // Auflegen & Teardown
    // -----------------------------------------------------------------------

    /// Legt auf: informiert die Gegenseite und raeumt ab
    pub async fn hangup(&self) {
        let s = self.store.lesen();
        if !s.zustand.ist_aktiv() {
            return;
        }
        if let Some(to) = s.remote_peer {
            self.senden(SignalMessage::EndCall {
                to: Some(to),
                from: None,
            });
        }
        self.teardown("aufgelegt").await;
    }

    /// Raeumt die Sitzung ab: Tracks stoppen, Link schliessen, Graph
    /// abbauen, Kontext leeren
    ///
    /// Sofort wirksam und idempotent – aus jedem Zustand aufrufbar,
    /// auch wiederholt und auch aus `Geschlossen` (dann No-op). Der
    /// AudioContext bleibt offen.
    pub async fn teardown(&self, grund: &str) {
        let vorher = self.store.lesen();
        let hatte_anruf = vorher.zustand.ist_aktiv();

        if !hatte_anruf && self.kontext.lock().await.is_none() {
            tracing::debug!(grund, "Teardown ohne aktiven Anruf (No-op)");
            return;
        }

        tracing::info!(grund, zustand = ?vorher.zustand, "Anruf wird beendet");
        self.ressourcen_freigeben().await;
        self.fruehe_kandidaten.lock().clear();
        self.store.aendern(|s| {
            s.zustand = AnrufZustand::Geschlossen;
            s.remote_peer = None;
            s.lokaler_stream = None;
            s.remote_stream = None;
        });

        self.emit(CallEvent::AnrufBeendet {
            peer_id: vorher.remote_peer,
            grund: grund.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Atomarer Einstieg in einen neuen Anruf
    ///
    /// Nur aus `Leerlauf` oder `Geschlossen`; ein aktiver Zustand
    /// lehnt sofort mit `AnrufLaeuft` ab (kein Einreihen).
    fn uebergang_neuer_anruf(
        &self,
        ziel_zustand: AnrufZustand,
        peer: &PeerId,
        operation: &'static str,
    ) -> CallResult<()> {
        let mut ergebnis = Ok(());
        self.store.aendern(|s| {
            if s.zustand.ist_aktiv() {
                ergebnis = Err(CallError::AnrufLaeuft);
            } else {
                *s = CallSession::default();
                s.zustand = ziel_zustand;
                s.remote_peer = Some(peer.clone());
            }
        });
        if ergebnis.is_err() {
            tracing::warn!(
                operation,
                zustand = ?self.store.zustand(),
                "Anrufversuch im aktiven Zustand abgewiesen"
            );
        }
        ergebnis
    }

    /// Erfasst Medien und haengt die Audio-Pipeline an
    ///
    /// Ergebnis ist der ausgehende Stream: genau ein Audio-Track
    /// (bearbeitet oder roh, nie beide) plus unveraendertes Video.
    async fn medien_aufbauen(&self) -> CallResult<MediaStream> {
        let roh = self
            .media_source
            .acquire(&self.constraints)
            .await
            .map_err(CallError::from)?;

        let audio = match self.pipeline.attach(&roh) {
            Ok(track) => track,
            Err(e) => {
                roh.stop_alle();
                return Err(e.into());
            }
        };

        if self.pipeline.ist_degradiert() {
            self.emit(CallEvent::SuppressorDegradiert {
                grund: "Suppressor-Modul nicht geladen".into(),
            });
        }

        let ausgehend = roh.mit_audio_ersetzt(audio);
        self.store
            .aendern(|s| s.lokaler_stream = Some(ausgehend.clone()));
        Ok(ausgehend)
    }

    /// Baut Link und Verhandlungskontext auf
    async fn kontext_aufbauen(&self) -> CallResult<Arc<dyn PeerLink>> {
        let (link, link_events) = self.link_factory.erstellen().await?;
        let (stop_tx, stop_rx) = watch::channel(false);

        if let Some(engine) = self.selbst.upgrade() {
            tokio::spawn(link_event_schleife(engine, link_events, stop_rx));
        }

        let mut kontext = self.kontext.lock().await;
        if kontext.is_some() {
            tracing::warn!("Alter Verhandlungskontext wird ersetzt");
        }
        *kontext = Some(NegotiationContext {
            link: Arc::clone(&link),
            remote_beschreibung_gesetzt: false,
            ice_warteschlange: self.fruehe_kandidaten.lock().drain(..).collect(),
            lokale_kandidaten: Vec::new(),
            stop_tx,
        });
        Ok(link)
    }

    /// Der Link des aktiven Kontexts
    async fn link(&self, operation: &'static str) -> CallResult<Arc<dyn PeerLink>> {
        self.kontext
            .lock()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.link))
            .ok_or(CallError::UngueltigerZustand {
                operation,
                zustand: self.store.zustand(),
            })
    }

    /// Bricht eine fehlgeschlagene Verhandlung ab und informiert beide Seiten
    async fn verhandlung_abbrechen(&self, fehler: &CallError) {
        tracing::warn!(fehler = %fehler, "Verhandlung abgebrochen");
        if let Some(to) = self.store.lesen().remote_peer {
            self.senden(SignalMessage::CallFailed {
                to: Some(to),
                error: Some(fehler.to_string()),
            });
        }
        self.emit(CallEvent::AnrufFehlgeschlagen {
            fehler: fehler.to_string(),
        });
        self.teardown("Verhandlung fehlgeschlagen").await;
    }

    /// Leitet einen lokalen Kandidaten weiter oder puffert ihn
    async fn lokalen_kandidaten_weiterleiten(&self, kandidat: IceCandidate) {
        match self.store.lesen().remote_peer {
            Some(to) => self.senden(SignalMessage::Candidate {
                to: Some(to),
                from: None,
                candidate: kandidat,
            }),
            None => {
                let mut kontext = self.kontext.lock().await;
                if let Some(ctx) = kontext.as_mut() {
                    tracing::trace!("Lokaler Kandidat ohne Gegenueber gepuffert");
                    ctx.lokale_kandidaten.push(kandidat);
                }
            }
        }
    }

    /// Sendet gepufferte lokale Kandidaten sobald das Gegenueber bekannt ist
    async fn lokale_kandidaten_flushen(&self) {
        let puffer = {
            let mut kontext = self.kontext.lock().await;
            kontext
                .as_mut()
                .map(|c| std::mem::take(&mut c.lokale_kandidaten))
                .unwrap_or_default()
        };
        let Some(to) = self.store.lesen().remote_peer else {
            return;
        };
        for kandidat in puffer {
            self.senden(SignalMessage::Candidate {
                to: Some(to.clone()),
                from: None,
                candidate: kandidat,
            });
        }
    }

    /// Nimmt einen eingetroffenen Remote-Track in die Sitzung auf
    fn remote_track_aufnehmen(&self, track: Arc<MediaTrack>) {
        let kind = track.kind();
        let mut peer = None;
        self.store.aendern(|s| {
            peer = s.remote_peer.clone();
            s.remote_stream = Some(match &s.remote_stream {
                Some(stream) => stream.mit_track(Arc::clone(&track)),
                None => MediaStream::neu(vec![Arc::clone(&track)]),
            });
        });
        tracing::info!(kind = %kind, "Remote-Track eingetroffen");
        if let Some(peer_id) = peer {
            self.emit(CallEvent::RemoteTrack { peer_id, kind });
        }
    }

    /// Gibt Link, Kontext, Tracks und Graphen frei (Context bleibt offen)
    async fn ressourcen_freigeben(&self) {
        let kontext = self.kontext.lock().await.take();
        if let Some(ctx) = kontext {
            let _ = ctx.stop_tx.send(true);
            if let Err(e) = ctx.link.close().await {
                tracing::debug!(fehler = %e, "Link-Schliessen meldete Fehler");
            }
        }

        let s = self.store.lesen();
        if let Some(stream) = &s.lokaler_stream {
            stream.stop_alle();
        }
        if let Some(stream) = &s.remote_stream {
            stream.stop_alle();
        }
        self.pipeline.detach();
        self.store.aendern(|s| {
            s.lokaler_stream = None;
            s.remote_stream = None;
        });
    }
}

/// Verarbeitet Link-Ereignisse bis zum Stopp-Signal
///
/// Verbindungsverlust (Getrennt/Fehlgeschlagen) erzwingt Teardown;
/// ICE-Zustaende werden nur geloggt, ausser Fehlschlag.
async fn link_event_schleife(
    engine: Arc<CallEngine>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LinkEvent::LokalerKandidat(kandidat) => {
                        engine.lokalen_kandidaten_weiterleiten(kandidat).await;
                    }
                    LinkEvent::RemoteTrack { track } => {
                        engine.remote_track_aufnehmen(track);
                    }
                    LinkEvent::Verbindungszustand(zustand) => {
                        tracing::debug!(?zustand, "Peer-Verbindungszustand");
                        if matches!(zustand, LinkZustand::Getrennt | LinkZustand::Fehlgeschlagen) {
                            engine.teardown("Peer-Verbindung verloren").await;
                        }
                    }
                    LinkEvent::Ice(zustand) => {
                        tracing::debug!(?zustand, "ICE-Verbindungszustand");
                        if zustand == IceZustand::Fehlgeschlagen {
                            engine.teardown("ICE fehlgeschlagen").await;
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("Link-Event-Schleife beendet");
}
