//! TrackBindingManager – Abgleich gewuenschter gegen gebundene Tracks
//!
//! Gleicht die Menge der Tracks die durch die Peer-Verbindung fliessen
//! sollen gegen die tatsaechlich gebundenen Sender ab:
//! - passender Sender vorhanden -> `replace_track` (billig, keine
//!   Neuverhandlung; identischer Track wird komplett uebersprungen)
//! - kein Sender der Art -> `add_track` (strukturelle SDP-Aenderung)
//! - Sender ohne gewuenschten Track -> `remove_track` (strukturell)
//!
//! Fehlgeschlagene Ersetzungen (abgelaufener Track, abgebauter Graph)
//! werden abgefangen und einmalig per Add statt Replace wiederholt –
//! sie erreichen den Aufrufer nie als unbehandelter Fehler.

use crate::error::CallResult;
use crate::link::PeerLink;
use std::collections::HashSet;
use std::sync::Arc;
use tincan_audio::MediaTrack;

/// Ergebnis eines Abgleichs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileBericht {
    /// Sender deren Track ausgetauscht wurde
    pub ersetzt: usize,
    /// Neu gebundene Sender
    pub hinzugefuegt: usize,
    /// Entfernte Sender
    pub entfernt: usize,
    /// Bereits korrekt gebundene Tracks (kein Eingriff)
    pub unveraendert: usize,
    /// Ob eine Neuverhandlung angestossen werden muss
    ///
    /// Nur bei strukturellen Aenderungen, und nur wenn die Verbindung
    /// nicht ohnehin mitten in einer Verhandlung steckt (dann ist die
    /// Neuverhandlung implizit).
    pub neuverhandlung_noetig: bool,
}

/// Gleicht gewuenschte Tracks gegen gebundene Sender ab
#[derive(Debug, Default)]
pub struct TrackBindingManager;

impl TrackBindingManager {
    pub fn neu() -> Self {
        Self
    }

    /// Fuehrt einen Abgleich durch
    ///
    /// Idempotent: ein zweiter Aufruf mit derselben Track-Menge erzeugt
    /// keine weiteren Sender-Eingriffe und keinen Neuverhandlungs-Trigger.
    pub async fn reconcile(
        &self,
        link: &Arc<dyn PeerLink>,
        gewuenscht: &[Arc<MediaTrack>],
    ) -> CallResult<ReconcileBericht> {
        let sender = link.senders().await;
        let mut bericht = ReconcileBericht::default();
        let mut strukturell = false;
        let mut benutzt: HashSet<u64> = HashSet::new();

        for track in gewuenscht {
            let passend = sender
                .iter()
                .find(|s| s.kind() == track.kind() && !benutzt.contains(&s.sender_id()));

            match passend {
                Some(s) => {
                    benutzt.insert(s.sender_id());

                    if s.gebundener_track() == Some(track.id()) {
                        bericht.unveraendert += 1;
                        continue;
                    }

                    match s.replace_track(Arc::clone(track)).await {
                        Ok(()) => {
                            tracing::debug!(kind = %track.kind(), track = %track.id(), "Track ersetzt");
                            bericht.ersetzt += 1;
                        }
                        Err(e) => {
                            // Einmaliger Wiederholungsversuch per Add
                            tracing::warn!(
                                kind = %track.kind(),
                                fehler = %e,
                                "Ersetzen fehlgeschlagen, wiederhole per Add"
                            );
                            if let Err(e) = link.remove_track(s.as_ref()).await {
                                tracing::debug!(fehler = %e, "Defekter Sender nicht entfernbar");
                            }
                            link.add_track(Arc::clone(track)).await?;
                            bericht.hinzugefuegt += 1;
                            strukturell = true;
                        }
                    }
                }
                None => {
                    link.add_track(Arc::clone(track)).await?;
                    tracing::debug!(kind = %track.kind(), track = %track.id(), "Track neu gebunden");
                    bericht.hinzugefuegt += 1;
                    strukturell = true;
                }
            }
        }

        // Sender ohne gewuenschten Track abbinden
        for s in sender.iter().filter(|s| !benutzt.contains(&s.sender_id())) {
            link.remove_track(s.as_ref()).await?;
            tracing::debug!(kind = %s.kind(), "Sender entfernt");
            bericht.entfernt += 1;
            strukturell = true;
        }

        bericht.neuverhandlung_noetig =
            strukturell && !link.signaling_state().mitten_in_verhandlung();

        Ok(bericht)
    }
}
