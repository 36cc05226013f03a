//! Presence-Roster – Wer ist gerade am Relay erreichbar
//!
//! Haelt den ephemeren Zustand des `active-users`-Rosters. Eintraege
//! entstehen mit jeder Roster-Nachricht und verschwinden mit der
//! Disconnect-Benachrichtigung; der eigene Eintrag wird herausgefiltert.
//!
//! Thread-safe durch DashMap; Clone teilt den inneren Zustand.

use dashmap::DashMap;
use std::sync::Arc;
use tincan_core::types::{Peer, PeerId};
use tincan_protocol::User;

/// Verwaltet die erreichbaren Teilnehmer
#[derive(Clone)]
pub struct PresenceRoster {
    inner: Arc<RosterInner>,
}

struct RosterInner {
    peers: DashMap<PeerId, Peer>,
    eigene_id: parking_lot::RwLock<Option<PeerId>>,
}

impl PresenceRoster {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(RosterInner {
                peers: DashMap::new(),
                eigene_id: parking_lot::RwLock::new(None),
            }),
        }
    }

    /// Merkt sich die eigene Relay-Kennung (zum Herausfiltern)
    pub fn eigene_id_setzen(&self, id: PeerId) {
        *self.inner.eigene_id.write() = Some(id);
    }

    pub fn eigene_id(&self) -> Option<PeerId> {
        self.inner.eigene_id.read().clone()
    }

    /// Ersetzt das Roster durch die neue `active-users`-Liste
    ///
    /// Gibt die sichtbaren Peers (ohne den eigenen Eintrag) zurueck.
    pub fn aktualisieren(&self, users: Vec<User>) -> Vec<Peer> {
        let eigene = self.eigene_id();
        self.inner.peers.clear();

        for user in users {
            if Some(&user.socket_id) == eigene.as_ref() {
                continue;
            }
            let peer = Peer {
                id: user.socket_id.clone(),
                display_name: user.user_id,
            };
            self.inner.peers.insert(user.socket_id, peer);
        }

        tracing::debug!(anzahl = self.inner.peers.len(), "Roster aktualisiert");
        self.alle()
    }

    /// Entfernt einen Teilnehmer (Disconnect-Benachrichtigung)
    pub fn entfernen(&self, id: &PeerId) -> Option<Peer> {
        let entfernt = self.inner.peers.remove(id).map(|(_, p)| p);
        if let Some(peer) = &entfernt {
            tracing::debug!(peer = %peer.id, "Teilnehmer offline");
        }
        entfernt
    }

    /// Sucht einen Teilnehmer nach Kennung
    pub fn peer(&self, id: &PeerId) -> Option<Peer> {
        self.inner.peers.get(id).map(|e| e.clone())
    }

    /// Alle sichtbaren Teilnehmer, nach Anzeigename sortiert
    pub fn alle(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.inner.peers.iter().map(|e| e.value().clone()).collect();
        peers.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        peers
    }

    pub fn anzahl(&self) -> usize {
        self.inner.peers.len()
    }
}

impl Default for PresenceRoster {
    fn default() -> Self {
        Self::neu()
    }
}
