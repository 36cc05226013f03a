//! Tests des Track-Binding-Abgleichs

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{FakeLink, FakeSender};
use tincan_audio::MediaTrack;
use tincan_call::{PeerLink, SignalisierungsZustand, TrackBindingManager};
use tincan_core::types::TrackKind;

fn track(kind: TrackKind) -> Arc<MediaTrack> {
    let (_writer, track) = MediaTrack::neu(kind, "test");
    track
}

fn als_link(link: &Arc<FakeLink>) -> Arc<dyn PeerLink> {
    Arc::clone(link) as Arc<dyn PeerLink>
}

#[tokio::test]
async fn neue_tracks_werden_gebunden_und_verlangen_neuverhandlung() {
    let link = FakeLink::neu();
    let manager = TrackBindingManager::neu();
    let gewuenscht = vec![track(TrackKind::Audio), track(TrackKind::Video)];

    let bericht = manager
        .reconcile(&als_link(&link), &gewuenscht)
        .await
        .unwrap();

    assert_eq!(bericht.hinzugefuegt, 2);
    assert_eq!(bericht.ersetzt, 0);
    assert!(bericht.neuverhandlung_noetig);
    assert_eq!(link.sender_liste.lock().len(), 2);
}

#[tokio::test]
async fn reconcile_ist_idempotent() {
    let link = FakeLink::neu();
    let manager = TrackBindingManager::neu();
    let gewuenscht = vec![track(TrackKind::Audio), track(TrackKind::Video)];

    let erster = manager
        .reconcile(&als_link(&link), &gewuenscht)
        .await
        .unwrap();
    assert_eq!(erster.hinzugefuegt, 2);

    // Zweiter Lauf mit derselben Menge: kein Eingriff, kein Trigger
    let zweiter = manager
        .reconcile(&als_link(&link), &gewuenscht)
        .await
        .unwrap();
    assert_eq!(zweiter.unveraendert, 2);
    assert_eq!(zweiter.hinzugefuegt, 0);
    assert_eq!(zweiter.ersetzt, 0);
    assert_eq!(zweiter.entfernt, 0);
    assert!(!zweiter.neuverhandlung_noetig);
    assert_eq!(link.sender_liste.lock().len(), 2);
}

#[tokio::test]
async fn geraetewechsel_ersetzt_nur_den_audio_sender() {
    let link = FakeLink::neu();
    let manager = TrackBindingManager::neu();
    let altes_mikro = track(TrackKind::Audio);
    let kamera = track(TrackKind::Video);

    manager
        .reconcile(&als_link(&link), &[Arc::clone(&altes_mikro), Arc::clone(&kamera)])
        .await
        .unwrap();

    // Mikrofonwechsel: nur der Audio-Sender tauscht, keine Runde noetig
    let neues_mikro = track(TrackKind::Audio);
    let bericht = manager
        .reconcile(&als_link(&link), &[Arc::clone(&neues_mikro), kamera])
        .await
        .unwrap();

    assert_eq!(bericht.ersetzt, 1);
    assert_eq!(bericht.unveraendert, 1);
    assert!(!bericht.neuverhandlung_noetig);

    let audio_sender = link.sender_mit_kind(TrackKind::Audio).unwrap();
    assert_eq!(*audio_sender.gebunden.lock(), neues_mikro.id());
}

#[tokio::test]
async fn ersatzfehler_wird_einmal_per_add_wiederholt() {
    let link = FakeLink::neu();
    let manager = TrackBindingManager::neu();

    // Vorbelegter Sender dessen Ersatz scheitert (abgelaufener Track)
    let kaputt = FakeSender::neu(99, TrackKind::Audio, track(TrackKind::Audio).id());
    kaputt.ersatz_schlaegt_fehl.store(true, Ordering::SeqCst);
    link.sender_liste.lock().push(kaputt);

    let neuer = track(TrackKind::Audio);
    let bericht = manager
        .reconcile(&als_link(&link), &[Arc::clone(&neuer)])
        .await
        .unwrap();

    // Fehler wurde abgefangen, der Track haengt per Add am Link
    assert_eq!(bericht.ersetzt, 0);
    assert_eq!(bericht.hinzugefuegt, 1);
    assert!(bericht.neuverhandlung_noetig);
    let sender = link.sender_mit_kind(TrackKind::Audio).unwrap();
    assert_eq!(*sender.gebunden.lock(), neuer.id());
}

#[tokio::test]
async fn laufende_verhandlung_unterdrueckt_den_trigger() {
    let link = FakeLink::neu();
    link.signaling_setzen(SignalisierungsZustand::RemoteAngebot);
    let manager = TrackBindingManager::neu();

    let bericht = manager
        .reconcile(&als_link(&link), &[track(TrackKind::Audio)])
        .await
        .unwrap();

    // Strukturelle Aenderung, aber die Neuverhandlung ist implizit
    assert_eq!(bericht.hinzugefuegt, 1);
    assert!(!bericht.neuverhandlung_noetig);
}

#[tokio::test]
async fn ueberzaehlige_sender_werden_entfernt() {
    let link = FakeLink::neu();
    let manager = TrackBindingManager::neu();

    manager
        .reconcile(
            &als_link(&link),
            &[track(TrackKind::Audio), track(TrackKind::Video)],
        )
        .await
        .unwrap();

    // Video faellt weg (z.B. Kamera aus): Sender wird abgebunden
    let nur_audio = vec![track(TrackKind::Audio)];
    let bericht = manager
        .reconcile(&als_link(&link), &nur_audio)
        .await
        .unwrap();

    assert_eq!(bericht.entfernt, 1);
    assert!(bericht.neuverhandlung_noetig);
    assert!(link.sender_mit_kind(TrackKind::Video).is_none());
}
