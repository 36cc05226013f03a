//! Tincan CLI-Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, baut die
//! Audio-Pipeline und die Relay-Verbindung auf und faehrt eine kleine
//! Kommando-Schleife auf stdin.

mod config;
mod decider;
mod source;

use anyhow::Result;
use config::ClientConfig;
use decider::CliDecider;
use source::SinusQuelle;
use std::path::PathBuf;
use std::sync::Arc;
use tincan_audio::{AudioContext, AudioContextConfig, AudioPipeline, CaptureConstraints};
use tincan_call::{CallEngine, IceConfig, WebRtcLinkFactory};
use tincan_core::CallEvent;
use tincan_signaling::{PresenceRoster, SignalDispatcher, SignalingChannel, SignalingConfig};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TINCAN_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        relay = %config.relay.url,
        "Tincan Client wird initialisiert"
    );

    // Audio-Kontext lebt die ganze Sitzung; die Pipeline laedt ihr
    // Modul einmal und wird ueber mehrere Anrufe wiederverwendet
    let context = AudioContext::neu(AudioContextConfig {
        sample_rate: config.audio.sample_rate,
        frame_size: (config.audio.sample_rate / 1000 * 20) as usize,
        channels: 1,
    });
    let pipeline = Arc::new(AudioPipeline::neu(
        Arc::clone(&context),
        config.audio.suppressor_modul.clone().map(PathBuf::from),
    ));
    pipeline.initialisieren().await;
    if pipeline.ist_degradiert() {
        tracing::warn!("Rauschunterdrueckung nicht verfuegbar, Anrufe laufen unbearbeitet");
    }

    // Relay-Verbindung (registriert sich nach jedem Connect neu)
    let kanal = SignalingChannel::verbinden(SignalingConfig::neu(
        &config.relay.url,
        &config.relay.user_name,
    ));

    // Anruf-Maschine
    let decider = Arc::new(CliDecider::neu());
    let engine = CallEngine::neu(
        kanal.sender(),
        Arc::new(WebRtcLinkFactory::neu(IceConfig {
            stun_server: config.ice.stun_server.clone(),
        })),
        Arc::new(SinusQuelle::neu(config.audio.sample_rate)),
        Arc::clone(&pipeline),
        Arc::clone(&decider) as Arc<dyn tincan_call::CallDecider>,
        CaptureConstraints::audio_und_video(),
    );

    // Dispatcher: eingehende Nachrichten -> Zustandsuebergaenge
    let roster = PresenceRoster::neu();
    let dispatcher = SignalDispatcher::neu(Arc::clone(&engine), roster.clone());
    let eingang = kanal
        .eingang_uebernehmen()
        .ok_or_else(|| anyhow::anyhow!("Eingangs-Strom bereits vergeben"))?;
    tokio::spawn(async move {
        dispatcher.ausfuehren(eingang).await;
    });

    // Transportverlust erzwingt Teardown
    let mut verbunden = kanal.verbunden_beobachten();
    let engine_verlust = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut war_verbunden = *verbunden.borrow();
        while verbunden.changed().await.is_ok() {
            let ist_verbunden = *verbunden.borrow();
            if war_verbunden && !ist_verbunden {
                engine_verlust
                    .handle_transport_loss("Relay-Verbindung verloren")
                    .await;
            }
            war_verbunden = ist_verbunden;
        }
    });

    // Anruf-Events auf die Konsole
    let mut events = engine.events_abonnieren();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => ereignis_ausgeben(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(verpasst = n, "Event-Abonnent hinkt hinterher");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    kommando_schleife(&engine, &roster, &decider).await;

    // Prozessweiter Teardown: erst der Anruf, dann der Audio-Kontext
    engine.hangup().await;
    kanal.trennen();
    context.schliessen();
    tracing::info!("Tincan Client beendet");
    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

fn ereignis_ausgeben(event: &CallEvent) {
    match event {
        CallEvent::Registriert { peer_id } => {
            println!(">> Registriert als {}", peer_id);
        }
        CallEvent::RosterAktualisiert { peers } => {
            println!(">> {} Teilnehmer erreichbar ('list')", peers.len());
        }
        CallEvent::EingehenderAnruf { .. } => {
            // Der Entscheider gibt den Prompt selbst aus
        }
        CallEvent::AnrufVerbunden { peer_id } => {
            println!(">> Anruf verbunden mit {}", peer_id);
        }
        CallEvent::AnrufAbgelehnt { peer_id } => {
            println!(">> {} hat den Anruf abgelehnt", peer_id);
        }
        CallEvent::AnrufBeendet { grund, .. } => {
            println!(">> Anruf beendet: {}", grund);
        }
        CallEvent::AnrufFehlgeschlagen { fehler } => {
            println!("!! Anruf fehlgeschlagen: {}", fehler);
        }
        CallEvent::RemoteTrack { kind, .. } => {
            println!(">> Remote-{}-Track eingetroffen", kind);
        }
        CallEvent::SuppressorDegradiert { grund } => {
            println!("!! Rauschunterdrueckung deaktiviert: {}", grund);
        }
    }
}

fn hilfe_ausgeben() {
    println!("Kommandos: list | call <nr|id> | accept | reject | hangup | status | quit");
}

async fn kommando_schleife(
    engine: &Arc<CallEngine>,
    roster: &PresenceRoster,
    decider: &Arc<CliDecider>,
) {
    let mut zeilen = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    hilfe_ausgeben();

    while let Ok(Some(zeile)) = zeilen.next_line().await {
        let teile: Vec<&str> = zeile.trim().split_whitespace().collect();
        match teile.as_slice() {
            ["list"] => {
                let peers = roster.alle();
                if peers.is_empty() {
                    println!("Niemand erreichbar");
                }
                for (i, peer) in peers.iter().enumerate() {
                    println!(" [{}] {} ({})", i, peer.display_name, peer.id);
                }
            }

            ["call", ziel] => {
                // Nummer aus 'list' oder direkte Kennung
                let peer_id = match ziel.parse::<usize>() {
                    Ok(index) => match roster.alle().get(index) {
                        Some(peer) => Some(peer.id.clone()),
                        None => {
                            println!("!! Kein Eintrag [{}]", index);
                            None
                        }
                    },
                    Err(_) => Some(tincan_core::types::PeerId::neu(*ziel)),
                };
                if let Some(peer_id) = peer_id {
                    if let Err(e) = engine.initiate_call(peer_id).await {
                        println!("!! {}", e);
                    }
                }
            }

            ["accept"] => {
                if !decider.beantworten(true).await {
                    println!("!! Kein eingehender Anruf");
                }
            }

            ["reject"] => {
                if !decider.beantworten(false).await {
                    println!("!! Kein eingehender Anruf");
                }
            }

            ["hangup"] => engine.hangup().await,

            ["status"] => {
                let s = engine.session().lesen();
                println!(
                    "Zustand: {:?}, Gegenseite: {}",
                    s.zustand,
                    s.remote_peer
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }

            ["quit"] | ["exit"] => break,
            [] => {}
            _ => hilfe_ausgeben(),
        }
    }
}
