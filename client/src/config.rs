//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay-Einstellungen
    pub relay: RelayEinstellungen,
    /// ICE/STUN-Einstellungen
    pub ice: IceEinstellungen,
    /// Audio-Einstellungen
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// WebSocket-URL des Signaling-Relays
    pub url: String,
    /// Anzeigename fuer die Registrierung
    pub user_name: String,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9000".into(),
            user_name: format!("User_{}", rand::thread_rng().gen_range(0..1000)),
        }
    }
}

/// ICE/STUN-Einstellungen (TURN ist bewusst nicht abgebildet)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceEinstellungen {
    /// STUN-Server, mindestens einer
    pub stun_server: Vec<String>,
}

impl Default for IceEinstellungen {
    fn default() -> Self {
        Self {
            stun_server: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Pfad zum Suppressor-Modul (None = degradierter Betrieb)
    pub suppressor_modul: Option<String>,
    /// Abtastrate der Verarbeitung
    pub sample_rate: u32,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            suppressor_modul: None,
            sample_rate: 48_000,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration (Standardwerte falls Datei fehlt)
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        if !Path::new(pfad).exists() {
            return Ok(Self::default());
        }
        let inhalt = std::fs::read_to_string(pfad)
            .with_context(|| format!("Konfigurationsdatei {} nicht lesbar", pfad))?;
        toml::from_str(&inhalt)
            .with_context(|| format!("Konfigurationsdatei {} nicht parsebar", pfad))
    }
}
