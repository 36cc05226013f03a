//! Suppressor-Modul – Laden des binaeren Gewichts-Payloads
//!
//! Das Modul wird einmal pro Sitzung asynchron geladen und dann ueber
//! mehrere Anrufe wiederverwendet. Schlaegt das Laden fehl, degradiert
//! die Pipeline auf Durchreichung – ein Anruf scheitert daran nie.
//!
//! ## Binaerformat
//!
//! ```text
//! +------+---------+-------+------+------------+----...----+
//! | TNSM | version | level | 0x00 | band_count | gewichte  |
//! | 4 B  | u16 LE  | u8    | u8   | u16 LE     | n*f32 LE  |
//! +------+---------+-------+------+------------+----...----+
//! ```
//!
//! Gewichte liegen in [0.0, 2.0]; band_count in 1..=64.

use crate::dsp::{NoiseSuppressor, SuppressionLevel};
use crate::error::{AudioError, AudioResult};
use std::path::Path;

/// Magic-Bytes am Dateianfang
pub const MODUL_MAGIC: &[u8; 4] = b"TNSM";

/// Unterstuetzte Formatversion
pub const MODUL_VERSION: u16 = 1;

/// Maximale Band-Anzahl
pub const MAX_BAENDER: u16 = 64;

/// Geladenes Rauschunterdrueckungs-Modul
#[derive(Debug, Clone)]
pub struct SuppressorModule {
    level: SuppressionLevel,
    band_gewichte: Vec<f32>,
}

impl SuppressorModule {
    /// Laedt das Modul asynchron von der Platte
    pub async fn laden(pfad: &Path) -> AudioResult<Self> {
        let bytes = tokio::fs::read(pfad).await.map_err(|e| {
            AudioError::SuppressorModul(format!("{} nicht lesbar: {}", pfad.display(), e))
        })?;
        Self::aus_bytes(&bytes)
    }

    /// Parst das Modul aus dem Binaerformat
    pub fn aus_bytes(bytes: &[u8]) -> AudioResult<Self> {
        if bytes.len() < 10 {
            return Err(AudioError::SuppressorModul(format!(
                "Payload zu kurz: {} Bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MODUL_MAGIC {
            return Err(AudioError::SuppressorModul(
                "Magic-Bytes fehlen (kein TNSM-Payload)".into(),
            ));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != MODUL_VERSION {
            return Err(AudioError::SuppressorModul(format!(
                "Formatversion {} nicht unterstuetzt (erwartet {})",
                version, MODUL_VERSION
            )));
        }

        let level = match bytes[6] {
            0 => SuppressionLevel::Low,
            1 => SuppressionLevel::Medium,
            2 => SuppressionLevel::High,
            andere => {
                return Err(AudioError::SuppressorModul(format!(
                    "Unbekannte Stufe: {}",
                    andere
                )))
            }
        };

        let band_count = u16::from_le_bytes([bytes[8], bytes[9]]);
        if band_count == 0 || band_count > MAX_BAENDER {
            return Err(AudioError::SuppressorModul(format!(
                "Band-Anzahl {} ausserhalb 1..={}",
                band_count, MAX_BAENDER
            )));
        }

        let erwartet = 10 + band_count as usize * 4;
        if bytes.len() != erwartet {
            return Err(AudioError::SuppressorModul(format!(
                "Laenge {} passt nicht zu {} Baendern (erwartet {})",
                bytes.len(),
                band_count,
                erwartet
            )));
        }

        let mut band_gewichte = Vec::with_capacity(band_count as usize);
        for i in 0..band_count as usize {
            let start = 10 + i * 4;
            let gewicht = f32::from_le_bytes([
                bytes[start],
                bytes[start + 1],
                bytes[start + 2],
                bytes[start + 3],
            ]);
            if !gewicht.is_finite() || !(0.0..=2.0).contains(&gewicht) {
                return Err(AudioError::SuppressorModul(format!(
                    "Gewicht {} von Band {} ausserhalb [0.0, 2.0]",
                    gewicht, i
                )));
            }
            band_gewichte.push(gewicht);
        }

        tracing::debug!(
            level = ?level,
            baender = band_gewichte.len(),
            "Suppressor-Modul geparst"
        );

        Ok(Self {
            level,
            band_gewichte,
        })
    }

    /// Serialisiert das Modul ins Binaerformat
    pub fn in_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.band_gewichte.len() * 4);
        out.extend_from_slice(MODUL_MAGIC);
        out.extend_from_slice(&MODUL_VERSION.to_le_bytes());
        out.push(match self.level {
            SuppressionLevel::Low => 0,
            SuppressionLevel::Medium => 1,
            SuppressionLevel::High => 2,
        });
        out.push(0);
        out.extend_from_slice(&(self.band_gewichte.len() as u16).to_le_bytes());
        for gewicht in &self.band_gewichte {
            out.extend_from_slice(&gewicht.to_le_bytes());
        }
        out
    }

    /// Erstellt ein Modul direkt aus Stufe und Gewichten
    pub fn neu(level: SuppressionLevel, band_gewichte: Vec<f32>) -> Self {
        Self {
            level,
            band_gewichte,
        }
    }

    /// Baut den DSP-Prozessor zu diesem Modul
    pub fn suppressor(&self) -> NoiseSuppressor {
        NoiseSuppressor::mit_gewichten(self.level, self.band_gewichte.clone())
    }

    pub fn level(&self) -> SuppressionLevel {
        self.level
    }

    pub fn band_gewichte(&self) -> &[f32] {
        &self.band_gewichte
    }
}
