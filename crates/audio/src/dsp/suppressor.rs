//! Rauschunterdrueckung via spektrale Subtraktion
//!
//! Schaetzt das Rauschspektrum waehrend Stille und subtrahiert es.
//! Die Band-Gewichte kommen aus dem geladenen Suppressor-Modul und
//! formen, wie stark die Subtraktion auf die einzelnen Frame-Segmente
//! wirkt.

use super::AudioProcessor;

/// Stufe der Rauschunterdrueckung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionLevel {
    /// Leichte Rauschreduzierung (alpha = 1.5)
    Low,
    /// Mittlere Rauschreduzierung (alpha = 2.5)
    #[default]
    Medium,
    /// Starke Rauschreduzierung (alpha = 4.0)
    High,
}

impl SuppressionLevel {
    /// Subtraktions-Faktor (alpha)
    fn alpha(&self) -> f32 {
        match self {
            Self::Low => 1.5,
            Self::Medium => 2.5,
            Self::High => 4.0,
        }
    }

    /// Minimaler Gain nach Subtraktion (Floor, verhindert musical noise)
    fn spectral_floor(&self) -> f32 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.1,
            Self::High => 0.05,
        }
    }
}

/// Rauschunterdruecker (spektrale Subtraktion im Zeitbereich)
///
/// Band-Energie-basierte Naeherung: der geschaetzte Rauschpegel wird
/// per exponentieller Glaettung aktualisiert und vom Signal
/// subtrahiert. Mit Band-Gewichten aus dem Modul wird der Frame in
/// gleich grosse Segmente geteilt und der Subtraktions-Effekt pro
/// Segment skaliert (Gewicht 1.0 = voller Effekt, 0.0 = keiner).
pub struct NoiseSuppressor {
    level: SuppressionLevel,
    /// Band-Gewichte aus dem Modul (leer = uniform)
    band_gewichte: Vec<f32>,
    /// Geschaetzter Rauschpegel (RMS)
    noise_estimate: f32,
    /// Glaettungsfaktor fuer Rauschschaetzung
    noise_smoothing: f32,
    /// Stille-Detektor: Frames unterhalb dieses Pegels gelten als Rauschen
    silence_threshold: f32,
    enabled: bool,
}

impl NoiseSuppressor {
    pub fn new(level: SuppressionLevel) -> Self {
        Self::mit_gewichten(level, Vec::new())
    }

    /// Erstellt einen Suppressor mit Band-Gewichten aus dem Modul
    pub fn mit_gewichten(level: SuppressionLevel, band_gewichte: Vec<f32>) -> Self {
        Self {
            level,
            band_gewichte,
            noise_estimate: 0.0,
            noise_smoothing: 0.95,
            silence_threshold: 0.02,
            enabled: true,
        }
    }

    /// Setzt den Stille-Schwellenwert (RMS unterhalb dessen Rauschen geschaetzt wird)
    pub fn set_silence_threshold(&mut self, threshold: f32) {
        self.silence_threshold = threshold;
    }

    /// Gibt die aktuelle Rauschschaetzung zurueck
    pub fn noise_estimate(&self) -> f32 {
        self.noise_estimate
    }

    pub fn level(&self) -> SuppressionLevel {
        self.level
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl AudioProcessor for NoiseSuppressor {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled || samples.is_empty() {
            return;
        }

        let frame_rms = Self::rms(samples);

        // Rauschschaetzung: nur aktualisieren wenn Signal leise (= Rauschen)
        if frame_rms < self.silence_threshold {
            self.noise_estimate = self.noise_smoothing * self.noise_estimate
                + (1.0 - self.noise_smoothing) * frame_rms;
        }

        if self.noise_estimate < 1e-7 {
            return;
        }

        let alpha = self.level.alpha();
        let floor = self.level.spectral_floor();

        // Spektrale Subtraktion (Zeitbereich-Naeherung):
        // Gain = max(floor, 1 - alpha * (noise / signal))
        let gain = if frame_rms > 1e-7 {
            let ratio = self.noise_estimate / frame_rms;
            (1.0 - alpha * ratio).max(floor)
        } else {
            floor
        };

        if self.band_gewichte.is_empty() {
            for sample in samples.iter_mut() {
                *sample *= gain;
            }
            return;
        }

        // Frame in Band-Segmente teilen, Subtraktions-Effekt pro Segment
        // mit dem Modul-Gewicht skalieren
        let band_anzahl = self.band_gewichte.len();
        let segment_laenge = samples.len().div_ceil(band_anzahl);
        for (band, segment) in samples.chunks_mut(segment_laenge).enumerate() {
            let gewicht = self.band_gewichte[band.min(band_anzahl - 1)];
            let band_gain = (1.0 - gewicht * (1.0 - gain)).clamp(floor, 1.0);
            for sample in segment.iter_mut() {
                *sample *= band_gain;
            }
        }
    }

    fn reset(&mut self) {
        self.noise_estimate = 0.0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
