//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus und stellt eine einfache f32-PCM basierte API fuer
//! die Transport-Naht bereit: ausgehende bearbeitete Frames werden vor
//! dem Versand kodiert, eingehende RTP-Payloads dekodiert.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// Opus-Frame-Dauer in Millisekunden (fest 20ms)
const FRAME_MS: u32 = 20;

fn rate_nach_audiopus(rate: u32) -> AudioResult<SampleRate> {
    match rate {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        andere => Err(AudioError::Konfiguration(format!(
            "Abtastrate {} wird von Opus nicht unterstuetzt",
            andere
        ))),
    }
}

fn kanaele_nach_audiopus(channels: u16) -> AudioResult<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        andere => Err(AudioError::Konfiguration(format!(
            "Kanalanzahl {} wird von Opus nicht unterstuetzt",
            andere
        ))),
    }
}

/// Opus-Encoder: kodiert f32-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    frame_size: usize,
    channels: u16,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder (Voip-Profil, 20ms-Frames)
    pub fn neu(sample_rate: u32, channels: u16) -> AudioResult<Self> {
        let encoder = Encoder::new(
            rate_nach_audiopus(sample_rate)?,
            kanaele_nach_audiopus(channels)?,
            Application::Voip,
        )
        .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        let frame_size = (sample_rate / 1000 * FRAME_MS) as usize;

        debug!(sample_rate, channels, frame_size, "OpusEncoder erstellt");

        Ok(Self {
            encoder,
            frame_size,
            channels,
        })
    }

    /// Kodiert einen PCM-Frame (f32, normalisiert -1.0..1.0) zu Opus-Bytes
    ///
    /// Die Eingabe muss exakt `frame_size() * channels` Samples lang sein.
    pub fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>> {
        let erwartet = self.frame_size * self.channels as usize;
        if pcm.len() != erwartet {
            return Err(AudioError::Konfiguration(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                erwartet,
                pcm.len()
            )));
        }

        // Puffer: max. 4000 Bytes reicht fuer alle Opus-Frames
        let mut output = vec![0u8; 4000];
        let written = self
            .encoder
            .encode_float(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }

    /// Gibt die erwartete Frame-Groesse in Samples pro Kanal zurueck
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu f32-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    frame_size: usize,
    channels: u16,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder (20ms-Frames)
    pub fn neu(sample_rate: u32, channels: u16) -> AudioResult<Self> {
        let decoder = Decoder::new(
            rate_nach_audiopus(sample_rate)?,
            kanaele_nach_audiopus(channels)?,
        )
        .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        let frame_size = (sample_rate / 1000 * FRAME_MS) as usize;

        debug!(sample_rate, channels, frame_size, "OpusDecoder erstellt");

        Ok(Self {
            decoder,
            frame_size,
            channels,
        })
    }

    /// Dekodiert Opus-Bytes zu f32-PCM
    pub fn decode(&mut self, opus_data: &[u8]) -> AudioResult<Vec<f32>> {
        let mut output = vec![0.0f32; self.frame_size * self.channels as usize];
        let decoded = self
            .decoder
            .decode_float(Some(opus_data), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * self.channels as usize);
        Ok(output)
    }

    /// Dekodiert mit PLC (Packet Loss Concealment) wenn kein Paket empfangen
    pub fn decode_plc(&mut self) -> AudioResult<Vec<f32>> {
        let mut output = vec![0.0f32; self.frame_size * self.channels as usize];
        let decoded = self
            .decoder
            .decode_float(None::<&[u8]>, &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * self.channels as usize);
        Ok(output)
    }

    /// Gibt die erwartete Frame-Groesse in Samples pro Kanal zurueck
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
