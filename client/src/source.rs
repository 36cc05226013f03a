//! Synthetische Medienquelle fuer den CLI-Client
//!
//! Die echte Geraete-Erfassung gehoert der Einbettung; im CLI steht ein
//! Sinuston fuer das Mikrofon. Video-Constraints werden hier bewusst
//! ignoriert (keine Kamera), der Anruf fordert Video-Empfang trotzdem an.

use async_trait::async_trait;
use std::f32::consts::TAU;
use std::time::Duration;
use tincan_audio::{
    AudioError, AudioFrame, AudioResult, CaptureConstraints, MediaFrame, MediaSource, MediaStream,
    MediaTrack,
};
use tincan_core::types::TrackKind;

/// Sinuston-Quelle (steht fuer die Mikrofon-Erfassung)
pub struct SinusQuelle {
    sample_rate: u32,
    frequenz: f32,
}

impl SinusQuelle {
    pub fn neu(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frequenz: 440.0,
        }
    }
}

#[async_trait]
impl MediaSource for SinusQuelle {
    async fn acquire(&self, constraints: &CaptureConstraints) -> AudioResult<MediaStream> {
        if constraints.video.is_some() {
            tracing::debug!("Keine Kamera im CLI-Client, Video-Constraints ignoriert");
        }

        let (writer, audio) = MediaTrack::neu(TrackKind::Audio, "sinus-mikro");
        let sample_rate = self.sample_rate;
        let frame_size = (sample_rate / 1000 * 20) as usize;
        let schritt = TAU * self.frequenz / sample_rate as f32;

        // 20ms-Takt bis der Track gestoppt wird
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(Duration::from_millis(20));
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut phase: f32 = 0.0;

            loop {
                takt.tick().await;
                if writer.ist_beendet() {
                    break;
                }

                let samples: Vec<f32> = (0..frame_size)
                    .map(|_| {
                        phase += schritt;
                        if phase > TAU {
                            phase -= TAU;
                        }
                        phase.sin() * 0.2
                    })
                    .collect();

                match writer.schreiben(MediaFrame::Audio(AudioFrame {
                    samples,
                    sample_rate,
                    channels: 1,
                })) {
                    Ok(()) | Err(AudioError::PufferVoll) => {}
                    Err(_) => break,
                }
            }
            tracing::debug!("Sinus-Quelle beendet");
        });

        Ok(MediaStream::neu(vec![audio]))
    }
}
