//! CLI-Entscheider fuer eingehende Anrufe
//!
//! Die Zustandsmaschine wartet auf die Entscheidung; die faellt hier
//! ueber `accept`/`reject` auf stdin. Ohne Eingabe lehnt ein Timeout
//! den Anruf ab.

use async_trait::async_trait;
use std::time::Duration;
use tincan_call::CallDecider;
use tincan_core::types::Peer;
use tokio::sync::{oneshot, Mutex};

/// Wie lange auf accept/reject gewartet wird
const ENTSCHEIDUNGS_TIMEOUT: Duration = Duration::from_secs(30);

/// Entscheider mit haengender stdin-Antwort
pub struct CliDecider {
    wartend: Mutex<Option<oneshot::Sender<bool>>>,
}

impl CliDecider {
    pub fn neu() -> Self {
        Self {
            wartend: Mutex::new(None),
        }
    }

    /// Beantwortet die offene Entscheidung (von der Kommando-Schleife)
    ///
    /// Gibt false zurueck wenn gerade keine Entscheidung offen ist.
    pub async fn beantworten(&self, annahme: bool) -> bool {
        match self.wartend.lock().await.take() {
            Some(tx) => tx.send(annahme).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl CallDecider for CliDecider {
    async fn entscheiden(&self, von: &Peer) -> bool {
        let (tx, rx) = oneshot::channel();
        *self.wartend.lock().await = Some(tx);

        println!(
            ">> Eingehender Anruf von {} ({}) - 'accept' oder 'reject' eingeben",
            von.display_name, von.id
        );

        match tokio::time::timeout(ENTSCHEIDUNGS_TIMEOUT, rx).await {
            Ok(Ok(antwort)) => antwort,
            _ => {
                println!(">> Keine Eingabe, Anruf wird abgelehnt");
                self.wartend.lock().await.take();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn antwort_erreicht_die_entscheidung() {
        let decider = Arc::new(CliDecider::neu());
        let d = Arc::clone(&decider);

        let frage = tokio::spawn(async move {
            d.entscheiden(&Peer::neu("sock-a", "alice")).await
        });

        // Auf die offene Entscheidung warten, dann beantworten
        for _ in 0..50 {
            if decider.beantworten(true).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(frage.await.unwrap());
    }

    #[tokio::test]
    async fn ohne_offene_frage_keine_antwort() {
        let decider = CliDecider::neu();
        assert!(!decider.beantworten(true).await);
    }
}
