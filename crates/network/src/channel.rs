//! Canal de session : la vue qu'a la session d'une connexion ouverte
//!
//! Quel que soit le transport (WebSocket réel ou simulé), la session voit :
//! - une file d'événements entrants (`next_event`)
//! - une file sortante bornée, alimentée sans jamais bloquer
//! - une tâche de transport optionnelle à arrêter à la fermeture

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{ChannelEvent, NetworkError, NetworkResult, OutboundMessage};
use audio::{EncodedFrame, FrameSendError, FrameSink};

/// Canal ouvert vers le service
#[derive(Debug)]
pub struct SessionChannel {
    events: mpsc::Receiver<ChannelEvent>,
    outgoing: Option<mpsc::Sender<OutboundMessage>>,
    worker: Option<JoinHandle<()>>,
    close_grace: Duration,
    frames_sent: u64,
}

impl SessionChannel {
    /// Assemble un canal à partir de ses files et de la tâche de transport
    pub fn new(
        events: mpsc::Receiver<ChannelEvent>,
        outgoing: mpsc::Sender<OutboundMessage>,
        worker: Option<JoinHandle<()>>,
        close_grace: Duration,
    ) -> Self {
        Self {
            events,
            outgoing: Some(outgoing),
            worker,
            close_grace,
            frames_sent: 0,
        }
    }

    /// Attend le prochain événement ; `None` quand le transport est terminé
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Met une frame micro en file d'envoi sans attendre
    ///
    /// # Erreurs
    /// - `NetworkError::SendQueueFull` : une frame attend déjà, celle-ci est perdue
    /// - `NetworkError::ChannelClosed` : le canal est fermé
    pub fn send_realtime_input(&mut self, frame: EncodedFrame) -> NetworkResult<()> {
        let sender = self.outgoing.as_ref().ok_or(NetworkError::ChannelClosed)?;
        sender
            .try_send(OutboundMessage::RealtimeInput(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => NetworkError::SendQueueFull,
                TrySendError::Closed(_) => NetworkError::ChannelClosed,
            })?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Vrai tant que `close()` n'a pas été appelé et que le transport écoute
    pub fn is_open(&self) -> bool {
        self.outgoing.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Ferme le canal ; idempotent
    ///
    /// Lâcher la file sortante demande au transport d'envoyer une fermeture
    /// propre. Au-delà du délai de grâce, la tâche est abandonnée.
    pub async fn close(&mut self) {
        let Some(outgoing) = self.outgoing.take() else {
            return;
        };
        drop(outgoing);
        self.events.close();

        if let Some(mut worker) = self.worker.take() {
            if tokio::time::timeout(self.close_grace, &mut worker).await.is_err() {
                debug!("Transport trop lent à fermer, tâche abandonnée");
                worker.abort();
            }
        }
        debug!(frames_sent = self.frames_sent, "Canal fermé");
    }
}

impl FrameSink for SessionChannel {
    fn try_send_frame(&mut self, frame: EncodedFrame) -> Result<(), FrameSendError> {
        self.send_realtime_input(frame).map_err(|e| match e {
            NetworkError::SendQueueFull => FrameSendError::Saturated,
            _ => FrameSendError::Closed,
        })
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn frame(sequence: u64) -> EncodedFrame {
        EncodedFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
            sequence_number: sequence,
            sample_count: 2,
        }
    }

    #[tokio::test]
    async fn test_send_never_queues_more_than_capacity() {
        let (_event_tx, event_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let mut channel = SessionChannel::new(event_rx, out_tx, None, Duration::from_millis(10));

        assert_ok!(channel.send_realtime_input(frame(0)));
        assert!(matches!(channel.send_realtime_input(frame(1)), Err(NetworkError::SendQueueFull)));
        assert_eq!(channel.try_send_frame(frame(2)), Err(FrameSendError::Saturated));

        // La frame en file est bien la première
        let OutboundMessage::RealtimeInput(sent) = out_rx.recv().await.unwrap();
        assert_eq!(sent.sequence_number, 0);
        assert_eq!(channel.frames_sent(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (event_tx, event_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let mut channel = SessionChannel::new(event_rx, out_tx, None, Duration::from_millis(10));
        assert!(channel.is_open());

        channel.close().await;
        channel.close().await;

        assert!(!channel.is_open());
        assert_err!(channel.send_realtime_input(frame(0)));
        assert_eq!(channel.try_send_frame(frame(1)), Err(FrameSendError::Closed));
        // Le transport voit la file sortante se fermer
        assert!(out_rx.recv().await.is_none());
        // Plus aucun événement n'est accepté
        assert!(event_tx.send(ChannelEvent::Open).await.is_err());
    }

    #[tokio::test]
    async fn test_close_aborts_stuck_worker() {
        let (_event_tx, event_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let worker = tokio::spawn(std::future::pending::<()>());
        let mut channel = SessionChannel::new(event_rx, out_tx, Some(worker), Duration::from_millis(10));

        channel.close().await;
        assert!(!channel.is_open());
    }
}
