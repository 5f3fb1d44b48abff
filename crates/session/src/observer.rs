//! Observateurs de session
//!
//! L'interface (terminal, graphique...) ne voit la session qu'à travers
//! ces quatre rappels. Ils sont appelés depuis la tâche de session et ne
//! doivent jamais bloquer.

use tokio::sync::mpsc;

use crate::ConnectionState;
use audio::FrequencySnapshot;

/// Rappels émis par la session
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, state: ConnectionState);

    /// Spectre de la sortie, une fois par chunk planifié
    fn on_audio_data(&self, snapshot: &FrequencySnapshot);

    /// Fragment de transcription, transmis tel quel
    fn on_transcript(&self, text: &str, speaker_is_user: bool);

    /// Message d'erreur lisible par l'utilisateur
    fn on_error(&self, message: &str);
}

/// Rappel sous forme de message
#[derive(Clone, Debug, PartialEq)]
pub enum SessionNotification {
    StateChanged(ConnectionState),
    AudioData(FrequencySnapshot),
    Transcript { text: String, speaker_is_user: bool },
    Error(String),
}

/// Observateur qui transmet chaque rappel sur un channel non borné
///
/// L'envoi ne bloque jamais ; si le récepteur a disparu, les rappels sont perdus.
pub struct EventForwarder {
    sender: mpsc::UnboundedSender<SessionNotification>,
}

impl EventForwarder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, notification: SessionNotification) {
        let _ = self.sender.send(notification);
    }
}

impl SessionObserver for EventForwarder {
    fn on_state_change(&self, state: ConnectionState) {
        self.forward(SessionNotification::StateChanged(state));
    }

    fn on_audio_data(&self, snapshot: &FrequencySnapshot) {
        self.forward(SessionNotification::AudioData(snapshot.clone()));
    }

    fn on_transcript(&self, text: &str, speaker_is_user: bool) {
        self.forward(SessionNotification::Transcript {
            text: text.to_string(),
            speaker_is_user,
        });
    }

    fn on_error(&self, message: &str) {
        self.forward(SessionNotification::Error(message.to_string()));
    }
}
