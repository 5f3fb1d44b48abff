//! Types de données pour le canal temps réel
//!
//! Ce module définit les structures échangées entre le transport et la session :
//! - ChannelEvent : ce que le canal remonte (ouverture, message, fermeture, erreur)
//! - ServerMessage : contenu utile d'un message du service
//! - SessionSetup : paramètres envoyés à l'ouverture
//! - ChannelConfig : configuration du canal

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::NetworkError;
use audio::EncodedFrame;

/// Qui parle dans un fragment de transcription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

/// Fragment de transcription (partiel ou complet)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub speaker: Speaker,
}

impl TranscriptFragment {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::User }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { text: text.into(), speaker: Speaker::Assistant }
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Audio encodé inclus dans un message du service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineAudio {
    /// Type MIME annoncé (`audio/pcm;rate=24000`), absent sur certains messages
    pub mime_type: Option<String>,
    /// PCM16 en base64
    pub data: String,
}

/// Contenu utile d'un message du service
///
/// Un même message peut porter de l'audio, des transcriptions et des
/// signaux de tour ; tous les champs sont optionnels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerMessage {
    pub audio: Vec<InlineAudio>,
    pub transcripts: Vec<TranscriptFragment>,
    /// L'utilisateur a coupé la parole à l'assistant
    pub interrupted: bool,
    /// L'assistant a fini son tour
    pub turn_complete: bool,
}

impl ServerMessage {
    /// Vrai si le message ne porte rien d'exploitable
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.transcripts.is_empty() && !self.interrupted && !self.turn_complete
    }
}

/// Événements remontés par un canal vers la session
///
/// L'ordre des événements est celui de réception ; un `Close` ou une
/// `Error` fatale termine le flux.
#[derive(Debug)]
pub enum ChannelEvent {
    /// Le service a accepté la configuration de session
    Open,
    Message(ServerMessage),
    /// Fermeture par le service (code WebSocket s'il y en a un)
    Close { code: Option<u16>, reason: String },
    Error(NetworkError),
}

/// Messages sortants mis en file pour le transport
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// Frame micro encodée
    RealtimeInput(EncodedFrame),
}

/// Paramètres envoyés au service à l'ouverture de la session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSetup {
    /// Identifiant du modèle (`models/...`)
    pub model: String,
    /// Variante de langue, `fr-FR`, `en-US`...
    pub language_code: String,
    /// Voix prédéfinie de l'assistant
    pub voice_name: String,
    pub system_instruction: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

/// Configuration du canal temps réel
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// URL WebSocket du service (sans la clé)
    pub endpoint: String,

    /// Modèle utilisé pour les sessions
    pub model: String,

    /// Voix prédéfinie de l'assistant
    pub voice_name: String,

    /// Taille de la file d'événements entrants (messages)
    pub event_queue_capacity: usize,

    /// Frames micro en attente d'envoi ; au-delà, la frame est perdue
    pub outgoing_queue_capacity: usize,

    /// Délai de connexion (DNS + TLS + handshake)
    pub connect_timeout: Duration,

    /// Délai laissé au transport pour fermer proprement
    pub close_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            event_queue_capacity: 64,
            outgoing_queue_capacity: 1,
            connect_timeout: Duration::from_secs(10),
            close_grace: Duration::from_millis(500),
        }
    }
}

impl ChannelConfig {
    /// Configuration pour tests (délais courts)
    pub fn test_config() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:0/test".to_string(),
            event_queue_capacity: 16,
            connect_timeout: Duration::from_millis(500),
            close_grace: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Valide la configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(format!("Endpoint invalide : {} (ws:// ou wss:// attendu)", self.endpoint));
        }
        if self.model.trim().is_empty() {
            return Err("Modèle non renseigné".to_string());
        }
        if self.event_queue_capacity == 0 || self.outgoing_queue_capacity == 0 {
            return Err("Les files du canal doivent avoir une capacité non nulle".to_string());
        }
        Ok(())
    }

    /// URL de connexion complète, clé incluse
    pub fn connection_url(&self, api_key: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.outgoing_queue_capacity, 1);
        assert!(config.validate().is_ok());
        assert!(ChannelConfig::test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ChannelConfig {
            endpoint: "https://exemple".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChannelConfig {
            outgoing_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_url() {
        let config = ChannelConfig {
            endpoint: "wss://exemple/ws".to_string(),
            ..Default::default()
        };
        assert_eq!(config.connection_url("abc"), "wss://exemple/ws?key=abc");

        let config = ChannelConfig {
            endpoint: "wss://exemple/ws?alt=json".to_string(),
            ..Default::default()
        };
        assert_eq!(config.connection_url("abc"), "wss://exemple/ws?alt=json&key=abc");
    }

    #[test]
    fn test_server_message_empty() {
        assert!(ServerMessage::default().is_empty());
        let message = ServerMessage {
            transcripts: vec![TranscriptFragment::user("bonjour")],
            ..Default::default()
        };
        assert!(!message.is_empty());
        assert!(message.transcripts[0].is_user());
    }
}
