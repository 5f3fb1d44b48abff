//! Gestion d'erreurs pour le canal temps réel
//!
//! Ce module définit les erreurs possibles entre le client et le service
//! vocal. Il suit les mêmes patterns que le module audio pour la cohérence
//! du code.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Énumération de toutes les erreurs possibles côté réseau
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Impossible de joindre le service (DNS, TCP, TLS)
    #[error("Connexion impossible vers {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Le service refuse temporairement la session (surcharge, quota)
    #[error("Service temporairement indisponible: {reason}")]
    ServiceUnavailable { reason: String },

    /// Le handshake WebSocket a été refusé
    #[error("Handshake refusé par le service (HTTP {status})")]
    HandshakeRejected { status: u16 },

    /// Le canal est fermé, plus aucun message ne passe
    #[error("Canal fermé")]
    ChannelClosed,

    /// Une frame est déjà en attente d'envoi, la nouvelle est abandonnée
    #[error("File d'envoi saturée, frame abandonnée")]
    SendQueueFull,

    /// Message reçu qui ne respecte pas le protocole
    #[error("Message invalide reçu: {0}")]
    InvalidMessage(String),

    /// Erreur lors de la sérialisation/désérialisation JSON
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Erreur du transport WebSocket en cours de session
    #[error("Erreur WebSocket: {0}")]
    WebSocketError(String),

    /// Erreur générale d'entrée/sortie réseau
    #[error("Erreur IO réseau: {0}")]
    IoError(#[from] std::io::Error),

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Codes HTTP qui signalent une surcharge plutôt qu'un refus
const OVERLOAD_STATUSES: [u16; 3] = [429, 503, 529];

/// Conversion des erreurs tungstenite
///
/// Le statut HTTP du handshake distingue "service saturé" de "requête refusée".
impl From<tungstenite::Error> for NetworkError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                if OVERLOAD_STATUSES.contains(&status) {
                    NetworkError::ServiceUnavailable { reason: format!("HTTP {}", status) }
                } else {
                    NetworkError::HandshakeRejected { status }
                }
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                NetworkError::ChannelClosed
            }
            tungstenite::Error::Io(e) => NetworkError::IoError(e),
            other => NetworkError::WebSocketError(other.to_string()),
        }
    }
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Fonctions utilitaires pour créer et classer les erreurs
impl NetworkError {
    /// Crée une erreur de connexion avec contexte
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Crée une erreur de surcharge du service
    pub fn service_unavailable(reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable { reason: reason.into() }
    }

    /// Vrai si le service est saturé plutôt que cassé
    pub fn is_overload(&self) -> bool {
        matches!(self, NetworkError::ServiceUnavailable { .. })
    }

    /// Vrai si l'erreur vient du transport (pas de réseau, socket coupée)
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionFailed { .. }
                | NetworkError::HandshakeRejected { .. }
                | NetworkError::WebSocketError(_)
                | NetworkError::IoError(_)
        )
    }

    /// Vrai si l'erreur ne concerne qu'un message, la session peut continuer
    pub fn is_local_to_message(&self) -> bool {
        matches!(
            self,
            NetworkError::InvalidMessage(_)
                | NetworkError::SerializationError(_)
                | NetworkError::SendQueueFull
        )
    }
}
