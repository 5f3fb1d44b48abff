//! Traits abstraits pour le réseau
//!
//! La session ouvre ses canaux via un `ChannelConnector`, ce qui permet de
//! remplacer le service réel par un service simulé dans les tests.

use async_trait::async_trait;

use crate::{NetworkResult, SessionChannel, SessionSetup};

/// Fabrique de canaux vers le service vocal
///
/// Implémentations :
/// - GeminiLiveConnector : WebSocket TLS vers le service réel
/// - SimulatedConnector : service simulé piloté par un `SimulatedRemote`
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Ouvre un canal et envoie la configuration de session
    ///
    /// Le canal retourné n'est pas encore "ouvert" au sens de la session :
    /// l'événement `ChannelEvent::Open` arrive quand le service a accepté
    /// la configuration.
    ///
    /// # Erreurs
    /// - `NetworkError::ConnectionFailed` : service injoignable
    /// - `NetworkError::ServiceUnavailable` : service saturé
    /// - `NetworkError::HandshakeRejected` : clé ou requête refusée
    async fn open(&self, setup: SessionSetup) -> NetworkResult<SessionChannel>;

    /// Description pour les logs (jamais la clé)
    fn describe(&self) -> String {
        "Connecteur".to_string()
    }
}
