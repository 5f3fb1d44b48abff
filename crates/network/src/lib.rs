//! Crate network - Canal temps réel vers le service vocal
//!
//! Ce crate ouvre et fait vivre la connexion WebSocket avec le service
//! Gemini Live : configuration de session, envoi des frames micro, réception
//! de l'audio, des transcriptions et des signaux de tour.
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs avec classification (surcharge, transport, message)
//! - `types` : Événements du canal, messages du service, configuration
//! - `protocol` : Format JSON des messages échangés
//! - `channel` : `SessionChannel`, la vue de la session sur une connexion
//! - `traits` : `ChannelConnector`, la fabrique de canaux
//! - `transport` : Implémentations WebSocket (réelle et simulée)
//!
//! # Example
//!
//! ```rust
//! use network::{ChannelConfig, ChannelConnector, ChannelEvent, SimulatedConnector, SessionSetup};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (connector, remote) = SimulatedConnector::pair(&ChannelConfig::test_config());
//! let setup = SessionSetup {
//!     model: "models/test".to_string(),
//!     language_code: "fr-FR".to_string(),
//!     voice_name: "Zephyr".to_string(),
//!     system_instruction: None,
//!     input_transcription: true,
//!     output_transcription: true,
//! };
//! let mut channel = connector.open(setup).await?;
//!
//! remote.open().await;
//! assert!(matches!(channel.next_event().await, Some(ChannelEvent::Open)));
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
pub mod protocol;
mod traits;
mod transport;
mod types;

pub use channel::SessionChannel;
pub use error::{NetworkError, NetworkResult};
pub use traits::ChannelConnector;
pub use transport::{GeminiLiveConnector, SimulatedConnector, SimulatedRemote};
pub use types::{
    ChannelConfig, ChannelEvent, InlineAudio, OutboundMessage, ServerMessage, SessionSetup, Speaker,
    TranscriptFragment,
};

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fonctions utilitaires
pub mod utils {
    /// Masque la valeur du paramètre `key` d'une URL
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    ///
    /// assert_eq!(utils::redact_key("wss://h/ws?key=abc&x=1"), "wss://h/ws?key=***&x=1");
    /// ```
    pub fn redact_key(url: &str) -> String {
        let Some(start) = url.find("key=").map(|i| i + "key=".len()) else {
            return url.to_string();
        };
        let end = url[start..].find('&').map_or(url.len(), |i| start + i);
        format!("{}***{}", &url[..start], &url[end..])
    }
}
