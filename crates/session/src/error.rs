//! Taxonomie des erreurs de session
//!
//! Toutes les erreurs audio et réseau sont ramenées à un petit nombre de
//! catégories compréhensibles par l'utilisateur. Seule `ProtocolError` est
//! traitée localement ; les autres terminent la session.

use audio::AudioError;
use network::NetworkError;
use thiserror::Error;

/// Code WebSocket "Try Again Later"
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Mots-clés d'une raison de fermeture qui signalent une surcharge
const OVERLOAD_HINTS: [&str; 5] = ["overload", "unavailable", "resource_exhausted", "quota", "try again"];

/// Erreurs visibles de la session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// La plateforme ne sait pas capturer de l'audio
    #[error("Capture audio indisponible: {0}")]
    CapabilityUnavailable(String),

    #[error("Aucun microphone détecté")]
    DeviceNotFound,

    #[error("Accès au microphone refusé: {0}")]
    PermissionDenied(String),

    /// Autre échec d'acquisition de périphérique, message transmis tel quel
    #[error("Erreur périphérique audio: {0}")]
    DeviceOther(String),

    #[error("Réseau indisponible: {0}")]
    NetworkUnavailable(String),

    #[error("Service surchargé: {0}")]
    ServiceOverloaded(String),

    /// Message ou chunk illisible ; jamais fatal
    #[error("Erreur de protocole: {0}")]
    ProtocolError(String),

    /// Le service a fermé la session
    #[error("Session fermée{}", .0.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    SessionClosed(Option<String>),
}

/// Type Result de la session
pub type SessionResult<T> = Result<T, SessionError>;

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::NoDeviceFound => SessionError::DeviceNotFound,
            AudioError::PermissionDenied(reason) => SessionError::PermissionDenied(reason),
            AudioError::CapabilityUnavailable(reason) => SessionError::CapabilityUnavailable(reason),
            AudioError::DecodeError(reason) => SessionError::ProtocolError(reason),
            other => SessionError::DeviceOther(other.to_string()),
        }
    }
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ServiceUnavailable { reason } => SessionError::ServiceOverloaded(reason),
            NetworkError::ChannelClosed => SessionError::SessionClosed(None),
            e if e.is_local_to_message() => SessionError::ProtocolError(e.to_string()),
            e => SessionError::NetworkUnavailable(e.to_string()),
        }
    }
}

impl SessionError {
    /// Interprète une fermeture du canal par le service
    pub fn from_close(code: Option<u16>, reason: &str) -> Self {
        let lowered = reason.to_ascii_lowercase();
        let overloaded = code == Some(CLOSE_TRY_AGAIN_LATER)
            || OVERLOAD_HINTS.iter().any(|hint| lowered.contains(hint));

        if overloaded {
            return SessionError::ServiceOverloaded(if reason.is_empty() {
                format!("code {}", code.unwrap_or(CLOSE_TRY_AGAIN_LATER))
            } else {
                reason.to_string()
            });
        }
        let reason = reason.trim();
        SessionError::SessionClosed((!reason.is_empty()).then(|| reason.to_string()))
    }

    /// Vrai si l'erreur termine la session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::ProtocolError(_))
    }

    /// Message destiné à l'utilisateur, propre à chaque catégorie
    pub fn user_message(&self) -> String {
        match self {
            SessionError::CapabilityUnavailable(_) => {
                "La capture audio n'est pas disponible sur ce système.".to_string()
            }
            SessionError::DeviceNotFound => {
                "Aucun microphone détecté. Branchez un micro puis réessayez.".to_string()
            }
            SessionError::PermissionDenied(_) => {
                "L'accès au microphone a été refusé. Autorisez-le dans les réglages du système.".to_string()
            }
            SessionError::DeviceOther(reason) => format!("Erreur du périphérique audio : {}", reason),
            SessionError::NetworkUnavailable(_) => {
                "Connexion au service impossible. Vérifiez votre connexion réseau.".to_string()
            }
            SessionError::ServiceOverloaded(_) => {
                "Le service est momentanément surchargé. Réessayez dans quelques instants.".to_string()
            }
            SessionError::ProtocolError(reason) => format!("Message illisible ignoré : {}", reason),
            SessionError::SessionClosed(Some(reason)) => format!("La session a été fermée : {}", reason),
            SessionError::SessionClosed(None) => "La session a été fermée par le service.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_mapping() {
        assert_eq!(SessionError::from(AudioError::NoDeviceFound), SessionError::DeviceNotFound);
        assert!(matches!(
            SessionError::from(AudioError::PermissionDenied("refus".into())),
            SessionError::PermissionDenied(_)
        ));
        assert!(matches!(
            SessionError::from(AudioError::CapabilityUnavailable("x".into())),
            SessionError::CapabilityUnavailable(_)
        ));
        assert!(matches!(
            SessionError::from(AudioError::DecodeError("base64".into())),
            SessionError::ProtocolError(_)
        ));
        assert!(matches!(
            SessionError::from(AudioError::DeviceDisconnected),
            SessionError::DeviceOther(_)
        ));
    }

    #[test]
    fn test_network_mapping() {
        assert!(matches!(
            SessionError::from(NetworkError::service_unavailable("HTTP 503")),
            SessionError::ServiceOverloaded(_)
        ));
        assert!(matches!(
            SessionError::from(NetworkError::connection_failed("wss://x", "dns")),
            SessionError::NetworkUnavailable(_)
        ));
        assert!(matches!(
            SessionError::from(NetworkError::InvalidMessage("json".into())),
            SessionError::ProtocolError(_)
        ));
        assert_eq!(SessionError::from(NetworkError::ChannelClosed), SessionError::SessionClosed(None));
    }

    #[test]
    fn test_close_classification() {
        assert!(matches!(SessionError::from_close(Some(1013), ""), SessionError::ServiceOverloaded(_)));
        assert!(matches!(
            SessionError::from_close(Some(1011), "RESOURCE_EXHAUSTED: quota"),
            SessionError::ServiceOverloaded(_)
        ));
        assert_eq!(SessionError::from_close(Some(1000), ""), SessionError::SessionClosed(None));
        assert_eq!(
            SessionError::from_close(None, "bye"),
            SessionError::SessionClosed(Some("bye".to_string()))
        );
    }

    #[test]
    fn test_fatality_and_messages() {
        assert!(!SessionError::ProtocolError("x".into()).is_fatal());
        assert!(SessionError::DeviceNotFound.is_fatal());
        assert_ne!(
            SessionError::DeviceNotFound.user_message(),
            SessionError::PermissionDenied("x".into()).user_message()
        );
        assert_eq!(SessionError::SessionClosed(None).to_string(), "Session fermée");
        assert_eq!(
            SessionError::SessionClosed(Some("fin".into())).to_string(),
            "Session fermée: fin"
        );
    }
}
