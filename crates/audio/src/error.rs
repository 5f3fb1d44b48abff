//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit toutes les erreurs que peuvent produire la capture micro,
//! la lecture haut-parleurs et le codec PCM. Les erreurs cpal sont classées
//! dès la conversion : une session doit pouvoir distinguer "pas de micro"
//! de "accès refusé" sans relire les messages.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
///
/// `thiserror::Error` génère l'implémentation du trait Error
/// et les messages viennent de `#[error("...")]`
#[derive(Error, Debug)]
pub enum AudioError {
    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// Le système a refusé l'accès au périphérique (permission micro)
    #[error("Accès au périphérique audio refusé: {0}")]
    PermissionDenied(String),

    /// La plateforme n'offre aucune capture audio exploitable
    #[error("Capture audio indisponible: {0}")]
    CapabilityUnavailable(String),

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal au démarrage d'un stream
    #[error("Erreur cpal: {0}")]
    CpalError(String),

    /// Données audio reçues illisibles (base64 invalide, PCM tronqué, format inconnu)
    #[error("Données audio invalides: {0}")]
    DecodeError(String),

    /// Le périphérique audio a été débranché pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

impl AudioError {
    /// Classe un message d'erreur brut du backend audio
    ///
    /// Les backends (ALSA, CoreAudio, WASAPI) ne remontent les refus de
    /// permission que sous forme de texte.
    pub fn from_backend_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let permission_markers = ["permission", "denied", "not permitted", "unauthorized", "not authorized"];
        let missing_markers = ["no such device", "not found", "no device"];

        if permission_markers.iter().any(|marker| lower.contains(marker)) {
            AudioError::PermissionDenied(message.to_string())
        } else if missing_markers.iter().any(|marker| lower.contains(marker)) {
            AudioError::NoDeviceFound
        } else {
            AudioError::InitializationError(message.to_string())
        }
    }
}

/// Conversion des erreurs cpal::BuildStreamError
///
/// C'est ici que le refus de permission micro apparaît en pratique :
/// le périphérique existe, mais l'ouverture du stream échoue.
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoDeviceFound,
            cpal::BuildStreamError::BackendSpecific { err } => {
                AudioError::from_backend_message(&err.description)
            }
            other => AudioError::ConfigError(format!("Erreur construction stream: {}", other)),
        }
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::NoDeviceFound,
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                AudioError::from_backend_message(&err.description)
            }
            other => AudioError::ConfigError(format!("Erreur config par défaut: {}", other)),
        }
    }
}

/// Conversion des erreurs cpal::DevicesError (énumération des périphériques)
impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        AudioError::CapabilityUnavailable(err.to_string())
    }
}

/// Conversion des erreurs cpal::PlayStreamError
///
/// Sur certaines plateformes la permission micro n'est vérifiée qu'au `play()`.
impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => AudioError::NoDeviceFound,
            cpal::PlayStreamError::BackendSpecific { err } => {
                match AudioError::from_backend_message(&err.description) {
                    AudioError::InitializationError(message) => AudioError::CpalError(message),
                    classified => classified,
                }
            }
            other => AudioError::CpalError(other.to_string()),
        }
    }
}

/// Conversion des erreurs cpal::PauseStreamError
impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::ConfigError(format!("Erreur pause stream: {}", err))
    }
}

/// Type Result personnalisé pour notre crate
pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AudioError::NoDeviceFound;
        assert_eq!(error.to_string(), "Aucun périphérique audio trouvé");

        let error = AudioError::ConfigError("Test".to_string());
        assert_eq!(error.to_string(), "Erreur de configuration audio: Test");
    }

    #[test]
    fn test_backend_message_classification() {
        assert!(matches!(
            AudioError::from_backend_message("Permission denied (os error 13)"),
            AudioError::PermissionDenied(_)
        ));
        assert!(matches!(
            AudioError::from_backend_message("Operation not permitted"),
            AudioError::PermissionDenied(_)
        ));
        assert!(matches!(
            AudioError::from_backend_message("ALSA: No such device"),
            AudioError::NoDeviceFound
        ));
        assert!(matches!(
            AudioError::from_backend_message("buffer size mismatch"),
            AudioError::InitializationError(_)
        ));
    }

    #[test]
    fn test_build_stream_error_conversion() {
        let error: AudioError = cpal::BuildStreamError::DeviceNotAvailable.into();
        assert!(matches!(error, AudioError::NoDeviceFound));
    }
}
