//! Configuration de l'assistant
//!
//! Une seule valeur est obligatoire : la clé du service, lue dans
//! l'environnement au démarrage. Sans elle, aucune session ne peut être créée.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use audio::AudioConfig;
use network::{ChannelConfig, SessionSetup};

/// Variables d'environnement lues pour la clé, dans l'ordre
pub const API_KEY_VARIABLES: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Erreurs de configuration, détectées avant toute tentative de connexion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Clé API absente : définissez {variable}")]
    MissingCredential { variable: String },

    #[error("Variante de langue invalide : {0}")]
    InvalidLanguage(String),

    #[error("Configuration audio invalide : {0}")]
    InvalidAudioConfig(String),

    #[error("Configuration du canal invalide : {0}")]
    InvalidChannelConfig(String),
}

/// Variante de langue de la conversation (`fr-FR`, `en-US`...)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LanguageVariant {
    code: String,
}

/// Région utilisée quand seule la langue est donnée
const DEFAULT_REGIONS: [(&str, &str); 7] = [
    ("fr", "FR"),
    ("en", "US"),
    ("de", "DE"),
    ("es", "ES"),
    ("it", "IT"),
    ("pt", "BR"),
    ("ja", "JP"),
];

impl LanguageVariant {
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Sous-étiquette de langue (`fr` pour `fr-FR`)
    pub fn language(&self) -> &str {
        self.code.split('-').next().unwrap_or(&self.code)
    }

    pub fn is_french(&self) -> bool {
        self.language() == "fr"
    }

    /// Consigne système par défaut, dans la langue de la conversation
    pub fn default_instruction(&self) -> &'static str {
        if self.is_french() {
            "Tu es un assistant vocal. Réponds en français, de façon brève et naturelle, \
             comme dans une conversation orale."
        } else {
            "You are a voice assistant. Answer briefly and naturally, as in a spoken conversation."
        }
    }
}

impl Default for LanguageVariant {
    fn default() -> Self {
        Self { code: "en-US".to_string() }
    }
}

impl FromStr for LanguageVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidLanguage(s.to_string());
        let normalized = s.trim().replace('_', "-");
        let mut parts = normalized.split('-');

        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let region = match parts.next() {
            Some(region) if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) => {
                region.to_ascii_uppercase()
            }
            Some(_) => return Err(invalid()),
            None => DEFAULT_REGIONS
                .iter()
                .find(|(lang, _)| *lang == language)
                .map(|(_, region)| region.to_string())
                .ok_or_else(invalid)?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { code: format!("{}-{}", language, region) })
    }
}

impl fmt::Display for LanguageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Configuration complète de l'assistant
#[derive(Clone)]
pub struct AssistantConfig {
    pub api_key: String,

    /// Consigne système ; `None` pour la consigne par défaut de la langue
    pub system_instruction: Option<String>,

    pub audio: AudioConfig,
    pub channel: ChannelConfig,
}

impl AssistantConfig {
    /// Lit la configuration depuis l'environnement du processus
    ///
    /// `VOC_MODEL` et `VOC_VOICE` remplacent le modèle et la voix par défaut.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Lit la configuration via une fonction de recherche de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = API_KEY_VARIABLES
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                variable: API_KEY_VARIABLES[0].to_string(),
            })?;

        let mut config = Self::with_api_key(api_key);
        if let Some(model) = lookup("VOC_MODEL").filter(|m| !m.trim().is_empty()) {
            config.channel.model = model.trim().to_string();
        }
        if let Some(voice) = lookup("VOC_VOICE").filter(|v| !v.trim().is_empty()) {
            config.channel.voice_name = voice.trim().to_string();
        }
        Ok(config)
    }

    /// Configuration par défaut avec la clé donnée
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            system_instruction: None,
            audio: AudioConfig::default(),
            channel: ChannelConfig::default(),
        }
    }

    /// Valide l'ensemble de la configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                variable: API_KEY_VARIABLES[0].to_string(),
            });
        }
        self.audio.validate().map_err(ConfigError::InvalidAudioConfig)?;
        self.channel.validate().map_err(ConfigError::InvalidChannelConfig)?;
        Ok(())
    }

    /// Paramètres de session envoyés au service
    pub fn session_setup(&self, language: &LanguageVariant) -> SessionSetup {
        let instruction = self
            .system_instruction
            .clone()
            .unwrap_or_else(|| language.default_instruction().to_string());

        SessionSetup {
            model: self.channel.model.clone(),
            language_code: language.code().to_string(),
            voice_name: self.channel.voice_name.clone(),
            system_instruction: Some(instruction),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &"***")
            .field("system_instruction", &self.system_instruction)
            .field("audio", &self.audio)
            .field("channel", &self.channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("fr-FR".parse::<LanguageVariant>().unwrap().code(), "fr-FR");
        assert_eq!("fr".parse::<LanguageVariant>().unwrap().code(), "fr-FR");
        assert_eq!("en_gb".parse::<LanguageVariant>().unwrap().code(), "en-GB");
        assert_eq!(" EN-us ".parse::<LanguageVariant>().unwrap().code(), "en-US");
        assert_eq!(LanguageVariant::default().code(), "en-US");

        assert_err!("xx".parse::<LanguageVariant>());
        assert_err!("f".parse::<LanguageVariant>());
        assert_err!("fr-FRA".parse::<LanguageVariant>());
        assert_err!("fr-FR-x".parse::<LanguageVariant>());
    }

    #[test]
    fn test_credential_lookup() {
        let config = assert_ok!(AssistantConfig::from_lookup(lookup(&[("GEMINI_API_KEY", " abc ")])));
        assert_eq!(config.api_key, "abc");

        let config = assert_ok!(AssistantConfig::from_lookup(lookup(&[("GEMINI_API_KEY", ""), ("API_KEY", "def")])));
        assert_eq!(config.api_key, "def");

        let error = assert_err!(AssistantConfig::from_lookup(lookup(&[])));
        assert_eq!(
            error,
            ConfigError::MissingCredential { variable: "GEMINI_API_KEY".to_string() }
        );
    }

    #[test]
    fn test_overrides() {
        let config = AssistantConfig::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("VOC_MODEL", "models/autre"),
            ("VOC_VOICE", "Puck"),
        ]))
        .unwrap();
        assert_eq!(config.channel.model, "models/autre");
        assert_eq!(config.channel.voice_name, "Puck");
        assert_ok!(config.validate());
    }

    #[test]
    fn test_session_setup() {
        let config = AssistantConfig::with_api_key("k");
        let french: LanguageVariant = "fr".parse().unwrap();
        let setup = config.session_setup(&french);

        assert_eq!(setup.language_code, "fr-FR");
        assert!(setup.system_instruction.unwrap().contains("français"));
        assert!(setup.input_transcription && setup.output_transcription);

        let config = AssistantConfig {
            system_instruction: Some("Sois bref.".to_string()),
            ..AssistantConfig::with_api_key("k")
        };
        let setup = config.session_setup(&LanguageVariant::default());
        assert_eq!(setup.system_instruction.as_deref(), Some("Sois bref."));
    }

    #[test]
    fn test_debug_hides_key() {
        let config = AssistantConfig::with_api_key("très-secret");
        assert!(!format!("{:?}", config).contains("très-secret"));
        assert_err!(AssistantConfig::with_api_key(" ").validate());
    }
}
