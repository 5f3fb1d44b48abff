//! Configuration audio pour l'assistant vocal
//!
//! Deux horloges cohabitent dans une session :
//! - la capture micro, envoyée au service en PCM 16 bits mono à 16 kHz
//! - la lecture des réponses, produites par le service en PCM 16 bits mono à 24 kHz
//!
//! Le périphérique physique tourne souvent à 44,1 ou 48 kHz ; la conversion
//! est faite par le resampler (capture) et par le mixeur (lecture).

use serde::{Deserialize, Serialize};

/// Configuration principale pour tout le système audio
///
/// `#[derive(Serialize, Deserialize)]` : permet de charger la config depuis un fichier
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage des frames envoyées au service (Hz)
    ///
    /// 16000 Hz est le format attendu pour l'entrée vocale
    pub capture_sample_rate: u32,

    /// Fréquence d'échantillonnage par défaut des chunks reçus (Hz)
    ///
    /// Utilisée quand le type MIME d'un chunk ne précise pas `rate=`
    pub playback_sample_rate: u32,

    /// Durée de chaque frame capturée en millisecondes
    ///
    /// 256ms à 16 kHz = 4096 échantillons par frame
    pub capture_frame_ms: u16,

    /// Taille de la fenêtre d'analyse spectrale (puissance de 2)
    ///
    /// 256 échantillons donnent 128 bandes de fréquence
    pub fft_size: usize,

    /// Lissage temporel des magnitudes entre deux analyses (0.0 à 1.0)
    pub smoothing_time_constant: f32,

    /// Niveau en dB correspondant à l'octet 0 de la visualisation
    pub min_decibels: f32,

    /// Niveau en dB correspondant à l'octet 255 de la visualisation
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,    // entrée vocale du service
            playback_sample_rate: 24000,   // sortie vocale du service
            capture_frame_ms: 256,         // 4096 échantillons
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AudioConfig {
    /// Calcule le nombre d'échantillons par frame capturée
    ///
    /// Formule : (capture_sample_rate * capture_frame_ms) / 1000
    /// Exemple : (16000 * 256) / 1000 = 4096 échantillons
    pub fn capture_samples_per_frame(&self) -> usize {
        (self.capture_sample_rate as usize * self.capture_frame_ms as usize) / 1000
    }

    /// Type MIME annoncé pour les frames envoyées
    pub fn capture_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.capture_sample_rate)
    }

    /// Valide que la configuration est cohérente
    ///
    /// # Returns
    /// - `Ok(())` si la config est valide
    /// - `Err(String)` avec un message d'erreur sinon
    pub fn validate(&self) -> Result<(), String> {
        for (label, rate) in [
            ("capture", self.capture_sample_rate),
            ("lecture", self.playback_sample_rate),
        ] {
            if !(8000..=48000).contains(&rate) {
                return Err(format!(
                    "Sample rate de {} invalide : {} Hz (doit être entre 8000 et 48000)",
                    label, rate
                ));
            }
        }

        if self.capture_frame_ms < 10 || self.capture_frame_ms > 1000 {
            return Err(format!(
                "Durée de frame invalide : {}ms (doit être entre 10 et 1000)",
                self.capture_frame_ms
            ));
        }

        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(format!(
                "Taille d'analyse invalide : {} (puissance de 2 entre 32 et 32768)",
                self.fft_size
            ));
        }

        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(format!(
                "Lissage invalide : {} (doit être entre 0.0 et 1.0)",
                self.smoothing_time_constant
            ));
        }

        if self.min_decibels >= self.max_decibels {
            return Err(format!(
                "Plage dB invalide : {} >= {}",
                self.min_decibels, self.max_decibels
            ));
        }

        Ok(())
    }
}

/// Configurations prédéfinies
impl AudioConfig {
    /// Frames plus courtes : l'assistant entend plus vite, au prix de plus de messages
    pub fn low_latency() -> Self {
        Self {
            capture_frame_ms: 128,
            ..Default::default()
        }
    }

    /// Analyse spectrale plus fine pour une visualisation détaillée
    pub fn detailed_visualization() -> Self {
        Self {
            fft_size: 1024,
            smoothing_time_constant: 0.6,
            ..Default::default()
        }
    }
}
