//! Types de données pour le système audio
//!
//! Ce module définit les structures manipulées tout au long d'une session :
//! - CaptureFrame : bloc d'échantillons micro, déjà au format 16 kHz mono
//! - EncodedFrame : la même frame prête à partir sur le canal (PCM16 en base64)
//! - AudioChunk : morceau de réponse vocale décodé, prêt à être planifié
//! - PlaybackUnit : un chunk placé sur la timeline du périphérique de sortie
//! - FrequencySnapshot : spectre de la sortie, pour la visualisation

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

/// Type pour un échantillon audio
///
/// Valeurs entre -1.0 et +1.0, 0.0 = silence
pub type Sample = f32;

/// Frame d'audio capturée (non encodée)
///
/// Une frame contient 256ms d'audio à 16 kHz (4096 échantillons)
/// avec la configuration par défaut.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureFrame {
    /// Échantillons mono à `sample_rate`
    pub samples: Vec<Sample>,

    /// Fréquence d'échantillonnage des échantillons (Hz)
    pub sample_rate: u32,

    /// Numéro de séquence, incrémenté pour chaque frame produite par un périphérique
    pub sequence_number: u64,
}

impl CaptureFrame {
    /// Crée une nouvelle frame capturée
    ///
    /// # Example
    /// ```rust
    /// use audio::CaptureFrame;
    ///
    /// let frame = CaptureFrame::new(vec![0.1, 0.2, -0.1, 0.0], 16000, 42);
    /// assert_eq!(frame.samples.len(), 4);
    /// ```
    pub fn new(samples: Vec<Sample>, sample_rate: u32, sequence_number: u64) -> Self {
        Self {
            samples,
            sample_rate,
            sequence_number,
        }
    }
}

/// Frame encodée prête à être envoyée au service
///
/// `data` contient les bytes PCM 16 bits little-endian encodés en base64,
/// `mime_type` vaut typiquement `audio/pcm;rate=16000`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub data: String,
    pub mime_type: String,
    pub sequence_number: u64,
    pub sample_count: usize,
}

/// Morceau de réponse vocale décodé
///
/// Les échantillons sont partagés (`Arc`) : le même chunk peut être lu
/// par le périphérique et inspecté sans copie.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub samples: Arc<[Sample]>,
    pub sample_rate: u32,

    /// Ordre d'arrivée du chunk dans la session
    pub sequence_number: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<Sample>, sample_rate: u32, sequence_number: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            sequence_number,
        }
    }

    /// Durée du chunk en secondes
    ///
    /// Nulle pour un chunk vide ou sans fréquence : un tel chunk ne
    /// produit aucune unité de lecture.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Identifiant d'une unité de lecture, unique dans une session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Un chunk placé sur la timeline du périphérique de sortie
///
/// Les temps sont exprimés en secondes sur l'horloge du périphérique.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackUnit {
    pub id: UnitId,
    pub sequence_number: u64,
    pub start: f64,
    pub duration: f64,
}

impl PlaybackUnit {
    /// Instant où l'unité finit de jouer
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Vrai si les deux unités jouent en même temps sur un intervalle non nul
    pub fn overlaps(&self, other: &PlaybackUnit) -> bool {
        const EPSILON: f64 = 1e-9;
        self.start < other.end() - EPSILON && other.start < self.end() - EPSILON
    }
}

/// Spectre de la sortie audio à un instant donné
///
/// Chaque octet représente une bande de fréquence, 0 = silence, 255 = plein niveau.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencySnapshot {
    pub bins: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Niveau moyen des bandes, entre 0.0 et 1.0
    pub fn average_level(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.bins.iter().map(|&b| b as u32).sum();
        sum as f32 / (self.bins.len() as f32 * 255.0)
    }
}

/// Statistiques audio d'une session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AudioStats {
    /// Frames micro transmises au canal
    pub frames_sent: u64,

    /// Frames micro abandonnées (canal saturé ou fermé)
    pub frames_dropped: u64,

    /// Chunks de réponse planifiés pour la lecture
    pub chunks_scheduled: u64,

    /// Chunks de réponse illisibles ou rejetés par le périphérique
    pub chunks_dropped: u64,

    /// Unités arrivées au bout de leur lecture
    pub units_completed: u64,

    /// Nombre d'interruptions (barge-in)
    pub interruptions: u64,
}

impl AudioStats {
    /// Pourcentage de frames micro perdues
    pub fn drop_percentage(&self) -> f32 {
        let total = self.frames_sent + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        (self.frames_dropped as f32 / total as f32) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_frame_creation() {
        let samples = vec![0.1, -0.2, 0.3, 0.0];
        let frame = CaptureFrame::new(samples.clone(), 16000, 42);

        assert_eq!(frame.samples, samples);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.sequence_number, 42);
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 2400], 24000, 1);
        assert!((chunk.duration() - 0.1).abs() < 1e-12);

        let empty = AudioChunk::new(Vec::new(), 24000, 2);
        assert_eq!(empty.duration(), 0.0);

        let no_rate = AudioChunk::new(vec![0.0; 480], 0, 3);
        assert_eq!(no_rate.duration(), 0.0);
    }

    #[test]
    fn test_unit_overlap() {
        let a = PlaybackUnit { id: UnitId(1), sequence_number: 1, start: 0.0, duration: 0.5 };
        let b = PlaybackUnit { id: UnitId(2), sequence_number: 2, start: 0.5, duration: 0.5 };
        let c = PlaybackUnit { id: UnitId(3), sequence_number: 3, start: 0.25, duration: 0.5 };

        // Deux unités contiguës ne se chevauchent pas
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_snapshot_level() {
        let snapshot = FrequencySnapshot::new(vec![255, 0, 255, 0]);
        assert!((snapshot.average_level() - 0.5).abs() < 0.001);
        assert_eq!(FrequencySnapshot::default().average_level(), 0.0);
    }

    #[test]
    fn test_stats_drop_percentage() {
        let stats = AudioStats {
            frames_sent: 95,
            frames_dropped: 5,
            ..Default::default()
        };
        assert_eq!(stats.drop_percentage(), 5.0);
    }
}
