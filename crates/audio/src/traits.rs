//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces que doivent implémenter les composants
//! audio. Chaque trait a une implémentation cpal (matériel réel) et une
//! implémentation simulée (tests sans hardware).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    AudioChunk, AudioConfig, AudioResult, CaptureFrame, EncodedFrame, PlaybackUnit, UnitId,
};

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Implémentations :
/// - CpalCapture : microphone réel via cpal
/// - SimulatedCapture : frames injectées par un test
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
#[async_trait]
pub trait AudioCapture: Send {
    /// Démarre la production de frames
    ///
    /// Le périphérique est déjà ouvert (et la permission obtenue) :
    /// cette fonction ne fait qu'ouvrir le robinet.
    async fn start(&mut self) -> AudioResult<()>;

    /// Arrête la capture et libère le périphérique
    ///
    /// Appeler `stop()` deux fois n'est pas une erreur.
    async fn stop(&mut self) -> AudioResult<()>;

    /// Récupère la prochaine frame audio
    ///
    /// Attend jusqu'à ce qu'une frame complète soit disponible.
    ///
    /// # Erreurs
    /// - `AudioError::DeviceDisconnected` : microphone débranché ou capture fermée
    async fn next_frame(&mut self) -> AudioResult<CaptureFrame>;

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Frames remplacées par une plus récente avant d'être lues
    fn dropped_frames(&self) -> u64 {
        0
    }

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Périphérique de sortie capable de planifier des chunks sur sa propre horloge
///
/// Contrairement à une file de lecture, chaque chunk est placé à un instant
/// précis de la timeline du périphérique. Quand une unité finit de jouer,
/// le périphérique envoie son identifiant sur le canal de complétion
/// fourni à l'ouverture.
pub trait PlaybackDevice: Send {
    /// Temps courant de l'horloge du périphérique, en secondes
    ///
    /// Monotone, démarre à 0 à l'ouverture.
    fn current_time(&self) -> f64;

    /// Planifie la lecture d'un chunk à `unit.start`
    fn schedule(&mut self, unit: &PlaybackUnit, chunk: &AudioChunk) -> AudioResult<()>;

    /// Arrête immédiatement une unité
    ///
    /// Une unité arrêtée ne signale pas sa complétion. Arrêter une unité
    /// inconnue ou déjà terminée n'a aucun effet.
    fn stop_unit(&mut self, id: UnitId);

    /// Copie les derniers échantillons rendus dans `out`
    ///
    /// Les échantillons sont alignés sur la fin de `out` ; retourne le
    /// nombre d'échantillons réellement disponibles.
    fn read_output_tap(&self, out: &mut [f32]) -> usize;

    /// Ferme le périphérique ; idempotent
    fn close(&mut self) -> AudioResult<()>;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Trait pour encoder/décoder l'audio échangé avec le service
pub trait AudioCodec: Send + Sync {
    /// Encode une frame capturée pour transmission
    ///
    /// L'encodage PCM ne peut pas échouer : les échantillons hors plage
    /// sont écrêtés.
    fn encode(&self, frame: &CaptureFrame) -> EncodedFrame;

    /// Décode un chunk reçu
    ///
    /// # Arguments
    /// * `payload` - données encodées (base64)
    /// * `mime_type` - type annoncé par le service, peut préciser `rate=`
    /// * `sequence_number` - ordre d'arrivée du chunk
    ///
    /// # Erreurs
    /// - `AudioError::DecodeError` : payload illisible ou format non supporté
    fn decode(
        &self,
        payload: &str,
        mime_type: Option<&str>,
        sequence_number: u64,
    ) -> AudioResult<AudioChunk>;

    /// Retourne des informations sur la configuration du codec
    fn codec_info(&self) -> String {
        "Codec audio".to_string()
    }
}

/// Point d'accès à la plateforme audio
///
/// La session ne crée jamais de périphérique directement : elle passe par
/// un backend, ce qui permet de remplacer tout le matériel en test.
pub trait AudioBackend: Send + Sync {
    /// Vérifie que la plateforme sait capturer de l'audio
    ///
    /// Appelé avant toute acquisition de périphérique.
    fn check_capability(&self) -> AudioResult<()>;

    /// Ouvre le microphone (la capture ne démarre qu'avec `start()`)
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` : aucun microphone
    /// - `AudioError::PermissionDenied` : accès refusé par le système
    fn open_input(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>>;

    /// Ouvre la sortie audio ; l'horloge démarre immédiatement
    fn open_output(
        &self,
        config: &AudioConfig,
        completions: mpsc::UnboundedSender<UnitId>,
    ) -> AudioResult<Box<dyn PlaybackDevice>>;

    fn backend_name(&self) -> String {
        "Backend audio".to_string()
    }
}

/// Raison du rejet d'une frame par un `FrameSink`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSendError {
    /// Une frame est déjà en attente d'envoi
    Saturated,
    /// Le canal est fermé
    Closed,
}

/// Destination non bloquante des frames encodées
pub trait FrameSink {
    /// Tente d'envoyer une frame ; ne bloque jamais et ne réessaie jamais
    fn try_send_frame(&mut self, frame: EncodedFrame) -> Result<(), FrameSendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        frames: Vec<EncodedFrame>,
        capacity: usize,
    }

    impl FrameSink for CollectingSink {
        fn try_send_frame(&mut self, frame: EncodedFrame) -> Result<(), FrameSendError> {
            if self.frames.len() >= self.capacity {
                return Err(FrameSendError::Saturated);
            }
            self.frames.push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_frame_sink_object() {
        // Le trait doit rester utilisable en objet dynamique
        let mut sink = CollectingSink { frames: Vec::new(), capacity: 1 };
        let sink_ref: &mut dyn FrameSink = &mut sink;

        let frame = EncodedFrame {
            data: String::new(),
            mime_type: "audio/pcm;rate=16000".to_string(),
            sequence_number: 0,
            sample_count: 0,
        };
        assert!(sink_ref.try_send_frame(frame.clone()).is_ok());
        assert_eq!(sink_ref.try_send_frame(frame), Err(FrameSendError::Saturated));
    }
}
