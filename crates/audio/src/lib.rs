//! Crate audio pour l'assistant vocal Voc
//!
//! Ce crate gère toute la chaîne audio d'une session :
//! - Capture microphone avec cpal, rééchantillonnée en 16 kHz mono
//! - Codec PCM 16 bits / base64 échangé avec le service
//! - Planification sans trou des réponses sur l'horloge de sortie
//! - Analyse spectrale de la sortie pour la visualisation
//! - Doubles simulés (capture, sortie, backend) pour les tests sans hardware

pub mod config;      // Configuration audio
pub mod types;       // Types de données (CaptureFrame, AudioChunk, etc.)
pub mod traits;      // Traits abstraits
pub mod error;       // Gestion d'erreurs
pub mod codec;       // PCM16 + base64
pub mod resampler;   // Conversion de fréquence du microphone
pub mod capture;     // Capture cpal et simulée
pub mod playback;    // Sortie cpal et virtuelle
pub mod scheduler;   // Timeline de lecture
pub mod visualizer;  // Spectre de la sortie
pub mod pipeline;    // Microphone -> canal
pub mod backend;     // Accès à la plateforme

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use backend::{CpalBackend, DeviceReport, SimulatedBackend, SimulatedFailure};
pub use capture::{CaptureFeed, CpalCapture, SimulatedCapture};
pub use codec::Pcm16Codec;
pub use pipeline::{CapturePipeline, ForwardOutcome};
pub use playback::{CpalPlayback, VirtualPlayback, VirtualPlaybackProbe};
pub use scheduler::PlaybackScheduler;
pub use visualizer::VisualizationSampler;
