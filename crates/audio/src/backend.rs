//! Backends audio : accès à la plateforme
//!
//! - `CpalBackend` ouvre les périphériques par défaut du système
//! - `SimulatedBackend` fournit une capture et une sortie simulées,
//!   avec injection d'échecs pour tester l'acquisition

use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    AudioBackend, AudioCapture, AudioConfig, AudioError, AudioResult, CaptureFeed, CpalCapture,
    CpalPlayback, PlaybackDevice, SimulatedCapture, UnitId, VirtualPlayback, VirtualPlaybackProbe,
};

/// Backend matériel basé sur l'host cpal par défaut
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

/// Inventaire des périphériques, pour la commande `devices`
#[derive(Debug, Clone, Default)]
pub struct DeviceReport {
    pub host: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub default_input: Option<String>,
    pub default_output: Option<String>,
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|| "Périphérique inconnu".to_string())
}

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Liste les périphériques d'entrée et de sortie de l'host par défaut
    pub fn describe_devices(&self) -> AudioResult<DeviceReport> {
        let host = cpal::default_host();
        Ok(DeviceReport {
            host: host.id().name().to_string(),
            inputs: host.input_devices()?.map(|d| device_name(&d)).collect(),
            outputs: host.output_devices()?.map(|d| device_name(&d)).collect(),
            default_input: host.default_input_device().map(|d| device_name(&d)),
            default_output: host.default_output_device().map(|d| device_name(&d)),
        })
    }
}

impl AudioBackend for CpalBackend {
    fn check_capability(&self) -> AudioResult<()> {
        let host = cpal::default_host();
        // Si l'énumération elle-même échoue, la plateforme ne sait pas capturer
        let inputs = host.input_devices()?.count();
        debug!(host = host.id().name(), inputs, "Capacité de capture vérifiée");
        Ok(())
    }

    fn open_input(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        Ok(Box::new(CpalCapture::open(config)?))
    }

    fn open_output(
        &self,
        config: &AudioConfig,
        completions: mpsc::UnboundedSender<UnitId>,
    ) -> AudioResult<Box<dyn PlaybackDevice>> {
        Ok(Box::new(CpalPlayback::open(config, completions)?))
    }

    fn backend_name(&self) -> String {
        format!("cpal ({})", cpal::default_host().id().name())
    }
}

/// Échec injecté dans un `SimulatedBackend`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// La plateforme n'a pas de capture audio
    Capability,
    /// Aucun microphone
    NoInputDevice,
    /// L'utilisateur refuse l'accès au microphone
    PermissionDenied,
    /// La sortie audio ne peut pas être ouverte
    Output(String),
}

/// Backend simulé pour les tests de session
pub struct SimulatedBackend {
    failure: Option<SimulatedFailure>,
    capture: Mutex<Option<SimulatedCapture>>,
    playback: Mutex<Option<VirtualPlaybackProbe>>,
    inputs_opened: AtomicUsize,
    outputs_opened: AtomicUsize,
}

impl SimulatedBackend {
    /// Backend fonctionnel ; retourne aussi l'injecteur de frames micro
    pub fn new() -> (Self, CaptureFeed) {
        let (capture, feed) = SimulatedCapture::channel(8);
        (Self::build(None, Some(capture)), feed)
    }

    /// Backend qui échoue de la façon indiquée
    pub fn failing(failure: SimulatedFailure) -> Self {
        let (capture, _feed) = SimulatedCapture::channel(1);
        Self::build(Some(failure), Some(capture))
    }

    fn build(failure: Option<SimulatedFailure>, capture: Option<SimulatedCapture>) -> Self {
        Self {
            failure,
            capture: Mutex::new(capture),
            playback: Mutex::new(None),
            inputs_opened: AtomicUsize::new(0),
            outputs_opened: AtomicUsize::new(0),
        }
    }

    /// Sonde de la dernière sortie ouverte
    pub fn playback_probe(&self) -> Option<VirtualPlaybackProbe> {
        self.playback.lock().ok().and_then(|probe| probe.clone())
    }

    /// Nombre de microphones effectivement ouverts
    pub fn inputs_opened(&self) -> usize {
        self.inputs_opened.load(Ordering::Acquire)
    }

    /// Nombre de sorties effectivement ouvertes
    pub fn outputs_opened(&self) -> usize {
        self.outputs_opened.load(Ordering::Acquire)
    }
}

impl AudioBackend for SimulatedBackend {
    fn check_capability(&self) -> AudioResult<()> {
        match self.failure {
            Some(SimulatedFailure::Capability) => Err(AudioError::CapabilityUnavailable(
                "aucune API de capture sur cette plateforme".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn open_input(&self, _config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        match self.failure {
            Some(SimulatedFailure::NoInputDevice) => return Err(AudioError::NoDeviceFound),
            Some(SimulatedFailure::PermissionDenied) => {
                return Err(AudioError::PermissionDenied("refus simulé".to_string()));
            }
            _ => {}
        }

        let capture = self
            .capture
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| AudioError::InitializationError("microphone simulé déjà utilisé".to_string()))?;
        self.inputs_opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(capture))
    }

    fn open_output(
        &self,
        config: &AudioConfig,
        completions: mpsc::UnboundedSender<UnitId>,
    ) -> AudioResult<Box<dyn PlaybackDevice>> {
        if let Some(SimulatedFailure::Output(reason)) = &self.failure {
            return Err(AudioError::InitializationError(reason.clone()));
        }

        let (device, probe) = VirtualPlayback::new(config.fft_size, completions);
        if let Ok(mut slot) = self.playback.lock() {
            *slot = Some(probe);
        }
        self.outputs_opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(device))
    }

    fn backend_name(&self) -> String {
        "simulé".to_string()
    }
}
