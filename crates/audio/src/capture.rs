//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture de deux façons :
//! - `CpalCapture` lit le microphone par défaut du système
//! - `SimulatedCapture` reçoit des frames injectées par un test
//!
//! # Architecture thread
//!
//! cpal fonctionne avec des callbacks sur un thread temps réel. Le callback
//! réduit en mono, rééchantillonne vers 16 kHz puis découpe en frames
//! complètes déposées dans un emplacement unique. Si la session ne suit
//! pas, la frame en attente est remplacée par la plus récente et comptée
//! comme perdue.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info};

use crate::resampler::{StreamingResampler, downmix_to_mono};
use crate::{AudioCapture, AudioConfig, AudioError, AudioResult, CaptureFrame};

/// Dernière frame complète, en attente d'être lue par la session
///
/// Au plus une frame attend : une nouvelle frame remplace l'ancienne.
#[derive(Default)]
struct LatestFrame {
    frame: Mutex<Option<CaptureFrame>>,
    ready: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl LatestFrame {
    /// Dépose une frame, en remplaçant celle qui n'a pas été lue
    fn put(&self, frame: CaptureFrame) {
        let replaced = match self.frame.lock() {
            Ok(mut slot) => slot.replace(frame).is_some(),
            Err(_) => true,
        };
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
    }

    fn take(&self) -> Option<CaptureFrame> {
        self.frame.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Vide l'emplacement et réveille un lecteur en attente
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut slot) = self.frame.lock() {
            slot.take();
        }
        self.ready.notify_one();
    }

    /// Attend une frame ; `None` une fois fermé
    async fn next(&self) -> Option<CaptureFrame> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(frame) = self.take() {
                return Some(frame);
            }
            self.ready.notified().await;
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Découpe le flux du périphérique en `CaptureFrame` au format du service
///
/// Vit dans le callback cpal ; n'alloue qu'au moment d'émettre une frame.
struct FrameAssembler {
    channels: usize,
    resampler: StreamingResampler,
    mono: Vec<f32>,
    pending: Vec<f32>,
    samples_per_frame: usize,
    sample_rate: u32,
    next_sequence: u64,
    output: Arc<LatestFrame>,
    active: Arc<AtomicBool>,
}

impl FrameAssembler {
    fn new(
        device_channels: usize,
        device_rate: u32,
        config: &AudioConfig,
        output: Arc<LatestFrame>,
        active: Arc<AtomicBool>,
    ) -> Self {
        let samples_per_frame = config.capture_samples_per_frame();
        Self {
            channels: device_channels.max(1),
            resampler: StreamingResampler::new(device_rate, config.capture_sample_rate),
            mono: Vec::new(),
            pending: Vec::with_capacity(samples_per_frame * 2),
            samples_per_frame,
            sample_rate: config.capture_sample_rate,
            next_sequence: 0,
            output,
            active,
        }
    }

    /// Traite un bloc entrelacé venant du périphérique
    fn push(&mut self, interleaved: &[f32]) {
        // Tant que la session n'a pas démarré la capture, l'audio est ignoré
        if !self.active.load(Ordering::Acquire) {
            if !self.pending.is_empty() {
                self.pending.clear();
                self.resampler.reset();
            }
            return;
        }

        self.mono.clear();
        downmix_to_mono(interleaved, self.channels, &mut self.mono);
        self.resampler.process(&self.mono, &mut self.pending);

        while self.pending.len() >= self.samples_per_frame {
            let samples: Vec<f32> = self.pending.drain(..self.samples_per_frame).collect();
            let frame = CaptureFrame::new(samples, self.sample_rate, self.next_sequence);
            self.next_sequence += 1;
            self.output.put(frame);
        }
    }
}

/// Implémentation de capture audio avec cpal
///
/// Le stream est ouvert (et la permission micro obtenue) dès `open()`,
/// mais aucune frame n'est produite avant `start()`.
pub struct CpalCapture {
    /// Stream audio actif (None une fois libéré)
    stream: Option<Stream>,

    /// Dernière frame complète produite par le callback
    latest: Arc<LatestFrame>,

    /// Ouvre ou ferme le robinet côté callback
    active: Arc<AtomicBool>,

    device_name: String,
}

impl CpalCapture {
    /// Ouvre le microphone par défaut
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun microphone n'est disponible
    /// - `AudioError::PermissionDenied` si le système refuse l'accès
    /// - `AudioError::ConfigError` si le format du périphérique n'est pas géré
    pub fn open(config: &AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let supported = device.default_input_config()?;
        let device_rate = supported.sample_rate();
        let device_channels = supported.channels() as usize;

        debug!(
            device = %device_name,
            sample_rate = device_rate,
            channels = device_channels,
            format = ?supported.sample_format(),
            "Config par défaut du microphone"
        );

        let latest = Arc::new(LatestFrame::default());
        let active = Arc::new(AtomicBool::new(false));
        let assembler = FrameAssembler::new(
            device_channels,
            device_rate,
            config,
            Arc::clone(&latest),
            Arc::clone(&active),
        );

        let stream_config = supported.config();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &stream_config, assembler)?,
            SampleFormat::I16 => build_input_stream::<i16>(&device, &stream_config, assembler)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &stream_config, assembler)?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )));
            }
        };

        // Le stream tourne dès maintenant : un refus de permission tardif remonte ici
        stream.play()?;

        info!(device = %device_name, "🎤 Microphone ouvert");

        Ok(Self {
            stream: Some(stream),
            latest,
            active,
            device_name,
        })
    }
}

/// Construit le stream d'entrée pour un format d'échantillon donné
fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
) -> AudioResult<Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut converted: Vec<f32> = Vec::new();
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&sample| sample.to_sample::<f32>()));
            assembler.push(&converted);
        },
        move |err| {
            error!(error = %err, "❌ Erreur stream audio entrée");
        },
        None,
    )?;
    Ok(stream)
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::DeviceDisconnected);
        }
        self.active.store(true, Ordering::Release);
        info!("🚀 Capture audio démarrée");
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        self.active.store(false, Ordering::Release);

        // Libère le périphérique puis réveille un éventuel lecteur
        if let Some(stream) = self.stream.take() {
            let paused = stream.pause();
            drop(stream);
            self.latest.close();
            info!(dropped = self.dropped_frames(), "🛑 Capture audio arrêtée");
            paused?;
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> AudioResult<CaptureFrame> {
        self.latest.next().await.ok_or(AudioError::DeviceDisconnected)
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some() && self.active.load(Ordering::Acquire)
    }

    fn dropped_frames(&self) -> u64 {
        self.latest.dropped()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Capture simulée pilotée par un test
///
/// Se comporte comme le microphone : les frames poussées avant `start()`
/// sont jetées, et `next_frame()` échoue une fois la capture libérée.
pub struct SimulatedCapture {
    frames: mpsc::Receiver<CaptureFrame>,
    recording: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

/// Côté test d'une `SimulatedCapture`
#[derive(Clone)]
pub struct CaptureFeed {
    sender: mpsc::Sender<CaptureFrame>,
    recording: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl SimulatedCapture {
    /// Crée une capture simulée et son point d'injection
    pub fn channel(capacity: usize) -> (Self, CaptureFeed) {
        let (sender, frames) = mpsc::channel(capacity.max(1));
        let recording = Arc::new(AtomicBool::new(false));
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                frames,
                recording: Arc::clone(&recording),
                released: Arc::clone(&released),
            },
            CaptureFeed { sender, recording, released },
        )
    }
}

impl CaptureFeed {
    /// Pousse une frame comme si le microphone l'avait produite
    ///
    /// Retourne `false` si la capture a été libérée.
    pub async fn push(&self, frame: CaptureFrame) -> bool {
        self.sender.send(frame).await.is_ok()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Vrai une fois `stop()` appelé sur la capture
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AudioCapture for SimulatedCapture {
    async fn start(&mut self) -> AudioResult<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(AudioError::DeviceDisconnected);
        }
        // Ce qui a été "capté" avant le démarrage n'est jamais transmis
        while self.frames.try_recv().is_ok() {}
        self.recording.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        self.recording.store(false, Ordering::Release);
        self.released.store(true, Ordering::Release);
        self.frames.close();
        Ok(())
    }

    async fn next_frame(&mut self) -> AudioResult<CaptureFrame> {
        if self.released.load(Ordering::Acquire) {
            return Err(AudioError::DeviceDisconnected);
        }
        self.frames.recv().await.ok_or(AudioError::DeviceDisconnected)
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    fn device_info(&self) -> String {
        "Microphone simulé".to_string()
    }
}
