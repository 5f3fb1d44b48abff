//! Module de lecture audio
//!
//! Deux implémentations du trait PlaybackDevice :
//! - `CpalPlayback` : sortie réelle, mixeur piloté par le callback cpal
//! - `VirtualPlayback` : horloge et complétions contrôlées par un test
//!
//! # Horloge
//!
//! L'horloge du périphérique est le nombre de frames déjà rendues par le
//! callback, divisé par la fréquence du périphérique. Chaque unité est
//! convertie en intervalle de frames ; le callback additionne les unités
//! actives à chaque instant, ce qui rend la lecture sans trou quand les
//! unités sont contiguës.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{AudioChunk, AudioConfig, AudioError, AudioResult, PlaybackDevice, PlaybackUnit, Sample as AudioSample, UnitId};

/// Unité convertie sur la timeline en frames du périphérique
struct ScheduledSource {
    id: UnitId,
    samples: Arc<[AudioSample]>,
    start_frame: u64,
    end_frame: u64,
    /// Pas de lecture dans `samples` pour une frame du périphérique
    step: f64,
}

impl ScheduledSource {
    /// Échantillon de la source à la frame `frame` (interpolation linéaire)
    fn sample_at(&self, frame: u64) -> f32 {
        if frame < self.start_frame || frame >= self.end_frame {
            return 0.0;
        }
        let position = (frame - self.start_frame) as f64 * self.step;
        let index = position.floor() as usize;
        let Some(&a) = self.samples.get(index) else {
            return 0.0;
        };
        let b = self.samples.get(index + 1).copied().unwrap_or(a);
        a + (position - index as f64) as f32 * (b - a)
    }
}

/// État partagé entre la session et le callback de sortie
struct Mixer {
    sources: Vec<ScheduledSource>,
    tap: VecDeque<f32>,
    tap_capacity: usize,
    completions: mpsc::UnboundedSender<UnitId>,
}

impl Mixer {
    fn new(tap_capacity: usize, completions: mpsc::UnboundedSender<UnitId>) -> Self {
        Self {
            sources: Vec::new(),
            tap: VecDeque::with_capacity(tap_capacity),
            tap_capacity,
            completions,
        }
    }

    fn mix_frame(&mut self, frame: u64) -> f32 {
        let value: f32 = self.sources.iter().map(|source| source.sample_at(frame)).sum();
        let value = value.clamp(-1.0, 1.0);

        if self.tap.len() == self.tap_capacity {
            self.tap.pop_front();
        }
        self.tap.push_back(value);
        value
    }

    /// Retire les sources terminées et signale leur complétion
    fn retire_finished(&mut self, now_frame: u64) {
        let completions = &self.completions;
        self.sources.retain(|source| {
            if source.end_frame <= now_frame {
                let _ = completions.send(source.id);
                false
            } else {
                true
            }
        });
    }
}

/// Horloge + mixeur, clonés dans le callback
#[derive(Clone)]
struct OutputShared {
    mixer: Arc<Mutex<Mixer>>,
    rendered_frames: Arc<AtomicU64>,
}

/// Implémentation de lecture audio avec cpal
///
/// Le stream démarre dès l'ouverture et produit du silence tant
/// qu'aucune unité n'est planifiée.
pub struct CpalPlayback {
    stream: Option<Stream>,
    shared: OutputShared,
    device_rate: u32,
    device_name: String,
}

impl CpalPlayback {
    /// Ouvre la sortie audio par défaut
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucune sortie n'est disponible
    /// - `AudioError::ConfigError` si le format du périphérique n'est pas géré
    pub fn open(config: &AudioConfig, completions: mpsc::UnboundedSender<UnitId>) -> AudioResult<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let supported = device.default_output_config()?;
        let device_rate = supported.sample_rate();

        debug!(
            device = %device_name,
            sample_rate = device_rate,
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "Config par défaut de la sortie"
        );

        let shared = OutputShared {
            mixer: Arc::new(Mutex::new(Mixer::new(config.fft_size, completions))),
            rendered_frames: Arc::new(AtomicU64::new(0)),
        };

        let stream_config = supported.config();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32>(&device, &stream_config, shared.clone())?,
            SampleFormat::I16 => build_output_stream::<i16>(&device, &stream_config, shared.clone())?,
            SampleFormat::U16 => build_output_stream::<u16>(&device, &stream_config, shared.clone())?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )));
            }
        };
        stream.play()?;

        info!(device = %device_name, sample_rate = device_rate, "🔊 Sortie audio ouverte");

        Ok(Self {
            stream: Some(stream),
            shared,
            device_rate,
            device_name,
        })
    }

    fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.device_rate as f64).round() as u64
    }
}

/// Construit le stream de sortie pour un format d'échantillon donné
fn build_output_stream<T>(device: &Device, config: &StreamConfig, shared: OutputShared) -> AudioResult<Stream>
where
    T: SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render(data, channels, &shared);
        },
        move |err| {
            error!(error = %err, "❌ Erreur stream audio sortie");
        },
        None,
    )?;
    Ok(stream)
}

/// Remplit le buffer de sortie (thread temps réel)
///
/// Ne bloque jamais : si la session tient le mixeur, ce bloc est rendu en
/// silence et l'horloge n'avance pas. Les unités planifiées glissent alors
/// d'un bloc au lieu de perdre des échantillons.
fn render<T>(output: &mut [T], channels: usize, shared: &OutputShared)
where
    T: SizedSample + cpal::FromSample<f32>,
{
    let frames = output.len() / channels;
    let base = shared.rendered_frames.load(Ordering::Acquire);

    match shared.mixer.try_lock() {
        Ok(mut mixer) => {
            for (offset, frame) in output.chunks_mut(channels).enumerate() {
                let value = mixer.mix_frame(base + offset as u64);
                for sample in frame.iter_mut() {
                    *sample = T::from_sample(value);
                }
            }
            mixer.retire_finished(base + frames as u64);
            shared.rendered_frames.fetch_add(frames as u64, Ordering::Release);
        }
        Err(_) => {
            for sample in output.iter_mut() {
                *sample = T::from_sample(0.0f32);
            }
        }
    }
}

impl PlaybackDevice for CpalPlayback {
    fn current_time(&self) -> f64 {
        self.shared.rendered_frames.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, unit: &PlaybackUnit, chunk: &AudioChunk) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::DeviceDisconnected);
        }
        let start_frame = self.seconds_to_frame(unit.start);
        let end_frame = self.seconds_to_frame(unit.end()).max(start_frame + 1);
        let source = ScheduledSource {
            id: unit.id,
            samples: Arc::clone(&chunk.samples),
            start_frame,
            end_frame,
            step: chunk.sample_rate as f64 / self.device_rate as f64,
        };

        let mut mixer = self
            .shared
            .mixer
            .lock()
            .map_err(|_| AudioError::InitializationError("Mixeur de sortie inutilisable".to_string()))?;
        mixer.sources.push(source);
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        match self.shared.mixer.lock() {
            Ok(mut mixer) => mixer.sources.retain(|source| source.id != id),
            Err(_) => warn!(unit = %id, "Mixeur inutilisable, arrêt d'unité ignoré"),
        }
    }

    fn read_output_tap(&self, out: &mut [f32]) -> usize {
        let Ok(mixer) = self.shared.mixer.lock() else {
            return 0;
        };
        copy_tail(&mixer.tap, out)
    }

    fn close(&mut self) -> AudioResult<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        if let Ok(mut mixer) = self.shared.mixer.lock() {
            mixer.sources.clear();
        }
        let paused = stream.pause();
        drop(stream);
        info!("🛑 Sortie audio fermée");
        paused?;
        Ok(())
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Copie la fin de `tap` alignée sur la fin de `out`
fn copy_tail(tap: &VecDeque<f32>, out: &mut [f32]) -> usize {
    let available = tap.len().min(out.len());
    let out_offset = out.len() - available;
    let tap_offset = tap.len() - available;
    for (dst, src) in out[out_offset..].iter_mut().zip(tap.iter().skip(tap_offset)) {
        *dst = *src;
    }
    available
}

/// État observable d'une `VirtualPlayback`
#[derive(Default)]
struct VirtualState {
    now: f64,
    scheduled: Vec<PlaybackUnit>,
    active: HashSet<UnitId>,
    stopped: Vec<UnitId>,
    tap: VecDeque<f32>,
    closed: bool,
}

/// Sortie simulée : l'horloge n'avance que sur ordre du test
pub struct VirtualPlayback {
    state: Arc<Mutex<VirtualState>>,
    tap_capacity: usize,
}

/// Côté test d'une `VirtualPlayback`
#[derive(Clone)]
pub struct VirtualPlaybackProbe {
    state: Arc<Mutex<VirtualState>>,
    completions: mpsc::UnboundedSender<UnitId>,
}

impl VirtualPlayback {
    pub fn new(tap_capacity: usize, completions: mpsc::UnboundedSender<UnitId>) -> (Self, VirtualPlaybackProbe) {
        let state = Arc::new(Mutex::new(VirtualState::default()));
        (
            Self {
                state: Arc::clone(&state),
                tap_capacity,
            },
            VirtualPlaybackProbe { state, completions },
        )
    }

    fn state(&self) -> AudioResult<std::sync::MutexGuard<'_, VirtualState>> {
        self.state
            .lock()
            .map_err(|_| AudioError::InitializationError("Sortie simulée inutilisable".to_string()))
    }
}

impl PlaybackDevice for VirtualPlayback {
    fn current_time(&self) -> f64 {
        self.state().map(|state| state.now).unwrap_or(0.0)
    }

    fn schedule(&mut self, unit: &PlaybackUnit, chunk: &AudioChunk) -> AudioResult<()> {
        let tap_capacity = self.tap_capacity;
        let mut state = self.state()?;
        if state.closed {
            return Err(AudioError::DeviceDisconnected);
        }
        state.scheduled.push(*unit);
        state.active.insert(unit.id);

        // Le "son rendu" est la fin du dernier chunk planifié
        state.tap.extend(chunk.samples.iter().copied());
        while state.tap.len() > tap_capacity {
            state.tap.pop_front();
        }
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        if let Ok(mut state) = self.state() {
            if state.active.remove(&id) {
                state.stopped.push(id);
            }
        }
    }

    fn read_output_tap(&self, out: &mut [f32]) -> usize {
        match self.state() {
            Ok(state) => copy_tail(&state.tap, out),
            Err(_) => 0,
        }
    }

    fn close(&mut self) -> AudioResult<()> {
        let mut state = self.state()?;
        // Une sortie fermée ne signale plus aucune complétion
        state.closed = true;
        state.active.clear();
        Ok(())
    }

    fn device_info(&self) -> String {
        "Sortie simulée".to_string()
    }
}

impl VirtualPlaybackProbe {
    fn with_state<R>(&self, f: impl FnOnce(&mut VirtualState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    /// Place l'horloge du périphérique à `seconds`
    pub fn set_time(&self, seconds: f64) {
        self.with_state(|state| state.now = seconds);
    }

    /// Unités planifiées, dans l'ordre des appels
    pub fn scheduled(&self) -> Vec<PlaybackUnit> {
        self.with_state(|state| state.scheduled.clone()).unwrap_or_default()
    }

    /// Unités planifiées et ni arrêtées ni terminées
    pub fn active_count(&self) -> usize {
        self.with_state(|state| state.active.len()).unwrap_or(0)
    }

    /// Unités arrêtées avant leur fin
    pub fn stopped(&self) -> Vec<UnitId> {
        self.with_state(|state| state.stopped.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state| state.closed).unwrap_or(false)
    }

    /// Termine une unité active et signale sa complétion
    ///
    /// Retourne `false` si l'unité n'était pas active.
    pub fn complete(&self, id: UnitId) -> bool {
        let finished = self
            .with_state(|state| !state.closed && state.active.remove(&id))
            .unwrap_or(false);
        if finished {
            let _ = self.completions.send(id);
        }
        finished
    }

    /// Avance l'horloge et termine toutes les unités finies à ce temps
    pub fn advance_to(&self, seconds: f64) -> Vec<UnitId> {
        let finished: Vec<UnitId> = self
            .with_state(|state| {
                state.now = seconds;
                state
                    .scheduled
                    .iter()
                    .filter(|unit| state.active.contains(&unit.id) && unit.end() <= seconds)
                    .map(|unit| unit.id)
                    .collect()
            })
            .unwrap_or_default();
        finished.into_iter().filter(|id| self.complete(*id)).collect()
    }
}
