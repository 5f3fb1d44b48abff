//! Analyse spectrale de la sortie pour la visualisation
//!
//! À chaque chunk planifié, on lit les derniers échantillons rendus par la
//! sortie et on calcule un spectre en octets :
//! 1. fenêtre de Blackman sur `fft_size` échantillons
//! 2. transformée de Fourier discrète, magnitudes normalisées
//! 3. lissage temporel avec l'analyse précédente
//! 4. conversion en dB puis projection linéaire de [min_db, max_db] vers [0, 255]
//!
//! L'analyse ne modifie jamais le signal : elle lit le tap du périphérique.

use std::f64::consts::PI;

use crate::{AudioConfig, FrequencySnapshot, PlaybackDevice};

/// Échantillonneur de spectre, un par session
pub struct VisualizationSampler {
    fft_size: usize,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<f32>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl VisualizationSampler {
    pub fn new(config: &AudioConfig) -> Self {
        let n = config.fft_size.max(2);

        // Fenêtre de Blackman (a0 = 0.42, a1 = 0.5, a2 = 0.08)
        let window = (0..n)
            .map(|i| {
                let x = i as f64 / n as f64;
                (0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()) as f32
            })
            .collect();

        let angle = |i: usize| 2.0 * PI * i as f64 / n as f64;
        Self {
            fft_size: n,
            window,
            cos_table: (0..n).map(|i| angle(i).cos() as f32).collect(),
            sin_table: (0..n).map(|i| angle(i).sin() as f32).collect(),
            smoothed: vec![0.0; n / 2],
            scratch: vec![0.0; n],
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    /// Nombre de bandes produites par `sample()`
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse ce que le périphérique vient de rendre
    pub fn sample(&mut self, device: &dyn PlaybackDevice) -> FrequencySnapshot {
        self.scratch.fill(0.0);
        device.read_output_tap(&mut self.scratch);
        self.analyze()
    }

    /// Analyse un bloc arbitraire (aligné sur la fin de la fenêtre)
    pub fn sample_block(&mut self, block: &[f32]) -> FrequencySnapshot {
        self.scratch.fill(0.0);
        let take = block.len().min(self.fft_size);
        let offset = self.fft_size - take;
        self.scratch[offset..].copy_from_slice(&block[block.len() - take..]);
        self.analyze()
    }

    fn analyze(&mut self) -> FrequencySnapshot {
        let n = self.fft_size;
        for (sample, weight) in self.scratch.iter_mut().zip(self.window.iter()) {
            *sample *= weight;
        }

        let range = self.max_decibels - self.min_decibels;
        let mut bins = Vec::with_capacity(n / 2);

        for k in 0..n / 2 {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (i, &x) in self.scratch.iter().enumerate() {
                let index = (k * i) % n;
                re += x * self.cos_table[index];
                im -= x * self.sin_table[index];
            }
            let magnitude = (re * re + im * im).sqrt() / n as f32;

            let smoothed = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            // Les valeurs non finies viendraient d'un signal NaN : on repart de zéro
            self.smoothed[k] = if smoothed.is_finite() { smoothed } else { 0.0 };

            let byte = if self.smoothed[k] <= 0.0 {
                0
            } else {
                let db = 20.0 * self.smoothed[k].log10();
                (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
            };
            bins.push(byte);
        }

        FrequencySnapshot::new(bins)
    }

    /// Oublie l'historique de lissage
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}
