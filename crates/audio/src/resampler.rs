//! Resampler linéaire en streaming
//!
//! Le microphone tourne au rythme natif du périphérique (souvent 48 kHz,
//! parfois en stéréo) alors que le service attend du 16 kHz mono.
//! L'interpolation linéaire n'introduit aucune latence algorithmique et
//! garde sa position fractionnaire d'un bloc à l'autre, ce qui convient
//! au callback temps réel de cpal.

use crate::Sample;

/// Resampler à interpolation linéaire, état conservé entre les appels
#[derive(Debug, Clone)]
pub struct StreamingResampler {
    /// Ratio fréquence d'entrée / fréquence de sortie (48000/16000 = 3.0)
    ratio: f64,
    /// Position dans le bloc courant, relative au dernier échantillon du bloc précédent
    position: f64,
    /// Dernier échantillon du bloc précédent
    previous: Sample,
    initialized: bool,
}

impl StreamingResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            ratio: input_rate as f64 / output_rate.max(1) as f64,
            position: 0.0,
            previous: 0.0,
            initialized: false,
        }
    }

    /// Vrai si l'entrée est déjà au bon rythme
    pub fn is_passthrough(&self) -> bool {
        (self.ratio - 1.0).abs() < f64::EPSILON
    }

    /// Rééchantillonne un bloc et ajoute le résultat à `output`
    pub fn process(&mut self, input: &[Sample], output: &mut Vec<Sample>) {
        if input.is_empty() {
            return;
        }
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }
        if !self.initialized {
            // Premier bloc : pas d'historique, on démarre sur le premier échantillon
            self.previous = input[0];
            self.position = 1.0;
            self.initialized = true;
        }

        // Index 0 = `previous`, index i >= 1 = input[i - 1]
        let at = |index: usize, previous: Sample| -> Sample {
            if index == 0 { previous } else { input[index - 1] }
        };

        let available = input.len() as f64;
        while self.position <= available {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let a = at(index, self.previous);
            let b = if index < input.len() { at(index + 1, self.previous) } else { a };
            output.push(a + frac * (b - a));
            self.position += self.ratio;
        }

        self.position -= available;
        self.previous = input[input.len() - 1];
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous = 0.0;
        self.initialized = false;
    }
}

/// Réduit un bloc entrelacé multi-canal en mono (moyenne des canaux)
pub fn downmix_to_mono(interleaved: &[Sample], channels: usize, output: &mut Vec<Sample>) {
    if channels <= 1 {
        output.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    output.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut resampler = StreamingResampler::new(16000, 16000);
        let mut out = Vec::new();
        resampler.process(&[0.1, 0.2, 0.3], &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_downsample_ratio() {
        let mut resampler = StreamingResampler::new(48000, 16000);
        let mut out = Vec::new();
        // 4800 échantillons à 48 kHz = 100ms = 1600 échantillons à 16 kHz
        for _ in 0..10 {
            resampler.process(&[0.0; 480], &mut out);
        }
        assert!((out.len() as i64 - 1600).abs() <= 1, "obtenu {}", out.len());
    }

    #[test]
    fn test_streaming_continuity() {
        // Même signal en un bloc ou en plusieurs : même résultat
        let signal: Vec<f32> = (0..300).map(|i| (i as f32 * 0.05).sin()).collect();

        let mut whole = StreamingResampler::new(44100, 16000);
        let mut expected = Vec::new();
        whole.process(&signal, &mut expected);

        let mut split = StreamingResampler::new(44100, 16000);
        let mut actual = Vec::new();
        for block in signal.chunks(37) {
            split.process(block, &mut actual);
        }

        assert_eq!(expected.len(), actual.len());
        for (a, b) in expected.iter().zip(actual.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_downmix() {
        let mut out = Vec::new();
        downmix_to_mono(&[0.2, 0.4, -1.0, 1.0], 2, &mut out);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
    }
}
