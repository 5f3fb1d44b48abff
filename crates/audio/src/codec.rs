//! Codec PCM 16 bits pour les échanges avec le service vocal
//!
//! Le service parle en PCM 16 bits signé little-endian, mono, transporté
//! en base64 dans des messages JSON. Ce module fait la conversion entre
//! nos échantillons f32 et ce format.
//!
//! La conversion est symétrique : `s / 32768` au décodage, `round(s * 32768)`
//! écrêté à l'encodage. Un aller-retour bytes → f32 → bytes est donc exact.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{AudioChunk, AudioCodec, AudioConfig, AudioError, AudioResult, CaptureFrame, EncodedFrame, Sample};

/// Préfixe MIME accepté pour les chunks reçus
const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Convertit des échantillons f32 en bytes PCM16 little-endian
///
/// # Example
/// ```rust
/// use audio::codec::samples_to_pcm16;
///
/// let bytes = samples_to_pcm16(&[0.0, 1.0, -1.0]);
/// assert_eq!(bytes, vec![0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80]);
/// ```
pub fn samples_to_pcm16(samples: &[Sample]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convertit des bytes PCM16 little-endian en échantillons f32
///
/// # Erreurs
/// - `AudioError::DecodeError` si le nombre de bytes est impair
pub fn pcm16_to_samples(bytes: &[u8]) -> AudioResult<Vec<Sample>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::DecodeError(format!(
            "PCM16 tronqué : {} bytes (nombre impair)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Extrait le paramètre `rate=` d'un type MIME (`audio/pcm;rate=24000`)
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Codec PCM16 + base64
#[derive(Clone, Debug)]
pub struct Pcm16Codec {
    capture_sample_rate: u32,
    default_playback_rate: u32,
    capture_mime_type: String,
}

impl Pcm16Codec {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            capture_sample_rate: config.capture_sample_rate,
            default_playback_rate: config.playback_sample_rate,
            capture_mime_type: config.capture_mime_type(),
        }
    }
}

impl Default for Pcm16Codec {
    fn default() -> Self {
        Self::new(&AudioConfig::default())
    }
}

impl AudioCodec for Pcm16Codec {
    fn encode(&self, frame: &CaptureFrame) -> EncodedFrame {
        let bytes = samples_to_pcm16(&frame.samples);
        // Une frame produite à un autre rythme que la config garde son propre type MIME
        let mime_type = if frame.sample_rate == self.capture_sample_rate {
            self.capture_mime_type.clone()
        } else {
            format!("{};rate={}", PCM_MIME_PREFIX, frame.sample_rate)
        };

        EncodedFrame {
            data: STANDARD.encode(bytes),
            mime_type,
            sequence_number: frame.sequence_number,
            sample_count: frame.samples.len(),
        }
    }

    fn decode(
        &self,
        payload: &str,
        mime_type: Option<&str>,
        sequence_number: u64,
    ) -> AudioResult<AudioChunk> {
        let sample_rate = match mime_type {
            Some(mime) => {
                if !mime.trim_start().to_ascii_lowercase().starts_with(PCM_MIME_PREFIX) {
                    return Err(AudioError::DecodeError(format!("format non supporté : {}", mime)));
                }
                parse_pcm_rate(mime).unwrap_or(self.default_playback_rate)
            }
            None => self.default_playback_rate,
        };
        if sample_rate == 0 {
            return Err(AudioError::DecodeError(format!(
                "fréquence nulle : {}",
                mime_type.unwrap_or_default()
            )));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| AudioError::DecodeError(format!("base64 invalide : {}", e)))?;
        let samples = pcm16_to_samples(&bytes)?;

        Ok(AudioChunk::new(samples, sample_rate, sequence_number))
    }

    fn codec_info(&self) -> String {
        format!(
            "PCM16 LE mono - entrée {} Hz, sortie {} Hz par défaut",
            self.capture_sample_rate, self.default_playback_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_extremes() {
        assert_eq!(samples_to_pcm16(&[1.0]), 32767i16.to_le_bytes().to_vec());
        assert_eq!(samples_to_pcm16(&[-1.0]), (-32768i16).to_le_bytes().to_vec());
        // Hors plage : écrêté, jamais de wraparound
        assert_eq!(samples_to_pcm16(&[3.0]), 32767i16.to_le_bytes().to_vec());
        assert_eq!(samples_to_pcm16(&[-3.0]), (-32768i16).to_le_bytes().to_vec());
    }

    #[test]
    fn test_bytes_round_trip_is_exact() {
        // Tous les i16 possibles survivent à bytes -> f32 -> bytes
        let original: Vec<u8> = (i16::MIN..=i16::MAX).flat_map(|v| v.to_le_bytes()).collect();

        let samples = pcm16_to_samples(&original).unwrap();
        assert_eq!(samples_to_pcm16(&samples), original);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(pcm16_to_samples(&[0x01, 0x02, 0x03]), Err(AudioError::DecodeError(_))));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_pcm_rate("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(parse_pcm_rate("audio/pcm; rate=16000"), Some(16000));
        assert_eq!(parse_pcm_rate("audio/pcm"), None);
        assert_eq!(parse_pcm_rate("audio/pcm;rate=abc"), None);
    }

    #[test]
    fn test_encode_decode_chunk() {
        let codec = Pcm16Codec::default();
        let frame = CaptureFrame::new(vec![0.5, -0.25, 0.0, 0.125], 16000, 7);

        let encoded = codec.encode(&frame);
        assert_eq!(encoded.mime_type, "audio/pcm;rate=16000");
        assert_eq!(encoded.sequence_number, 7);
        assert_eq!(encoded.sample_count, 4);

        let chunk = codec.decode(&encoded.data, Some(&encoded.mime_type), 1).unwrap();
        assert_eq!(chunk.sample_rate, 16000);
        assert_eq!(&chunk.samples[..], &[0.5, -0.25, 0.0, 0.125]);
    }

    #[test]
    fn test_decode_defaults_to_playback_rate() {
        let codec = Pcm16Codec::default();
        let payload = STANDARD.encode(samples_to_pcm16(&[0.0; 240]));

        let chunk = codec.decode(&payload, None, 3).unwrap();
        assert_eq!(chunk.sample_rate, 24000);
        assert!((chunk.duration() - 0.01).abs() < 1e-12);

        let chunk = codec.decode(&payload, Some("audio/pcm"), 4).unwrap();
        assert_eq!(chunk.sample_rate, 24000);
    }

    #[test]
    fn test_decode_errors() {
        let codec = Pcm16Codec::default();
        assert!(matches!(codec.decode("@@pas du base64@@", None, 1), Err(AudioError::DecodeError(_))));
        assert!(matches!(
            codec.decode("AAAA", Some("audio/opus"), 2),
            Err(AudioError::DecodeError(_))
        ));

        let payload = STANDARD.encode(samples_to_pcm16(&[0.1; 480]));
        assert!(matches!(
            codec.decode(&payload, Some("audio/pcm;rate=0"), 3),
            Err(AudioError::DecodeError(_))
        ));
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let codec = Pcm16Codec::default();
        // Valeurs non représentables exactement, réparties sur [-1, 1]
        let original: Vec<Sample> = (0..=20_000)
            .map(|i| -1.0 + 2.0 * (i as f32 * 0.618_034).fract())
            .chain([-1.0, 1.0, 0.999_99, -0.999_99, 1e-7, -1e-7])
            .collect();
        let frame = CaptureFrame::new(original.clone(), 16000, 1);

        let encoded = codec.encode(&frame);
        let chunk = codec.decode(&encoded.data, Some(&encoded.mime_type), 1).unwrap();

        assert_eq!(chunk.samples.len(), original.len());
        for (x, y) in original.iter().zip(chunk.samples.iter()) {
            assert!((x - y).abs() <= 1.0 / 32768.0, "{} -> {}", x, y);
        }
    }
}
