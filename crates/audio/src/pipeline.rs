//! Pipeline de capture : microphone → encodage → canal
//!
//! ```text
//! Microphone → [Capture 16 kHz] → [Encode PCM16/base64] → FrameSink (canal)
//! ```
//!
//! Le pipeline ne décide pas quand il tourne : la session ne lui demande des
//! frames qu'une fois le canal ouvert. L'envoi est non bloquant, une frame
//! refusée est perdue et comptée.

use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    AudioCapture, AudioCodec, AudioResult, EncodedFrame, FrameSendError, FrameSink,
};

/// Résultat du transfert d'une frame vers le canal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    Dropped(FrameSendError),
}

/// Pipeline de capture
pub struct CapturePipeline {
    capture: Box<dyn AudioCapture>,
    codec: Arc<dyn AudioCodec>,
    frames_sent: u64,
    frames_dropped: u64,
    running: bool,
}

impl CapturePipeline {
    pub fn new(capture: Box<dyn AudioCapture>, codec: Arc<dyn AudioCodec>) -> Self {
        debug!(
            capture = %capture.device_info(),
            codec = %codec.codec_info(),
            "Pipeline de capture créé"
        );
        Self {
            capture,
            codec,
            frames_sent: 0,
            frames_dropped: 0,
            running: false,
        }
    }

    /// Démarre la capture (le canal est ouvert)
    pub async fn start(&mut self) -> AudioResult<()> {
        if self.running {
            return Ok(());
        }
        self.capture.start().await?;
        self.running = true;
        info!(device = %self.capture.device_info(), "🎙️ Pipeline de capture démarré");
        Ok(())
    }

    /// Arrête la capture et libère le microphone ; idempotent
    pub async fn stop(&mut self) -> AudioResult<()> {
        self.running = false;
        self.capture.stop().await?;
        debug!(
            sent = self.frames_sent,
            dropped = self.frames_dropped(),
            "Pipeline de capture arrêté"
        );
        Ok(())
    }

    /// Attend la prochaine frame et l'encode
    pub async fn next_encoded(&mut self) -> AudioResult<EncodedFrame> {
        let frame = self.capture.next_frame().await?;
        Ok(self.codec.encode(&frame))
    }

    /// Transmet une frame encodée sans jamais bloquer ni réessayer
    pub fn forward(&mut self, frame: EncodedFrame, sink: &mut dyn FrameSink) -> ForwardOutcome {
        match sink.try_send_frame(frame) {
            Ok(()) => {
                self.frames_sent += 1;
                ForwardOutcome::Sent
            }
            Err(reason) => {
                self.frames_dropped += 1;
                ForwardOutcome::Dropped(reason)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Frames perdues, à la capture comme à l'envoi
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped + self.capture.dropped_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureFrame, Pcm16Codec, SimulatedCapture};

    /// Canal factice : accepte `capacity` frames puis sature
    struct BoundedSink {
        accepted: Vec<EncodedFrame>,
        capacity: usize,
        closed: bool,
    }

    impl FrameSink for BoundedSink {
        fn try_send_frame(&mut self, frame: EncodedFrame) -> Result<(), FrameSendError> {
            if self.closed {
                return Err(FrameSendError::Closed);
            }
            if self.accepted.len() >= self.capacity {
                return Err(FrameSendError::Saturated);
            }
            self.accepted.push(frame);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capture_encode_forward() {
        let (capture, feed) = SimulatedCapture::channel(4);
        let mut pipeline = CapturePipeline::new(Box::new(capture), Arc::new(Pcm16Codec::default()));
        pipeline.start().await.unwrap();
        assert!(pipeline.is_running());

        feed.push(CaptureFrame::new(vec![0.5; 4096], 16000, 0)).await;
        let encoded = pipeline.next_encoded().await.unwrap();
        assert_eq!(encoded.mime_type, "audio/pcm;rate=16000");
        assert_eq!(encoded.sample_count, 4096);

        let mut sink = BoundedSink { accepted: Vec::new(), capacity: 1, closed: false };
        assert_eq!(pipeline.forward(encoded.clone(), &mut sink), ForwardOutcome::Sent);
        assert_eq!(
            pipeline.forward(encoded.clone(), &mut sink),
            ForwardOutcome::Dropped(FrameSendError::Saturated)
        );

        sink.closed = true;
        assert_eq!(
            pipeline.forward(encoded, &mut sink),
            ForwardOutcome::Dropped(FrameSendError::Closed)
        );
        assert_eq!(pipeline.frames_sent(), 1);
        assert_eq!(pipeline.frames_dropped(), 2);
    }

    /// Micro qui a déjà remplacé `dropped` frames non lues
    struct LaggingCapture {
        dropped: u64,
    }

    #[async_trait::async_trait]
    impl AudioCapture for LaggingCapture {
        async fn start(&mut self) -> AudioResult<()> {
            Ok(())
        }

        async fn stop(&mut self) -> AudioResult<()> {
            Ok(())
        }

        async fn next_frame(&mut self) -> AudioResult<CaptureFrame> {
            Ok(CaptureFrame::new(vec![0.0; 16], 16000, self.dropped))
        }

        fn is_recording(&self) -> bool {
            true
        }

        fn dropped_frames(&self) -> u64 {
            self.dropped
        }
    }

    #[tokio::test]
    async fn test_capture_drops_are_counted() {
        let capture = LaggingCapture { dropped: 3 };
        let mut pipeline = CapturePipeline::new(Box::new(capture), Arc::new(Pcm16Codec::default()));
        pipeline.start().await.unwrap();

        let encoded = pipeline.next_encoded().await.unwrap();
        let mut sink = BoundedSink { accepted: Vec::new(), capacity: 0, closed: false };
        pipeline.forward(encoded, &mut sink);

        assert_eq!(pipeline.frames_sent(), 0);
        assert_eq!(pipeline.frames_dropped(), 4);
    }

    #[tokio::test]
    async fn test_stop_releases_capture() {
        let (capture, feed) = SimulatedCapture::channel(4);
        let mut pipeline = CapturePipeline::new(Box::new(capture), Arc::new(Pcm16Codec::default()));
        pipeline.start().await.unwrap();

        pipeline.stop().await.unwrap();
        pipeline.stop().await.unwrap();
        assert!(!pipeline.is_running());
        assert!(feed.is_released());
        assert!(pipeline.next_encoded().await.is_err());
    }
}
