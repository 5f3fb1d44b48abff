//! Session temps réel : cycle de vie, câblage audio ↔ canal
//!
//! Une session vit dans une seule tâche tokio. Tous les événements
//! (commande, message du service, fin de lecture, frame micro) passent par
//! une même boucle `select!` et sont traités l'un après l'autre, sans
//! réentrance dans le planificateur.
//!
//! ```text
//! Micro → CapturePipeline → SessionChannel → [service]
//! [service] → SessionChannel → décodage → PlaybackScheduler → sortie
//!                                                  └→ VisualizationSampler → observateur
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    AssistantConfig, ConnectionState, LanguageVariant, SessionError, SessionObserver, SessionResult,
};
use audio::{
    AudioBackend, AudioCodec, AudioResult, AudioStats, CapturePipeline, EncodedFrame, ForwardOutcome,
    FrameSendError, Pcm16Codec, PlaybackScheduler, UnitId, VisualizationSampler,
};
use network::{ChannelConnector, ChannelEvent, InlineAudio, ServerMessage, SessionChannel, SessionSetup};

/// Commandes envoyées à une session en cours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Disconnect,
}

/// Ce qui a réveillé la boucle de session
enum Step {
    Command(Option<SessionCommand>),
    Channel(Option<ChannelEvent>),
    Completed(UnitId),
    Frame(AudioResult<EncodedFrame>),
}

/// Une tentative de connexion et tout ce qu'elle possède
///
/// Chaque ressource est optionnelle : la libération fonctionne quel que
/// soit le point où l'établissement s'est arrêté.
pub struct Session {
    audio_config: audio::AudioConfig,
    setup: SessionSetup,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn ChannelConnector>,
    observer: Arc<dyn SessionObserver>,

    state: ConnectionState,
    codec: Arc<dyn AudioCodec>,
    sampler: VisualizationSampler,

    pipeline: Option<CapturePipeline>,
    scheduler: Option<PlaybackScheduler>,
    channel: Option<SessionChannel>,

    completions_tx: mpsc::UnboundedSender<UnitId>,
    completions: mpsc::UnboundedReceiver<UnitId>,

    stats: AudioStats,
    chunk_sequence: u64,
    send_failure_reported: bool,
}

impl Session {
    pub fn new(
        config: &AssistantConfig,
        language: &LanguageVariant,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn ChannelConnector>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            audio_config: config.audio.clone(),
            setup: config.session_setup(language),
            backend,
            connector,
            observer,
            state: ConnectionState::Disconnected,
            codec: Arc::new(Pcm16Codec::new(&config.audio)),
            sampler: VisualizationSampler::new(&config.audio),
            pipeline: None,
            scheduler: None,
            channel: None,
            completions_tx,
            completions,
            stats: AudioStats::default(),
            chunk_sequence: 0,
            send_failure_reported: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Fait vivre la session jusqu'à sa fin ; retourne l'état final
    ///
    /// La session se termine sur `SessionCommand::Disconnect`, quand
    /// l'émetteur de commandes disparaît, ou sur erreur fatale.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> ConnectionState {
        self.set_state(ConnectionState::Connecting);

        let established = tokio::select! {
            biased;
            command = commands.recv() => {
                debug!(?command, "Déconnexion demandée pendant l'établissement");
                None
            }
            result = self.establish() => Some(result),
        };

        match established {
            None => return self.shutdown().await,
            Some(Err(error)) => return self.fail(error).await,
            Some(Ok(())) => {}
        }

        self.event_loop(&mut commands).await
    }

    /// Acquiert les ressources dans l'ordre : capacité, micro, sortie, canal
    ///
    /// Une capacité absente échoue avant tout périphérique.
    async fn establish(&mut self) -> SessionResult<()> {
        self.backend.check_capability()?;

        let capture = self.backend.open_input(&self.audio_config)?;
        self.pipeline = Some(CapturePipeline::new(capture, Arc::clone(&self.codec)));

        let output = self
            .backend
            .open_output(&self.audio_config, self.completions_tx.clone())
            .map_err(|e| SessionError::DeviceOther(e.to_string()))?;
        self.scheduler = Some(PlaybackScheduler::new(output));

        info!(
            connector = %self.connector.describe(),
            language = %self.setup.language_code,
            "Ouverture du canal"
        );
        let channel = self.connector.open(self.setup.clone()).await?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn event_loop(&mut self, commands: &mut mpsc::Receiver<SessionCommand>) -> ConnectionState {
        loop {
            let capturing = self.state == ConnectionState::Connected;
            let step = match (self.channel.as_mut(), self.pipeline.as_mut()) {
                (Some(channel), Some(pipeline)) => tokio::select! {
                    biased;
                    command = commands.recv() => Step::Command(command),
                    event = channel.next_event() => Step::Channel(event),
                    Some(id) = self.completions.recv() => Step::Completed(id),
                    frame = pipeline.next_encoded(), if capturing => Step::Frame(frame),
                },
                // Ressources déjà libérées : plus rien à écouter
                _ => Step::Channel(None),
            };

            match step {
                Step::Command(command) => {
                    debug!(?command, "Fin de session demandée");
                    return self.shutdown().await;
                }
                Step::Channel(None) => return self.fail(SessionError::SessionClosed(None)).await,
                Step::Channel(Some(event)) => {
                    if let Err(error) = self.on_channel_event(event).await {
                        return self.fail(error).await;
                    }
                }
                Step::Completed(id) => self.on_unit_completed(id),
                Step::Frame(Ok(frame)) => self.forward_frame(frame),
                Step::Frame(Err(e)) => return self.fail(e.into()).await,
            }
        }
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) -> SessionResult<()> {
        match event {
            ChannelEvent::Open => self.on_open().await,
            ChannelEvent::Message(message) => {
                self.on_message(message);
                Ok(())
            }
            ChannelEvent::Close { code, reason } => {
                info!(?code, reason = %reason, "Canal fermé par le service");
                Err(SessionError::from_close(code, &reason))
            }
            ChannelEvent::Error(e) => match SessionError::from(e) {
                error if error.is_fatal() => Err(error),
                error => {
                    warn!("{}", error);
                    Ok(())
                }
            },
        }
    }

    async fn on_open(&mut self) -> SessionResult<()> {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ouverture en double ignorée");
            return Ok(());
        }
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.start().await?;
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Interruption d'abord, puis transcriptions, puis audio
    fn on_message(&mut self, message: ServerMessage) {
        if message.interrupted {
            self.interrupt();
        }
        for fragment in &message.transcripts {
            self.observer.on_transcript(&fragment.text, fragment.is_user());
        }
        for audio in message.audio {
            self.play(audio);
        }
        if message.turn_complete {
            debug!("Fin du tour de l'assistant");
        }
    }

    fn interrupt(&mut self) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let stopped = scheduler.interrupt();
        self.stats.interruptions += 1;
        info!(stopped, "✋ Interruption, lecture arrêtée");
    }

    /// Décode et planifie un chunk ; un chunk illisible est abandonné seul
    fn play(&mut self, audio: InlineAudio) {
        let sequence = self.chunk_sequence;
        self.chunk_sequence += 1;

        let chunk = match self.codec.decode(&audio.data, audio.mime_type.as_deref(), sequence) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(sequence, "Chunk abandonné: {}", SessionError::from(e));
                self.stats.chunks_dropped += 1;
                return;
            }
        };

        let Some(scheduler) = self.scheduler.as_mut() else {
            debug!(sequence, "Chunk reçu sans sortie audio, ignoré");
            return;
        };
        match scheduler.schedule(&chunk) {
            Ok(Some(_)) => {
                self.stats.chunks_scheduled += 1;
                let snapshot = self.sampler.sample(scheduler.device());
                self.observer.on_audio_data(&snapshot);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(sequence, error = %e, "Chunk refusé par la sortie audio");
                self.stats.chunks_dropped += 1;
            }
        }
    }

    fn on_unit_completed(&mut self, id: UnitId) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            if scheduler.on_unit_completed(id) {
                self.stats.units_completed += 1;
            }
        }
    }

    /// Envoi non bloquant ; une frame refusée est perdue
    fn forward_frame(&mut self, frame: EncodedFrame) {
        let (Some(pipeline), Some(channel)) = (self.pipeline.as_mut(), self.channel.as_mut()) else {
            return;
        };
        match pipeline.forward(frame, channel) {
            ForwardOutcome::Sent => {}
            ForwardOutcome::Dropped(FrameSendError::Saturated) => {
                debug!("Canal saturé, frame micro abandonnée");
            }
            ForwardOutcome::Dropped(FrameSendError::Closed) if !self.send_failure_reported => {
                warn!("Canal fermé pendant la session, frames micro abandonnées");
                self.send_failure_reported = true;
            }
            ForwardOutcome::Dropped(FrameSendError::Closed) => {
                debug!("Frame micro abandonnée, canal fermé");
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Transition refusée");
            return;
        }
        debug!(from = %self.state, to = %next, "Changement d'état");
        self.state = next;
        self.observer.on_state_change(next);
    }

    async fn fail(&mut self, error: SessionError) -> ConnectionState {
        error!(error = %error, "❌ Session en erreur");
        self.set_state(ConnectionState::Error);
        self.observer.on_error(&error.user_message());
        self.release().await;
        self.state
    }

    async fn shutdown(&mut self) -> ConnectionState {
        self.release().await;
        self.set_state(ConnectionState::Disconnected);
        self.state
    }

    /// Libère micro, sortie, unités en cours et canal ; idempotent
    ///
    /// Chaque étape est indépendante, aucune erreur n'est propagée.
    async fn release(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.stop().await {
                warn!(error = %e, "Arrêt du micro en erreur");
            }
            self.stats.frames_sent = pipeline.frames_sent();
            self.stats.frames_dropped = pipeline.frames_dropped();
        }
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }

        info!(
            frames_sent = self.stats.frames_sent,
            frames_dropped = self.stats.frames_dropped,
            drop_pct = format!("{:.1}", self.stats.drop_percentage()),
            chunks_scheduled = self.stats.chunks_scheduled,
            chunks_dropped = self.stats.chunks_dropped,
            units_completed = self.stats.units_completed,
            interruptions = self.stats.interruptions,
            "Ressources de session libérées"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventForwarder, SessionNotification};
    use audio::{CaptureFeed, CaptureFrame, SimulatedBackend};
    use network::{ChannelConfig, SimulatedConnector, SimulatedRemote};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Running {
        commands: mpsc::Sender<SessionCommand>,
        task: JoinHandle<ConnectionState>,
        backend: Arc<SimulatedBackend>,
        feed: CaptureFeed,
        remote: SimulatedRemote,
        notifications: mpsc::UnboundedReceiver<SessionNotification>,
    }

    fn spawn_session() -> Running {
        let mut config = AssistantConfig::with_api_key("test");
        config.channel = ChannelConfig::test_config();

        let (backend, feed) = SimulatedBackend::new();
        let backend = Arc::new(backend);
        let (connector, remote) = SimulatedConnector::pair(&config.channel);
        let (forwarder, notifications) = EventForwarder::new();

        let session = Session::new(
            &config,
            &LanguageVariant::default(),
            backend.clone(),
            Arc::new(connector),
            Arc::new(forwarder),
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let (commands, receiver) = mpsc::channel(1);
        let task = tokio::spawn(session.run(receiver));
        Running { commands, task, backend, feed, remote, notifications }
    }

    async fn next_state(notifications: &mut mpsc::UnboundedReceiver<SessionNotification>) -> ConnectionState {
        loop {
            let notification = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
                .await
                .expect("notification attendue")
                .expect("observateur fermé");
            if let SessionNotification::StateChanged(state) = notification {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_frames_flow_only_after_open() {
        let mut running = spawn_session();
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Connecting);

        // Capté avant l'ouverture : jamais transmis
        assert!(running.feed.push(CaptureFrame::new(vec![0.0; 16], 16_000, 0)).await);

        assert!(running.remote.open().await);
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Connected);
        assert!(running.feed.is_recording());
        assert!(running.remote.try_recv_frame().is_none());

        assert!(running.feed.push(CaptureFrame::new(vec![0.0; 16], 16_000, 1)).await);
        let frame = tokio::time::timeout(Duration::from_secs(2), running.remote.recv_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.sequence_number, 1);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");

        running.commands.send(SessionCommand::Disconnect).await.unwrap();
        assert_eq!(running.task.await.unwrap(), ConnectionState::Disconnected);
        assert!(running.feed.is_released());
        assert!(running.remote.is_released());
        assert!(running.backend.playback_probe().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        let mut running = spawn_session();
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Connecting);

        while running.remote.open_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Le service n'a jamais confirmé l'ouverture
        drop(running.commands);
        assert_eq!(running.task.await.unwrap(), ConnectionState::Disconnected);
        assert!(running.feed.is_released());
        assert!(running.remote.is_released());
    }

    #[tokio::test]
    async fn test_remote_close_is_an_error() {
        let mut running = spawn_session();
        assert!(running.remote.open().await);
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Connected);

        assert!(running.remote.close(Some(1000), "").await);
        assert_eq!(next_state(&mut running.notifications).await, ConnectionState::Error);
        assert_eq!(
            running.notifications.recv().await,
            Some(SessionNotification::Error(SessionError::SessionClosed(None).user_message()))
        );
        assert_eq!(running.task.await.unwrap(), ConnectionState::Error);
        assert!(running.feed.is_released());
    }
}
