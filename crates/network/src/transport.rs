//! Transports vers le service vocal
//!
//! Ce module fournit deux implémentations de `ChannelConnector` :
//! - GeminiLiveConnector : WebSocket TLS vers le service réel
//! - SimulatedConnector : service simulé pour les tests, piloté par un `SimulatedRemote`

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::protocol::{IncomingFrame, encode_realtime_input, encode_setup, parse_server_frame};
use crate::utils::redact_key;
use crate::{
    ChannelConfig, ChannelConnector, ChannelEvent, NetworkError, NetworkResult, OutboundMessage,
    ServerMessage, SessionChannel, SessionSetup, TranscriptFragment,
};
use audio::EncodedFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Traduit un message texte du service en événement de canal
///
/// `None` pour les messages sans effet sur la session. Un message illisible
/// est journalisé puis abandonné, il ne touche pas la session.
fn frame_to_event(text: &str) -> Option<ChannelEvent> {
    match parse_server_frame(text) {
        Ok(IncomingFrame::SetupComplete) => Some(ChannelEvent::Open),
        Ok(IncomingFrame::Content(message)) => Some(ChannelEvent::Message(message)),
        Ok(IncomingFrame::GoAway(time_left)) => {
            warn!(time_left = time_left.as_deref().unwrap_or("?"), "Le service annonce la fin de session");
            None
        }
        Ok(IncomingFrame::Ignored) => {
            debug!("Message du service ignoré");
            None
        }
        Err(e) => {
            warn!("Message du service abandonné: {}", e);
            None
        }
    }
}

/// Connecteur WebSocket vers le service Gemini Live
///
/// Une connexion = une session : le message de configuration part dès la
/// fin du handshake, puis une tâche dédiée fait la navette entre la socket
/// et les files du `SessionChannel`.
pub struct GeminiLiveConnector {
    config: ChannelConfig,
    api_key: String,
}

impl GeminiLiveConnector {
    /// Crée un connecteur après validation de la configuration
    pub fn new(config: ChannelConfig, api_key: impl Into<String>) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::ConfigError)?;
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(NetworkError::ConfigError("Clé API vide".to_string()));
        }
        Ok(Self { config, api_key })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn connect(&self) -> NetworkResult<WsStream> {
        // Plusieurs fournisseurs crypto peuvent être compilés ; on fixe ring.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let url = self.config.connection_url(&self.api_key);
        let endpoint = redact_key(&url);
        debug!(endpoint = %endpoint, "Connexion au service");

        let (socket, response) = match timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
            Err(_) => return Err(NetworkError::connection_failed(endpoint, "délai de connexion dépassé")),
            Ok(Err(e)) => {
                // Surcharge et refus gardent leur nature, le reste est "injoignable"
                return Err(match NetworkError::from(e) {
                    kept @ (NetworkError::ServiceUnavailable { .. } | NetworkError::HandshakeRejected { .. }) => kept,
                    other => NetworkError::connection_failed(endpoint, other),
                });
            }
            Ok(Ok(pair)) => pair,
        };
        debug!(status = response.status().as_u16(), "Handshake WebSocket terminé");
        Ok(socket)
    }
}

#[async_trait]
impl ChannelConnector for GeminiLiveConnector {
    async fn open(&self, setup: SessionSetup) -> NetworkResult<SessionChannel> {
        let mut socket = self.connect().await?;

        let setup_message = encode_setup(&setup)?;
        socket.send(Message::Text(setup_message.into())).await?;
        info!(model = %setup.model, language = %setup.language_code, "Configuration de session envoyée");

        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_capacity);
        let (out_tx, out_rx) = mpsc::channel(self.config.outgoing_queue_capacity);
        let worker = tokio::spawn(run_socket(socket, event_tx, out_rx));

        Ok(SessionChannel::new(event_rx, out_tx, Some(worker), self.config.close_grace))
    }

    fn describe(&self) -> String {
        format!("Gemini Live ({})", self.config.model)
    }
}

/// Boucle de la tâche de transport
///
/// Se termine quand la session lâche la file sortante (fermeture propre),
/// quand le service ferme, ou sur erreur de socket.
async fn run_socket(
    socket: WsStream,
    events: mpsc::Sender<ChannelEvent>,
    mut outgoing: mpsc::Receiver<OutboundMessage>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = outgoing.recv() => match outbound {
                Some(OutboundMessage::RealtimeInput(frame)) => {
                    let text = match encode_realtime_input(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(sequence = frame.sequence_number, "Frame non sérialisable: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = events.send(ChannelEvent::Error(e.into())).await;
                        break;
                    }
                }
                None => {
                    debug!("File sortante fermée, envoi de la fermeture");
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = stream.next() => {
                let event = match incoming {
                    None => Some(ChannelEvent::Close { code: None, reason: String::new() }),
                    Some(Err(e)) => Some(ChannelEvent::Error(e.into())),
                    Some(Ok(Message::Text(text))) => frame_to_event(&text),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => frame_to_event(text),
                        Err(_) => {
                            warn!(bytes = data.len(), "Message binaire non UTF-8 ignoré");
                            None
                        }
                    },
                    Some(Ok(Message::Close(frame))) => Some(match frame {
                        Some(frame) => ChannelEvent::Close {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.to_string(),
                        },
                        None => ChannelEvent::Close { code: None, reason: String::new() },
                    }),
                    Some(Ok(_)) => None,
                };

                let Some(event) = event else { continue };
                let terminal = matches!(event, ChannelEvent::Close { .. })
                    || matches!(&event, ChannelEvent::Error(e) if !e.is_local_to_message());
                if events.send(event).await.is_err() || terminal {
                    break;
                }
            }
        }
    }
    debug!("Tâche de transport terminée");
}

/// État partagé entre le connecteur simulé et son pilote
#[derive(Default)]
struct SimulatedShared {
    opens: AtomicUsize,
    last_setup: Mutex<Option<SessionSetup>>,
}

/// Connecteur simulé pour les tests
///
/// Le premier `open` réussit (ou échoue avec l'erreur programmée) ; le
/// service est ensuite piloté depuis le `SimulatedRemote`.
pub struct SimulatedConnector {
    link: Mutex<Option<(mpsc::Receiver<ChannelEvent>, mpsc::Sender<OutboundMessage>)>>,
    failure: Mutex<Option<NetworkError>>,
    shared: Arc<SimulatedShared>,
    close_grace: Duration,
}

impl SimulatedConnector {
    /// Crée un connecteur et le pilote du service simulé
    pub fn pair(config: &ChannelConfig) -> (Self, SimulatedRemote) {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
        let (out_tx, out_rx) = mpsc::channel(config.outgoing_queue_capacity);
        let shared = Arc::new(SimulatedShared::default());

        let connector = Self {
            link: Mutex::new(Some((event_rx, out_tx))),
            failure: Mutex::new(None),
            shared: shared.clone(),
            close_grace: config.close_grace,
        };
        let remote = SimulatedRemote { events: event_tx, outgoing: out_rx, shared };
        (connector, remote)
    }

    /// Connecteur dont l'ouverture échoue
    pub fn failing(error: NetworkError) -> Self {
        Self {
            link: Mutex::new(None),
            failure: Mutex::new(Some(error)),
            shared: Arc::new(SimulatedShared::default()),
            close_grace: Duration::from_millis(10),
        }
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelConnector for SimulatedConnector {
    async fn open(&self, setup: SessionSetup) -> NetworkResult<SessionChannel> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_setup.lock().await = Some(setup);

        if let Some(error) = self.failure.lock().await.take() {
            return Err(error);
        }
        let (events, outgoing) = self
            .link
            .lock()
            .await
            .take()
            .ok_or_else(|| NetworkError::connection_failed("simulé", "connecteur déjà utilisé"))?;

        Ok(SessionChannel::new(events, outgoing, None, self.close_grace))
    }

    fn describe(&self) -> String {
        "Service simulé".to_string()
    }
}

/// Pilote du service simulé
///
/// Chaque méthode d'envoi retourne `false` si la session a déjà fermé le canal.
pub struct SimulatedRemote {
    events: mpsc::Sender<ChannelEvent>,
    outgoing: mpsc::Receiver<OutboundMessage>,
    shared: Arc<SimulatedShared>,
}

impl SimulatedRemote {
    async fn emit(&self, event: ChannelEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Accepte la configuration de session
    pub async fn open(&self) -> bool {
        self.emit(ChannelEvent::Open).await
    }

    pub async fn message(&self, message: ServerMessage) -> bool {
        self.emit(ChannelEvent::Message(message)).await
    }

    /// Envoie un bloc audio (PCM16 base64)
    pub async fn audio(&self, data: impl Into<String>, mime_type: Option<&str>) -> bool {
        let message = ServerMessage {
            audio: vec![crate::InlineAudio {
                mime_type: mime_type.map(str::to_string),
                data: data.into(),
            }],
            ..Default::default()
        };
        self.message(message).await
    }

    /// Signale que l'utilisateur a coupé la parole à l'assistant
    pub async fn interrupt(&self) -> bool {
        self.message(ServerMessage { interrupted: true, ..Default::default() }).await
    }

    pub async fn transcript(&self, fragment: TranscriptFragment) -> bool {
        self.message(ServerMessage { transcripts: vec![fragment], ..Default::default() }).await
    }

    pub async fn turn_complete(&self) -> bool {
        self.message(ServerMessage { turn_complete: true, ..Default::default() }).await
    }

    /// Envoie un message brut, interprété comme par le transport réel
    pub async fn raw(&self, text: &str) -> bool {
        match frame_to_event(text) {
            Some(event) => self.emit(event).await,
            None => !self.events.is_closed(),
        }
    }

    /// Ferme la session côté service
    pub async fn close(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.emit(ChannelEvent::Close { code, reason: reason.into() }).await
    }

    pub async fn error(&self, error: NetworkError) -> bool {
        self.emit(ChannelEvent::Error(error)).await
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Dernière configuration reçue
    pub async fn last_setup(&self) -> Option<SessionSetup> {
        self.shared.last_setup.lock().await.clone()
    }

    /// Frame micro en attente, sans bloquer
    pub fn try_recv_frame(&mut self) -> Option<EncodedFrame> {
        match self.outgoing.try_recv() {
            Ok(OutboundMessage::RealtimeInput(frame)) => Some(frame),
            Err(_) => None,
        }
    }

    /// Attend la prochaine frame micro ; `None` quand la session a fermé
    pub async fn recv_frame(&mut self) -> Option<EncodedFrame> {
        match self.outgoing.recv().await {
            Some(OutboundMessage::RealtimeInput(frame)) => Some(frame),
            None => None,
        }
    }

    /// Vrai quand la session a fermé son canal
    pub fn is_released(&self) -> bool {
        self.events.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> SessionSetup {
        SessionSetup {
            model: "models/test".to_string(),
            language_code: "fr-FR".to_string(),
            voice_name: "Zephyr".to_string(),
            system_instruction: None,
            input_transcription: true,
            output_transcription: true,
        }
    }

    #[test]
    fn test_gemini_connector_rejects_bad_config() {
        let config = ChannelConfig { endpoint: "http://exemple".to_string(), ..Default::default() };
        assert!(matches!(GeminiLiveConnector::new(config, "clé"), Err(NetworkError::ConfigError(_))));
        assert!(GeminiLiveConnector::new(ChannelConfig::default(), "  ").is_err());

        let connector = assert_ok!(GeminiLiveConnector::new(ChannelConfig::default(), "secret"));
        assert!(!connector.describe().contains("secret"));
    }

    #[tokio::test]
    async fn test_gemini_connector_unreachable() {
        let config = ChannelConfig {
            endpoint: "ws://127.0.0.1:1/ws".to_string(),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let connector = GeminiLiveConnector::new(config, "secret").unwrap();
        let error = assert_err!(connector.open(setup()).await);
        assert!(error.is_transport_failure());
        assert!(!error.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_simulated_open_once() {
        let (connector, remote) = SimulatedConnector::pair(&ChannelConfig::test_config());

        let _channel = assert_ok!(connector.open(setup()).await);
        assert_err!(connector.open(setup()).await);
        assert_eq!(remote.open_count(), 2);
        assert_eq!(remote.last_setup().await.unwrap().language_code, "fr-FR");
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let connector = SimulatedConnector::failing(NetworkError::service_unavailable("quota"));
        let error = assert_err!(connector.open(setup()).await);
        assert!(error.is_overload());
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_round_trip() {
        let (connector, mut remote) = SimulatedConnector::pair(&ChannelConfig::test_config());
        let mut channel = connector.open(setup()).await.unwrap();

        assert!(remote.open().await);
        assert!(matches!(channel.next_event().await, Some(ChannelEvent::Open)));

        assert!(remote.raw(r#"{"serverContent":{"interrupted":true}}"#).await);
        match channel.next_event().await {
            Some(ChannelEvent::Message(message)) => assert!(message.interrupted),
            other => panic!("message attendu, reçu {:?}", other),
        }

        // Un message illisible est abandonné sans événement
        assert!(remote.raw("pas du json").await);
        assert!(remote.raw(r#"{"serverContent":{"turnComplete":true}}"#).await);
        match channel.next_event().await {
            Some(ChannelEvent::Message(message)) => assert!(message.turn_complete),
            other => panic!("fin de tour attendue, reçu {:?}", other),
        }

        let frame = EncodedFrame {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
            sequence_number: 7,
            sample_count: 2,
        };
        assert_ok!(channel.send_realtime_input(frame));
        assert_eq!(remote.recv_frame().await.unwrap().sequence_number, 7);
        assert!(remote.try_recv_frame().is_none());

        channel.close().await;
        assert!(remote.is_released());
        assert!(!remote.open().await);
        assert!(remote.recv_frame().await.is_none());
    }
}
