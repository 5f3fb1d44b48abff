//! Point d'entrée de l'application : connect / disconnect
//!
//! Le contrôleur garantit qu'une seule session existe à la fois. Un
//! `connect` pendant qu'une session est active la ferme (bascule), un
//! `disconnect` est toujours sans danger.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::{Session, SessionCommand};
use crate::{AssistantConfig, ConfigError, ConnectionState, LanguageVariant, SessionObserver};
use audio::AudioBackend;
use network::ChannelConnector;

/// Effet d'un appel à `connect`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Une nouvelle session démarre
    Started,
    /// Une session était active, elle a été fermée
    Stopped,
}

struct ActiveSession {
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<ConnectionState>,
}

/// Contrôleur de sessions
pub struct SessionController {
    config: AssistantConfig,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn ChannelConnector>,
    observer: Arc<dyn SessionObserver>,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Crée le contrôleur ; échoue si la configuration est incomplète
    ///
    /// Sans clé, aucune session ne pourra jamais être créée.
    pub fn new(
        config: AssistantConfig,
        backend: Arc<dyn AudioBackend>,
        connector: Arc<dyn ChannelConnector>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(backend = %backend.backend_name(), connector = %connector.describe(), "Contrôleur prêt");
        Ok(Self { config, backend, connector, observer, active: None })
    }

    /// Démarre une session, ou ferme celle qui est active
    pub async fn connect(&mut self, language: LanguageVariant) -> ConnectOutcome {
        if self.is_active() {
            info!("Session active, connect vaut déconnexion");
            self.disconnect().await;
            return ConnectOutcome::Stopped;
        }

        // Une session terminée en erreur est libérée avant la suivante
        self.disconnect().await;

        info!(language = %language, "Nouvelle session");
        let session = Session::new(
            &self.config,
            &language,
            Arc::clone(&self.backend),
            Arc::clone(&self.connector),
            Arc::clone(&self.observer),
        );
        let (commands, receiver) = mpsc::channel(1);
        let task = tokio::spawn(session.run(receiver));
        self.active = Some(ActiveSession { commands, task });
        ConnectOutcome::Started
    }

    /// Ferme la session courante ; sans effet s'il n'y en a pas
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let _ = active.commands.try_send(SessionCommand::Disconnect);
        drop(active.commands);

        let final_state = match active.task.await {
            Ok(state) => state,
            Err(e) => {
                error!("Tâche de session interrompue: {}", e);
                ConnectionState::Error
            }
        };
        // Une session finie en erreur passe à Disconnected une fois libérée
        if final_state != ConnectionState::Disconnected {
            self.observer.on_state_change(ConnectionState::Disconnected);
        }
        debug!(final_state = %final_state, "Session terminée");
    }

    /// Vrai si une session est en cours (connexion ou connectée)
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|active| !active.task.is_finished())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}
