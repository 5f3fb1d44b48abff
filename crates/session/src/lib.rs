//! Crate session - Cycle de vie d'une conversation vocale temps réel
//!
//! Ce crate relie le crate `audio` (micro, lecture planifiée, visualisation)
//! au crate `network` (canal vers le service) et expose à l'application une
//! API minimale : `connect`, `disconnect` et quatre rappels.
//!
//! # Architecture
//!
//! - `state` : États de connexion et transitions autorisées
//! - `error` : Taxonomie des erreurs visibles par l'utilisateur
//! - `config` : Clé du service, langue, configuration audio et réseau
//! - `observer` : Rappels vers l'interface
//! - `session` : La session elle-même, une tâche tokio
//! - `controller` : Une seule session à la fois, connect/disconnect
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use session::{AssistantConfig, EventForwarder, SessionController};
//! use audio::CpalBackend;
//! use network::GeminiLiveConnector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AssistantConfig::from_env()?;
//! let connector = GeminiLiveConnector::new(config.channel.clone(), config.api_key.clone())?;
//! let (observer, mut notifications) = EventForwarder::new();
//!
//! let mut controller = SessionController::new(
//!     config,
//!     Arc::new(CpalBackend::new()),
//!     Arc::new(connector),
//!     Arc::new(observer),
//! )?;
//! controller.connect("fr-FR".parse()?).await;
//! while let Some(notification) = notifications.recv().await {
//!     println!("{:?}", notification);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod error;
mod observer;
pub mod session;
mod state;

pub use config::{API_KEY_VARIABLES, AssistantConfig, ConfigError, LanguageVariant};
pub use controller::{ConnectOutcome, SessionController};
pub use error::{SessionError, SessionResult};
pub use observer::{EventForwarder, SessionNotification, SessionObserver};
pub use state::ConnectionState;

/// Version du crate session
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
