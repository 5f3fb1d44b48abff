// Assistant vocal Voc en terminal
//
// - `voc-assistant run` : conversation vocale avec le service (Entrée = connexion/déconnexion)
// - `voc-assistant devices` : inventaire des périphériques audio

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use audio::{AudioBackend, CpalBackend};
use network::GeminiLiveConnector;
use session::{
    AssistantConfig, ConnectOutcome, ConnectionState, EventForwarder, LanguageVariant, SessionController,
    SessionNotification,
};

const DEFAULT_FILTER: &str = "voc_assistant=info,session=info,audio=info,network=info";
const VERBOSE_FILTER: &str = "voc_assistant=debug,session=debug,audio=debug,network=debug";

#[derive(Parser)]
#[command(author, version, about = "Assistant vocal temps réel Voc")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Logs détaillés (niveau debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lance une conversation vocale
    Run {
        /// Langue de la conversation (fr-FR, en-US...)
        #[arg(short, long, default_value = "fr-FR")]
        language: String,
    },
    /// Liste les périphériques audio
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::Run { language: "fr-FR".to_string() }) {
        Commands::Run { language } => run(&language).await,
        Commands::Devices => show_devices(),
    }
}

/// Initialise les logs ; `RUST_LOG` a priorité sur le filtre par défaut
fn init_tracing(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(language: &str) -> Result<()> {
    let language: LanguageVariant = language.parse()?;
    let config = AssistantConfig::from_env().context("Configuration incomplète (fichier .env ?)")?;
    let connector = GeminiLiveConnector::new(config.channel.clone(), config.api_key.clone())?;
    let (observer, notifications) = EventForwarder::new();

    let mut controller = SessionController::new(
        config,
        Arc::new(CpalBackend::new()),
        Arc::new(connector),
        Arc::new(observer),
    )?;
    let renderer = tokio::spawn(render(notifications));

    println!("🎙️  Assistant vocal Voc ({})", language);
    println!("   Entrée : connexion / déconnexion");
    println!("   q      : quitter");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Ctrl+C reçu");
                break;
            }
            line = lines.next_line() => match line? {
                None => break,
                Some(input) if input.trim().eq_ignore_ascii_case("q") => break,
                Some(_) => match controller.connect(language.clone()).await {
                    ConnectOutcome::Started => info!("Session démarrée"),
                    ConnectOutcome::Stopped => info!("Session arrêtée"),
                },
            },
        }
    }

    controller.disconnect().await;
    drop(controller);
    // Le rendu s'arrête quand plus aucun observateur n'existe
    let _ = renderer.await;
    println!("👋 Au revoir !");
    Ok(())
}

/// Affiche les rappels de session dans le terminal
async fn render(mut notifications: mpsc::UnboundedReceiver<SessionNotification>) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            SessionNotification::StateChanged(state) => {
                let icon = match state {
                    ConnectionState::Disconnected => "⏹️ ",
                    ConnectionState::Connecting => "⏳",
                    ConnectionState::Connected => "🟢",
                    ConnectionState::Error => "❌",
                };
                println!("{} {}", icon, state);
            }
            SessionNotification::Transcript { text, speaker_is_user } => {
                let speaker = if speaker_is_user { "Vous" } else { "Assistant" };
                println!("   {} : {}", speaker, text);
            }
            SessionNotification::Error(message) => println!("⚠️  {}", message),
            SessionNotification::AudioData(snapshot) => {
                debug!(level = format!("{:.2}", snapshot.average_level()), "Niveau de sortie");
            }
        }
    }
}

/// Inventaire des périphériques audio
fn show_devices() -> Result<()> {
    let backend = CpalBackend::new();

    match backend.check_capability() {
        Ok(()) => println!("✅ Capture audio disponible"),
        Err(e) => println!("❌ Capture audio indisponible : {}", e),
    }

    let report = backend.describe_devices()?;
    println!("🔊 Host audio : {}", report.host);
    println!("   Micro par défaut : {}", report.default_input.as_deref().unwrap_or("aucun"));
    println!("   Sortie par défaut : {}", report.default_output.as_deref().unwrap_or("aucune"));

    println!("\n🎤 Entrées ({}) :", report.inputs.len());
    for name in &report.inputs {
        println!("   - {}", name);
    }
    println!("\n🔈 Sorties ({}) :", report.outputs.len());
    for name in &report.outputs {
        println!("   - {}", name);
    }
    Ok(())
}
