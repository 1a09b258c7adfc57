use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use attendant::cli::{self, Cli, Command, ConfigCommand};
use attendant::config::{self, AttendantConfig};
use attendant::ivr::{self, CallRegistry, IvrHandler};
use attendant::logging;
use attendant::mail::{LogMailer, MailSender, NotificationSettings, SesMailer};
use attendant::server::{self, AppState};
use attendant::voice::{RelayClient, VoiceConfig, VoiceError};

const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        None | Some(Command::Start) => run().await,
        Some(Command::Config(ConfigCommand::Show)) => cli::handle_config_show(),
        Some(Command::Config(ConfigCommand::Path)) => {
            cli::handle_config_path();
            Ok(())
        }
        Some(Command::Status { host, port }) => cli::handle_status(&host, port).await,
        Some(Command::Version) => {
            cli::handle_version();
            Ok(())
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config()?;
    logging::init_logging(&config.logging)?;
    config.validate()?;

    let mailer = build_mailer(&config)?;
    let registry = Arc::new(CallRegistry::new(config.ivr.history_limit));
    let handler = Arc::new(IvrHandler::new(
        config.ivr.clone(),
        NotificationSettings::from(&config.mail),
        mailer,
        registry.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_config = config.server.clone();
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        };
        if let Err(e) = server::run_server(&server_config, AppState::new(registry), shutdown).await
        {
            error!(error = %e, "HTTP server failed");
        }
    });

    tokio::select! {
        result = relay_loop(&config.voice, handler, shutdown_rx) => {
            if let Err(e) = result {
                error!(error = %e, "Voice client stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = server.await;
    info!("Attendant stopped");
    Ok(())
}

fn build_mailer(config: &AttendantConfig) -> Result<Arc<dyn MailSender>, Box<dyn std::error::Error>> {
    if config.mail.enabled {
        let mailer = SesMailer::new(&config.mail)?;
        info!(region = %config.mail.region, "Voicemail notifications go through SES");
        Ok(Arc::new(mailer))
    } else {
        warn!("Mail disabled; voicemail notifications will only be logged");
        Ok(Arc::new(LogMailer))
    }
}

/// Keep a RELAY session open, reconnecting with exponential backoff.
/// Returns only on configuration errors or shutdown.
async fn relay_loop(
    config: &VoiceConfig,
    handler: Arc<IvrHandler>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), VoiceError> {
    let mut backoff = RECONNECT_INITIAL;

    while !*shutdown.borrow() {
        match RelayClient::connect(config).await {
            Ok((client, incoming)) => {
                backoff = RECONNECT_INITIAL;
                ivr::serve_calls(incoming, handler.clone()).await;
                drop(client);
                warn!("RELAY session ended");
            }
            Err(e @ VoiceError::ConfigError(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "RELAY connection failed");
            }
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }

    Ok(())
}
