use std::path::PathBuf;

use applyx::{AppError, ResponderSnafu, Settings, SettingsSnafu, Terminal};
use applyx_chat::{Composer, Session};
use applyx_llm::{ResponderKind, create_responder};
use clap::Parser;
use snafu::ResultExt;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "applyx", version, about = "Chat with a job-application agent from the terminal")]
struct Cli {
    /// Settings file, defaults to `<config dir>/applyx/settings.json`.
    #[arg(long, env = "APPLYX_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `responder.kind` from the settings.
    #[arg(long, value_name = "KIND")]
    responder: Option<ResponderKind>,

    /// Writes the effective settings to the settings file and exits.
    #[arg(long)]
    init_config: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Settings::default_config_path);
    let mut settings = Settings::load(&config_path);
    if let Some(kind) = cli.responder {
        settings.responder.kind = kind;
    }
    tracing::debug!(path = ?config_path, kind = %settings.responder.kind, "settings loaded");

    if cli.init_config {
        settings.save(&config_path).context(SettingsSnafu {
            stage: "init-config",
        })?;
        println!("wrote {}", config_path.display());
        return Ok(());
    }

    let responder = match create_responder(settings.responder.to_responder_config()) {
        Ok(responder) => responder,
        Err(error) => {
            tracing::error!(kind = %settings.responder.kind, error = %error, "failed to build responder");
            return Err(error).context(ResponderSnafu {
                stage: "create-responder",
            });
        }
    };

    let composer = Composer::with_policy(settings.attachment_policy());
    let session = Session::new(responder);
    let mut terminal = Terminal::new(composer, session, tokio::io::stdout());
    terminal.run(BufReader::new(tokio::io::stdin())).await
}
