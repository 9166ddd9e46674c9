use ai_relay::client::{ChatSession, HttpTransport, SendOutcome};
use ai_relay::server::{AppState, RelayServer};
use ai_relay::{AiService, Config, ConfigLoader, HealthReport, ResponseEnvelope};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ai-relay")]
#[command(
    version,
    about = "Resilient chat relay for LLM providers with retry, circuit breaking and fallback"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, help = "Config file (replaces global/project lookup)")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP endpoint
    Serve {
        #[arg(long, short, help = "Bind address (overrides server.bind)")]
        bind: Option<String>,
    },

    /// Send one message through the provider chain
    Ask {
        #[arg(help = "Message to send")]
        message: String,
        #[arg(long, help = "Print the raw response envelope")]
        json: bool,
        #[arg(long, help = "Relay base URL; runs in-process when omitted")]
        remote: Option<String>,
    },

    /// Show provider configuration and circuit state
    Health {
        #[arg(long, help = "Print the raw health report")]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(long, help = "Render as JSON instead of TOML")]
        json: bool,
    },
    /// Show configuration file paths
    Path,
    /// Initialize project configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n{}", style("━━━ PANIC ━━━").red().bold());
        eprintln!("{}", style("ai-relay encountered an unexpected error:").red());
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "{}",
                style(format!(
                    "Location: {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ))
                .dim()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            let config = load_config(cli.config.as_ref())?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState::from_config(&config)?;
            if !state.service.has_providers() {
                tracing::warn!("No provider credentials found; every request will fail with CONFIGURATION");
            }
            let server = RelayServer::bind(state, &bind)?;

            let rt = Runtime::new()?;
            rt.block_on(server.run())?;
        }
        Commands::Ask {
            message,
            json,
            remote,
        } => {
            let rt = Runtime::new()?;
            let envelope = match remote {
                Some(base_url) => rt.block_on(ask_remote(&base_url, &message))?,
                None => {
                    let config = load_config(cli.config.as_ref())?;
                    let service = AiService::from_config(&config)?;
                    rt.block_on(ask_local(&service, &message))
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                print_envelope(&envelope);
            }
            if !envelope.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Health { json } => {
            let config = load_config(cli.config.as_ref())?;
            let report = AiService::from_config(&config)?.health();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health(&report);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = load_config(cli.config.as_ref())?;
                println!("{}", ConfigLoader::render(&config, json)?);
            }
            ConfigAction::Path => {
                ConfigLoader::show_path();
            }
            ConfigAction::Init { force } => {
                let root = std::env::current_dir()?;
                let path = ConfigLoader::init_project(&root, force)?;
                println!("{} Created {}", style("✓").green(), path.display());
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(config)
}

async fn ask_local(service: &AiService, message: &str) -> ResponseEnvelope {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let envelope = service.generate_response(message, None, None, &cancel).await;
    ctrl_c.abort();
    envelope
}

async fn ask_remote(base_url: &str, message: &str) -> anyhow::Result<ResponseEnvelope> {
    let session = ChatSession::new(HttpTransport::new(base_url)?);
    let envelope = match session.send_message(message, None).await {
        SendOutcome::Success(envelope) => ResponseEnvelope::Success(envelope),
        SendOutcome::Failed(error) => ResponseEnvelope::Failure(ai_relay::ai::FailureEnvelope {
            success: false,
            error: error.user_message().to_string(),
            kind: error.kind,
            correlation_id: error.correlation_id,
        }),
        SendOutcome::Superseded => anyhow::bail!("request was superseded"),
    };
    Ok(envelope)
}

fn print_envelope(envelope: &ResponseEnvelope) {
    match envelope {
        ResponseEnvelope::Success(success) => {
            println!("{}", success.response);
            println!(
                "\n{}",
                style(format!(
                    "{} · {} · {}",
                    success.provider, success.model, success.correlation_id
                ))
                .dim()
            );
        }
        ResponseEnvelope::Failure(failure) => {
            eprintln!(
                "{} {} {}",
                style("✗").red(),
                failure.error,
                style(format!("[{}]", failure.kind)).yellow()
            );
            eprintln!("{}", style(failure.correlation_id.as_str()).dim());
        }
    }
}

fn print_health(report: &HealthReport) {
    println!("\n{}", style("Provider health").bold().underlined());
    println!("  Status: {}", report.status);
    println!();

    for (name, provider) in &report.providers {
        let marker = if !provider.configured {
            style("✗").red()
        } else if provider.status == "configured" {
            style("✓").green()
        } else {
            style("⚠").yellow()
        };
        let circuit = provider.circuit.as_deref().unwrap_or("-");
        println!(
            "  {} {:<8} {:<16} {}",
            marker,
            name,
            provider.status,
            style(circuit).dim()
        );
    }
}
