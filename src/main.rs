//! twilio-messaging-mcp CLI entry point.
//!
//! Validates the Twilio credentials given as positional arguments, builds
//! the capability registry, optionally starts the status-callback listener,
//! and serves MCP on stdin/stdout until interrupted or stdin closes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use twilio_messaging_mcp::callbacks::CallbackStore;
use twilio_messaging_mcp::capabilities::build_registry;
use twilio_messaging_mcp::carrier::twilio::TwilioClient;
use twilio_messaging_mcp::carrier::MessagingService;
use twilio_messaging_mcp::config::{CarrierConfig, ConfigError, USAGE};
use twilio_messaging_mcp::mcp::{McpServer, ServerInfo};
use twilio_messaging_mcp::{logging, webhook};

/// How long to wait for background tasks after the server stops.
const RUNTIME_SHUTDOWN_TIMEOUT_MS: u64 = 500;

/// Instructions advertised to MCP clients on `initialize`.
const SERVER_INSTRUCTIONS: &str = "Send SMS messages via Twilio with the send-message tool. \
     Delivery status callbacks are readable from the twilio://statuscallback resource.";

/// MCP server for sending SMS messages via the Twilio API.
#[derive(Parser)]
#[command(name = "twilio-messaging-mcp", version, about)]
struct Cli {
    /// Twilio account SID (must start with "AC").
    account_sid: String,
    /// Twilio API key SID.
    api_key: String,
    /// Twilio API key secret.
    api_secret: String,
    /// Sender phone number in E.164 format.
    number: String,

    /// Address for the status-callback HTTP listener (e.g. 127.0.0.1:8081).
    /// Posts are unauthenticated: bind loopback and expose it through a tunnel.
    #[arg(long)]
    callback_listen: Option<SocketAddr>,

    /// Public URL Twilio should post delivery-status callbacks to.
    #[arg(long)]
    callback_url: Option<String>,

    /// Override the Twilio REST API base URL.
    #[arg(long)]
    api_base: Option<String>,

    /// Also write JSON logs (daily rotation) to this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(cli));
    // Stdin reads run on a blocking thread that never returns once the
    // server stops reading; do not wait on it.
    runtime.shutdown_timeout(Duration::from_millis(RUNTIME_SHUTDOWN_TIMEOUT_MS));
    code
}

async fn run(cli: Cli) -> ExitCode {
    let _logging_guard = match cli.log_dir.as_deref() {
        Some(dir) => match logging::init_with_file(dir) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("Error: {e:#}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            logging::init_console();
            None
        }
    };

    match serve(cli).await {
        Ok(()) => {
            info!("TwilioMessagingServer shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "TwilioMessagingServer failed");
            match e.downcast_ref::<ConfigError>() {
                Some(ConfigError::InvalidAccountSid) => {
                    eprintln!("Error: Account SID must start with 'AC'");
                }
                Some(ConfigError::Missing(_)) => eprintln!("{USAGE}"),
                Some(err @ ConfigError::InvalidUrl { .. }) => eprintln!("Error: {err}"),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let mut config = CarrierConfig::new(&cli.account_sid, &cli.api_key, &cli.api_secret, &cli.number)?;
    if let Some(ref base) = cli.api_base {
        config = config.with_api_base(base)?;
    }
    if let Some(ref url) = cli.callback_url {
        config = config.with_status_callback(url)?;
    }
    info!(?config, "configuration loaded");

    let client = TwilioClient::new(&config).context("failed to create Twilio client")?;
    let messaging = Arc::new(MessagingService::new(
        Arc::new(client),
        config.from_number(),
    ));
    let callbacks = CallbackStore::new();

    let registry = build_registry(messaging, callbacks.clone())
        .context("failed to register capabilities")?;

    if let Some(addr) = cli.callback_listen {
        webhook::spawn(addr, callbacks.clone()).await?;
        if config.status_callback().is_none() {
            warn!("callback listener running without --callback-url; Twilio will not post to it");
        }
    }

    let mut server = McpServer::new(Arc::new(registry), ServerInfo::default())
        .with_instructions(SERVER_INSTRUCTIONS);

    server
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await
        .context("MCP transport failed")?;

    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; relying on stdin EOF");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
