//! `quill-chrome` - Chrome bridge command line entry
//!
//! `host` is what the browser launches through the installed wrapper script;
//! `serve` is what the agent spawns as its MCP tool server. Both log to
//! stderr only, because stdout is the wire in either mode.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use quill_chrome_bridge::catalog::ToolCatalog;
use quill_chrome_bridge::config::{self, BridgeSettings};
use quill_chrome_bridge::mcp_endpoint::McpEndpoint;
use quill_chrome_bridge::native_host;
use quill_chrome_bridge::relay::client::RelayClient;
use quill_chrome_bridge::service::ToolService;

#[derive(Parser)]
#[command(name = "quill-chrome", about = "Chrome extension bridge for Quill", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the native messaging host (launched by the browser)
    Host,
    /// Run the MCP tool endpoint over stdio (launched by the agent)
    Serve,
    /// Install the native host manifest and wrapper script
    Install {
        /// Command the wrapper script should exec; defaults to this binary
        #[arg(long)]
        command: Option<String>,
    },
    /// Remove the native host manifest and wrapper script
    Uninstall,
    /// Report installation and configuration state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep the non-blocking writer alive for the process lifetime.
    let _log_guard = init_tracing(matches!(&cli.command, Commands::Host));

    match cli.command {
        Commands::Host => run_host().await,
        Commands::Serve => run_serve().await,
        Commands::Install { command } => run_install(command).await,
        Commands::Uninstall => run_uninstall().await,
        Commands::Status => run_status().await,
    }
}

fn init_tracing(log_to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if log_to_file {
        let log_dir = config::config_dir();
        let _ = std::fs::create_dir_all(&log_dir);
        let appender = tracing_appender::rolling::never(log_dir, "chrome-bridge-host.log");
        let (file_writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        None
    }
}

#[cfg(unix)]
async fn run_host() -> anyhow::Result<()> {
    use quill_chrome_bridge::events::{BridgeEvent, EventBus};
    use quill_chrome_bridge::relay::server::{RelayServer, ServerConfig};

    let settings = BridgeSettings::load_or_default(&config::settings_path())
        .context("failed to load bridge settings")?;

    let events = Arc::new(EventBus::new());
    for event in [
        BridgeEvent::ClientConnected,
        BridgeEvent::ClientDisconnected,
        BridgeEvent::Bridging,
        BridgeEvent::Draining,
    ] {
        events.subscribe(event, |event| {
            tracing::info!("Bridge event: {event}");
            Ok(())
        });
    }

    let server = RelayServer::bind(ServerConfig::from_settings(&settings))
        .context("failed to start the bridge socket")?
        .with_events(events);

    server
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("relay server failed")?;
    Ok(())
}

#[cfg(not(unix))]
async fn run_host() -> anyhow::Result<()> {
    anyhow::bail!("the native messaging host currently supports Unix platforms only")
}

async fn run_serve() -> anyhow::Result<()> {
    let settings = BridgeSettings::load_or_default(&config::settings_path())
        .context("failed to load bridge settings")?;
    if !settings.is_enabled(None) {
        tracing::warn!(
            "Chrome bridge is disabled in settings; serving anyway because it was requested explicitly"
        );
    }

    let catalog = match &settings.catalog_path {
        Some(path) => ToolCatalog::from_file(path)
            .with_context(|| format!("failed to load tool catalog from {}", path.display()))?,
        None => ToolCatalog::builtin(),
    };

    let client = Arc::new(RelayClient::from_settings(&settings));
    // A failed first connect is not fatal: invoke retries when called.
    if let Err(e) = client.connect().await {
        tracing::warn!("Bridge not reachable yet: {e}");
    }

    let service = ToolService::new(catalog, client, settings.call_timeout());
    McpEndpoint::new(service, "Quill in Chrome")
        .run_stdio()
        .await
        .context("MCP endpoint failed")?;
    Ok(())
}

async fn run_install(command: Option<String>) -> anyhow::Result<()> {
    let command = match command {
        Some(command) => command,
        None => {
            let exe = std::env::current_exe().context("failed to resolve current executable")?;
            format!("{} host", exe.display())
        }
    };

    let result = native_host::setup_native_host(&command)
        .await
        .context("failed to install the native host")?;
    println!("Installed manifest: {}", result.manifest_path.display());
    println!("Wrapper script:     {}", result.wrapper_path.display());

    let settings_path = config::settings_path();
    let mut settings = BridgeSettings::load_or_default(&settings_path)?;
    settings.enabled = true;
    settings.save(&settings_path)?;
    println!("Chrome bridge enabled in {}", settings_path.display());
    Ok(())
}

async fn run_uninstall() -> anyhow::Result<()> {
    native_host::uninstall_native_host()
        .await
        .context("failed to uninstall the native host")?;

    let settings_path = config::settings_path();
    let mut settings = BridgeSettings::load_or_default(&settings_path)?;
    settings.enabled = false;
    settings.save(&settings_path)?;
    println!("Chrome bridge uninstalled and disabled.");
    Ok(())
}

async fn run_status() -> anyhow::Result<()> {
    let settings = BridgeSettings::load_or_default(&config::settings_path())?;
    let socket_path = settings.resolved_socket_path();

    println!("Platform supported: {}", native_host::is_supported());
    println!("Manifest installed: {}", native_host::is_configured().await);
    println!("Enabled:            {}", settings.is_enabled(None));
    println!("Socket path:        {socket_path}");
    #[cfg(unix)]
    println!(
        "Host running:       {}",
        std::path::Path::new(&socket_path).exists()
    );
    Ok(())
}
