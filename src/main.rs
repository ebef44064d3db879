use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tutor_stream::{
    cli::{execute_command, Cli, Commands},
    completion::CompletionClient,
    config::{Config, LogFormat},
    orchestrator::{ChannelNotifier, Notifier},
    server::{AppState, Outbound, RpcServer, StdioNotifier},
    storage::SqliteStorage,
    turns::{TurnController, TurnCore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Tutor stream starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize completion client
    let client = match CompletionClient::new(&config.completion, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.completion.base_url, "Completion client initialized");
            Arc::new(c)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize completion client");
            return Err(e.into());
        }
    };

    let build_controller = |notifier: Arc<dyn Notifier>| {
        let core = TurnCore::new(client.clone(), storage.clone(), notifier);
        TurnController::new(core, config.models.clone(), config.request.idle_timeout())
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let (outbound, outbound_rx) = Outbound::channel();
            let controller = build_controller(Arc::new(StdioNotifier::new(outbound.clone())));
            let state = Arc::new(AppState::new(config.clone(), controller));
            let server = RpcServer::new(state, outbound);

            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run(outbound_rx).await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
        }
        command => {
            let (notifier, events) = ChannelNotifier::new();
            let controller = build_controller(Arc::new(notifier));
            let result = execute_command(command, &controller, events).await;

            if result.exit_code == 0 || result.exit_code == 2 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            if result.exit_code != 0 {
                std::process::exit(result.exit_code);
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
