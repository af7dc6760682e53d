//! Chat server CLI and REST API entry point.
//!
//! Binary name: `chatserver`
//!
//! Parses CLI arguments, loads configuration, initializes the database and
//! chat service, then dispatches to a one-shot command or starts the REST
//! API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use chatserver_infra::config::{load_config, resolve_data_dir};
use chatserver_observe::tracing_setup::{init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));
    let mut config = load_config(&config_path).await;

    if let Some(url) = &cli.database_url {
        config.database_url = Some(url.clone());
    }
    match cli.verbose {
        0 => {}
        1 => {
            config.log.filter =
                "info,chatserver=debug,chatserver_core=debug,chatserver_infra=debug".to_string()
        }
        _ => config.log.filter = "trace".to_string(),
    }
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.http.host = host.clone();
        }
        if let Some(port) = port {
            config.http.port = *port;
        }
    }

    init_tracing(&config.log, config.otel).map_err(|e| anyhow::anyhow!(e))?;

    let state = AppState::init(config, &data_dir).await?;
    let result = run(cli, state.clone()).await;

    state.db_pool.close().await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { .. } => {
            let addr = state.config.http.address();
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Chat server listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());
            tracing::info!(%addr, "REST API started");

            let shutdown = state.shutdown.clone();
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(shutdown))
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::CreateChat { usernames } => {
            cli::chat::create_chat(&state, usernames, cli.json).await?;
        }

        Commands::Send { from, text } => {
            cli::chat::send(&state, from, text, cli.json).await?;
        }

        Commands::DeleteChat { id } => {
            cli::chat::delete_chat(&state, id, cli.json).await?;
        }

        Commands::Messages { limit } => {
            cli::chat::messages(&state, limit, cli.json).await?;
        }

        Commands::Members { id } => {
            cli::chat::members(&state, id, cli.json).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, cancelling `shutdown` so in-flight calls
/// abort and roll back instead of holding the server open.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
