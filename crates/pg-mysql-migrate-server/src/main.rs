//! pg-mysql-migrate-server - HTTP frontend for heterogeneous table migration.

use clap::Parser;
use pg_mysql_migrate_server::app;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pg-mysql-migrate-server")]
#[command(about = "HTTP frontend for PostgreSQL/MySQL table migration")]
#[command(version)]
struct Cli {
    /// Address to bind the HTTP listener to
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Override the per-invocation migration batch cap
    #[arg(long)]
    batch_cap: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let state = app::AppState::new(cli.batch_cap);
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolve on SIGINT or SIGTERM so in-flight requests drain before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
