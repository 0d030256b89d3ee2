mod archive;
mod breadcrumb;
mod classify;
mod config;
mod error;
mod handlers;
mod listing;
mod paths;
mod render;
mod sorting;
mod token;
mod trash;
mod unique;

use std::{
    fs::OpenOptions,
    path::Path,
    sync::{Arc, Mutex},
};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    config::{Args, Settings},
    handlers::AppState,
};

const LOG_FILE: &str = "netdisk.log";

/// Console output plus an append-only copy under the log directory.
fn init_tracing(log_dir: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netdisk=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

// --- Main Application ---
#[tokio::main]
async fn main() {
    let args = Args::parse();

    // The log directory comes out of this step, so failures here go to stderr only.
    let settings = match Settings::prepare(args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&settings.log_dir) {
        eprintln!(
            "Error: Failed to open log file in '{}': {}",
            settings.log_dir.display(),
            e
        );
        std::process::exit(1);
    }

    let classifier = match settings.load_classifier() {
        Ok(classifier) => classifier,
        Err(e) => {
            error!("{}. Exiting.", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Serving files from: {}", settings.root_dir.display());
    info!("Archives in: {}", settings.archive_dir.display());
    info!(
        "Deleted items: {:?} (trash: {})",
        settings.delete_policy,
        settings.trash_dir.display()
    );
    if settings.admin_token.is_none() {
        warn!("No admin token configured, deletes are open to every client");
    }

    let bind_addr = settings.bind_addr;
    let app = handlers::router(Arc::new(AppState::new(settings, classifier)));

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {}: {}", bind_addr, e);
            eprintln!("Error: Failed to bind to address {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on: {}", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
