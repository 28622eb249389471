use clap::Parser;

use dodo_offline_sync::api::auth;
use dodo_offline_sync::{AppState, ClientProfile, SyncConfig};

/// Headless host for the offline sync subsystem.
///
/// Probes the API, drains the pending queue whenever it comes back online and
/// logs status changes until interrupted.
#[derive(Parser, Debug)]
#[command(name = "dodo-offline-sync")]
struct Args {
    /// Which front end's queue to serve
    #[arg(long, value_enum)]
    profile: Option<ClientProfile>,

    /// API base URL (overrides OFFLINE_SYNC_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Queue database path (overrides OFFLINE_SYNC_DB_PATH)
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    /// Save a bearer token to the keychain for this profile, then continue
    #[arg(long, value_name = "TOKEN")]
    save_token: Option<String>,

    /// Drain once and exit instead of running in the background
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    env_logger::init();
    log::info!("Dodo offline sync starting...");

    let args = Args::parse();

    let mut config = SyncConfig::from_env();
    if let Some(profile) = args.profile {
        config = config.with_profile(profile);
    }
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }
    log::info!(
        "Profile: {}, API: {}, queue: {}",
        config.profile,
        config.api_base_url,
        config.db_path.display()
    );

    if let Some(token) = args.save_token.as_deref() {
        match auth::store_token(config.profile, token) {
            Ok(()) => log::info!("Token saved to keychain for {} profile", config.profile),
            Err(e) => log::error!("Failed to save token: {}", e),
        }
    }

    // Assume the link is up; the first probe settles the real state.
    let state = AppState::new(config, true);
    state.load_token().await;

    let running = state.start();

    if args.once {
        state
            .monitor
            .probe_once(&state.remote, state.config.probe_timeout)
            .await;
        match running.trigger.sync_now().await {
            Ok(report) => log::info!(
                "{:?}: {} synced, {} failed, {} remaining",
                report.strategy,
                report.synced,
                report.failed,
                report.remaining
            ),
            Err(e) => log::error!("Sync failed: {}", e),
        }
        running.shutdown();
        return;
    }

    let mut status_rx = running.trigger.status();
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            match status.pending() {
                Some(pending) if pending > 0 => {
                    log::info!("Sync status: {} ({} pending)", status.label(), pending)
                }
                _ => log::info!("Sync status: {}", status.label()),
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
    }

    log::info!("Shutting down");
    status_task.abort();
    running.shutdown();
    state.store.close();
}
