use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use royaleboard::engine::TournamentEngine;
use royaleboard::export::{build_payload, write_payload};
use royaleboard::persist::{load_store, save_store, MonitorStore};
use royaleboard::settings::MonitorSettings;
use royaleboard::shutdown::{spawn_flag_file_watcher, spawn_signal_listener, ShutdownSignal};
use royaleboard::tailer::LogTailer;
use royaleboard::teams::TeamDirectory;

/// Battle-royale tournament log monitor: tails the game server's logs,
/// scores finished matches, and publishes a live scoreboard JSON.
#[derive(Debug, Parser)]
#[command(name = "royaleboard", version, about)]
struct Cli {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the game server writes its logs into.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Team name/logo INI file.
    #[arg(long)]
    team_config: Option<PathBuf>,

    /// Scoreboard JSON destination.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Persisted store path.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Rebuild the phase standings from the match history, write the
    /// scoreboard once, and exit.
    #[arg(long)]
    rebuild: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = MonitorSettings::load(cli.config.as_deref())?;
    if let Some(log_dir) = cli.log_dir {
        settings.log_dir = log_dir;
    }
    if let Some(team_config) = cli.team_config {
        settings.team_config = team_config;
    }
    if let Some(output) = cli.output {
        settings.output_json = output;
    }
    if let Some(store) = cli.store {
        settings.store_path = store;
    }

    settings.ensure_directories()?;

    let directory = TeamDirectory::load(
        &settings.team_config,
        settings.logo_base_url.clone(),
        settings.default_team_logo.clone(),
        settings.default_player_photo.clone(),
    );

    let mut engine = TournamentEngine::new(directory, settings.placement_table());
    match load_store(&settings.store_path) {
        Ok(Some(store)) => {
            tracing::info!(
                players = store.all_time_players.len(),
                matches = store.match_history.len(),
                "restored persisted state"
            );
            engine.restore(
                store.all_time_players,
                store.finalized_match_ids,
                store.match_history,
            );
        }
        Ok(None) => tracing::info!("no persisted state, starting fresh"),
        Err(error) => tracing::warn!(error = %error, "could not load store, starting fresh"),
    }

    // The phase standings are derived state; replaying the history brings
    // them back after a restart without re-scoring anything.
    engine.rebuild_phase_from_history();

    if cli.rebuild {
        let store = MonitorStore::from_engine(&engine);
        save_store(&settings.store_path, &store)?;
        write_payload(&settings.output_json, &build_payload(&engine))?;
        tracing::info!(path = %settings.output_json.display(), "rebuild complete");
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());
    spawn_flag_file_watcher(shutdown.clone(), settings.control_dir.clone());

    tracing::info!(
        log_dir = %settings.log_dir.display(),
        output = %settings.output_json.display(),
        "monitor starting"
    );
    LogTailer::new(settings, engine, shutdown).run().await?;
    Ok(())
}
