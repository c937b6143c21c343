use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::scoring::PlacementTable;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Runtime configuration. Every field has a default so a missing config
/// file and a sparse one both work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Directory the game server appends its `.txt` logs into.
    pub log_dir: PathBuf,
    /// INI file with the team name/logo section.
    pub team_config: PathBuf,
    /// Export payload destination.
    pub output_json: PathBuf,
    /// Persisted store (all-time players, ledger, history).
    pub store_path: PathBuf,
    /// Directory polled for `finalize.flag` / `shutdown.flag`.
    pub control_dir: PathBuf,

    /// Log size poll interval.
    pub poll_interval_ms: u64,
    /// Export rewrite interval while live.
    pub export_interval_ms: u64,
    /// Export rewrite interval in drain mode.
    pub drain_export_interval_ms: u64,
    /// Window without log growth before a live match may be force-ended.
    pub inactivity_timeout_secs: u64,
    /// How long a candidate file is watched to decide whether it is live.
    pub growth_probe_ms: u64,
    /// A candidate below this size is treated as backlog, not live.
    pub live_file_min_bytes: u64,
    /// Carry-over size past which the extractor warns about a stream that
    /// never produces a boundary.
    pub carry_warn_bytes: usize,

    /// Placement points by rank, rank 1 first.
    pub placement_points: Vec<i64>,

    pub logo_base_url: String,
    pub default_team_logo: String,
    pub default_player_photo: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            team_config: PathBuf::from("TeamLogoAndColor.ini"),
            output_json: PathBuf::from("live_scoreboard.json"),
            store_path: PathBuf::from("tournament_store.json"),
            control_dir: PathBuf::from("."),
            poll_interval_ms: 100,
            export_interval_ms: 500,
            drain_export_interval_ms: 10_000,
            inactivity_timeout_secs: 60,
            growth_probe_ms: 1_000,
            live_file_min_bytes: 500,
            carry_warn_bytes: 4 * 1024 * 1024,
            placement_points: vec![10, 6, 5, 4, 3, 2, 1, 1],
            logo_base_url: "/assets/logos/".to_string(),
            default_team_logo: "/assets/logos/default.png".to_string(),
            default_player_photo: "/assets/players/default.png".to_string(),
        }
    }
}

impl MonitorSettings {
    /// Loads settings from a JSON file. `None` or a missing file yields the
    /// defaults; an unreadable or malformed file is an error, since running
    /// a tournament on silently-wrong settings is worse than failing.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Creates the directories the monitor needs. Only the log directory is
    /// fatal; output parents are attempted and logged.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;

        for parent in [self.output_json.parent(), self.store_path.parent()]
            .into_iter()
            .flatten()
        {
            if parent.as_os_str().is_empty() {
                continue;
            }
            if let Err(error) = std::fs::create_dir_all(parent) {
                tracing::warn!(
                    path = %parent.display(),
                    error = %error,
                    "could not create output directory"
                );
            }
        }
        Ok(())
    }

    pub fn placement_table(&self) -> PlacementTable {
        PlacementTable::new(self.placement_points.clone())
    }
}
