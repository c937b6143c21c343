use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::engine::model::{AggregatePlayer, FinalizedMatch};
use crate::engine::TournamentEngine;

pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to read store '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The single persisted document: all-time player totals, the ledger of
/// match ids that were already scored, and the finalized match history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStore {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub all_time_players: BTreeMap<String, AggregatePlayer>,
    #[serde(default)]
    pub finalized_match_ids: BTreeSet<String>,
    #[serde(default)]
    pub match_history: Vec<FinalizedMatch>,
}

impl MonitorStore {
    pub fn from_engine(engine: &TournamentEngine) -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION,
            all_time_players: engine.all_time().players.clone(),
            finalized_match_ids: engine.finalized_ids().clone(),
            match_history: engine.history().to_vec(),
        }
    }
}

/// Reads the store. A missing file is a normal first run. A file that is
/// not valid JSON starts the monitor empty with a warning; individually
/// malformed player or history entries are dropped, never fatal.
pub fn load_store(path: &Path) -> Result<Option<MonitorStore>, PersistError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let document: serde_json::Value = match serde_json::from_str(&contents) {
        Ok(document) => document,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "store file is not valid JSON, starting empty"
            );
            return Ok(None);
        }
    };

    let mut store = MonitorStore {
        schema_version: document
            .get("schemaVersion")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        ..MonitorStore::default()
    };

    if let Some(players) = document.get("allTimePlayers").and_then(|value| value.as_object()) {
        for (player_id, entry) in players {
            match serde_json::from_value::<AggregatePlayer>(entry.clone()) {
                Ok(player) => {
                    store.all_time_players.insert(player_id.clone(), player);
                }
                Err(error) => {
                    tracing::warn!(
                        player_id = %player_id,
                        error = %error,
                        "dropping malformed all-time player entry"
                    );
                }
            }
        }
    }

    if let Some(ids) = document.get("finalizedMatchIds").and_then(|value| value.as_array()) {
        for id in ids {
            if let Some(id) = id.as_str() {
                store.finalized_match_ids.insert(id.to_string());
            }
        }
    }

    if let Some(history) = document.get("matchHistory").and_then(|value| value.as_array()) {
        for entry in history {
            match serde_json::from_value::<FinalizedMatch>(entry.clone()) {
                Ok(record) => store.match_history.push(record),
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "dropping malformed match history entry"
                    );
                }
            }
        }
    }

    Ok(Some(store))
}

/// Atomic save: serialize to a sibling temp file, then rename over the
/// target so readers never observe a torn document.
pub fn save_store(path: &Path, store: &MonitorStore) -> Result<(), PersistError> {
    let serialized = serde_json::to_string_pretty(store)?;
    write_atomically(path, serialized.as_bytes())
}

pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), PersistError> {
    let temp_path = temp_sibling(path);
    std::fs::write(&temp_path, contents).map_err(|source| PersistError::Write {
        path: temp_path.clone(),
        source,
    })?;

    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(PersistError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    file_name.push_str(".tmp");
    path.with_file_name(file_name)
}
