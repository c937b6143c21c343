use serde::Serialize;
use std::path::Path;

use crate::engine::model::{Aggregate, FinalizedMatch, MatchState};
use crate::engine::TournamentEngine;
use crate::persist::{write_atomically, PersistError};

pub const EXPORT_SCHEMA_VERSION: u32 = 1;
const TOP_PLAYER_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub schema_version: u32,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsRow {
    pub rank: usize,
    pub team_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logo: String,
    pub kills: i64,
    pub placement_points: i64,
    pub points: i64,
    pub wwcd: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPlayerRow {
    pub rank: usize,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub photo: String,
    pub team_name: String,
    pub kills: i64,
    pub damage: i64,
    pub knockouts: i64,
    pub matches: i64,
}

/// The document the scoreboard frontend reads. Built in one pass so the
/// match, standings, and history always come from the same engine state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub meta: ExportMeta,
    pub current_match: MatchState,
    pub phase_standings: Vec<StandingsRow>,
    pub all_time_top_players: Vec<TopPlayerRow>,
    pub match_history: Vec<FinalizedMatch>,
}

pub fn build_payload(engine: &TournamentEngine) -> ExportPayload {
    ExportPayload {
        meta: ExportMeta {
            schema_version: EXPORT_SCHEMA_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
        },
        current_match: engine.match_state().clone(),
        phase_standings: phase_standings(engine.phase()),
        all_time_top_players: top_players(engine.all_time()),
        match_history: engine.history().to_vec(),
    }
}

/// Writes the payload atomically; a failed write leaves the previous file
/// in place so consumers keep serving stale-but-consistent data.
pub fn write_payload(path: &Path, payload: &ExportPayload) -> Result<(), PersistError> {
    let serialized = serde_json::to_string_pretty(payload)?;
    write_atomically(path, serialized.as_bytes())
}

fn phase_standings(aggregate: &Aggregate) -> Vec<StandingsRow> {
    let mut teams: Vec<_> = aggregate.teams.values().collect();
    teams.sort_by(|left, right| {
        right
            .totals
            .points
            .cmp(&left.totals.points)
            .then(right.totals.kills.cmp(&left.totals.kills))
            .then(left.name.cmp(&right.name))
    });

    teams
        .into_iter()
        .enumerate()
        .map(|(index, team)| StandingsRow {
            rank: index + 1,
            team_name: team.name.clone(),
            logo: team.logo.clone(),
            kills: team.totals.kills,
            placement_points: team.totals.placement_points,
            points: team.totals.points,
            wwcd: team.totals.wwcd,
        })
        .collect()
}

fn top_players(aggregate: &Aggregate) -> Vec<TopPlayerRow> {
    let mut players: Vec<_> = aggregate.players.values().collect();
    players.sort_by(|left, right| {
        right
            .totals
            .kills
            .cmp(&left.totals.kills)
            .then(right.totals.damage.cmp(&left.totals.damage))
            .then(right.totals.knockouts.cmp(&left.totals.knockouts))
            .then(left.name.cmp(&right.name))
    });

    players
        .into_iter()
        .take(TOP_PLAYER_LIMIT)
        .enumerate()
        .map(|(index, player)| TopPlayerRow {
            rank: index + 1,
            id: player.id.clone(),
            name: player.name.clone(),
            photo: player.photo.clone(),
            team_name: player.team_name.clone(),
            kills: player.totals.kills,
            damage: player.totals.damage,
            knockouts: player.totals.knockouts,
            matches: player.totals.matches,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{build_payload, write_payload, EXPORT_SCHEMA_VERSION};
    use crate::engine::scoring::PlacementTable;
    use crate::engine::{ApplyMode, TournamentEngine};
    use crate::snapshot::Snapshot;
    use crate::teams::TeamDirectory;

    fn finished_engine() -> TournamentEngine {
        let mut engine = TournamentEngine::new(
            TeamDirectory::empty(String::new(), String::new(), String::new()),
            PlacementTable::default(),
        );
        let opening = "\
[2025-08-31 10:00:01] POST /totalmessage\n\
GameID: \"500\"\n\
TotalPlayerList:\n\
{ uId: 1, playerName: 'One', teamId: 1, teamName: 'Alpha', health: 100, liveState: 0, killNum: 0, damage: 10 }\n\
{ uId: 2, playerName: 'Two', teamId: 2, teamName: 'Bravo', health: 100, liveState: 0, killNum: 0, damage: 20 }\n";
        let closing = "\
[2025-08-31 10:05:00] POST /totalmessage\n\
TotalPlayerList:\n\
{ uId: 1, playerName: 'One', teamId: 1, teamName: 'Alpha', health: 0, liveState: 5, killNum: 0, damage: 10 }\n\
{ uId: 2, playerName: 'Two', teamId: 2, teamName: 'Bravo', health: 90, liveState: 0, killNum: 1, damage: 120 }\n";
        engine.apply_snapshot(&Snapshot::new(opening.to_string()), ApplyMode::Incremental);
        engine.apply_snapshot(&Snapshot::new(closing.to_string()), ApplyMode::Incremental);
        engine.finalize_active_match("test");
        engine
    }

    #[test]
    fn standings_rank_by_points_then_kills() {
        let engine = finished_engine();
        let payload = build_payload(&engine);

        assert_eq!(payload.meta.schema_version, EXPORT_SCHEMA_VERSION);
        assert_eq!(payload.phase_standings.len(), 2);
        assert_eq!(payload.phase_standings[0].team_name, "Bravo");
        assert_eq!(payload.phase_standings[0].rank, 1);
        assert_eq!(payload.phase_standings[0].points, 11);
        assert_eq!(payload.phase_standings[1].team_name, "Alpha");
        assert_eq!(payload.phase_standings[1].points, 6);
    }

    #[test]
    fn top_players_rank_by_kills_then_damage() {
        let engine = finished_engine();
        let payload = build_payload(&engine);

        assert_eq!(payload.all_time_top_players.len(), 2);
        assert_eq!(payload.all_time_top_players[0].name, "Two");
        assert_eq!(payload.all_time_top_players[0].kills, 1);
        assert_eq!(payload.all_time_top_players[1].name, "One");
    }

    #[test]
    fn history_and_idle_match_are_exported() {
        let engine = finished_engine();
        let payload = build_payload(&engine);

        assert_eq!(payload.match_history.len(), 1);
        assert_eq!(payload.match_history[0].id, "500");
        assert!(payload.current_match.id.is_none());
    }

    #[test]
    fn payload_writes_camel_case_json() {
        let engine = finished_engine();
        let payload = build_payload(&engine);
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("scoreboard.json");
        write_payload(&path, &payload).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read back");
        let document: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON");
        assert!(document.get("phaseStandings").is_some());
        assert!(document.get("allTimeTopPlayers").is_some());
        assert_eq!(
            document["meta"]["schemaVersion"],
            serde_json::json!(EXPORT_SCHEMA_VERSION)
        );
    }
}
