pub mod model;
pub mod scoring;

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::record::{extract_record_fragments, parse_record, Record};
use crate::snapshot::Snapshot;
use crate::teams::TeamDirectory;

use model::{
    Aggregate, AggregatePlayer, FinalizedMatch, MatchPlayer, MatchState, MatchStatus, MatchTeam,
    DEAD_LIVE_STATE,
};
use scoring::{build_finalized_record, fold_into_aggregate, PlacementTable};

const PLAYER_LIST_MARKER: &str = "TotalPlayerList:";
const TEAM_LIST_MARKER: &str = "TeamInfoList:";

lazy_static! {
    static ref GAME_ID: Regex =
        Regex::new(r#"GameID:\s*['"]?(\d+)['"]?"#).expect("game id pattern");
    static ref DEATH_EVENTS: Vec<Regex> = vec![
        Regex::new(r"G_PlayerDied.*?PlayerName=([^,]+).*?Health=([^,\s]+)")
            .expect("death pattern"),
        Regex::new(r"PlayerDied.*?Name=([^,]+).*?Health=([^,\s]+)").expect("death pattern"),
        Regex::new(r"Death.*?Player=([^,]+).*?Health=([^,\s]+)").expect("death pattern"),
    ];
}

/// How player kill counters in a snapshot are interpreted.
///
/// `Incremental` is live tailing: kills only ever grow, growth feeds the
/// kill ticker, and a shrinking counter is the server telling us a new match
/// started in the same file. `FullReplay` is backlog catch-up, where every
/// snapshot is authoritative and the ticker stays quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Incremental,
    FullReplay,
}

/// The tournament state machine: one live match plus the phase and all-time
/// scoreboards, the finalized-match ledger, and the match history.
#[derive(Debug)]
pub struct TournamentEngine {
    directory: TeamDirectory,
    placement: PlacementTable,
    match_state: MatchState,
    phase: Aggregate,
    all_time: Aggregate,
    history: Vec<FinalizedMatch>,
    finalized_ids: BTreeSet<String>,
    dropped_records: u64,
}

impl TournamentEngine {
    pub fn new(directory: TeamDirectory, placement: PlacementTable) -> Self {
        Self {
            directory,
            placement,
            match_state: MatchState::default(),
            phase: Aggregate::default(),
            all_time: Aggregate::default(),
            history: Vec::new(),
            finalized_ids: BTreeSet::new(),
            dropped_records: 0,
        }
    }

    /// Re-adopts persisted state: the all-time player board, the ledger of
    /// already-scored match ids, and the match history.
    pub fn restore(
        &mut self,
        all_time_players: impl IntoIterator<Item = (String, AggregatePlayer)>,
        finalized_ids: impl IntoIterator<Item = String>,
        history: Vec<FinalizedMatch>,
    ) {
        self.all_time.players.extend(all_time_players);
        self.finalized_ids.extend(finalized_ids);
        self.history = history;
    }

    pub fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    pub fn phase(&self) -> &Aggregate {
        &self.phase
    }

    pub fn all_time(&self) -> &Aggregate {
        &self.all_time
    }

    pub fn history(&self) -> &[FinalizedMatch] {
        &self.history
    }

    pub fn finalized_ids(&self) -> &BTreeSet<String> {
        &self.finalized_ids
    }

    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    /// Feeds one snapshot through the full pipeline: match identity, death
    /// events, team records, player records, then the derived state (live
    /// member counts, eliminations, win detection).
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot, mode: ApplyMode) {
        if !self.handle_match_identity(&snapshot.raw) {
            return;
        }
        self.apply_death_events(&snapshot.raw);

        for block in marker_blocks(&snapshot.raw, TEAM_LIST_MARKER) {
            for fragment in extract_record_fragments(block) {
                self.upsert_team(&parse_record(fragment));
            }
        }
        for block in marker_blocks(&snapshot.raw, PLAYER_LIST_MARKER) {
            for fragment in extract_record_fragments(block) {
                self.upsert_player(&parse_record(fragment), mode);
            }
        }

        self.recompute_derived_state();
    }

    /// Resolves the snapshot's match id against the active match. Returns
    /// false when the snapshot belongs to a match already in the finalized
    /// ledger; such snapshots must not resurrect it.
    fn handle_match_identity(&mut self, raw: &str) -> bool {
        let Some(new_id) = GAME_ID
            .captures(raw)
            .map(|captures| captures[1].to_string())
        else {
            return true;
        };

        match self.match_state.id.clone() {
            Some(active_id) if active_id == new_id => true,
            Some(active_id) => {
                if self.is_eliminable() {
                    tracing::info!(
                        previous = %active_id,
                        next = %new_id,
                        "match id changed, finalizing previous match"
                    );
                    self.finalize_active_match("match id changed");
                } else {
                    tracing::warn!(
                        previous = %active_id,
                        next = %new_id,
                        "discarding partial match without elimination data"
                    );
                    self.match_state = MatchState::default();
                }
                self.start_match(new_id)
            }
            None => self.start_match(new_id),
        }
    }

    fn start_match(&mut self, id: String) -> bool {
        if self.finalized_ids.contains(&id) {
            tracing::debug!(match_id = %id, "snapshot for already-finalized match ignored");
            return false;
        }
        tracing::info!(match_id = %id, "match started");
        self.match_state = MatchState {
            id: Some(id),
            status: MatchStatus::Live,
            ..MatchState::default()
        };
        true
    }

    fn apply_death_events(&mut self, raw: &str) {
        for line in raw.lines() {
            let Some((name, health)) = DEATH_EVENTS.iter().find_map(|pattern| {
                pattern.captures(line).map(|captures| {
                    (
                        captures[1].trim().to_string(),
                        captures[2]
                            .trim()
                            .parse::<f64>()
                            .map(|value| value as i64)
                            .unwrap_or(0),
                    )
                })
            }) else {
                continue;
            };

            let Some(player) = self
                .match_state
                .players
                .values_mut()
                .find(|player| player.name == name)
            else {
                continue;
            };
            player.is_alive = false;
            player.live_state = DEAD_LIVE_STATE;
            player.health = health.max(0).min(player.health);
        }
    }

    fn upsert_team(&mut self, record: &Record) {
        let Some(team_id) = record.text("teamId") else {
            self.dropped_records += 1;
            tracing::debug!("team record without teamId dropped");
            return;
        };

        let name = record
            .text("teamName")
            .or_else(|| self.directory.resolve_name(&team_id).map(str::to_string))
            .unwrap_or_else(|| format!("Team {team_id}"));
        let logo = self.directory.resolve_logo(&name);
        let has_players = self.team_has_players(&team_id);

        let team = self
            .match_state
            .teams
            .entry(team_id.clone())
            .or_insert_with(|| MatchTeam {
                id: team_id.clone(),
                ..MatchTeam::default()
            });
        team.name = name;
        team.logo = logo;

        // Trusted only until player records exist for the team; the derived
        // pass recomputes both from player state.
        if let Some(live_members) = record.integer("liveMemberNum") {
            team.membership_known = true;
            if !has_players {
                team.live_members = live_members.max(0) as usize;
            }
        }
        if !has_players {
            if let Some(total_kills) = record.integer("totalKill") {
                team.kills = total_kills.max(0);
            }
        }
    }

    fn upsert_player(&mut self, record: &Record, mode: ApplyMode) {
        let (Some(player_id), Some(team_id)) = (record.text("uId"), record.text("teamId")) else {
            self.dropped_records += 1;
            tracing::debug!("player record without identity dropped");
            return;
        };

        self.ensure_team(&team_id, record.text("teamName"));

        let default_photo = self.directory.default_player_photo().to_string();
        let is_new = !self.match_state.players.contains_key(&player_id);
        let player = self
            .match_state
            .players
            .entry(player_id.clone())
            .or_insert_with(|| MatchPlayer {
                id: player_id.clone(),
                photo: default_photo,
                ..MatchPlayer::default()
            });

        player.team_id = team_id;
        if let Some(name) = record.text("playerName") {
            player.name = name;
        }
        if let Some(photo) = record.text("picUrl") {
            player.photo = photo;
        }
        if let Some(health) = record.integer("health") {
            player.health = health;
        }
        if let Some(health_max) = record.integer("healthMax") {
            player.health_max = health_max;
        }
        if let Some(live_state) = record.integer("liveState") {
            player.live_state = live_state;
        }
        player.is_alive = player.live_state != DEAD_LIVE_STATE && player.health > 0;
        if let Some(damage) = record.integer("damage") {
            player.damage = damage;
        }
        if let Some(knockouts) = record.integer("knockouts") {
            player.knockouts = knockouts;
        }

        let Some(reported_kills) = record.integer("killNum") else {
            return;
        };

        match mode {
            ApplyMode::FullReplay => {
                player.kills = reported_kills;
            }
            ApplyMode::Incremental => {
                if is_new || reported_kills == player.kills {
                    player.kills = reported_kills;
                } else if reported_kills > player.kills {
                    let delta = reported_kills - player.kills;
                    player.kills = reported_kills;
                    let feed_name = player.name.clone();
                    let feed_team_id = player.team_id.clone();
                    for _ in 0..delta {
                        let team_name = self
                            .match_state
                            .teams
                            .get(&feed_team_id)
                            .map(|team| team.name.clone())
                            .unwrap_or_else(|| format!("Team {feed_team_id}"));
                        self.match_state
                            .push_kill_feed(format!("Kill: {feed_name} ({team_name}) got a new kill!"));
                    }
                } else {
                    // Counter went backwards: the server restarted the match
                    // counters. Take the reported record wholesale.
                    tracing::debug!(
                        player = %player.name,
                        previous = player.kills,
                        reported = reported_kills,
                        "kill counter decreased, resetting player record"
                    );
                    player.kills = reported_kills;
                }
            }
        }
    }

    fn ensure_team(&mut self, team_id: &str, name_hint: Option<String>) {
        if self.match_state.teams.contains_key(team_id) {
            if let Some(name) = name_hint {
                if let Some(team) = self.match_state.teams.get_mut(team_id) {
                    if team.name != name {
                        team.name = name;
                        team.logo = self.directory.resolve_logo(&team.name);
                    }
                }
            }
            return;
        }

        let name = name_hint
            .or_else(|| self.directory.resolve_name(team_id).map(str::to_string))
            .unwrap_or_else(|| format!("Team {team_id}"));
        let logo = self.directory.resolve_logo(&name);
        self.match_state.teams.insert(
            team_id.to_string(),
            MatchTeam {
                id: team_id.to_string(),
                name,
                logo,
                ..MatchTeam::default()
            },
        );
    }

    fn team_has_players(&self, team_id: &str) -> bool {
        self.match_state
            .players
            .values()
            .any(|player| player.team_id == team_id)
    }

    fn recompute_derived_state(&mut self) {
        let team_ids: Vec<String> = self.match_state.teams.keys().cloned().collect();
        for team_id in &team_ids {
            if !self.team_has_players(team_id) {
                continue;
            }
            let mut members = Vec::new();
            let mut live_members = 0usize;
            let mut kills = 0i64;
            for player in self
                .match_state
                .players
                .values()
                .filter(|player| &player.team_id == team_id)
            {
                members.push(player.id.clone());
                live_members += usize::from(player.is_counted_alive());
                kills += player.kills;
            }
            if let Some(team) = self.match_state.teams.get_mut(team_id) {
                team.players = members;
                team.live_members = live_members;
                team.kills = kills;
                team.membership_known = true;
            }
        }

        // Eliminations are append-only. A team counts as eliminated once its
        // player records all read dead, or once a team-info record has
        // reported its live-member count as zero. Teams nothing has reported
        // membership for yet stay out of the order.
        for team_id in &team_ids {
            let Some(team) = self.match_state.teams.get(team_id) else {
                continue;
            };
            if !team.membership_known {
                continue;
            }
            if team.live_members == 0
                && !self
                    .match_state
                    .eliminated_team_ids
                    .contains(&team.id)
            {
                tracing::info!(team = %team.name, "team eliminated");
                let name = team.name.clone();
                let id = team.id.clone();
                self.match_state.elimination_order.push(name);
                self.match_state.eliminated_team_ids.push(id);
            }
        }

        if self.match_state.status == MatchStatus::Live && self.match_state.teams.len() > 1 {
            let alive = self.match_state.teams_with_live_members();
            if alive.len() == 1 {
                let winner = alive[0];
                let winner_id = winner.id.clone();
                let winner_name = winner.name.clone();
                tracing::info!(
                    match_id = self.match_state.id.as_deref().unwrap_or(""),
                    winner = %winner_name,
                    "match finished"
                );
                self.match_state.status = MatchStatus::Finished;
                self.match_state.winner_team_id = Some(winner_id);
                self.match_state.winner_team_name = Some(winner_name);
            }
        }
    }

    /// True when the live match carries enough signal to score it: the win
    /// was detected, or at least one elimination was recorded.
    pub fn is_eliminable(&self) -> bool {
        match self.match_state.status {
            MatchStatus::Finished => true,
            MatchStatus::Live => !self.match_state.elimination_order.is_empty(),
            MatchStatus::Idle => false,
        }
    }

    /// Stricter gate used by shutdown and inactivity handling: finished, or
    /// an unambiguous single survivor.
    pub fn can_finalize_safely(&self) -> bool {
        match self.match_state.status {
            MatchStatus::Finished => true,
            MatchStatus::Live => {
                self.match_state.teams.len() > 1
                    && self.match_state.teams_with_live_members().len() == 1
            }
            MatchStatus::Idle => false,
        }
    }

    /// Finalizes the active match if it is in an eliminable state. Used at
    /// file boundaries during backlog replay.
    pub fn finalize_if_eliminable(&mut self, reason: &str) -> bool {
        if self.is_eliminable() {
            self.finalize_active_match(reason)
        } else {
            false
        }
    }

    /// Scores the active match, folds it into both scoreboards, appends it
    /// to the history, and resets the live match. Idempotent per match id:
    /// an id already in the ledger is skipped.
    pub fn finalize_active_match(&mut self, reason: &str) -> bool {
        let Some(match_id) = self.match_state.id.clone() else {
            return false;
        };

        if self.finalized_ids.contains(&match_id) {
            tracing::info!(match_id = %match_id, "match already finalized, skipping");
            self.match_state = MatchState::default();
            return false;
        }

        let record = build_finalized_record(
            &self.match_state,
            &match_id,
            &self.placement,
            chrono::Utc::now().to_rfc3339(),
        );

        fold_into_aggregate(&mut self.phase, &record);
        fold_into_aggregate(&mut self.all_time, &record);
        self.finalized_ids.insert(match_id.clone());

        tracing::info!(
            match_id = %match_id,
            reason,
            winner = record.winner_team_name.as_deref().unwrap_or("none"),
            teams = record.teams.len(),
            dropped_records = self.dropped_records,
            "match finalized"
        );

        self.history.push(record);
        self.match_state = MatchState::default();
        true
    }

    /// Throws away the phase scoreboard and replays the deduplicated match
    /// history in order. The result must equal what incremental folding
    /// produced.
    pub fn rebuild_phase_from_history(&mut self) {
        self.phase = Aggregate::default();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for record in &self.history {
            if !seen.insert(record.id.as_str()) {
                tracing::warn!(match_id = %record.id, "duplicate history entry ignored");
                continue;
            }
            fold_into_aggregate(&mut self.phase, record);
        }
        tracing::info!(matches = seen.len(), "phase scoreboard rebuilt from history");
    }
}

fn marker_blocks<'a>(raw: &'a str, marker: &str) -> Vec<&'a str> {
    let mut positions: Vec<(usize, usize)> = Vec::new();
    for candidate in [PLAYER_LIST_MARKER, TEAM_LIST_MARKER] {
        for (offset, _) in raw.match_indices(candidate) {
            positions.push((offset, candidate.len()));
        }
    }
    positions.sort_unstable();

    let mut blocks = Vec::new();
    for (index, &(offset, length)) in positions.iter().enumerate() {
        if &raw[offset..offset + length] != marker {
            continue;
        }
        let block_end = positions
            .get(index + 1)
            .map(|&(next_offset, _)| next_offset)
            .unwrap_or(raw.len());
        blocks.push(&raw[offset + length..block_end]);
    }
    blocks
}
