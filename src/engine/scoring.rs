use std::collections::BTreeMap;

use crate::engine::model::{
    Aggregate, AggregatePlayer, AggregateTeam, FinalizedMatch, FinalizedPlayerResult,
    FinalizedTeamResult, MatchState,
};

/// Placement points by final rank, index 0 = rank 1. Ranks past the end of
/// the table score zero.
#[derive(Debug, Clone)]
pub struct PlacementTable {
    points: Vec<i64>,
}

impl Default for PlacementTable {
    fn default() -> Self {
        Self {
            points: vec![10, 6, 5, 4, 3, 2, 1, 1],
        }
    }
}

impl PlacementTable {
    pub fn new(points: Vec<i64>) -> Self {
        Self { points }
    }

    pub fn points_for_rank(&self, rank: usize) -> i64 {
        if rank == 0 {
            return 0;
        }
        self.points.get(rank - 1).copied().unwrap_or(0)
    }
}

/// Team ids of a live match in final rank order (rank 1 first).
///
/// Surviving teams come first, ordered by kills descending; eliminated teams
/// follow in reverse elimination order (last team out places highest). When
/// the recorded eliminations cannot account for all but one team, the order
/// is degraded but deterministic: every team ranked by liveness then kills.
pub fn rank_teams(state: &MatchState) -> Vec<String> {
    let team_count = state.teams.len();
    let eliminated_ids = eliminated_ids(state);
    let recorded = state.elimination_order.len().max(eliminated_ids.len());

    if team_count > 0 && recorded + 1 < team_count {
        let mut all: Vec<_> = state.teams.values().collect();
        all.sort_by(|left, right| {
            let left_alive = left.live_members > 0;
            let right_alive = right.live_members > 0;
            right_alive
                .cmp(&left_alive)
                .then(right.kills.cmp(&left.kills))
                .then(left.name.cmp(&right.name))
        });
        return all.into_iter().map(|team| team.id.clone()).collect();
    }

    let mut survivors: Vec<_> = state
        .teams
        .values()
        .filter(|team| team.live_members > 0)
        .collect();
    survivors.sort_by(|left, right| {
        right
            .kills
            .cmp(&left.kills)
            .then(left.name.cmp(&right.name))
    });

    let mut ranked: Vec<String> = survivors.into_iter().map(|team| team.id.clone()).collect();
    for eliminated in eliminated_ids.into_iter().rev() {
        if state.teams.contains_key(&eliminated) && !ranked.contains(&eliminated) {
            ranked.push(eliminated);
        }
    }

    // Teams the elimination order never named (joined late, lost records)
    // still have to place somewhere: after everyone accounted for.
    for team in state.teams.values() {
        if !ranked.iter().any(|existing| existing == &team.id) {
            ranked.push(team.id.clone());
        }
    }

    ranked
}

/// The elimination order as team ids. Live states record ids alongside the
/// names; a state carrying only names (older data) falls back to resolving
/// them against the team table.
fn eliminated_ids(state: &MatchState) -> Vec<String> {
    if !state.eliminated_team_ids.is_empty() {
        return state.eliminated_team_ids.clone();
    }

    let name_to_id: BTreeMap<&str, &str> = state
        .teams
        .values()
        .map(|team| (team.name.as_str(), team.id.as_str()))
        .collect();
    state
        .elimination_order
        .iter()
        .filter_map(|name| name_to_id.get(name.as_str()).map(|id| (*id).to_string()))
        .collect()
}

/// Builds the immutable scoring record for a finished match.
pub fn build_finalized_record(
    state: &MatchState,
    match_id: &str,
    placement: &PlacementTable,
    finalized_at: String,
) -> FinalizedMatch {
    let ranked_ids = rank_teams(state);

    let teams = ranked_ids
        .iter()
        .enumerate()
        .filter_map(|(index, team_id)| {
            let team = state.teams.get(team_id)?;
            let rank = index + 1;
            Some(FinalizedTeamResult {
                name: team.name.clone(),
                logo: team.logo.clone(),
                rank,
                kills: team.kills,
                placement_points: placement.points_for_rank(rank),
                survived: team.live_members > 0,
            })
        })
        .collect();

    let players = state
        .players
        .values()
        .map(|player| FinalizedPlayerResult {
            id: player.id.clone(),
            name: player.name.clone(),
            photo: player.photo.clone(),
            team_name: state
                .teams
                .get(&player.team_id)
                .map(|team| team.name.clone())
                .unwrap_or_default(),
            kills: player.kills,
            damage: player.damage,
            knockouts: player.knockouts,
        })
        .collect();

    let winner_team_name = ranked_ids
        .first()
        .and_then(|id| state.teams.get(id))
        .filter(|team| team.live_members > 0)
        .map(|team| team.name.clone());

    FinalizedMatch {
        id: match_id.to_string(),
        winner_team_name,
        elimination_order: state.elimination_order.clone(),
        teams,
        players,
        finalized_at,
    }
}

/// Folds one finalized match into a scoreboard. Increments only; calling
/// this once per distinct match id from an empty aggregate reproduces the
/// board exactly, which is what the rebuild path relies on.
pub fn fold_into_aggregate(aggregate: &mut Aggregate, record: &FinalizedMatch) {
    // Every team exists on the board before any win is credited.
    for team in &record.teams {
        let entry = aggregate
            .teams
            .entry(team.name.clone())
            .or_insert_with(|| AggregateTeam {
                name: team.name.clone(),
                logo: team.logo.clone(),
                ..AggregateTeam::default()
            });
        if entry.logo.is_empty() && !team.logo.is_empty() {
            entry.logo = team.logo.clone();
        }
        entry.totals.kills += team.kills;
        entry.totals.placement_points += team.placement_points;
    }

    let winner = record
        .teams
        .iter()
        .find(|team| team.rank == 1 && team.survived)
        .map(|team| team.name.clone());
    if let Some(winner_name) = winner {
        if let Some(entry) = aggregate.teams.get_mut(&winner_name) {
            entry.totals.wwcd += 1;
        }
    }

    for entry in aggregate.teams.values_mut() {
        entry.totals.points = entry.totals.kills + entry.totals.placement_points;
    }

    for player in &record.players {
        let entry = aggregate
            .players
            .entry(player.id.clone())
            .or_insert_with(|| AggregatePlayer {
                id: player.id.clone(),
                name: player.name.clone(),
                photo: player.photo.clone(),
                team_name: player.team_name.clone(),
                ..AggregatePlayer::default()
            });
        entry.name = player.name.clone();
        if !player.team_name.is_empty() {
            entry.team_name = player.team_name.clone();
        }
        if entry.photo.is_empty() && !player.photo.is_empty() {
            entry.photo = player.photo.clone();
        }
        entry.totals.kills += player.kills;
        entry.totals.damage += player.damage;
        entry.totals.knockouts += player.knockouts;
        entry.totals.matches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{build_finalized_record, fold_into_aggregate, rank_teams, PlacementTable};
    use crate::engine::model::{Aggregate, MatchPlayer, MatchState, MatchTeam};

    fn team(id: &str, name: &str, live_members: usize, kills: i64) -> MatchTeam {
        MatchTeam {
            id: id.to_string(),
            name: name.to_string(),
            live_members,
            kills,
            ..MatchTeam::default()
        }
    }

    fn four_team_state() -> MatchState {
        let mut state = MatchState::default();
        state.id = Some("700".to_string());
        for (id, name, live, kills) in [
            ("1", "Alpha", 0, 3),
            ("2", "Bravo", 0, 5),
            ("3", "Charlie", 0, 2),
            ("4", "Delta", 2, 8),
        ] {
            state.teams.insert(id.to_string(), team(id, name, live, kills));
        }
        state.elimination_order = vec![
            "Alpha".to_string(),
            "Bravo".to_string(),
            "Charlie".to_string(),
        ];
        state
    }

    #[test]
    fn placement_table_defaults() {
        let table = PlacementTable::default();
        assert_eq!(table.points_for_rank(1), 10);
        assert_eq!(table.points_for_rank(2), 6);
        assert_eq!(table.points_for_rank(8), 1);
        assert_eq!(table.points_for_rank(9), 0);
        assert_eq!(table.points_for_rank(0), 0);
    }

    #[test]
    fn survivor_then_reverse_elimination_order() {
        let state = four_team_state();
        let ranked = rank_teams(&state);
        // Delta survived; Charlie fell last, Alpha first.
        assert_eq!(ranked, vec!["4", "3", "2", "1"]);

        let record =
            build_finalized_record(&state, "700", &PlacementTable::default(), String::new());
        let by_name: Vec<(&str, i64)> = record
            .teams
            .iter()
            .map(|team| (team.name.as_str(), team.placement_points))
            .collect();
        assert_eq!(
            by_name,
            vec![("Delta", 10), ("Charlie", 6), ("Bravo", 5), ("Alpha", 4)]
        );
        assert_eq!(record.winner_team_name.as_deref(), Some("Delta"));
    }

    #[test]
    fn several_survivors_rank_by_kills() {
        let mut state = MatchState::default();
        state
            .teams
            .insert("1".to_string(), team("1", "Alpha", 1, 2));
        state
            .teams
            .insert("2".to_string(), team("2", "Bravo", 2, 7));
        state
            .teams
            .insert("3".to_string(), team("3", "Charlie", 0, 4));
        state.elimination_order = vec!["Charlie".to_string(), "unused".to_string()];

        let ranked = rank_teams(&state);
        assert_eq!(ranked, vec!["2", "1", "3"]);
    }

    #[test]
    fn incomplete_eliminations_fall_back_to_liveness_then_kills() {
        let mut state = MatchState::default();
        state
            .teams
            .insert("1".to_string(), team("1", "Alpha", 0, 9));
        state
            .teams
            .insert("2".to_string(), team("2", "Bravo", 1, 3));
        state
            .teams
            .insert("3".to_string(), team("3", "Charlie", 0, 6));
        // One elimination recorded for three teams: not enough to trust.
        state.elimination_order = vec!["Alpha".to_string()];

        let ranked = rank_teams(&state);
        assert_eq!(ranked, vec!["2", "1", "3"]);
    }

    #[test]
    fn duplicate_team_names_are_ranked_by_id() {
        let mut state = MatchState::default();
        state.teams.insert("1".to_string(), team("1", "Alpha", 0, 2));
        state.teams.insert("2".to_string(), team("2", "Alpha", 0, 6));
        state.teams.insert("3".to_string(), team("3", "Bravo", 1, 4));
        state.elimination_order = vec!["Alpha".to_string(), "Alpha".to_string()];
        state.eliminated_team_ids = vec!["1".to_string(), "2".to_string()];

        let ranked = rank_teams(&state);
        assert_eq!(ranked, vec!["3", "2", "1"]);

        let record =
            build_finalized_record(&state, "9", &PlacementTable::default(), String::new());
        let ranks: Vec<(&str, usize)> = record
            .teams
            .iter()
            .map(|team| (team.name.as_str(), team.rank))
            .collect();
        assert_eq!(ranks, vec![("Bravo", 1), ("Alpha", 2), ("Alpha", 3)]);
    }

    #[test]
    fn two_team_match_scores_winner_ten_loser_six() {
        let mut state = MatchState::default();
        state
            .teams
            .insert("1".to_string(), team("1", "A", 0, 1));
        state
            .teams
            .insert("2".to_string(), team("2", "B", 1, 2));
        state.elimination_order = vec!["A".to_string()];

        let record =
            build_finalized_record(&state, "9", &PlacementTable::default(), String::new());
        assert_eq!(record.winner_team_name.as_deref(), Some("B"));
        assert_eq!(record.teams[0].name, "B");
        assert_eq!(record.teams[0].placement_points, 10);
        assert_eq!(record.teams[1].name, "A");
        assert_eq!(record.teams[1].placement_points, 6);
    }

    #[test]
    fn fold_increments_and_recomputes_points() {
        let state = four_team_state();
        let record =
            build_finalized_record(&state, "700", &PlacementTable::default(), String::new());

        let mut aggregate = Aggregate::default();
        fold_into_aggregate(&mut aggregate, &record);
        fold_into_aggregate(&mut aggregate, &record);

        let delta = aggregate.teams.get("Delta").expect("winner on board");
        assert_eq!(delta.totals.kills, 16);
        assert_eq!(delta.totals.placement_points, 20);
        assert_eq!(delta.totals.points, 36);
        assert_eq!(delta.totals.wwcd, 2);

        let alpha = aggregate.teams.get("Alpha").expect("last place on board");
        assert_eq!(alpha.totals.wwcd, 0);
        assert_eq!(alpha.totals.points, alpha.totals.kills + alpha.totals.placement_points);
    }

    #[test]
    fn fold_accumulates_player_totals() {
        let mut state = four_team_state();
        state.players.insert(
            "p1".to_string(),
            MatchPlayer {
                id: "p1".to_string(),
                name: "One".to_string(),
                team_id: "4".to_string(),
                kills: 5,
                damage: 480,
                knockouts: 2,
                ..MatchPlayer::default()
            },
        );

        let record =
            build_finalized_record(&state, "700", &PlacementTable::default(), String::new());
        let mut aggregate = Aggregate::default();
        fold_into_aggregate(&mut aggregate, &record);

        let player = aggregate.players.get("p1").expect("player on board");
        assert_eq!(player.team_name, "Delta");
        assert_eq!(player.totals.kills, 5);
        assert_eq!(player.totals.damage, 480);
        assert_eq!(player.totals.matches, 1);
    }
}
