use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// liveState value the server uses for a dead player.
pub const DEAD_LIVE_STATE: i64 = 5;

/// Bounded kill-feed ring size.
pub const KILL_FEED_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Idle,
    Live,
    Finished,
}

impl Default for MatchStatus {
    fn default() -> Self {
        MatchStatus::Idle
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayer {
    pub id: String,
    pub name: String,
    pub team_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub photo: String,
    pub is_alive: bool,
    pub live_state: i64,
    pub health: i64,
    pub health_max: i64,
    pub kills: i64,
    pub damage: i64,
    pub knockouts: i64,
}

impl MatchPlayer {
    /// The only liveness rule used anywhere: the flag, the state code, and
    /// the health value must all agree that the player is up.
    pub fn is_counted_alive(&self) -> bool {
        self.is_alive && self.live_state != DEAD_LIVE_STATE && self.health > 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTeam {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub logo: String,
    /// Member player ids, recomputed alongside the live-member count.
    pub players: Vec<String>,
    pub live_members: usize,
    pub kills: i64,
    /// Whether any record (player or team-info) has told us about this
    /// team's membership yet. A team with no membership data cannot be
    /// declared eliminated.
    #[serde(skip)]
    pub membership_known: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_team_name: Option<String>,
    pub elimination_order: Vec<String>,
    /// Team ids paired with `elimination_order` entries. Names can collide
    /// between teams; ranking always goes through the ids.
    #[serde(skip)]
    pub eliminated_team_ids: Vec<String>,
    pub kill_feed: VecDeque<String>,
    pub teams: BTreeMap<String, MatchTeam>,
    pub players: BTreeMap<String, MatchPlayer>,
}

impl MatchState {
    pub fn teams_with_live_members(&self) -> Vec<&MatchTeam> {
        self.teams
            .values()
            .filter(|team| team.live_members > 0)
            .collect()
    }

    pub fn push_kill_feed(&mut self, entry: String) {
        self.kill_feed.push_back(entry);
        while self.kill_feed.len() > KILL_FEED_CAPACITY {
            self.kill_feed.pop_front();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTotals {
    pub kills: i64,
    pub placement_points: i64,
    pub points: i64,
    pub wwcd: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateTeam {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub logo: String,
    #[serde(flatten)]
    pub totals: TeamTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTotals {
    pub kills: i64,
    pub damage: i64,
    pub knockouts: i64,
    pub matches: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePlayer {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub photo: String,
    pub team_name: String,
    #[serde(flatten)]
    pub totals: PlayerTotals,
}

/// One scoreboard: keyed by team name (ids are only stable within a match)
/// and by player id. Used for both the phase and the all-time boards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub teams: BTreeMap<String, AggregateTeam>,
    pub players: BTreeMap<String, AggregatePlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedTeamResult {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub logo: String,
    pub rank: usize,
    pub kills: i64,
    pub placement_points: i64,
    pub survived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedPlayerResult {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub photo: String,
    pub team_name: String,
    pub kills: i64,
    pub damage: i64,
    pub knockouts: i64,
}

/// Immutable scoring record of one completed match, in final rank order.
/// The history of these records is the authority the phase aggregate can be
/// rebuilt from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedMatch {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_team_name: Option<String>,
    pub elimination_order: Vec<String>,
    pub teams: Vec<FinalizedTeamResult>,
    pub players: Vec<FinalizedPlayerResult>,
    pub finalized_at: String,
}
