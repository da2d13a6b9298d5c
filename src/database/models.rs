use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::rating::{LeagueId, PlayerId, RatingState};
use crate::schedule::Schedule;
use crate::session::{Outcome, RaceResult, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Game {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct League {
    pub id: LeagueId,
    pub game_id: i32,
    pub short_code: String,
    pub name: String,
    /// Settings handed to the seed generator.
    pub settings_ref: String,
    pub announce_channel: Option<String>,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub discord_id: Option<String>,
    pub stream_url: Option<String>,
}

/// A session row without its seed blobs, which are loaded on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSession {
    pub id: i32,
    pub league_id: LeagueId,
    pub status: SessionStatus,
    pub start_date: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub seed: Option<String>,
    pub seed_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRow {
    pub id: i32,
    pub session_id: i32,
    pub league_id: LeagueId,
}

/// One player's side of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    pub id: i32,
    pub match_id: i32,
    pub session_id: i32,
    pub player_id: PlayerId,
    pub player_name: String,
    /// `None` until the player reports.
    pub result: Option<RaceResult>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Set when the session closes.
    pub outcome: Option<Outcome>,
}

impl MatchEntry {
    pub fn finish_seconds(&self) -> Option<i64> {
        match self.result {
            Some(RaceResult::Finished(seconds)) => Some(seconds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerRatingRow {
    pub player_id: PlayerId,
    pub league_id: LeagueId,
    pub state: RatingState,
}

/// Leaderboard projection, computed on every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub player_name: String,
    pub player_stream_url: Option<String>,
    pub rating: f64,
    pub deviation: f64,
    pub wins: i32,
    pub losses: i32,
    pub draws: i32,
    pub forfeits: i32,
}

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Outcome {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Outcome {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}
