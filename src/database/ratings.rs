use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::PlayerRatingRow;
use crate::rating::{LeagueId, PlayerId, RatingState};

pub fn upsert_rating(
    conn: &Connection,
    player_id: PlayerId,
    league_id: LeagueId,
    state: &RatingState,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let sql = "INSERT INTO player_ratings (player_id, league_id, rating, deviation, volatility, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT (player_id, league_id) DO UPDATE SET
                   rating = excluded.rating,
                   deviation = excluded.deviation,
                   volatility = excluded.volatility,
                   updated_at = excluded.updated_at";

    conn.execute(
        sql,
        params![
            player_id,
            league_id,
            state.rating,
            state.deviation,
            state.volatility,
            updated_at
        ],
    )
    .context("Failed to upsert player rating")?;
    Ok(())
}

fn parse_rating_row(row: &rusqlite::Row) -> rusqlite::Result<PlayerRatingRow> {
    Ok(PlayerRatingRow {
        player_id: row.get(0)?,
        league_id: row.get(1)?,
        state: RatingState {
            rating: row.get(2)?,
            deviation: row.get(3)?,
            volatility: row.get(4)?,
        },
    })
}

pub fn get_rating(
    conn: &Connection,
    player_id: PlayerId,
    league_id: LeagueId,
) -> Result<Option<RatingState>> {
    let sql = "SELECT player_id, league_id, rating, deviation, volatility FROM player_ratings WHERE player_id = ?1 AND league_id = ?2";

    conn.query_row(sql, params![player_id, league_id], parse_rating_row)
        .optional()
        .map(|row| row.map(|r| r.state))
        .context("Failed to get player rating")
}

pub fn list_by_league(conn: &Connection, league_id: LeagueId) -> Result<Vec<PlayerRatingRow>> {
    let sql = "SELECT player_id, league_id, rating, deviation, volatility FROM player_ratings WHERE league_id = ?1 ORDER BY player_id";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![league_id], parse_rating_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn delete_by_league(conn: &Connection, league_id: LeagueId) -> Result<usize> {
    conn.execute(
        "DELETE FROM player_ratings WHERE league_id = ?1",
        params![league_id],
    )
    .context("Failed to delete league ratings")
}
