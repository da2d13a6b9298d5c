use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::LeaderboardEntry;
use super::ratings;
use crate::rating::{LeagueId, PlayerId};

const AROUND_LIMIT: usize = 5;

// Outcome counters are derived from the match entries of the league.
const ENTRY_SELECT: &str = "
    SELECT
        r.player_id,
        p.name,
        p.stream_url,
        r.rating,
        r.deviation,
        COALESCE(SUM(e.outcome = 'win'), 0),
        COALESCE(SUM(e.outcome = 'loss'), 0),
        COALESCE(SUM(e.outcome = 'draw'), 0),
        COALESCE(SUM(e.outcome = 'forfeit'), 0)
    FROM player_ratings r
    INNER JOIN players p ON (r.player_id = p.id)
    LEFT JOIN matches m ON (m.league_id = r.league_id)
    LEFT JOIN match_entries e ON (e.match_id = m.id AND e.player_id = r.player_id)";

fn parse_leaderboard_row(row: &rusqlite::Row) -> rusqlite::Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        player_id: row.get(0)?,
        player_name: row.get(1)?,
        player_stream_url: row.get(2)?,
        rating: row.get(3)?,
        deviation: row.get(4)?,
        wins: row.get(5)?,
        losses: row.get(6)?,
        draws: row.get(7)?,
        forfeits: row.get(8)?,
    })
}

/// Best rated players whose deviation is strictly below `max_deviation`.
/// Ties on rating are ordered by player id.
pub fn top(
    conn: &Connection,
    league_id: LeagueId,
    max_deviation: f64,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>> {
    let sql = format!(
        "{ENTRY_SELECT}
         WHERE r.league_id = ?1 AND r.deviation < ?2
         GROUP BY r.player_id
         ORDER BY r.rating DESC, r.player_id ASC
         LIMIT ?3"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![league_id, max_deviation, limit as i64], parse_leaderboard_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to query leaderboard")?;

    Ok(rows)
}

/// Up to five players rated strictly above `player_id`, the player, then up
/// to five rated at or below, highest rating first.
///
/// A player tied with someone else keeps them in the lower half; the player
/// is excluded from that half by id. Returns nothing when the player has no
/// rating in the league or nobody is around them.
pub fn around(
    conn: &Connection,
    league_id: LeagueId,
    player_id: PlayerId,
) -> Result<Vec<LeaderboardEntry>> {
    if ratings::get_rating(conn, player_id, league_id)?.is_none() {
        return Ok(Vec::new());
    }

    let own = format!(
        "{ENTRY_SELECT}
         WHERE r.league_id = ?1 AND r.player_id = ?2
         GROUP BY r.player_id"
    );
    let player = conn
        .query_row(&own, params![league_id, player_id], parse_leaderboard_row)
        .context("Failed to query player leaderboard entry")?;

    let mut above = neighbours(conn, league_id, &player, true)?;
    let below = neighbours(conn, league_id, &player, false)?;

    if above.is_empty() && below.is_empty() {
        return Ok(Vec::new());
    }

    // fetched nearest first, displayed highest first
    above.reverse();

    let mut entries = Vec::with_capacity(above.len() + 1 + below.len());
    entries.extend(above);
    entries.push(player);
    entries.extend(below);

    Ok(entries)
}

fn neighbours(
    conn: &Connection,
    league_id: LeagueId,
    player: &LeaderboardEntry,
    above: bool,
) -> Result<Vec<LeaderboardEntry>> {
    let (op, dir) = if above { (">", "ASC") } else { ("<=", "DESC") };
    let sql = format!(
        "{ENTRY_SELECT}
         WHERE r.league_id = ?1 AND r.rating {op} ?2 AND r.player_id != ?3
         GROUP BY r.player_id
         ORDER BY r.rating {dir}, r.player_id ASC
         LIMIT ?4"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![league_id, player.rating, player.player_id, AROUND_LIMIT as i64],
            parse_leaderboard_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to query leaderboard neighbours")?;

    Ok(rows)
}
