use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;
use serde::Serialize;

use super::rating::rate_session;
use super::recap::{RecapScope, build_recap};
use crate::config::settings::AppConfig;
use crate::database::{
    self, DbPool, Game, LeaderboardEntry, League, MatchSession, Player, games, leaderboard,
    leagues, players, ratings, sessions, with_read_transaction, with_transaction,
};
use crate::errors::LadderError;
use crate::external::notifier::{self, Notification, Notifier};
use crate::external::generator::{self, SeedGenerator};
use crate::rating::{Glicko2, PlayerId, RatingAlgorithm};
use crate::schedule::Schedule;
use crate::session::SessionStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeagueOverview {
    pub league: League,
    pub next_session_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameOverview {
    pub game: Game,
    pub leagues: Vec<LeagueOverview>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionListing {
    pub session: MatchSession,
    pub league: League,
}

/// Entry point of the ladder: owns the store and the external collaborators
/// and exposes every operation as plain data in, plain data out.
#[derive(Clone)]
pub struct Ladder {
    pub(super) pool: DbPool,
    pub(super) config: AppConfig,
    pub(super) rating: Arc<dyn RatingAlgorithm>,
    pub(super) generator: Arc<dyn SeedGenerator>,
    pub(super) notifier: Arc<dyn Notifier>,
}

impl Ladder {
    /// Builds the ladder on an already migrated pool.
    pub fn new(
        pool: DbPool,
        config: AppConfig,
        generator: Arc<dyn SeedGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rating = Arc::new(Glicko2::new(&config.rating));
        Self {
            pool,
            config,
            rating,
            generator,
            notifier,
        }
    }

    /// Opens the configured database, applies the schema and wires the
    /// collaborators named by the configuration.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let pool = database::create_pool(&config.database_path)?;
        database::setup::migrate(&*database::get_connection(&pool)?)?;

        let generator = generator::from_settings(&config.generator);
        let notifier = notifier::from_settings(&config.notifier)?;

        Ok(Self::new(pool, config, generator, notifier))
    }

    pub fn with_rating_algorithm(mut self, rating: Arc<dyn RatingAlgorithm>) -> Self {
        self.rating = rating;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // Administration

    pub fn create_game(&self, name: &str) -> Result<Game> {
        with_transaction(&self.pool, |tx| games::upsert_game(tx, name))
    }

    pub fn create_league(
        &self,
        game_name: &str,
        short_code: &str,
        name: &str,
        settings_ref: &str,
        schedule: &Schedule,
    ) -> Result<League> {
        let league = with_transaction(&self.pool, |tx| {
            let game = games::find_by_name(tx, game_name)?
                .ok_or_else(|| LadderError::GameNotFound(game_name.to_string()))?;
            leagues::insert_league(tx, game.id, short_code, name, settings_ref, schedule)
        })?;

        info!("Created league {} ({})", league.short_code, league.name);
        Ok(league)
    }

    pub fn set_league_schedule(&self, short_code: &str, schedule: &Schedule) -> Result<()> {
        with_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            leagues::update_schedule(tx, league.id, schedule)
        })
    }

    /// Sets or clears the channel receiving the league's recaps.
    pub fn set_league_announce_channel(&self, short_code: &str, channel: Option<&str>) -> Result<()> {
        with_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            leagues::update_announce_channel(tx, league.id, channel)
        })
    }

    pub fn get_league_by_shortcode(&self, short_code: &str) -> Result<League> {
        with_read_transaction(&self.pool, |tx| require_league(tx, short_code))
    }

    pub fn get_leagues(&self) -> Result<Vec<League>> {
        with_read_transaction(&self.pool, |tx| leagues::list_all(tx))
    }

    pub fn register_player(
        &self,
        name: &str,
        discord_id: Option<&str>,
        stream_url: Option<&str>,
    ) -> Result<Player> {
        let player = with_transaction(&self.pool, |tx| {
            players::insert_player(tx, name, discord_id, stream_url)
        })?;

        info!("Registered player {} (id {})", player.name, player.id);
        Ok(player)
    }

    pub fn get_player_by_discord_id(&self, discord_id: &str) -> Result<Player> {
        with_read_transaction(&self.pool, |tx| {
            players::find_by_discord_id(tx, discord_id)?
                .ok_or_else(|| LadderError::PlayerNotRegistered(discord_id.to_string()).into())
        })
    }

    // Queries

    /// Every game with its leagues and the start of each league's next
    /// session: the earliest open session, or else the next scheduled slot.
    pub fn get_games_leagues_and_next_session_start(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameOverview>> {
        let lookahead = self.config.scheduler.lookahead;

        with_read_transaction(&self.pool, |tx| {
            let all_leagues = leagues::list_all(tx)?;
            let mut overview = Vec::new();

            for game in games::list_all(tx)? {
                let mut game_leagues = Vec::new();
                for league in all_leagues.iter().filter(|l| l.game_id == game.id) {
                    let next_session_start = match sessions::find_next_open(tx, league.id)? {
                        Some(session) => Some(session.start_date),
                        None => league.schedule.next_between(now, now + lookahead).ok(),
                    };
                    game_leagues.push(LeagueOverview {
                        league: league.clone(),
                        next_session_start,
                    });
                }
                overview.push(GameOverview {
                    game,
                    leagues: game_leagues,
                });
            }

            Ok(overview)
        })
    }

    /// Public leaderboard: players below `max_deviation`, best first.
    pub fn get_leaderboard(&self, short_code: &str, max_deviation: f64) -> Result<Vec<LeaderboardEntry>> {
        let limit = self.config.rating.top_limit;

        with_read_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            leaderboard::top(tx, league.id, max_deviation, limit)
        })
    }

    pub fn get_leaderboard_around_player(
        &self,
        player_id: PlayerId,
        short_code: &str,
    ) -> Result<Vec<LeaderboardEntry>> {
        with_read_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            players::find_by_id(tx, player_id)?.ok_or(LadderError::PlayerNotFound(player_id))?;
            leaderboard::around(tx, league.id, player_id)
        })
    }

    /// Top of the board and the window around the player behind
    /// `discord_id`. The window is empty for unknown accounts.
    pub fn get_leaderboards_for_discord_user(
        &self,
        discord_id: &str,
        short_code: &str,
    ) -> Result<(Vec<LeaderboardEntry>, Vec<LeaderboardEntry>)> {
        let threshold = self.config.rating.deviation_threshold;
        let limit = self.config.rating.top_limit;

        with_read_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            let top = leaderboard::top(tx, league.id, threshold, limit)?;
            let around = match players::find_by_discord_id(tx, discord_id)? {
                Some(player) => leaderboard::around(tx, league.id, player.id)?,
                None => Vec::new(),
            };
            Ok((top, around))
        })
    }

    /// Sessions of every league starting within `[from, to]`, newest first.
    pub fn get_match_sessions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[SessionStatus],
    ) -> Result<Vec<SessionListing>> {
        with_read_transaction(&self.pool, |tx| {
            let by_id: HashMap<_, _> = leagues::list_all(tx)?
                .into_iter()
                .map(|league| (league.id, league))
                .collect();

            sessions::list_between(tx, from, to, statuses)?
                .into_iter()
                .map(|session| -> Result<SessionListing> {
                    let league = by_id.get(&session.league_id).cloned().ok_or_else(|| {
                        LadderError::Integrity(format!(
                            "session {} references missing league {}",
                            session.id, session.league_id
                        ))
                    })?;
                    Ok(SessionListing { session, league })
                })
                .collect()
        })
    }

    // Commands

    /// Rebuilds every rating of the league by replaying its closed sessions
    /// in start order. Runs in one write transaction: readers see the old
    /// ratings until it commits, and any failure leaves them untouched.
    pub fn rerank(&self, short_code: &str) -> Result<usize> {
        let algorithm = self.rating.as_ref();

        let (league, replayed) = with_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            let cleared = ratings::delete_by_league(tx, league.id)?;
            log::debug!("Cleared {} ratings of league {}", cleared, league.short_code);

            let closed = sessions::list_by_status(tx, league.id, SessionStatus::Closed)?;
            for session in &closed {
                let rated_at = session.ended_at.unwrap_or(session.start_date);
                rate_session(tx, algorithm, session, rated_at)
                    .with_context(|| format!("Failed to replay session {}", session.id))?;
            }

            Ok((league, closed.len()))
        })?;

        info!("Reranked league {} from {} sessions", league.short_code, replayed);
        Ok(replayed)
    }

    /// Sends `to_user` a recap of every running session of the league.
    pub async fn send_recaps(&self, to_user: &str, short_code: &str, scope: RecapScope) -> Result<usize> {
        let recaps = with_read_transaction(&self.pool, |tx| {
            let league = require_league(tx, short_code)?;
            sessions::list_by_status(tx, league.id, SessionStatus::Active)?
                .iter()
                .map(|session| build_recap(tx, &league, session, scope))
                .collect::<Result<Vec<_>>>()
        })?;

        let count = recaps.len();
        for recap in recaps {
            let notification = Notification::SessionRecap {
                to: Some(to_user.to_string()),
                recap,
            };
            self.notify(notification).await;
        }

        Ok(count)
    }

    /// Sends the spoiler log of `seed` to `player`. Until the race is closed
    /// only administrators may read it.
    pub async fn send_seed_spoiler_log(&self, player: &Player, seed: &str, is_admin: bool) -> Result<()> {
        let spoiler_log = with_read_transaction(&self.pool, |tx| {
            let session = sessions::find_by_seed(tx, seed)?
                .ok_or_else(|| LadderError::SeedNotFound(seed.to_string()))?;

            if !is_admin && !session.status.is_closed() {
                return Err(LadderError::SpoilerLogLocked(seed.to_string()).into());
            }

            sessions::get_spoiler_log(tx, session.id)?.ok_or_else(|| LadderError::SeedNotReady.into())
        })?;

        let notification = Notification::SpoilerLogUnlocked {
            player: player.name.clone(),
            seed: seed.to_string(),
            spoiler_log,
        };
        self.notify(notification).await;

        Ok(())
    }

    pub(super) async fn notify(&self, notification: Notification) {
        notifier::deliver(self.notifier.as_ref(), notification, self.config.notifier.timeout).await;
    }
}

pub(super) fn require_league(conn: &Connection, short_code: &str) -> Result<League> {
    leagues::find_by_short_code(conn, short_code)?
        .ok_or_else(|| LadderError::LeagueNotFound(short_code.to_string()).into())
}
