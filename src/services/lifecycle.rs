//! Session lifecycle: Open -> Active -> Closed.
//!
//! Every transition commits in its own write transaction. Seed generation
//! and notifications happen after the commit, so a slow or failing
//! collaborator never holds a transaction open.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use uuid::Uuid;

use super::ladder::Ladder;
use super::rating::{current_state, rate_session};
use super::recap::{RecapScope, build_recap, group_by_match};
use crate::database::{
    MatchSession, leagues, matches, players, sessions, with_read_transaction, with_transaction,
};
use crate::errors::{LadderError, ladder_error};
use crate::external::notifier::Notification;
use crate::rating::{LeagueId, PlayerId, RatingAlgorithm};
use crate::session::pairing::{pair_by_rating, resolve_outcomes};
use crate::session::{RaceResult, SessionStatus};

impl Ladder {
    /// Creates the league's next session once its join window has opened.
    /// Returns `None` when there is nothing to create, including when the
    /// session already exists.
    pub fn open_due_session(&self, league_id: LeagueId, now: DateTime<Utc>) -> Result<Option<MatchSession>> {
        let scheduler = &self.config.scheduler;

        let created = with_transaction(&self.pool, |tx| {
            let league = leagues::find_by_id(tx, league_id)?
                .ok_or_else(|| LadderError::Integrity(format!("league {league_id} vanished")))?;

            let start = match league.schedule.next_between(now, now + scheduler.lookahead) {
                Ok(start) => start,
                Err(LadderError::NoOccurrence { .. }) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            if now < start - scheduler.join_window {
                return Ok(None);
            }

            sessions::insert_if_absent(tx, league.id, start)
        })?;

        if let Some(session) = &created {
            info!(
                "Opened session {} of league {} starting at {}",
                session.id, league_id, session.start_date
            );
        }
        Ok(created)
    }

    pub fn join_session(&self, session_id: i32, player_id: PlayerId, now: DateTime<Utc>) -> Result<()> {
        with_transaction(&self.pool, |tx| {
            let session = require_joinable(tx, session_id, now)?;
            players::find_by_id(tx, player_id)?.ok_or(LadderError::PlayerNotFound(player_id))?;

            if !sessions::add_player(tx, session.id, player_id, now)? {
                return Err(LadderError::AlreadyJoined.into());
            }
            Ok(())
        })?;

        debug!("Player {} joined session {}", player_id, session_id);
        Ok(())
    }

    pub fn cancel_join(&self, session_id: i32, player_id: PlayerId, now: DateTime<Utc>) -> Result<()> {
        with_transaction(&self.pool, |tx| {
            let session = require_joinable(tx, session_id, now)?;

            if !sessions::remove_player(tx, session.id, player_id)? {
                return Err(LadderError::NotParticipating.into());
            }
            Ok(())
        })?;

        debug!("Player {} left session {}", player_id, session_id);
        Ok(())
    }

    /// Starts every open session of the league whose start time has come.
    pub async fn start_due_sessions(&self, league_id: LeagueId, now: DateTime<Utc>) -> Result<Vec<MatchSession>> {
        let due: Vec<MatchSession> = with_read_transaction(&self.pool, |tx| {
            sessions::list_by_status(tx, league_id, SessionStatus::Open)
        })?
        .into_iter()
        .filter(|session| session.start_date <= now)
        .collect();

        let mut started = Vec::with_capacity(due.len());
        for session in due {
            match self.start_session(session.id, now).await {
                Ok(session) => started.push(session),
                Err(e) if is_rejected_transition(&e) => debug!("Session {} already started", session.id),
                Err(e) => return Err(e),
            }
        }
        Ok(started)
    }

    /// Open -> Active: pairs the joined players, assigns a fresh seed and
    /// commits, then asks the generator for the race content.
    ///
    /// A session with fewer than two players has no race and is closed on
    /// the spot. A generation failure leaves the session active without a
    /// seed; the driver retries it later.
    pub async fn start_session(&self, session_id: i32, now: DateTime<Utc>) -> Result<MatchSession> {
        let algorithm = self.rating.as_ref();
        let session = with_transaction(&self.pool, |tx| activate(tx, algorithm, session_id, now))?;

        if session.status.is_closed() {
            info!("Session {} closed at start: not enough players", session.id);
            return Ok(session);
        }

        info!(
            "Session {} started with seed {}",
            session.id,
            session.seed.as_deref().unwrap_or_default()
        );

        if let Err(e) = self.generate_seed(session.id).await {
            error!("Seed generation for session {} failed: {:#}", session.id, e);
        }

        self.get_session(session.id)
    }

    /// Generates and stores the race content of an active session that does
    /// not have it yet. Retries with backoff unless the generator failed for
    /// good, and raises an operator alert the first time a session fails.
    pub async fn generate_seed(&self, session_id: i32) -> Result<()> {
        let (session, settings_ref) = with_read_transaction(&self.pool, |tx| {
            let session = require_session(tx, session_id)?;
            let league = leagues::find_by_id(tx, session.league_id)?
                .ok_or_else(|| LadderError::Integrity(format!("league {} vanished", session.league_id)))?;
            Ok((session, league.settings_ref))
        })?;

        if session.seed_ready || session.status != SessionStatus::Active {
            return Ok(());
        }
        let seed = session
            .seed
            .clone()
            .ok_or_else(|| LadderError::Integrity(format!("active session {session_id} has no seed")))?;

        let settings = &self.config.generator;
        let generated = settings
            .retry
            .retry_async_if(
                |_| {
                    let generator = self.generator.clone();
                    let (settings_ref, seed) = (settings_ref.clone(), seed.clone());
                    async move {
                        tokio::time::timeout(settings.timeout, generator.generate(&settings_ref, &seed))
                            .await
                            .map_err(|_| {
                                anyhow::Error::new(LadderError::Generator(format!(
                                    "timed out after {:?}",
                                    settings.timeout
                                )))
                            })?
                    }
                },
                is_retryable,
            )
            .await;

        let generated = match generated {
            Ok(generated) => generated,
            Err(e) => {
                let fatal = !is_retryable(&e);
                let message = format!(
                    "Seed generation for session {} (seed {}) {}: {:#}",
                    session_id,
                    seed,
                    if fatal { "failed for good" } else { "ran out of attempts" },
                    e
                );
                error!("{}", message);

                let first = with_transaction(&self.pool, |tx| {
                    sessions::record_seed_failure(tx, session_id, &format!("{e:#}"), fatal)
                })?;
                if first {
                    self.notify(Notification::OperatorAlert { message }).await;
                }
                return Err(e);
            }
        };

        let stored = with_transaction(&self.pool, |tx| {
            sessions::store_seed_output(tx, session_id, &generated.patch, &generated.spoiler_log)
        })?;

        if stored {
            info!("Seed {} ready for session {}", seed, session_id);
        } else {
            warn!("Seed output of session {} was already stored", session_id);
        }
        Ok(())
    }

    /// Records a player's result. Closes the session once every player has
    /// reported and returns it in that case.
    pub async fn submit_result(
        &self,
        session_id: i32,
        player_id: PlayerId,
        result: RaceResult,
        now: DateTime<Utc>,
    ) -> Result<Option<MatchSession>> {
        if let RaceResult::Finished(seconds @ ..0) = result {
            return Err(LadderError::InvalidFinishTime(seconds).into());
        }

        let algorithm = self.rating.as_ref();
        let closed = with_transaction(&self.pool, |tx| {
            let session = require_session(tx, session_id)?;
            if session.status != SessionStatus::Active {
                return Err(LadderError::RaceNotRunning.into());
            }
            if !session.seed_ready {
                return Err(LadderError::SeedNotReady.into());
            }

            let entry = matches::find_entry(tx, session_id, player_id)?
                .ok_or(LadderError::NotParticipating)?;
            if entry.result.is_some() {
                return Err(LadderError::AlreadySubmitted.into());
            }
            matches::record_result(tx, entry.id, result, now)?;

            if matches::count_pending(tx, session_id)? > 0 {
                return Ok(None);
            }
            close(tx, algorithm, session, now).map(Some)
        })?;

        if let Some(session) = &closed {
            self.announce_close(session).await;
        }
        Ok(closed)
    }

    /// Administrative close. Players who have not reported forfeit.
    /// Closing an already closed session is rejected and changes nothing.
    pub async fn force_close(&self, session_id: i32, now: DateTime<Utc>) -> Result<MatchSession> {
        let algorithm = self.rating.as_ref();
        let session = with_transaction(&self.pool, |tx| {
            let session = require_session(tx, session_id)?;
            close(tx, algorithm, session, now)
        })?;

        self.announce_close(&session).await;
        Ok(session)
    }

    /// Retries seed generation for active sessions still missing their
    /// content. Sessions whose generator failed for good are left to the
    /// race timeout.
    pub async fn retry_missing_seeds(&self, league_id: LeagueId) -> Result<usize> {
        let missing = with_read_transaction(&self.pool, |tx| sessions::list_awaiting_seed(tx, league_id))?;

        let mut recovered = 0;
        for session_id in missing {
            match self.generate_seed(session_id).await {
                Ok(()) => recovered += 1,
                Err(e) => warn!("Seed for session {} still missing: {:#}", session_id, e),
            }
        }
        Ok(recovered)
    }

    /// Force-closes active sessions of the league that started longer ago
    /// than the race timeout.
    pub async fn close_timed_out_sessions(&self, league_id: LeagueId, now: DateTime<Utc>) -> Result<usize> {
        let deadline = now - self.config.scheduler.race_timeout;
        let expired: Vec<i32> = with_read_transaction(&self.pool, |tx| {
            sessions::list_by_status(tx, league_id, SessionStatus::Active)
        })?
        .into_iter()
        .filter(|session| session.started_at.unwrap_or(session.start_date) <= deadline)
        .map(|session| session.id)
        .collect();

        let mut closed = 0;
        for session_id in expired {
            info!("Session {} timed out", session_id);
            match self.force_close(session_id, now).await {
                Ok(_) => closed += 1,
                Err(e) if is_rejected_transition(&e) => debug!("Session {} already closed", session_id),
                Err(e) => return Err(e),
            }
        }
        Ok(closed)
    }

    pub fn get_session(&self, session_id: i32) -> Result<MatchSession> {
        with_read_transaction(&self.pool, |tx| require_session(tx, session_id))
    }

    /// The patch of a running race, for one of its participants.
    pub fn get_seed_patch(&self, session_id: i32, player_id: PlayerId) -> Result<Vec<u8>> {
        with_read_transaction(&self.pool, |tx| {
            let session = require_session(tx, session_id)?;
            if session.status != SessionStatus::Active {
                return Err(LadderError::RaceNotRunning.into());
            }
            matches::find_entry(tx, session_id, player_id)?.ok_or(LadderError::NotParticipating)?;

            sessions::get_seed_patch(tx, session_id)?.ok_or_else(|| LadderError::SeedNotReady.into())
        })
    }

    pub fn get_session_players(&self, session_id: i32) -> Result<Vec<PlayerId>> {
        with_read_transaction(&self.pool, |tx| {
            require_session(tx, session_id)?;
            sessions::list_player_ids(tx, session_id)
        })
    }

    /// Next session of the league still accepting players.
    pub fn get_next_open_session(&self, short_code: &str) -> Result<Option<MatchSession>> {
        with_read_transaction(&self.pool, |tx| {
            let league = super::ladder::require_league(tx, short_code)?;
            sessions::find_next_open(tx, league.id)
        })
    }

    async fn announce_close(&self, session: &MatchSession) {
        let recap = with_read_transaction(&self.pool, |tx| {
            let league = leagues::find_by_id(tx, session.league_id)?
                .ok_or_else(|| LadderError::Integrity(format!("league {} vanished", session.league_id)))?;
            let recap = build_recap(tx, &league, session, RecapScope::Full)?;
            Ok((league.announce_channel, recap))
        });

        match recap {
            Ok((to, recap)) => {
                self.notify(Notification::SessionRecap { to, recap }).await;
            }
            Err(e) => error!("Failed to build recap of session {}: {:#}", session.id, e),
        }
    }
}

fn require_session(conn: &Connection, session_id: i32) -> Result<MatchSession> {
    sessions::find_by_id(conn, session_id)?
        .ok_or_else(|| LadderError::SessionNotFound(session_id).into())
}

fn require_joinable(conn: &Connection, session_id: i32, now: DateTime<Utc>) -> Result<MatchSession> {
    let session = require_session(conn, session_id)?;
    if session.status != SessionStatus::Open || now >= session.start_date {
        return Err(LadderError::JoinClosed.into());
    }
    Ok(session)
}

fn activate(
    conn: &Connection,
    algorithm: &dyn RatingAlgorithm,
    session_id: i32,
    now: DateTime<Utc>,
) -> Result<MatchSession> {
    let session = require_session(conn, session_id)?;
    let status = session.status.activate()?;

    let mut joined = Vec::new();
    for player_id in sessions::list_player_ids(conn, session.id)? {
        let state = current_state(conn, algorithm, player_id, session.league_id)?;
        joined.push((player_id, state.rating));
    }
    let pairing = pair_by_rating(&joined);

    if pairing.pairs.is_empty() {
        sessions::mark_active(conn, session.id, None, now)?;
        status.close()?;
        sessions::mark_closed(conn, session.id, now)?;
        return require_session(conn, session.id);
    }

    let seed = Uuid::new_v4().simple().to_string().to_uppercase();
    sessions::mark_active(conn, session.id, Some(&seed), now)?;

    for (a, b) in &pairing.pairs {
        let row = matches::insert_match(conn, session.id, session.league_id)?;
        matches::insert_entry(conn, row.id, session.id, *a)?;
        matches::insert_entry(conn, row.id, session.id, *b)?;
    }
    if let Some(player_id) = pairing.left_out {
        info!("Player {} sits out session {}: odd player count", player_id, session.id);
    }

    require_session(conn, session.id)
}

/// Active -> Closed: forfeits missing results, settles every match, rates
/// the participants and marks the session closed, all in `conn`'s
/// transaction.
///
/// A session whose seed never got generated had no race. Its matches are
/// dropped and nobody is rated.
fn close(
    conn: &Connection,
    algorithm: &dyn RatingAlgorithm,
    session: MatchSession,
    now: DateTime<Utc>,
) -> Result<MatchSession> {
    session.status.close()?;

    if !session.seed_ready {
        let dropped = matches::delete_for_session(conn, session.id)?;
        sessions::mark_closed(conn, session.id, now)?;
        warn!("Session {} closed without a seed, {} matches dropped", session.id, dropped);
        return require_session(conn, session.id);
    }

    let entries = matches::list_entries_for_session(conn, session.id)?;
    for entry in entries.iter().filter(|entry| entry.result.is_none()) {
        matches::record_result(conn, entry.id, RaceResult::Forfeit, now)?;
    }

    for group in group_by_match(&entries) {
        if let [a, b] = group {
            let (outcome_a, outcome_b) = resolve_outcomes(a.result, b.result);
            matches::set_outcome(conn, a.id, outcome_a)?;
            matches::set_outcome(conn, b.id, outcome_b)?;
        }
    }

    let rated = rate_session(conn, algorithm, &session, now)
        .with_context(|| format!("Failed to rate session {}", session.id))?;
    sessions::mark_closed(conn, session.id, now)?;

    info!("Session {} closed, {} players rated", session.id, rated);
    require_session(conn, session.id)
}

// Errors that are not ladder errors come from the generator's own plumbing
// and may go away.
fn is_retryable(err: &anyhow::Error) -> bool {
    ladder_error(err).is_none_or(LadderError::is_retryable)
}

/// Whether `err` is a rejected state transition rather than a failure.
pub fn is_rejected_transition(err: &anyhow::Error) -> bool {
    matches!(ladder_error(err), Some(LadderError::InvalidTransition { .. }))
}
