use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use race_ladder::config::settings::AppConfig;
use race_ladder::database::{
    self, DbPool, MatchSession, PlayerRatingRow, create_memory_pool, get_connection, ratings,
};
use race_ladder::errors::{ErrorKind, LadderError, ladder_error, public_message};
use race_ladder::external::{
    FixtureGenerator, GeneratedSeed, Notification, RecordingNotifier, RetryPolicy, SeedGenerator,
};
use race_ladder::rating::PlayerId;
use race_ladder::schedule::{Schedule, Slot};
use race_ladder::services::{Ladder, RecapScope};
use race_ladder::session::{Outcome, RaceResult, SessionStatus};

/// Fails the first `failures` calls, then behaves like the fixture generator.
struct FlakyGenerator {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl SeedGenerator for FlakyGenerator {
    async fn generate(&self, settings_ref: &str, seed: &str) -> Result<GeneratedSeed> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(LadderError::Generator("randomizer crashed".to_string()).into());
        }
        FixtureGenerator.generate(settings_ref, seed).await
    }
}

/// A generator that cannot run at all.
#[derive(Default)]
struct MissingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl SeedGenerator for MissingGenerator {
    async fn generate(&self, _settings_ref: &str, _seed: &str) -> Result<GeneratedSeed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LadderError::GeneratorUnavailable("unable to run randomizer".to_string()).into())
    }
}

struct TestLadder {
    ladder: Ladder,
    pool: DbPool,
    notifier: Arc<RecordingNotifier>,
    league_id: i32,
}

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

// Every day at 20:00 UTC; 2024-05-06 is a Monday.
const START: &str = "2024-05-06T20:00:00Z";
const JOIN_TIME: &str = "2024-05-06T19:30:00Z";

fn setup_with(generator: Arc<dyn SeedGenerator>) -> TestLadder {
    let pool = create_memory_pool().unwrap();
    database::setup::migrate(&get_connection(&pool).unwrap()).unwrap();

    let mut config = AppConfig::new();
    config.generator.retry = RetryPolicy::new(2, 1, 1);

    let notifier = Arc::new(RecordingNotifier::new());
    let ladder = Ladder::new(pool.clone(), config, generator, notifier.clone());

    let mut schedule = Schedule::new();
    schedule.set_all(&["20:00 Etc/UTC".parse::<Slot>().unwrap()]);
    ladder.create_game("Ocarina of Time").unwrap();
    let league = ladder
        .create_league("Ocarina of Time", "std", "Standard", "s3.json", &schedule)
        .unwrap();

    TestLadder {
        ladder,
        pool,
        notifier,
        league_id: league.id,
    }
}

fn setup() -> TestLadder {
    setup_with(Arc::new(FixtureGenerator))
}

impl TestLadder {
    fn players(&self, names: &[&str]) -> Vec<PlayerId> {
        names
            .iter()
            .map(|name| self.ladder.register_player(name, None, None).unwrap().id)
            .collect()
    }

    async fn start_race(&self, players: &[PlayerId]) -> MatchSession {
        let session = self
            .ladder
            .open_due_session(self.league_id, at(JOIN_TIME))
            .unwrap()
            .expect("session should open inside the join window");
        for player in players {
            self.ladder.join_session(session.id, *player, at(JOIN_TIME)).unwrap();
        }

        let started = self
            .ladder
            .start_due_sessions(self.league_id, at(START))
            .await
            .unwrap();
        assert_eq!(started.len(), 1);
        started.into_iter().next().unwrap()
    }

    fn ratings(&self) -> Vec<PlayerRatingRow> {
        let conn = get_connection(&self.pool).unwrap();
        ratings::list_by_league(&conn, self.league_id).unwrap()
    }

    fn alerts(&self) -> usize {
        self.notifier
            .sent()
            .iter()
            .filter(|n| matches!(n, Notification::OperatorAlert { .. }))
            .count()
    }

    fn count(&self, sql: &str, session_id: i32) -> i64 {
        let conn = get_connection(&self.pool).unwrap();
        conn.query_row(sql, rusqlite::params![session_id], |row| row.get(0)).unwrap()
    }

    fn rating_of(&self, player: PlayerId) -> PlayerRatingRow {
        self.ratings()
            .into_iter()
            .find(|row| row.player_id == player)
            .expect("player should be rated")
    }
}

fn finished(minutes: i64) -> RaceResult {
    RaceResult::Finished(minutes * 60)
}

#[tokio::test]
async fn test_session_opens_once_inside_join_window() {
    let t = setup();

    let early = t.ladder.open_due_session(t.league_id, at("2024-05-06T18:30:00Z")).unwrap();
    assert!(early.is_none());

    let opened = t.ladder.open_due_session(t.league_id, at("2024-05-06T19:15:00Z")).unwrap();
    let opened = opened.expect("session should open");
    assert_eq!(opened.status, SessionStatus::Open);
    assert_eq!(opened.start_date, at(START));

    let again = t.ladder.open_due_session(t.league_id, at("2024-05-06T19:45:00Z")).unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn test_full_race_updates_ratings_and_sends_recap() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda", "Ganon", "Navi"]);

    let session = t.start_race(&ids).await;
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.seed_ready);
    assert!(session.seed.is_some());

    let now = at("2024-05-06T22:00:00Z");
    assert!(t.ladder.submit_result(session.id, ids[0], finished(90), now).await.unwrap().is_none());
    assert!(t.ladder.submit_result(session.id, ids[1], finished(95), now).await.unwrap().is_none());
    assert!(t.ladder.submit_result(session.id, ids[2], RaceResult::Forfeit, now).await.unwrap().is_none());
    let closed = t
        .ladder
        .submit_result(session.id, ids[3], finished(120), now)
        .await
        .unwrap()
        .expect("last result closes the session");

    assert_eq!(closed.status, SessionStatus::Closed);
    assert_eq!(closed.ended_at, Some(now));

    assert!(t.rating_of(ids[0]).state.rating > 1500.0);
    assert!(t.rating_of(ids[1]).state.rating < 1500.0);
    assert!(t.rating_of(ids[2]).state.rating < 1500.0);
    assert!(t.rating_of(ids[3]).state.rating > 1500.0);
    assert!(t.ratings().iter().all(|row| row.state.deviation < 350.0));

    let recap = t
        .notifier
        .sent()
        .into_iter()
        .find_map(|n| match n {
            Notification::SessionRecap { to: None, recap } => Some(recap),
            _ => None,
        })
        .expect("closing sends a recap");
    assert_eq!(recap.matches.len(), 2);
    assert_eq!(recap.matches[1].entries[0].outcome, Some(Outcome::Forfeit));
    assert_eq!(recap.matches[1].entries[1].outcome, Some(Outcome::Win));
}

#[tokio::test]
async fn test_odd_player_sits_out() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda", "Ganon"]);

    let session = t.start_race(&ids).await;
    let err = t
        .ladder
        .submit_result(session.id, ids[2], finished(80), at("2024-05-06T21:30:00Z"))
        .await
        .unwrap_err();

    assert!(matches!(ladder_error(&err), Some(LadderError::NotParticipating)));
}

#[tokio::test]
async fn test_lonely_session_closes_at_start() {
    let t = setup();
    let ids = t.players(&["Link"]);

    let session = t.start_race(&ids).await;

    assert_eq!(session.status, SessionStatus::Closed);
    assert!(session.seed.is_none());
    assert!(t.ratings().is_empty());
}

#[tokio::test]
async fn test_join_rules() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t
        .ladder
        .open_due_session(t.league_id, at(JOIN_TIME))
        .unwrap()
        .unwrap();

    t.ladder.join_session(session.id, ids[0], at(JOIN_TIME)).unwrap();
    let twice = t.ladder.join_session(session.id, ids[0], at(JOIN_TIME)).unwrap_err();
    assert!(matches!(ladder_error(&twice), Some(LadderError::AlreadyJoined)));

    t.ladder.cancel_join(session.id, ids[0], at(JOIN_TIME)).unwrap();
    let gone = t.ladder.cancel_join(session.id, ids[0], at(JOIN_TIME)).unwrap_err();
    assert!(matches!(ladder_error(&gone), Some(LadderError::NotParticipating)));

    let late = t.ladder.join_session(session.id, ids[1], at(START)).unwrap_err();
    assert!(matches!(ladder_error(&late), Some(LadderError::JoinClosed)));
    assert_eq!(public_message(&late).as_deref(), Some("registrations for this race are closed"));

    assert!(t.ladder.get_session_players(session.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_seed_failure_keeps_session_active_until_retry() {
    let t = setup_with(Arc::new(FlakyGenerator {
        failures: 2,
        calls: AtomicUsize::new(0),
    }));
    let ids = t.players(&["Link", "Zelda"]);

    let session = t.start_race(&ids).await;
    assert_eq!(session.status, SessionStatus::Active);
    assert!(!session.seed_ready);

    let err = t
        .ladder
        .submit_result(session.id, ids[0], finished(90), at("2024-05-06T21:30:00Z"))
        .await
        .unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::SeedNotReady)));

    assert!(
        t.notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::OperatorAlert { .. }))
    );

    assert_eq!(t.ladder.retry_missing_seeds(t.league_id).await.unwrap(), 1);
    assert!(t.ladder.get_session(session.id).unwrap().seed_ready);
}

#[tokio::test]
async fn test_seedless_race_times_out_without_rating() {
    let generator = Arc::new(FlakyGenerator {
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    });
    let t = setup_with(generator.clone());
    let ids = t.players(&["Link", "Zelda"]);

    let session = t.start_race(&ids).await;
    assert!(!session.seed_ready);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    assert_eq!(t.ladder.retry_missing_seeds(t.league_id).await.unwrap(), 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
    assert_eq!(t.alerts(), 1);

    let closed = t
        .ladder
        .close_timed_out_sessions(t.league_id, at("2024-05-07T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(closed, 1);
    assert!(t.ladder.get_session(session.id).unwrap().status.is_closed());
    assert!(t.ratings().is_empty());
    assert_eq!(t.count("SELECT COUNT(*) FROM matches WHERE session_id = ?1", session.id), 0);

    t.ladder.rerank("std").unwrap();
    assert!(t.ratings().is_empty());
}

#[tokio::test]
async fn test_unavailable_generator_is_not_retried() {
    let generator = Arc::new(MissingGenerator::default());
    let t = setup_with(generator.clone());
    let ids = t.players(&["Link", "Zelda"]);

    let session = t.start_race(&ids).await;
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    assert_eq!(t.ladder.retry_missing_seeds(t.league_id).await.unwrap(), 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.alerts(), 1);
}

#[tokio::test]
async fn test_failed_rating_leaves_race_untouched() {
    let t = setup();
    let other = t
        .ladder
        .create_league("Ocarina of Time", "other", "Other", "s3.json", &Schedule::new())
        .unwrap();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;
    t.ladder
        .submit_result(session.id, ids[0], finished(90), at("2024-05-06T21:30:00Z"))
        .await
        .unwrap();

    {
        let conn = get_connection(&t.pool).unwrap();
        conn.execute(
            "INSERT INTO matches (session_id, league_id) VALUES (?1, ?2)",
            rusqlite::params![session.id, other.id],
        )
        .unwrap();
    }

    let err = t.ladder.force_close(session.id, at("2024-05-06T23:00:00Z")).await.unwrap_err();
    assert_eq!(ladder_error(&err).unwrap().kind(), ErrorKind::IntegrityViolation);

    assert_eq!(t.ladder.get_session(session.id).unwrap().status, SessionStatus::Active);
    assert_eq!(
        t.count("SELECT COUNT(*) FROM match_entries WHERE session_id = ?1 AND result IS NULL", session.id),
        1
    );
    assert_eq!(
        t.count("SELECT COUNT(*) FROM match_entries WHERE session_id = ?1 AND outcome IS NOT NULL", session.id),
        0
    );
    assert!(t.ratings().is_empty());
    assert!(
        !t.notifier
            .sent()
            .iter()
            .any(|n| matches!(n, Notification::SessionRecap { .. }))
    );
}

#[tokio::test]
async fn test_recap_goes_to_announce_channel() {
    let t = setup();
    t.ladder.set_league_announce_channel("std", Some("#races")).unwrap();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;

    let now = at("2024-05-06T21:30:00Z");
    t.ladder.submit_result(session.id, ids[0], finished(90), now).await.unwrap();
    t.ladder.submit_result(session.id, ids[1], finished(91), now).await.unwrap();

    let targets: Vec<Option<String>> = t
        .notifier
        .sent()
        .into_iter()
        .filter_map(|n| match n {
            Notification::SessionRecap { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![Some("#races".to_string())]);
}

#[tokio::test]
async fn test_seed_patch_is_served_to_participants() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda", "Ganon"]);
    let session = t.start_race(&ids).await;

    let patch = t.ladder.get_seed_patch(session.id, ids[0]).unwrap();
    assert!(!patch.is_empty());

    // the odd player sits out
    let err = t.ladder.get_seed_patch(session.id, ids[2]).unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::NotParticipating)));

    t.ladder.force_close(session.id, at("2024-05-06T23:00:00Z")).await.unwrap();
    let err = t.ladder.get_seed_patch(session.id, ids[0]).unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::RaceNotRunning)));
}

#[tokio::test]
async fn test_force_close_twice_does_not_rate_twice() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;

    let now = at("2024-05-06T21:30:00Z");
    t.ladder.submit_result(session.id, ids[0], finished(90), now).await.unwrap();

    let closed = t.ladder.force_close(session.id, now).await.unwrap();
    assert_eq!(closed.status, SessionStatus::Closed);
    let after_first = t.ratings();
    assert_eq!(after_first.len(), 2);

    let err = t.ladder.force_close(session.id, now).await.unwrap_err();
    assert_eq!(ladder_error(&err).unwrap().kind(), ErrorKind::PreconditionFailed);
    assert_eq!(t.ratings(), after_first);

    assert!(t.rating_of(ids[0]).state.rating > t.rating_of(ids[1]).state.rating);
}

#[tokio::test]
async fn test_timed_out_race_is_closed() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;

    let closed = t
        .ladder
        .close_timed_out_sessions(t.league_id, at("2024-05-06T22:00:00Z"))
        .await
        .unwrap();
    assert_eq!(closed, 0);

    let closed = t
        .ladder
        .close_timed_out_sessions(t.league_id, at("2024-05-07T00:00:00Z"))
        .await
        .unwrap();
    assert_eq!(closed, 1);
    assert!(t.ladder.get_session(session.id).unwrap().status.is_closed());
}

#[tokio::test]
async fn test_spoiler_log_is_locked_until_close() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;
    let seed = session.seed.clone().unwrap();
    let link = t.ladder.register_player("Epona", None, None).unwrap();

    let err = t.ladder.send_seed_spoiler_log(&link, &seed, false).await.unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::SpoilerLogLocked(_))));

    t.ladder.send_seed_spoiler_log(&link, &seed, true).await.unwrap();

    t.ladder.force_close(session.id, at("2024-05-06T21:00:00Z")).await.unwrap();
    t.ladder.send_seed_spoiler_log(&link, &seed, false).await.unwrap();

    let unlocked = t
        .notifier
        .sent()
        .into_iter()
        .filter(|n| matches!(n, Notification::SpoilerLogUnlocked { .. }))
        .count();
    assert_eq!(unlocked, 2);

    let unknown = t.ladder.send_seed_spoiler_log(&link, "NOPE", true).await.unwrap_err();
    assert_eq!(ladder_error(&unknown).unwrap().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_public_recap_hides_seed_and_times() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;
    t.ladder
        .submit_result(session.id, ids[0], finished(90), at("2024-05-06T21:30:00Z"))
        .await
        .unwrap();

    let sent = t.ladder.send_recaps("user-1", "std", RecapScope::Public).await.unwrap();
    assert_eq!(sent, 1);

    let recap = t
        .notifier
        .sent()
        .into_iter()
        .find_map(|n| match n {
            Notification::SessionRecap { to: Some(to), recap } if to == "user-1" => Some(recap),
            _ => None,
        })
        .unwrap();
    assert_eq!(recap.matches[0].seed, None);
    assert!(recap.matches[0].entries.iter().all(|e| e.finish_seconds.is_none()));

    let err = t.ladder.send_recaps("user-1", "nope", RecapScope::Full).await.unwrap_err();
    assert_eq!(ladder_error(&err).unwrap().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_rerank_is_idempotent_and_matches_live_ratings() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda", "Ganon", "Navi"]);

    let session = t.start_race(&ids).await;
    let now = at("2024-05-06T22:00:00Z");
    for (player, minutes) in ids.iter().zip([90, 95, 100, 85]) {
        t.ladder.submit_result(session.id, *player, finished(minutes), now).await.unwrap();
    }

    let live = t.ratings();
    assert_eq!(t.ladder.rerank("std").unwrap(), 1);
    let first = t.ratings();
    t.ladder.rerank("std").unwrap();
    let second = t.ratings();

    assert_eq!(first, second);
    assert_eq!(live, first);
}

#[tokio::test]
async fn test_rerank_aborts_on_foreign_match() {
    let t = setup();
    let other = t
        .ladder
        .create_league("Ocarina of Time", "other", "Other", "s3.json", &Schedule::new())
        .unwrap();
    let ids = t.players(&["Link", "Zelda"]);
    let session = t.start_race(&ids).await;
    t.ladder.force_close(session.id, at("2024-05-06T21:00:00Z")).await.unwrap();
    let before = t.ratings();

    {
        let conn = get_connection(&t.pool).unwrap();
        conn.execute(
            "INSERT INTO matches (session_id, league_id) VALUES (?1, ?2)",
            rusqlite::params![session.id, other.id],
        )
        .unwrap();
    }

    let err = t.ladder.rerank("std").unwrap_err();
    assert_eq!(ladder_error(&err).unwrap().kind(), ErrorKind::IntegrityViolation);
    assert_eq!(t.ratings(), before);
}

#[tokio::test]
async fn test_leaderboards_after_races() {
    let t = setup();
    let ids = t.players(&["Link", "Zelda", "Ganon", "Navi"]);
    let session = t.start_race(&ids).await;
    t.ladder
        .submit_result(session.id, ids[0], finished(90), at("2024-05-06T21:30:00Z"))
        .await
        .unwrap();
    t.ladder.force_close(session.id, at("2024-05-06T23:00:00Z")).await.unwrap();

    // one race is not enough to leave the provisional range
    assert!(t.ladder.get_leaderboard("std", 100.0).unwrap().is_empty());

    let board = t.ladder.get_leaderboard("std", 351.0).unwrap();
    assert_eq!(board.len(), 4);
    assert!(board.windows(2).all(|w| w[0].rating >= w[1].rating));
    assert_eq!(board[0].player_name, "Link");
    assert_eq!(board[0].wins, 1);
    assert_eq!(board.iter().map(|e| e.forfeits).sum::<i32>(), 3);

    let around = t.ladder.get_leaderboard_around_player(ids[1], "std").unwrap();
    assert!(around.len() <= 11);
    assert_eq!(around.iter().filter(|e| e.player_id == ids[1]).count(), 1);
    assert!(around.windows(2).all(|w| w[0].rating >= w[1].rating));

    let missing = t.ladder.get_leaderboard_around_player(9999, "std").unwrap_err();
    assert!(matches!(ladder_error(&missing), Some(LadderError::PlayerNotFound(9999))));
}

#[tokio::test]
async fn test_discord_lookups() {
    let t = setup();
    t.ladder.register_player("Link", Some("42"), None).unwrap();

    assert_eq!(t.ladder.get_player_by_discord_id("42").unwrap().name, "Link");

    let err = t.ladder.get_player_by_discord_id("43").unwrap_err();
    assert!(public_message(&err).unwrap().starts_with("there is no player associated"));

    let (top, around) = t.ladder.get_leaderboards_for_discord_user("43", "std").unwrap();
    assert!(top.is_empty());
    assert!(around.is_empty());
}

#[tokio::test]
async fn test_next_session_start_prefers_open_session() {
    let t = setup();

    let overview = t
        .ladder
        .get_games_leagues_and_next_session_start(at("2024-05-06T10:00:00Z"))
        .unwrap();
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].leagues[0].next_session_start, Some(at(START)));

    t.ladder.open_due_session(t.league_id, at(JOIN_TIME)).unwrap();
    let overview = t
        .ladder
        .get_games_leagues_and_next_session_start(at("2024-05-06T20:30:00Z"))
        .unwrap();
    assert_eq!(overview[0].leagues[0].next_session_start, Some(at(START)));
}

#[tokio::test]
async fn test_admin_configuration() {
    let t = setup();

    t.ladder.set_league_announce_channel("std", Some("#races")).unwrap();
    let league = t.ladder.get_league_by_shortcode("std").unwrap();
    assert_eq!(league.announce_channel.as_deref(), Some("#races"));

    let mut schedule = Schedule::new();
    schedule.set_all(&["21:00 Europe/Paris".parse::<Slot>().unwrap()]);
    t.ladder.set_league_schedule("std", &schedule).unwrap();
    assert_eq!(t.ladder.get_league_by_shortcode("std").unwrap().schedule, schedule);

    let err = t.ladder.set_league_announce_channel("nope", None).unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::LeagueNotFound(_))));

    let err = t
        .ladder
        .create_league("Majora's Mask", "mm", "MM", "mm.json", &Schedule::new())
        .unwrap_err();
    assert!(matches!(ladder_error(&err), Some(LadderError::GameNotFound(_))));

    let sessions = t
        .ladder
        .get_match_sessions(at("2024-05-01T00:00:00Z"), at("2024-05-31T00:00:00Z"), &[SessionStatus::Open])
        .unwrap();
    assert!(sessions.is_empty());
}
