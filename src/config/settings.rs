use std::time::Duration;

use crate::external::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct RatingSettings {
    pub default_rating: f64,
    pub default_deviation: f64,
    pub default_volatility: f64,
    pub tau: f64,
    /// Players at or above this deviation stay off public leaderboards.
    pub deviation_threshold: f64,
    pub top_limit: usize,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            default_rating: 1500.0,
            default_deviation: 350.0,
            default_volatility: 0.06,
            tau: 0.5,
            deviation_threshold: 100.0,
            top_limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    /// How far ahead the schedule is searched for the next slot.
    pub lookahead: chrono::Duration,
    /// Sessions open for registration this long before their start.
    pub join_window: chrono::Duration,
    /// Active sessions are force-closed this long after their start.
    pub race_timeout: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            lookahead: chrono::Duration::days(7),
            join_window: chrono::Duration::minutes(60),
            race_timeout: chrono::Duration::minutes(240),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// External randomizer executable; the fixture generator is used when unset.
    pub command: Option<String>,
    pub output_dir: std::path::PathBuf,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            command: None,
            output_dir: std::env::temp_dir().join("race_ladder"),
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::new(3, 1_000, 30_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub webhook_url: Option<String>,
    pub timeout: Duration,
    pub user_agent: &'static str,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(10),
            user_agent: "RaceLadder/1.0",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub rating: RatingSettings,
    pub scheduler: SchedulerSettings,
    pub generator: GeneratorSettings,
    pub notifier: NotifierSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            database_path: "race_ladder.db".to_string(),
            rating: RatingSettings::default(),
            scheduler: SchedulerSettings::default(),
            generator: GeneratorSettings::default(),
            notifier: NotifierSettings::default(),
        }
    }

    /// Defaults overridden by `DATABASE_PATH` and `LADDER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = path;
        }
        if let Some(secs) = env_number("LADDER_TICK_SECS") {
            config.scheduler.tick_interval = Duration::from_secs(secs as u64);
        }
        if let Some(mins) = env_number("LADDER_JOIN_WINDOW_MINS") {
            config.scheduler.join_window = chrono::Duration::minutes(mins);
        }
        if let Some(mins) = env_number("LADDER_RACE_TIMEOUT_MINS") {
            config.scheduler.race_timeout = chrono::Duration::minutes(mins);
        }
        config.generator.command = std::env::var("LADDER_GENERATOR_CMD").ok();
        if let Ok(dir) = std::env::var("LADDER_GENERATOR_OUTPUT") {
            config.generator.output_dir = dir.into();
        }
        config.notifier.webhook_url = std::env::var("LADDER_WEBHOOK_URL").ok();

        config
    }
}

fn env_number(key: &str) -> Option<i64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            log::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}
