//! Background scheduling of the ladder.
//!
//! One task per league wakes up every tick and moves that league forward:
//! it opens the upcoming session once its join window starts, starts due
//! sessions, retries missing seeds and closes races that ran out of time.
//! Which sessions exist is read from the database on every tick, so a
//! restart neither re-triggers nor skips a slot.

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};

use super::ladder::Ladder;
use crate::database::League;

/// Handle used to stop a running [`Driver`].
#[derive(Debug, Clone)]
pub struct DriverHandle {
    shutdown: watch::Sender<bool>,
}

impl DriverHandle {
    pub fn shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown.send(true);
    }
}

pub struct Driver {
    ladder: Ladder,
    shutdown: watch::Sender<bool>,
}

impl Driver {
    pub fn new(ladder: Ladder) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { ladder, shutdown }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs one task per league until shut down.
    pub async fn run(self) -> Result<()> {
        let leagues = self.ladder.get_leagues()?;
        info!("Driving {} leagues", leagues.len());

        let mut tasks = JoinSet::new();
        for league in leagues {
            let ladder = self.ladder.clone();
            let shutdown = self.shutdown.subscribe();
            tasks.spawn(drive_league(ladder, league, shutdown));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("League task panicked: {}", e);
            }
        }

        info!("Driver stopped");
        Ok(())
    }
}

async fn drive_league(ladder: Ladder, league: League, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(ladder.config().scheduler.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&ladder, &league).await {
                    error!("Tick of league {} failed: {:#}", league.short_code, e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("League {} task stopped", league.short_code);
}

/// One scheduling step for `league`.
pub async fn tick(ladder: &Ladder, league: &League) -> Result<()> {
    let now = Utc::now();

    ladder.open_due_session(league.id, now)?;
    ladder.start_due_sessions(league.id, now).await?;
    ladder.retry_missing_seeds(league.id).await?;
    ladder.close_timed_out_sessions(league.id, now).await?;

    Ok(())
}
