//! Race session lifecycle: `Open` → `Active` → `Closed`.

pub mod pairing;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::LadderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Accepting players until the scheduled start.
    Open,
    /// Seed handed out, accepting results.
    Active,
    /// Results committed and rated. Terminal.
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn activate(self) -> Result<SessionStatus, LadderError> {
        match self {
            SessionStatus::Open => Ok(SessionStatus::Active),
            from => Err(LadderError::InvalidTransition {
                from,
                to: SessionStatus::Active,
            }),
        }
    }

    pub fn close(self) -> Result<SessionStatus, LadderError> {
        match self {
            SessionStatus::Active => Ok(SessionStatus::Closed),
            from => Err(LadderError::InvalidTransition {
                from,
                to: SessionStatus::Closed,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == SessionStatus::Closed
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            other => anyhow::bail!("Unknown session status: {}", other),
        }
    }
}

/// Final result of one player's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    Forfeit,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
            Outcome::Forfeit => "forfeit",
        }
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(Outcome::Win),
            "loss" => Ok(Outcome::Loss),
            "draw" => Ok(Outcome::Draw),
            "forfeit" => Ok(Outcome::Forfeit),
            other => anyhow::bail!("Unknown outcome: {}", other),
        }
    }
}

/// What a player reports at the end of their race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceResult {
    /// Finished, with the race time in seconds.
    Finished(i64),
    Forfeit,
}
