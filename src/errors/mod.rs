use chrono::{DateTime, Utc};

use crate::session::SessionStatus;

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    ExternalFailure,
    IntegrityViolation,
}

/// Domain errors of the ladder.
///
/// These travel inside `anyhow::Error` and are recovered with
/// `err.downcast_ref::<LadderError>()`.
#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    #[error("no league found with shortcode '{0}'")]
    LeagueNotFound(String),

    #[error("no game found named '{0}'")]
    GameNotFound(String),

    #[error("there is no player associated with this discord account, did you forget to register?")]
    PlayerNotRegistered(String),

    #[error("no player found with id {0}")]
    PlayerNotFound(i32),

    #[error("no race session found with id {0}")]
    SessionNotFound(i32),

    #[error("no race found for seed {0}")]
    SeedNotFound(String),

    #[error("no scheduled slot between {from} and {to}")]
    NoOccurrence {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("the race for seed {0} is still in progress")]
    SpoilerLogLocked(String),

    #[error("race session status transition not allowed: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("registrations for this race are closed")]
    JoinClosed,

    #[error("you already joined this race")]
    AlreadyJoined,

    #[error("you are not part of this race")]
    NotParticipating,

    #[error("you already submitted a result for this race")]
    AlreadySubmitted,

    #[error("the seed for this race is not available yet")]
    SeedNotReady,

    #[error("this race is not running")]
    RaceNotRunning,

    #[error("invalid finish time: {0} seconds")]
    InvalidFinishTime(i64),

    #[error("invalid schedule slot '{0}'")]
    InvalidSlot(String),

    #[error("seed generation failed: {0}")]
    Generator(String),

    /// The generator cannot work at all, e.g. its executable is missing.
    #[error("seed generator unavailable: {0}")]
    GeneratorUnavailable(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl LadderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LeagueNotFound(_)
            | Self::GameNotFound(_)
            | Self::PlayerNotRegistered(_)
            | Self::PlayerNotFound(_)
            | Self::SessionNotFound(_)
            | Self::SeedNotFound(_)
            | Self::NoOccurrence { .. } => ErrorKind::NotFound,
            Self::SpoilerLogLocked(_)
            | Self::InvalidTransition { .. }
            | Self::JoinClosed
            | Self::AlreadyJoined
            | Self::NotParticipating
            | Self::AlreadySubmitted
            | Self::SeedNotReady
            | Self::RaceNotRunning
            | Self::InvalidFinishTime(_)
            | Self::InvalidSlot(_) => ErrorKind::PreconditionFailed,
            Self::Generator(_) | Self::GeneratorUnavailable(_) | Self::Notification(_) => {
                ErrorKind::ExternalFailure
            }
            Self::Integrity(_) => ErrorKind::IntegrityViolation,
        }
    }

    /// Whether the message can be shown as-is to a player.
    pub fn is_public(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::PreconditionFailed
        )
    }

    /// External failures are transient until the retry budget runs out,
    /// except an unavailable generator, which no retry will fix.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalFailure && !matches!(self, Self::GeneratorUnavailable(_))
    }
}

/// Returns the ladder error wrapped in `err`, if any.
pub fn ladder_error(err: &anyhow::Error) -> Option<&LadderError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LadderError>())
}

/// User-facing text for errors that may be displayed publicly.
pub fn public_message(err: &anyhow::Error) -> Option<String> {
    ladder_error(err)
        .filter(|e| e.is_public())
        .map(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kind_classification() {
        assert_eq!(LadderError::LeagueNotFound("std".into()).kind(), ErrorKind::NotFound);
        assert_eq!(LadderError::SpoilerLogLocked("abc".into()).kind(), ErrorKind::PreconditionFailed);
        assert_eq!(LadderError::Generator("boom".into()).kind(), ErrorKind::ExternalFailure);
        assert_eq!(LadderError::Integrity("bad".into()).kind(), ErrorKind::IntegrityViolation);
    }

    #[test]
    fn test_public_message_survives_context() {
        let err: anyhow::Error = Err::<(), _>(LadderError::LeagueNotFound("xyz".into()))
            .context("Failed to load leaderboard")
            .unwrap_err();

        assert_eq!(
            public_message(&err).as_deref(),
            Some("no league found with shortcode 'xyz'")
        );
    }

    #[test]
    fn test_external_failures_are_not_public() {
        let err = anyhow::Error::new(LadderError::Generator("timeout".into()));
        assert!(public_message(&err).is_none());
        assert!(ladder_error(&err).unwrap().is_retryable());
    }

    #[test]
    fn test_unavailable_generator_is_fatal() {
        let err = LadderError::GeneratorUnavailable("no such file".into());
        assert_eq!(err.kind(), ErrorKind::ExternalFailure);
        assert!(!err.is_retryable());
        assert!(LadderError::Notification("503".into()).is_retryable());
    }

    #[test]
    fn test_plain_errors_have_no_public_message() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(public_message(&err).is_none());
    }
}
