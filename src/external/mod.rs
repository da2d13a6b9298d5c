//! Collaborators living outside the ladder: the seed generator and the
//! notification sink. Both are slow or failing network/process calls, so
//! every call is bounded by a timeout.

pub mod generator;
pub mod notifier;
pub mod retry;

pub use generator::{CommandGenerator, FixtureGenerator, GeneratedSeed, SeedGenerator};
pub use notifier::{LogNotifier, Notification, Notifier, RecordingNotifier, WebhookNotifier};
pub use retry::RetryPolicy;
