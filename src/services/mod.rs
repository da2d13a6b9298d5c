pub mod driver;
pub mod fixtures;
pub mod ladder;
pub mod lifecycle;
pub mod rating;
pub mod recap;

pub use driver::{Driver, DriverHandle};
pub use ladder::{GameOverview, Ladder, LeagueOverview, SessionListing};
pub use recap::RecapScope;
