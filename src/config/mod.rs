pub mod leagues;
pub mod settings;

pub use leagues::{LeagueConfig, get_default_leagues};
pub use settings::AppConfig;
