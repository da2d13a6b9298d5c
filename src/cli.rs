use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "race ladder backend")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "lower_case")]
pub enum Command {
    /// Run the scheduling driver until interrupted
    Serve,
    /// Rebuild the ratings of a league from its closed sessions
    Rerank {
        /// League shortcode
        shortcode: String,
    },
    /// Print the public leaderboard of a league
    Leaderboard {
        /// League shortcode
        shortcode: String,
        /// Hide players at or above this deviation (defaults to the configured threshold)
        #[arg(short, long)]
        max_deviation: Option<f64>,
    },
    /// List games, leagues and the start of their next session
    Next,
    /// Create the default games and leagues
    Fixtures {
        /// Also register demo players
        #[arg(long)]
        players: bool,
    },
}
