use anyhow::Result;

use race_ladder::cli::Command;
use race_ladder::{
    handle_fixtures, handle_leaderboard, handle_next, handle_rerank, handle_serve, interpret,
};

fn main() {
    setup_logging();
    parse_and_execute().unwrap_or_else(|e| {
        match race_ladder::errors::public_message(&e) {
            Some(message) => eprintln!("Error: {message}"),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    });
}

fn setup_logging() {
    sensible_env_logger::init!();
}

fn parse_and_execute() -> Result<()> {
    let command = interpret();
    execute_command(&command)
}

fn execute_command(command: &Command) -> Result<()> {
    match command {
        Command::Serve => handle_serve(),
        Command::Rerank { shortcode } => handle_rerank(shortcode),
        Command::Leaderboard {
            shortcode,
            max_deviation,
        } => handle_leaderboard(shortcode, *max_deviation),
        Command::Next => handle_next(),
        Command::Fixtures { players } => handle_fixtures(*players),
    }
}
