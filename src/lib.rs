pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod external;
pub mod rating;
pub mod schedule;
pub mod services;
pub mod session;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use log::info;

use crate::cli::Command;
use crate::config::settings::AppConfig;
use crate::database::LeaderboardEntry;
use crate::services::fixtures::load_fixtures;
use crate::services::{Driver, Ladder};

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

pub fn handle_serve() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let ladder = Ladder::from_config(AppConfig::from_env())?;
        let driver = Driver::new(ladder);
        let handle = driver.handle();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
                handle.shutdown();
            }
        });

        driver.run().await
    })
}

pub fn handle_rerank(shortcode: &str) -> Result<()> {
    let ladder = Ladder::from_config(AppConfig::from_env())?;
    let replayed = ladder.rerank(shortcode)?;
    println!(
        "{} {} from {} closed sessions",
        "Reranked".green().bold(),
        shortcode,
        replayed
    );
    Ok(())
}

pub fn handle_leaderboard(shortcode: &str, max_deviation: Option<f64>) -> Result<()> {
    let ladder = Ladder::from_config(AppConfig::from_env())?;
    let threshold = max_deviation.unwrap_or(ladder.config().rating.deviation_threshold);
    let entries = ladder.get_leaderboard(shortcode, threshold)?;

    if entries.is_empty() {
        println!("{}", "No ranked players yet".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:>4}  {:<24} {:>8} {:>6}  {:>4} {:>4} {:>4} {:>4}",
            "#", "Player", "Rating", "RD", "W", "L", "D", "FF"
        )
        .bold()
    );
    for (idx, entry) in entries.iter().enumerate() {
        print_entry(idx + 1, entry);
    }
    Ok(())
}

fn print_entry(rank: usize, entry: &LeaderboardEntry) {
    println!(
        "{:>4}  {:<24} {:>8} {:>6.1}  {:>4} {:>4} {:>4} {:>4}",
        rank,
        entry.player_name.cyan(),
        format!("{:.0}", entry.rating).bold(),
        entry.deviation,
        entry.wins,
        entry.losses,
        entry.draws,
        entry.forfeits
    );
}

pub fn handle_next() -> Result<()> {
    let ladder = Ladder::from_config(AppConfig::from_env())?;

    for game in ladder.get_games_leagues_and_next_session_start(Utc::now())? {
        println!("{}", game.game.name.bold());
        for overview in game.leagues {
            let next = match overview.next_session_start {
                Some(start) => start.to_rfc3339().green(),
                None => "no upcoming session".dimmed(),
            };
            println!("  {:<12} {:<28} {}", overview.league.short_code.cyan(), overview.league.name, next);
        }
    }
    Ok(())
}

pub fn handle_fixtures(with_players: bool) -> Result<()> {
    let ladder = Ladder::from_config(AppConfig::from_env())?;
    let created = load_fixtures(&ladder, with_players)?;
    println!("{} {} leagues", "Created".green().bold(), created);
    Ok(())
}
