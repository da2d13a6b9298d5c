use anyhow::{Context, Result};
use log::info;

use super::ladder::Ladder;
use crate::config::{LeagueConfig, get_default_leagues};
use crate::schedule::{Schedule, Slot};

const DEMO_PLAYERS: &[(&str, &str)] = &[
    ("Saria", "100000000000000001"),
    ("Darunia", "100000000000000002"),
    ("Ruto", "100000000000000003"),
    ("Nabooru", "100000000000000004"),
    ("Impa", "100000000000000005"),
];

/// Creates the default games and leagues, plus demo players when asked.
/// Leagues or players that already exist are left alone.
pub fn load_fixtures(ladder: &Ladder, with_players: bool) -> Result<usize> {
    let existing: Vec<String> = ladder
        .get_leagues()?
        .into_iter()
        .map(|league| league.short_code)
        .collect();

    let mut created = 0;
    for config in get_default_leagues() {
        if existing.iter().any(|code| code == config.short_code) {
            continue;
        }

        let schedule = build_schedule(&config)?;
        ladder.create_game(config.game)?;
        ladder.create_league(
            config.game,
            config.short_code,
            config.name,
            config.settings_ref,
            &schedule,
        )?;
        created += 1;
    }

    if with_players {
        for (name, discord_id) in DEMO_PLAYERS {
            if ladder.get_player_by_discord_id(discord_id).is_err() {
                ladder.register_player(name, Some(discord_id), None)?;
            }
        }
    }

    info!("Loaded {} new leagues", created);
    Ok(created)
}

/// Applies the every-day pattern, then the per-day overrides.
pub fn build_schedule(config: &LeagueConfig) -> Result<Schedule> {
    let mut schedule = Schedule::new();
    schedule.set_all(&parse_slots(config.every_day)?);

    for (day, slots) in config.overrides {
        schedule.set_day(*day, parse_slots(slots)?);
    }

    Ok(schedule)
}

fn parse_slots(raw: &[&str]) -> Result<Vec<Slot>> {
    raw.iter()
        .map(|slot| {
            slot.parse::<Slot>()
                .with_context(|| format!("Invalid slot in league fixtures: {slot}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_default_leagues_parse() {
        for config in get_default_leagues() {
            let schedule = build_schedule(&config).unwrap();
            assert!(!schedule.is_empty(), "{} has no slots", config.short_code);
        }
    }

    #[test]
    fn test_overrides_replace_day() {
        let std = get_default_leagues()
            .into_iter()
            .find(|l| l.short_code == "std")
            .unwrap();
        let schedule = build_schedule(&std).unwrap();

        assert_eq!(schedule.for_day(Weekday::Tue)[0].to_string(), "20:00 America/Los_Angeles");
        assert_eq!(schedule.for_day(Weekday::Mon)[0].to_string(), "21:00 America/Los_Angeles");
    }
}
