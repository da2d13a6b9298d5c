/// League definitions loaded by the `fixtures` command
///
/// Each league names the randomizer settings file passed to the seed
/// generator and a weekly pattern of race slots. The pattern applies to
/// every day; `overrides` then replaces individual days.
#[derive(Debug, Clone)]
pub struct LeagueConfig {
    pub game: &'static str,
    pub short_code: &'static str,
    pub name: &'static str,
    pub settings_ref: &'static str,
    pub every_day: &'static [&'static str],
    pub overrides: &'static [(chrono::Weekday, &'static [&'static str])],
}

const STD_EARLY: &[&str] = &[
    "20:00 America/Los_Angeles",
    "20:00 America/New_York",
    "14:00 Europe/Paris",
    "20:00 Europe/Paris",
];

/// Get the ladder leagues created on a fresh database
pub fn get_default_leagues() -> Vec<LeagueConfig> {
    use chrono::Weekday::{Sun, Thu, Tue};

    vec![
        LeagueConfig {
            game: "The Legend of Zelda: Ocarina of Time",
            short_code: "std",
            name: "Standard",
            settings_ref: "s3.json",
            every_day: &[
                "21:00 America/Los_Angeles",
                "21:00 America/New_York",
                "15:00 Europe/Paris",
                "21:00 Europe/Paris",
            ],
            overrides: &[(Tue, STD_EARLY), (Thu, STD_EARLY), (Sun, STD_EARLY)],
        },
        LeagueConfig {
            game: "The Legend of Zelda: Ocarina of Time",
            short_code: "shuffled",
            name: "Shuffled settings",
            settings_ref: "shuffled.json",
            every_day: &["19:00 Europe/Paris", "20:00 America/New_York"],
            overrides: &[],
        },
    ]
}
