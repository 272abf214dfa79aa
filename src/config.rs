use std::{collections::HashMap, env::vars};

use chrono_tz::Tz;
use log::info;

use crate::{error::ConfigError, limiter::WeekendPolicy};

const DEFAULT_BOT_NAME: &str = "title_vote_bot";
const DEFAULT_TIMEZONE: &str = "America/Chicago";

pub struct Config {
    pub db_url: String,
    /// Secret for admin commands
    pub secret: String,
    pub bot_name: String,
    pub timezone: Tz,
    pub weekend: WeekendPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            vars.get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &'static str, default: &str| {
            vars.get(key).cloned().unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };

        let timezone = optional("VOTING_TZ", DEFAULT_TIMEZONE);
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|reason| ConfigError::Invalid {
                key: "VOTING_TZ",
                value: timezone.clone(),
                reason: reason.to_string(),
            })?;

        let weekend = optional("VOTING_WEEKEND", "tighten");
        let weekend = weekend
            .parse::<WeekendPolicy>()
            .map_err(|reason| ConfigError::Invalid {
                key: "VOTING_WEEKEND",
                value: weekend.clone(),
                reason,
            })?;

        Ok(Self {
            db_url: required("DB_URL")?,
            secret: required("VOTING_SECRET")?,
            bot_name: optional("BOT_NAME", DEFAULT_BOT_NAME),
            timezone,
            weekend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_vars(&vars(&[
            ("DB_URL", "postgres://localhost/votes"),
            ("VOTING_SECRET", "hunter2"),
        ]))
        .unwrap();

        assert_eq!(config.bot_name, DEFAULT_BOT_NAME);
        assert_eq!(config.timezone, chrono_tz::America::Chicago);
        assert_eq!(config.weekend, WeekendPolicy::TightenOnly);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_vars(&vars(&[
            ("DB_URL", "sqlite::memory:"),
            ("VOTING_SECRET", "s"),
            ("VOTING_TZ", "Europe/Berlin"),
            ("VOTING_WEEKEND", "closed"),
            ("BOT_NAME", "games_bot"),
        ]))
        .unwrap();

        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.weekend, WeekendPolicy::Closed);
        assert_eq!(config.bot_name, "games_bot");
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        let missing = Config::from_vars(&vars(&[("DB_URL", "x")]));
        assert!(matches!(missing, Err(ConfigError::Missing("VOTING_SECRET"))));

        let bad_tz = Config::from_vars(&vars(&[
            ("DB_URL", "x"),
            ("VOTING_SECRET", "s"),
            ("VOTING_TZ", "Mars/Olympus_Mons"),
        ]));
        assert!(matches!(bad_tz, Err(ConfigError::Invalid { key: "VOTING_TZ", .. })));

        let bad_policy = Config::from_vars(&vars(&[
            ("DB_URL", "x"),
            ("VOTING_SECRET", "s"),
            ("VOTING_WEEKEND", "sometimes"),
        ]));
        assert!(matches!(bad_policy, Err(ConfigError::Invalid { key: "VOTING_WEEKEND", .. })));
    }
}
