use std::{fmt::Display, time::Duration};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::{blocking::BlockLevel, ledger::LedgerConfig};

/// Selects how generous accrual is compared to deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Chill,
    #[default]
    Medium,
    #[value(alias = "productive_guru")]
    ProductiveGuru,
}

/// Points per completed interval for one difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    pub points_per_interval: u64,
    pub deduction_per_interval: u64,
}

impl Difficulty {
    pub fn rates(self) -> Rates {
        match self {
            Difficulty::Chill => Rates {
                points_per_interval: 2,
                deduction_per_interval: 1,
            },
            Difficulty::Medium => Rates {
                points_per_interval: 1,
                deduction_per_interval: 1,
            },
            Difficulty::ProductiveGuru => Rates {
                points_per_interval: 1,
                deduction_per_interval: 2,
            },
        }
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Chill => write!(f, "chill"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::ProductiveGuru => write!(f, "productive_guru"),
        }
    }
}

/// User settings stored in `settings.json`. Durations are in seconds. Missing fields take
/// their defaults, so older files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub difficulty_level: Difficulty,
    pub time_interval: u64,
    pub streak_threshold: u64,
    pub streak_bonus: f64,
    pub daily_points_cap: u64,
    pub daily_entertainment_cap: u64,
    pub monitor_interval: u64,
    pub block_level: BlockLevel,
    /// Additional process names that must never be blocked. Read once at daemon start.
    pub extra_whitelist: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            difficulty_level: Difficulty::Medium,
            time_interval: 300,
            streak_threshold: 3600,
            streak_bonus: 0.1,
            daily_points_cap: 100,
            daily_entertainment_cap: 50,
            monitor_interval: 5,
            block_level: BlockLevel::Warn,
            extra_whitelist: vec![],
        }
    }
}

impl Settings {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval.max(1))
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        let rates = self.difficulty_level.rates();
        LedgerConfig {
            points_per_interval: rates.points_per_interval,
            deduction_per_interval: rates.deduction_per_interval,
            time_interval: self.time_interval.max(1) as f64,
            streak_threshold: self.streak_threshold as f64,
            streak_bonus: self.streak_bonus.max(0.),
            daily_points_cap: self.daily_points_cap,
            daily_entertainment_cap: self.daily_entertainment_cap,
            monitor_interval: self.monitor_interval.max(1) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::daemon::blocking::BlockLevel;

    use super::{Difficulty, Settings};

    #[test]
    fn test_partial_settings_take_defaults() -> Result<()> {
        let settings: Settings = serde_json::from_str(
            r#"{"difficulty_level": "productive_guru", "block_level": "hide"}"#,
        )?;
        assert_eq!(settings.difficulty_level, Difficulty::ProductiveGuru);
        assert_eq!(settings.block_level, BlockLevel::Background);
        assert_eq!(settings.time_interval, 300);
        assert_eq!(settings.daily_points_cap, 100);
        Ok(())
    }

    #[test]
    fn test_difficulty_selects_rates() {
        let config = Settings {
            difficulty_level: Difficulty::Chill,
            ..Settings::default()
        }
        .ledger_config();
        assert_eq!(config.points_per_interval, 2);
        assert_eq!(config.deduction_per_interval, 1);

        let config = Settings {
            difficulty_level: Difficulty::ProductiveGuru,
            ..Settings::default()
        }
        .ledger_config();
        assert_eq!(config.points_per_interval, 1);
        assert_eq!(config.deduction_per_interval, 2);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let settings = Settings {
            time_interval: 0,
            monitor_interval: 0,
            ..Settings::default()
        };
        assert_eq!(settings.monitor_interval().as_secs(), 1);
        assert_eq!(settings.ledger_config().time_interval, 1.);
    }
}
