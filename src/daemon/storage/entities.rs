use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::daemon::classifier::Category;

/// Keyword lists as stored on disk. `neutral_app` is optional so that the minimal
/// two-list layout stays readable and is written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfigEntity {
    #[serde(default)]
    pub productivity_app: Vec<String>,
    #[serde(default)]
    pub entertainment_app: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neutral_app: Vec<String>,
}

/// What produced a ledger change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Productive,
    Entertainment,
    Adjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntity {
    pub timestamp: DateTime<Utc>,
    pub delta: i64,
    pub source: HistorySource,
    pub dwell_seconds: f64,
    pub resulting_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The point ledger document. The minimal `{"points": N}` layout is accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntity {
    #[serde(default, alias = "points")]
    pub current_points: u64,
    #[serde(default)]
    pub daily_points_earned: u64,
    #[serde(default)]
    pub daily_points_spent: u64,
    #[serde(default)]
    pub last_reset_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_points_earned: u64,
    #[serde(default)]
    pub total_points_spent: u64,
    #[serde(default)]
    pub history: Vec<HistoryEntity>,
}

/// Aggregates for one calendar day. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReportEntity {
    pub date: NaiveDate,
    #[serde(default)]
    pub points_earned: u64,
    #[serde(default)]
    pub points_spent: u64,
    #[serde(default)]
    pub productive_time: f64,
    #[serde(default)]
    pub entertainment_time: f64,
    #[serde(default)]
    pub streaks: u32,
}

impl DailyReportEntity {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            points_earned: 0,
            points_spent: 0,
            productive_time: 0.,
            entertainment_time: 0.,
            streaks: 0,
        }
    }

    /// Adds counters of `other` into this report.
    pub fn merge(&mut self, other: &DailyReportEntity) {
        self.points_earned += other.points_earned;
        self.points_spent += other.points_spent;
        self.productive_time += other.productive_time;
        self.entertainment_time += other.entertainment_time;
        self.streaks += other.streaks;
    }

    pub fn is_empty(&self) -> bool {
        self.points_earned == 0
            && self.points_spent == 0
            && self.productive_time == 0.
            && self.entertainment_time == 0.
            && self.streaks == 0
    }
}

/// Last-known state of the daemon, written for passive observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEntity {
    pub monitoring_active: bool,
    pub current_points: u64,
    #[serde(default)]
    pub active_process: Option<String>,
    #[serde(default)]
    pub active_category: Option<Category>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;

    use super::{CategoryConfigEntity, DailyReportEntity, LedgerEntity};

    #[test]
    fn test_minimal_ledger_layout_is_accepted() -> Result<()> {
        let ledger: LedgerEntity = serde_json::from_str(r#"{"points": 12}"#)?;
        assert_eq!(ledger.current_points, 12);
        assert!(ledger.history.is_empty());
        assert_eq!(ledger.last_reset_date, None);
        Ok(())
    }

    #[test]
    fn test_default_category_config_layout() -> Result<()> {
        assert_eq!(
            serde_json::to_value(CategoryConfigEntity::default())?,
            serde_json::json!({"productivity_app": [], "entertainment_app": []})
        );
        Ok(())
    }

    #[test]
    fn test_report_merge() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut report = DailyReportEntity::empty(date);
        assert!(report.is_empty());
        report.merge(&DailyReportEntity {
            points_earned: 2,
            productive_time: 600.,
            streaks: 1,
            ..DailyReportEntity::empty(date)
        });
        report.merge(&DailyReportEntity {
            points_spent: 1,
            entertainment_time: 300.,
            ..DailyReportEntity::empty(date)
        });
        assert_eq!(report.points_earned, 2);
        assert_eq!(report.points_spent, 1);
        assert_eq!(report.productive_time, 600.);
        assert_eq!(report.entertainment_time, 300.);
        assert_eq!(report.streaks, 1);
    }
}
