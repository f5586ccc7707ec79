//! Point balance arithmetic. [PointLedger] is pure and owns no files, which keeps every
//! cap and streak rule testable without a disk. [persistent::PersistentLedger] wraps it
//! with the `points.json` and `daily_reports.json` documents.

pub mod persistent;
pub mod streak;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::daemon::{
    classifier::Category,
    storage::entities::{DailyReportEntity, HistoryEntity, HistorySource, LedgerEntity},
};

use streak::StreakState;

/// Rates and limits the ledger works with. Durations are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub points_per_interval: u64,
    pub deduction_per_interval: u64,
    pub time_interval: f64,
    pub streak_threshold: f64,
    pub streak_bonus: f64,
    pub daily_points_cap: u64,
    pub daily_entertainment_cap: u64,
    pub monitor_interval: f64,
}

/// Dwell seconds that did not add up to a whole interval yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Carry {
    productive: f64,
    entertainment: f64,
}

/// Result of a single ledger mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
    /// Signed change of the balance after clamping.
    pub delta: i64,
    /// Whether the persisted part of the ledger changed.
    pub changed: bool,
    /// Report of the day that just ended, if this update started a new day.
    pub finished_day: Option<DailyReportEntity>,
}

pub struct PointLedger {
    config: LedgerConfig,
    state: LedgerEntity,
    carry: Carry,
    streak: StreakState,
    /// Counters of the current day not yet written to the report document.
    pending_report: DailyReportEntity,
}

fn take_intervals(carry: &mut f64, dwell_seconds: f64, interval: f64) -> u64 {
    *carry += dwell_seconds.max(0.);
    let intervals = (*carry / interval).floor();
    *carry -= intervals * interval;
    intervals as u64
}

impl PointLedger {
    pub fn new(config: LedgerConfig, state: LedgerEntity, today: NaiveDate) -> Self {
        Self {
            config,
            state,
            carry: Carry::default(),
            streak: StreakState::default(),
            pending_report: DailyReportEntity::empty(today),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerEntity {
        &self.state
    }

    pub fn current_points(&self) -> u64 {
        self.state.current_points
    }

    pub fn streak(&self) -> &StreakState {
        &self.streak
    }

    pub fn pending_report(&self) -> &DailyReportEntity {
        &self.pending_report
    }

    /// Clears the pending counters after they were written, keeping the day.
    pub fn mark_report_flushed(&mut self) {
        self.pending_report = DailyReportEntity::empty(self.pending_report.date);
    }

    /// Resets the daily counters when `today` differs from the last reset date. Returns
    /// whether a reset happened and the finished day's pending report, if any.
    fn roll_day(&mut self, today: NaiveDate) -> (bool, Option<DailyReportEntity>) {
        if self.state.last_reset_date == Some(today) {
            return (false, None);
        }
        info!(
            "New day {today}, resetting daily counters (earned {}, spent {})",
            self.state.daily_points_earned, self.state.daily_points_spent
        );
        self.state.daily_points_earned = 0;
        self.state.daily_points_spent = 0;
        self.state.last_reset_date = Some(today);

        if self.pending_report.date == today {
            return (true, None);
        }
        let finished = std::mem::replace(&mut self.pending_report, DailyReportEntity::empty(today));
        (true, Some(finished).filter(|r| !r.is_empty()))
    }

    pub fn apply_tick(
        &mut self,
        category: Category,
        dwell_seconds: f64,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> LedgerUpdate {
        let (reset, finished_day) = self.roll_day(today);
        let dwell_seconds = dwell_seconds.max(0.);

        let delta = match category {
            Category::Productive => self.apply_productive(dwell_seconds, now),
            Category::Entertainment => self.apply_entertainment(dwell_seconds),
            Category::Neutral | Category::Unclassified => {
                self.streak.reset();
                0
            }
        };

        if delta != 0 {
            let source = if delta > 0 {
                HistorySource::Productive
            } else {
                HistorySource::Entertainment
            };
            self.record(now, delta, source, dwell_seconds, None);
        }

        LedgerUpdate {
            delta,
            changed: reset || delta != 0,
            finished_day,
        }
    }

    fn apply_productive(&mut self, dwell_seconds: f64, now: DateTime<Utc>) -> i64 {
        let config = &self.config;
        let intervals = take_intervals(
            &mut self.carry.productive,
            dwell_seconds,
            config.time_interval,
        );
        let mut base = intervals * config.points_per_interval;

        self.streak
            .extend(now, dwell_seconds, config.monitor_interval * 2.);
        if self.streak.cross_threshold(config.streak_threshold) {
            info!(
                "Productive streak of {:.0}s reached",
                self.streak.current_streak_seconds
            );
            self.pending_report.streaks += 1;
        }
        if base > 0 && self.streak.is_bonus_active(config.streak_threshold) {
            base = (base as f64 * (1. + config.streak_bonus)).floor() as u64;
        }

        let remaining = config
            .daily_points_cap
            .saturating_sub(self.state.daily_points_earned);
        let applied = base.min(remaining);
        if applied < base {
            debug!("Daily points cap reached, clamping {base} to {applied}");
        }

        self.state.current_points += applied;
        self.state.daily_points_earned += applied;
        self.state.total_points_earned += applied;
        self.pending_report.points_earned += applied;
        self.pending_report.productive_time += dwell_seconds;
        applied as i64
    }

    fn apply_entertainment(&mut self, dwell_seconds: f64) -> i64 {
        self.streak.reset();
        let config = &self.config;
        let intervals = take_intervals(
            &mut self.carry.entertainment,
            dwell_seconds,
            config.time_interval,
        );
        let base = intervals * config.deduction_per_interval;

        let remaining = config
            .daily_entertainment_cap
            .saturating_sub(self.state.daily_points_spent);
        let applied = base.min(remaining).min(self.state.current_points);

        self.state.current_points -= applied;
        self.state.daily_points_spent += applied;
        self.state.total_points_spent += applied;
        self.pending_report.points_spent += applied;
        self.pending_report.entertainment_time += dwell_seconds;
        -(applied as i64)
    }

    /// Manual credit or debit. Floored at zero and not subject to the daily caps.
    pub fn adjust(
        &mut self,
        delta: i64,
        reason: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> LedgerUpdate {
        let (reset, finished_day) = self.roll_day(today);

        let applied = if delta >= 0 {
            self.state.current_points += delta as u64;
            delta
        } else {
            let removed = delta.unsigned_abs().min(self.state.current_points);
            self.state.current_points -= removed;
            -(removed as i64)
        };

        if applied != 0 {
            self.record(now, applied, HistorySource::Adjustment, 0., Some(reason));
        }

        LedgerUpdate {
            delta: applied,
            changed: reset || applied != 0,
            finished_day,
        }
    }

    fn record(
        &mut self,
        now: DateTime<Utc>,
        delta: i64,
        source: HistorySource,
        dwell_seconds: f64,
        reason: Option<&str>,
    ) {
        self.state.history.push(HistoryEntity {
            timestamp: now,
            delta,
            source,
            dwell_seconds,
            resulting_total: self.state.current_points,
            reason: reason.map(|v| v.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use crate::{
        daemon::{
            classifier::Category,
            storage::entities::{HistorySource, LedgerEntity},
        },
        utils::clock::testing::TEST_START_DATE,
    };

    use super::{LedgerConfig, PointLedger};

    pub fn config() -> LedgerConfig {
        LedgerConfig {
            points_per_interval: 1,
            deduction_per_interval: 1,
            time_interval: 300.,
            streak_threshold: 3600.,
            streak_bonus: 0.1,
            daily_points_cap: 100,
            daily_entertainment_cap: 50,
            monitor_interval: 5.,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn today() -> NaiveDate {
        TEST_START_DATE.date()
    }

    fn ledger_with(config: LedgerConfig, state: LedgerEntity) -> PointLedger {
        PointLedger::new(
            config,
            LedgerEntity {
                last_reset_date: Some(today()),
                ..state
            },
            today(),
        )
    }

    /// Feeds `count` ticks of `dwell` seconds each, spaced by `dwell`.
    fn run_ticks(
        ledger: &mut PointLedger,
        category: Category,
        from: DateTime<Utc>,
        count: usize,
        dwell: f64,
    ) -> (i64, DateTime<Utc>) {
        let mut total = 0;
        let mut now = from;
        for _ in 0..count {
            now += Duration::milliseconds((dwell * 1000.) as i64);
            total += ledger.apply_tick(category, dwell, now, today()).delta;
        }
        (total, now)
    }

    #[test]
    fn test_fractional_dwell_carries_over() {
        let mut ledger = ledger_with(config(), LedgerEntity::default());

        let switch = ledger.apply_tick(Category::Productive, 0., start(), today());
        let (earned, _) = run_ticks(&mut ledger, Category::Productive, start(), 61, 5.);

        assert_eq!(switch.delta, 0);
        assert_eq!(earned, 1);
        assert_eq!(ledger.current_points(), 1);
        assert_eq!(ledger.state().daily_points_earned, 1);
        assert_eq!(ledger.state().history.len(), 1);
        assert_eq!(ledger.pending_report().productive_time, 305.);
    }

    #[test]
    fn test_daily_cap_clamps_delta() {
        let mut ledger = ledger_with(
            LedgerConfig {
                points_per_interval: 10,
                ..config()
            },
            LedgerEntity {
                current_points: 20,
                daily_points_earned: 95,
                ..LedgerEntity::default()
            },
        );

        let update = ledger.apply_tick(Category::Productive, 300., start(), today());

        assert_eq!(update.delta, 5);
        assert_eq!(ledger.current_points(), 25);
        assert_eq!(ledger.state().daily_points_earned, 100);

        let update = ledger.apply_tick(
            Category::Productive,
            300.,
            start() + Duration::seconds(300),
            today(),
        );
        assert_eq!(update.delta, 0);
        assert!(!update.changed);
        assert_eq!(ledger.state().daily_points_earned, 100);
    }

    #[test]
    fn test_entertainment_floors_at_zero() {
        let mut ledger = ledger_with(
            LedgerConfig {
                deduction_per_interval: 2,
                ..config()
            },
            LedgerEntity {
                current_points: 3,
                ..LedgerEntity::default()
            },
        );

        let (spent, _) = run_ticks(&mut ledger, Category::Entertainment, start(), 6, 300.);

        assert_eq!(spent, -3);
        assert_eq!(ledger.current_points(), 0);
        assert_eq!(ledger.state().daily_points_spent, 3);
        assert_eq!(ledger.state().total_points_spent, 3);
        let last = ledger.state().history.last().unwrap();
        assert_eq!(last.source, HistorySource::Entertainment);
        assert_eq!(last.resulting_total, 0);
    }

    #[test]
    fn test_entertainment_cap() {
        let mut ledger = ledger_with(
            config(),
            LedgerEntity {
                current_points: 80,
                daily_points_spent: 49,
                ..LedgerEntity::default()
            },
        );

        let (spent, _) = run_ticks(&mut ledger, Category::Entertainment, start(), 3, 300.);

        assert_eq!(spent, -1);
        assert_eq!(ledger.current_points(), 79);
        assert_eq!(ledger.state().daily_points_spent, 50);
    }

    #[test]
    fn test_streak_bonus_applies_past_threshold() {
        let mut ledger = ledger_with(
            LedgerConfig {
                points_per_interval: 10,
                streak_threshold: 600.,
                streak_bonus: 0.5,
                daily_points_cap: 1000,
                monitor_interval: 300.,
                ..config()
            },
            LedgerEntity::default(),
        );

        let (_, now) = run_ticks(&mut ledger, Category::Productive, start(), 1, 300.);
        assert_eq!(ledger.current_points(), 10);

        // streak reaches 600s on this tick
        let update = ledger.apply_tick(
            Category::Productive,
            300.,
            now + Duration::seconds(300),
            today(),
        );
        assert_eq!(update.delta, 15);
        assert_eq!(ledger.pending_report().streaks, 1);
    }

    #[test]
    fn test_gap_resets_streak_to_post_gap_dwell() {
        let mut ledger = ledger_with(config(), LedgerEntity::default());
        let (_, now) = run_ticks(&mut ledger, Category::Productive, start(), 10, 5.);
        assert_eq!(ledger.streak().current_streak_seconds, 50.);

        ledger.apply_tick(Category::Productive, 5., now + Duration::seconds(11), today());
        assert_eq!(ledger.streak().current_streak_seconds, 5.);

        ledger.apply_tick(Category::Neutral, 5., now + Duration::seconds(16), today());
        assert_eq!(ledger.streak().current_streak_seconds, 0.);
        assert_eq!(ledger.streak().last_productive_activity_time, None);
    }

    #[test]
    fn test_neutral_tick_changes_nothing() {
        let mut ledger = ledger_with(
            config(),
            LedgerEntity {
                current_points: 7,
                ..LedgerEntity::default()
            },
        );

        let update = ledger.apply_tick(Category::Unclassified, 600., start(), today());

        assert_eq!(update.delta, 0);
        assert!(!update.changed);
        assert!(ledger.state().history.is_empty());
        assert_eq!(ledger.current_points(), 7);
    }

    #[test]
    fn test_new_day_resets_counters_and_finishes_report() {
        let mut ledger = ledger_with(
            config(),
            LedgerEntity {
                daily_points_earned: 100,
                daily_points_spent: 10,
                ..LedgerEntity::default()
            },
        );
        ledger.apply_tick(Category::Entertainment, 120., start(), today());

        let tomorrow = today().succ_opt().unwrap();
        let update = ledger.apply_tick(
            Category::Productive,
            300.,
            start() + Duration::days(1),
            tomorrow,
        );

        assert!(update.changed);
        assert_eq!(update.delta, 1);
        assert_eq!(ledger.state().daily_points_earned, 1);
        assert_eq!(ledger.state().daily_points_spent, 0);
        assert_eq!(ledger.state().last_reset_date, Some(tomorrow));
        let finished = update.finished_day.unwrap();
        assert_eq!(finished.date, today());
        assert_eq!(finished.entertainment_time, 120.);
        assert_eq!(ledger.pending_report().date, tomorrow);
    }

    #[test]
    fn test_adjust_ignores_caps_and_floors_at_zero() {
        let mut ledger = ledger_with(
            config(),
            LedgerEntity {
                current_points: 4,
                daily_points_earned: 100,
                ..LedgerEntity::default()
            },
        );

        assert_eq!(ledger.adjust(20, "wager won", start(), today()).delta, 20);
        assert_eq!(ledger.adjust(-50, "wager lost", start(), today()).delta, -24);
        assert_eq!(ledger.current_points(), 0);
        assert_eq!(ledger.state().daily_points_earned, 100);

        let history = &ledger.state().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].source, HistorySource::Adjustment);
        assert_eq!(history[1].reason.as_deref(), Some("wager lost"));
    }
}
