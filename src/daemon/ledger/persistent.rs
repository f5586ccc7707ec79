use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error};

use crate::daemon::{
    classifier::Category,
    storage::{
        documents::{merge_report, JsonDocument},
        entities::{DailyReportEntity, LedgerEntity},
    },
};

use super::{LedgerConfig, LedgerUpdate, PointLedger};

/// [PointLedger] that writes itself to `points.json` after every change and merges its
/// report counters into `daily_reports.json`. A failed write keeps the in-memory state
/// authoritative and is retried on the next tick.
pub struct PersistentLedger {
    ledger: PointLedger,
    points: JsonDocument<LedgerEntity>,
    reports: JsonDocument<Vec<DailyReportEntity>>,
    dirty: bool,
}

impl PersistentLedger {
    pub async fn load(
        config: LedgerConfig,
        points: JsonDocument<LedgerEntity>,
        reports: JsonDocument<Vec<DailyReportEntity>>,
        today: NaiveDate,
    ) -> Result<Self> {
        let state = points
            .load()
            .await
            .inspect_err(|e| error!("Failed to load point ledger {e:?}"))?;
        debug!("Loaded ledger with {} points", state.current_points);

        Ok(Self {
            ledger: PointLedger::new(config, state, today),
            points,
            reports,
            dirty: false,
        })
    }

    pub fn ledger(&self) -> &PointLedger {
        &self.ledger
    }

    pub fn current_points(&self) -> u64 {
        self.ledger.current_points()
    }

    pub async fn apply_tick(
        &mut self,
        category: Category,
        dwell_seconds: f64,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> i64 {
        let update = self.ledger.apply_tick(category, dwell_seconds, now, today);
        self.after_update(update).await
    }

    pub async fn adjust(
        &mut self,
        delta: i64,
        reason: &str,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> i64 {
        let update = self.ledger.adjust(delta, reason, now, today);
        self.after_update(update).await
    }

    async fn after_update(&mut self, update: LedgerUpdate) -> i64 {
        if let Some(finished) = update.finished_day {
            self.write_report(&finished).await;
        }
        if update.changed || self.dirty {
            self.flush().await;
        }
        update.delta
    }

    /// Writes the ledger and today's pending report. Called on shutdown as well.
    pub async fn flush(&mut self) {
        self.dirty = self
            .points
            .save(self.ledger.state())
            .await
            .inspect_err(|e| error!("Failed to save point ledger {e:?}"))
            .is_err();

        let pending = self.ledger.pending_report().clone();
        if !pending.is_empty() && self.write_report(&pending).await {
            self.ledger.mark_report_flushed();
        }
    }

    async fn write_report(&self, report: &DailyReportEntity) -> bool {
        self.merge_into_reports(report)
            .await
            .inspect_err(|e| error!("Failed to save daily report for {} {e:?}", report.date))
            .is_ok()
    }

    async fn merge_into_reports(&self, report: &DailyReportEntity) -> Result<()> {
        let mut reports = self.reports.load().await?;
        merge_report(&mut reports, report);
        self.reports.save(&reports).await
    }
}
