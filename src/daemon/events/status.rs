use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    daemon::storage::{documents::JsonDocument, entities::StatusEntity},
    utils::clock::Clock,
};

use super::{module::EventProcessor, MonitorEvent};

/// Mirrors monitor events into `status.json`, so observers can show the last-known balance
/// and whether monitoring is still active.
pub struct StatusWriter {
    document: JsonDocument<StatusEntity>,
    status: StatusEntity,
    clock: Arc<dyn Clock>,
}

impl StatusWriter {
    pub fn new(
        document: JsonDocument<StatusEntity>,
        current_points: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            document,
            status: StatusEntity {
                monitoring_active: true,
                current_points,
                ..StatusEntity::default()
            },
            clock,
        }
    }

    pub fn status(&self) -> &StatusEntity {
        &self.status
    }

    /// Writes the initial status before any event arrives.
    pub async fn start(&mut self) -> Result<()> {
        self.write().await
    }

    async fn write(&mut self) -> Result<()> {
        self.status.updated_at = Some(self.clock.time());
        self.document.save(&self.status).await
    }
}

impl EventProcessor for StatusWriter {
    async fn process_next(&mut self, event: MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::CategoryChanged { identity, category } => {
                info!("Now using {identity} ({category})");
                self.status.active_process = Some(identity.process_name.to_string());
                self.status.active_category = Some(category);
            }
            MonitorEvent::FocusLost => {
                self.status.active_process = None;
                self.status.active_category = None;
            }
            MonitorEvent::PointsUpdated {
                delta,
                current_points,
            } => {
                info!("Points {delta:+}, balance {current_points}");
                self.status.current_points = current_points;
            }
            MonitorEvent::BlockedAppAccess { identity } => {
                warn!(
                    "No points left for {}. Get back to work to earn some",
                    identity.process_name
                );
                return Ok(());
            }
            MonitorEvent::BlockApplied { identity, level } => {
                info!("Applied {level} block to {identity}");
                return Ok(());
            }
            MonitorEvent::BlockReleased { process_name } => {
                info!("Released block of {process_name}");
                return Ok(());
            }
            MonitorEvent::MonitoringStopped { reason } => {
                warn!("Monitoring stopped: {reason}");
                self.status.monitoring_active = false;
                self.status.stopped_reason = Some(reason);
            }
        }
        self.write().await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.status.monitoring_active = false;
        if self.status.stopped_reason.is_none() {
            self.status.stopped_reason = Some("daemon stopped".to_string());
        }
        self.write().await
    }
}
