use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{error, info};

use crate::{
    daemon::{blocking::BlockLevel, classifier::KeywordList},
    window_api::AppIdentity,
};

use super::{MonitorSession, SessionParts};

pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Requests applied by the session between two ticks, in the order they were sent.
#[derive(Debug)]
pub enum SessionCommand {
    /// Manual credit or debit. Replies with the delta actually applied.
    AdjustPoints {
        delta: i64,
        reason: String,
        reply: oneshot::Sender<i64>,
    },
    AddKeyword {
        list: KeywordList,
        keyword: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    RemoveKeyword {
        list: KeywordList,
        keyword: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    SetBlockLevel {
        level: BlockLevel,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub current_points: u64,
    pub daily_points_earned: u64,
    pub daily_points_spent: u64,
    pub streak_seconds: f64,
    pub tracked: Option<AppIdentity>,
    pub block_level: BlockLevel,
    pub blocked_processes: Vec<String>,
}

/// Owner side of a spawned [MonitorSession].
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    shutdown: CancellationToken,
    finished: CancellationToken,
    task: JoinHandle<Result<()>>,
    interval: Duration,
}

impl SessionHandle {
    /// Spawns the monitoring loop on the current runtime.
    pub fn start(parts: SessionParts) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let finished = CancellationToken::new();
        let interval = parts.interval;
        let session = MonitorSession::new(parts, receiver, shutdown.clone());

        let done = finished.clone();
        let task = tokio::spawn(async move {
            let result = session.run().await;
            done.cancel();
            result
        });

        Self {
            commands,
            shutdown,
            finished,
            task,
            interval,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolves once the loop exited, whatever the reason.
    pub fn finished(&self) -> WaitForCancellationFuture<'_> {
        self.finished.cancelled()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Monitoring session is not running"))
    }

    pub async fn adjust_points(&self, delta: i64, reason: impl Into<String>) -> Result<i64> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::AdjustPoints {
            delta,
            reason: reason.into(),
            reply,
        })
        .await?;
        Ok(response.await?)
    }

    pub async fn add_keyword(&self, list: KeywordList, keyword: impl Into<String>) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::AddKeyword {
            list,
            keyword: keyword.into(),
            reply,
        })
        .await?;
        response.await?
    }

    pub async fn remove_keyword(
        &self,
        list: KeywordList,
        keyword: impl Into<String>,
    ) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::RemoveKeyword {
            list,
            keyword: keyword.into(),
            reply,
        })
        .await?;
        response.await?
    }

    pub async fn set_block_level(&self, level: BlockLevel) -> Result<()> {
        self.send(SessionCommand::SetBlockLevel { level }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        Ok(response.await?)
    }

    /// Cancels the loop and waits up to three poll intervals for it to finish.
    pub async fn stop_and_wait(self) -> Result<()> {
        self.shutdown.cancel();
        let limit = self.interval * 3;
        match tokio::time::timeout(limit, self.task).await {
            Ok(joined) => {
                info!("Monitoring session stopped");
                joined?
            }
            Err(_) => {
                error!("Monitoring session didn't stop in {limit:?}");
                bail!("Monitoring session is stuck")
            }
        }
    }
}
