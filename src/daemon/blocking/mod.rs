//! Decides and applies actions against entertainment apps used without points. Every OS
//! failure is logged and reported as an unsuccessful action, nothing escapes
//! [BlockController::execute].

pub mod warnings;

use std::{collections::HashMap, fmt::Display, sync::Arc, time::Duration};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use warnings::WarnLimiter;

use crate::{
    daemon::{
        classifier::Category,
        events::{EventPublisher, MonitorEvent},
    },
    utils::{blocking::BlockingSlot, clock::Clock},
    window_api::{AppIdentity, ProcessController, WindowAction, WindowController, WindowState},
};

const TERMINATION_TIMEOUT_SECS: i64 = 3;
/// How long a force-killed process may take to disappear.
const KILL_TIMEOUT_SECS: i64 = 1;
const TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlockLevel {
    #[default]
    Warn,
    Minimize,
    #[serde(alias = "hide")]
    #[value(alias = "hide")]
    Background,
    #[serde(alias = "close")]
    #[value(alias = "close")]
    Terminate,
}

impl Display for BlockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockLevel::Warn => write!(f, "warn"),
            BlockLevel::Minimize => write!(f, "minimize"),
            BlockLevel::Background => write!(f, "background"),
            BlockLevel::Terminate => write!(f, "terminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    None,
    Warn,
    Minimize,
    Background,
    Terminate,
}

impl From<BlockLevel> for BlockDecision {
    fn from(value: BlockLevel) -> Self {
        match value {
            BlockLevel::Warn => BlockDecision::Warn,
            BlockLevel::Minimize => BlockDecision::Minimize,
            BlockLevel::Background => BlockDecision::Background,
            BlockLevel::Terminate => BlockDecision::Terminate,
        }
    }
}

#[derive(Debug, Clone)]
struct BlockedEntry {
    identity: AppIdentity,
    level: BlockLevel,
}

/// Windows changed by a block, keyed by lowercase process name, together with the state
/// each window had before it was first touched.
#[derive(Debug, Default)]
struct BlockState {
    blocked: HashMap<String, BlockedEntry>,
    /// Window title to (process key, state before blocking).
    prior_states: HashMap<String, (String, WindowState)>,
}

pub struct BlockController {
    level: BlockLevel,
    windows: BlockingSlot<Box<dyn WindowController>>,
    processes: Box<dyn ProcessController>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
    warnings: WarnLimiter,
    state: BlockState,
}

fn process_key(identity: &AppIdentity) -> String {
    identity.process_name.to_lowercase()
}

impl BlockController {
    pub fn new(
        level: BlockLevel,
        windows: Box<dyn WindowController>,
        processes: Box<dyn ProcessController>,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            level,
            windows: BlockingSlot::new(windows),
            processes,
            clock,
            events,
            warnings: WarnLimiter::default(),
            state: BlockState::default(),
        }
    }

    pub fn with_call_timeout(self, timeout: Duration) -> Self {
        Self {
            windows: self.windows.with_timeout(timeout),
            ..self
        }
    }

    pub fn level(&self) -> BlockLevel {
        self.level
    }

    pub fn set_level(&mut self, level: BlockLevel) {
        info!("Block level changed from {} to {level}", self.level);
        self.level = level;
    }

    /// Lowercase names of processes whose windows are currently blocked.
    pub fn blocked_processes(&self) -> Vec<&str> {
        self.state.blocked.keys().map(|v| v.as_str()).collect()
    }

    pub fn evaluate(
        &self,
        identity: &AppIdentity,
        category: Category,
        current_points: u64,
    ) -> BlockDecision {
        if category != Category::Entertainment || current_points > 0 {
            return BlockDecision::None;
        }
        debug!("{} is used without points", identity.process_name);
        self.level.into()
    }

    /// Returns whether the action took effect. For warnings that means a warning was emitted.
    pub async fn execute(&mut self, decision: BlockDecision, identity: &AppIdentity) -> bool {
        match decision {
            BlockDecision::None => false,
            BlockDecision::Warn => self.warn(identity),
            BlockDecision::Minimize => {
                self.change_window(identity, BlockLevel::Minimize, WindowAction::Minimize)
                    .await
            }
            BlockDecision::Background => {
                self.change_window(identity, BlockLevel::Background, WindowAction::Hide)
                    .await
            }
            BlockDecision::Terminate => self.terminate(identity).await,
        }
    }

    fn warn(&mut self, identity: &AppIdentity) -> bool {
        if !self
            .warnings
            .try_warn(&identity.process_name, self.clock.time())
        {
            return false;
        }
        self.events.publish(MonitorEvent::BlockedAppAccess {
            identity: identity.clone(),
        });
        true
    }

    async fn change_window(
        &mut self,
        identity: &AppIdentity,
        level: BlockLevel,
        action: WindowAction,
    ) -> bool {
        let title = identity.window_title.as_ref();
        let queried = identity.window_title.clone();
        let prior = match self
            .windows
            .run(move |windows| windows.window_state(&queried))
            .await
        {
            Ok(Some(v)) => v,
            Ok(None) => {
                warn!(
                    "Window '{title}' of {} is gone, can't {level} it",
                    identity.process_name
                );
                return false;
            }
            Err(e) => {
                error!("Failed to query window '{title}' {e:?}");
                return false;
            }
        };

        let changed = identity.window_title.clone();
        match self
            .windows
            .run(move |windows| windows.apply(&changed, action))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("Window '{title}' disappeared before {level}");
                return false;
            }
            Err(e) => {
                error!("Failed to {level} window '{title}' {e:?}");
                return false;
            }
        }

        let key = process_key(identity);
        self.state
            .prior_states
            .entry(title.to_string())
            .or_insert_with(|| (key.clone(), prior));
        self.state.blocked.insert(
            key,
            BlockedEntry {
                identity: identity.clone(),
                level,
            },
        );
        self.events.publish(MonitorEvent::BlockApplied {
            identity: identity.clone(),
            level,
        });
        true
    }

    async fn terminate(&mut self, identity: &AppIdentity) -> bool {
        let pid = identity.pid;
        match self.processes.request_termination(pid) {
            Ok(false) => {
                debug!("{identity} is already gone");
                return true;
            }
            Ok(true) => {}
            Err(e) => warn!("Failed to ask {identity} to terminate {e:?}"),
        }

        if !self.wait_for_exit(pid, TERMINATION_TIMEOUT_SECS).await {
            info!("{identity} didn't exit in {TERMINATION_TIMEOUT_SECS}s, killing it");
            if let Err(e) = self.processes.force_kill(pid) {
                error!("Failed to kill {identity} {e:?}");
                return false;
            }
            if !self.wait_for_exit(pid, KILL_TIMEOUT_SECS).await {
                error!("{identity} is still running after being killed");
                return false;
            }
        }

        self.events.publish(MonitorEvent::BlockApplied {
            identity: identity.clone(),
            level: BlockLevel::Terminate,
        });
        true
    }

    /// Polls until `pid` is gone. Returns `false` when it outlived `seconds`.
    async fn wait_for_exit(&mut self, pid: u32, seconds: i64) -> bool {
        let deadline = self.clock.time() + chrono::Duration::seconds(seconds);
        while self.clock.time() < deadline {
            if !self.processes.is_running(pid) {
                return true;
            }
            self.clock.sleep(TERMINATION_POLL_INTERVAL).await;
        }
        !self.processes.is_running(pid)
    }

    /// Restores every blocked window. Called once the balance is positive again.
    pub async fn release_all(&mut self) {
        self.release_unless(|_| false).await;
    }

    /// Restores blocked windows for which `still_blocked` returns `false`. Called after the
    /// keyword lists change.
    pub async fn release_unless(&mut self, still_blocked: impl Fn(&AppIdentity) -> bool) {
        let released = self
            .state
            .blocked
            .iter()
            .filter(|(_, entry)| !still_blocked(&entry.identity))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        for key in released {
            if let Some(entry) = self.state.blocked.remove(&key) {
                debug!("Releasing {} block of {}", entry.level, entry.identity);
            }
            self.restore_windows_of(&key).await;
            self.events
                .publish(MonitorEvent::BlockReleased { process_name: key });
        }
    }

    async fn restore_windows_of(&mut self, key: &str) {
        let titles = self
            .state
            .prior_states
            .iter()
            .filter(|(_, (owner, _))| owner == key)
            .map(|(title, _)| title.clone())
            .collect::<Vec<_>>();

        for title in titles {
            let Some((_, prior)) = self.state.prior_states.remove(&title) else {
                continue;
            };
            if prior.visible {
                self.restore_window(&title, WindowAction::Show).await;
            }
            if !prior.minimized {
                self.restore_window(&title, WindowAction::Restore).await;
            }
        }
    }

    async fn restore_window(&mut self, title: &str, action: WindowAction) {
        let restored = title.to_string();
        match self
            .windows
            .run(move |windows| windows.apply(&restored, action))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!("Window '{title}' closed while blocked"),
            Err(e) => error!("Failed to {action:?} window '{title}' {e:?}"),
        }
    }
}
