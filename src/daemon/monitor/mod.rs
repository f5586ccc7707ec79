//! Tracks the focused window between ticks. OS queries run on the blocking pool under a
//! timeout, so a stuck query only ever skips a tick.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    daemon::classifier::{rules::ClassificationRules, Category},
    utils::{blocking::BlockingSlot, time::seconds_between},
    window_api::{AppIdentity, WindowManager},
};

/// Outcome of a single monitor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorTick {
    /// The OS query failed. Nothing changed and the elapsed time is not credited.
    Skipped,
    /// Nothing is focused and nothing was tracked.
    Idle,
    /// The tracked window lost focus.
    FocusLost,
    /// A new window got focus. Its dwell time starts now.
    Switched {
        identity: AppIdentity,
        category: Category,
    },
    Continued {
        identity: AppIdentity,
        category: Category,
        dwell_seconds: f64,
    },
}

impl MonitorTick {
    /// The activity this tick observed, with the dwell time to account for it.
    pub fn activity(&self) -> Option<(&AppIdentity, Category, f64)> {
        match self {
            MonitorTick::Switched { identity, category } => Some((identity, *category, 0.)),
            MonitorTick::Continued {
                identity,
                category,
                dwell_seconds,
            } => Some((identity, *category, *dwell_seconds)),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum MonitorState {
    Idle,
    Tracking {
        identity: AppIdentity,
        /// Cleared when the rules change.
        category: Option<Category>,
        last_tick_time: DateTime<Utc>,
    },
}

pub struct WindowMonitor {
    manager: BlockingSlot<Box<dyn WindowManager>>,
    state: MonitorState,
}

impl WindowMonitor {
    pub fn new(manager: Box<dyn WindowManager>) -> Self {
        Self {
            manager: BlockingSlot::new(manager),
            state: MonitorState::Idle,
        }
    }

    pub fn with_query_timeout(self, query_timeout: Duration) -> Self {
        Self {
            manager: self.manager.with_timeout(query_timeout),
            ..self
        }
    }

    pub fn tracked(&self) -> Option<&AppIdentity> {
        match &self.state {
            MonitorState::Idle => None,
            MonitorState::Tracking { identity, .. } => Some(identity),
        }
    }

    /// Asks the OS for the focused window. `None` when nothing has focus.
    pub async fn poll(&self) -> Result<Option<AppIdentity>> {
        self.manager
            .run(|manager| manager.get_active_identity())
            .await
    }

    /// Forces reclassification of the tracked window on the next tick.
    pub fn invalidate_categories(&mut self) {
        if let MonitorState::Tracking { category, .. } = &mut self.state {
            *category = None;
        }
    }

    pub async fn tick(&mut self, rules: &ClassificationRules, now: DateTime<Utc>) -> MonitorTick {
        let current = match self.poll().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping tick, failed to query the focused window {e:?}");
                if let MonitorState::Tracking { last_tick_time, .. } = &mut self.state {
                    *last_tick_time = now;
                }
                return MonitorTick::Skipped;
            }
        };

        let Some(current) = current else {
            return match std::mem::replace(&mut self.state, MonitorState::Idle) {
                MonitorState::Idle => MonitorTick::Idle,
                MonitorState::Tracking { identity, .. } => {
                    debug!("{identity} lost focus");
                    MonitorTick::FocusLost
                }
            };
        };

        if let MonitorState::Tracking {
            identity,
            category,
            last_tick_time,
        } = &mut self.state
        {
            if identity.same_window(&current) {
                let dwell_seconds = seconds_between(*last_tick_time, now);
                let category = *category.get_or_insert_with(|| rules.classify(&current));
                *last_tick_time = now;
                *identity = current.clone();
                return MonitorTick::Continued {
                    identity: current,
                    category,
                    dwell_seconds,
                };
            }
        }

        let category = rules.classify(&current);
        debug!("Switched to {current} ({category})");
        self.state = MonitorState::Tracking {
            identity: current.clone(),
            category: Some(category),
            last_tick_time: now,
        };
        MonitorTick::Switched {
            identity: current,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::anyhow;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::{
        daemon::{
            classifier::{rules::ClassificationRules, Category, KeywordList, Whitelist},
            storage::entities::CategoryConfigEntity,
        },
        utils::clock::testing::TEST_START_DATE,
        window_api::{testing::identity, AppIdentity, MockWindowManager},
    };

    use super::{MonitorTick, WindowMonitor};

    fn rules() -> ClassificationRules {
        ClassificationRules::from_entity(
            &CategoryConfigEntity {
                productivity_app: vec!["code".into()],
                entertainment_app: vec!["steam".into()],
                neutral_app: vec![],
            },
            Whitelist::from_entries([]),
        )
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::seconds(seconds)
    }

    fn monitor_of(results: Vec<anyhow::Result<Option<AppIdentity>>>) -> WindowMonitor {
        let mut manager = MockWindowManager::new();
        let mut results = results.into_iter();
        manager
            .expect_get_active_identity()
            .returning(move || results.next().unwrap_or(Ok(None)));
        WindowMonitor::new(Box::new(manager))
    }

    #[tokio::test]
    async fn test_switch_then_continue() {
        let code = identity("Code.exe", "main.rs");
        let mut monitor = monitor_of(vec![
            Ok(Some(code.clone())),
            Ok(Some(code.clone())),
            Ok(Some(identity("steam.exe", "Library"))),
        ]);
        let rules = rules();

        assert_eq!(
            monitor.tick(&rules, at(0)).await,
            MonitorTick::Switched {
                identity: code.clone(),
                category: Category::Productive
            }
        );
        assert_eq!(
            monitor.tick(&rules, at(5)).await,
            MonitorTick::Continued {
                identity: code,
                category: Category::Productive,
                dwell_seconds: 5.
            }
        );
        assert!(matches!(
            monitor.tick(&rules, at(10)).await,
            MonitorTick::Switched {
                category: Category::Entertainment,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_focus_lost_then_idle() {
        let mut monitor = monitor_of(vec![Ok(Some(identity("Code.exe", "main.rs"))), Ok(None)]);
        let rules = rules();

        monitor.tick(&rules, at(0)).await;
        assert_eq!(monitor.tick(&rules, at(5)).await, MonitorTick::FocusLost);
        assert_eq!(monitor.tick(&rules, at(10)).await, MonitorTick::Idle);
        assert!(monitor.tracked().is_none());
    }

    #[tokio::test]
    async fn test_failed_query_is_never_credited() {
        let code = identity("Code.exe", "main.rs");
        let mut monitor = monitor_of(vec![
            Ok(Some(code.clone())),
            Err(anyhow!("access denied")),
            Ok(Some(code.clone())),
        ]);
        let rules = rules();

        monitor.tick(&rules, at(0)).await;
        assert_eq!(monitor.tick(&rules, at(5)).await, MonitorTick::Skipped);
        let tick = monitor.tick(&rules, at(10)).await;

        assert_eq!(tick.activity().map(|(_, _, dwell)| dwell), Some(5.));
        assert_eq!(monitor.tracked(), Some(&code));
    }

    #[tokio::test]
    async fn test_stuck_query_times_out() {
        let mut manager = MockWindowManager::new();
        manager.expect_get_active_identity().returning(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(None)
        });
        let mut monitor =
            WindowMonitor::new(Box::new(manager)).with_query_timeout(Duration::from_millis(50));

        assert_eq!(monitor.tick(&rules(), at(0)).await, MonitorTick::Skipped);
    }

    #[tokio::test]
    async fn test_stuck_query_runs_only_once() {
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = queries.clone();
        let mut manager = MockWindowManager::new();
        manager.expect_get_active_identity().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            Ok(None)
        });
        let mut monitor =
            WindowMonitor::new(Box::new(manager)).with_query_timeout(Duration::from_millis(20));
        let rules = rules();

        for second in 0..6 {
            assert_eq!(monitor.tick(&rules, at(second)).await, MonitorTick::Skipped);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rules_change_reclassifies_tracked_window() -> anyhow::Result<()> {
        let game = identity("game.exe", "Level 1");
        let mut monitor = monitor_of(vec![Ok(Some(game.clone())), Ok(Some(game.clone()))]);
        let mut rules = rules();

        monitor.tick(&rules, at(0)).await;
        rules.add(KeywordList::Entertainment, "game")?;
        monitor.invalidate_categories();

        assert!(matches!(
            monitor.tick(&rules, at(5)).await,
            MonitorTick::Continued {
                category: Category::Entertainment,
                ..
            }
        ));
        Ok(())
    }
}
