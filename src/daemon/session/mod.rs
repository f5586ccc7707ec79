//! The monitoring loop. A [MonitorSession] owns every component and is the only writer of
//! the ledger and the keyword lists, everybody else goes through [SessionCommand]s.

pub mod commands;
pub mod integrity;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use commands::{SessionCommand, SessionSnapshot};
use integrity::IntegrityProbe;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    daemon::{
        blocking::{BlockController, BlockDecision},
        classifier::{Category, Classifier},
        events::{EventPublisher, MonitorEvent},
        ledger::persistent::PersistentLedger,
        monitor::{MonitorTick, WindowMonitor},
    },
    utils::clock::Clock,
};

/// Everything a session is assembled from.
pub struct SessionParts {
    pub classifier: Classifier,
    pub ledger: PersistentLedger,
    pub monitor: WindowMonitor,
    pub blocker: BlockController,
    pub integrity: Box<dyn IntegrityProbe>,
    pub clock: Arc<dyn Clock>,
    pub events: EventPublisher,
    pub interval: Duration,
}

pub struct MonitorSession {
    classifier: Classifier,
    ledger: PersistentLedger,
    monitor: WindowMonitor,
    blocker: BlockController,
    integrity: Box<dyn IntegrityProbe>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
    interval: Duration,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: CancellationToken,
}

impl MonitorSession {
    pub fn new(
        parts: SessionParts,
        commands: mpsc::Receiver<SessionCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            classifier: parts.classifier,
            ledger: parts.ledger,
            monitor: parts.monitor,
            blocker: parts.blocker,
            integrity: parts.integrity,
            clock: parts.clock,
            events: parts.events,
            interval: parts.interval,
            commands,
            shutdown,
        }
    }

    /// Executes the monitoring loop until cancelled or until the integrity check fails.
    /// Commands are handled while waiting for the next tick.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Monitoring every {:?} with {} points",
            self.interval,
            self.ledger.current_points()
        );
        let mut next_tick = self.clock.instant();
        let result = 'session: loop {
            next_tick += self.interval;

            if let Err(e) = self.tick().await {
                break 'session Err(e);
            }

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break 'session Ok(()),
                    Some(command) = self.commands.recv() => self.handle(command).await,
                    _ = self.clock.sleep_until(next_tick) => break,
                }
            }
        };

        self.ledger.flush().await;
        result
    }

    async fn tick(&mut self) -> Result<()> {
        if let Err(e) = self.integrity.verify() {
            error!("Integrity check failed, stopping monitoring {e:?}");
            self.events.publish(MonitorEvent::MonitoringStopped {
                reason: e.to_string(),
            });
            return Err(anyhow!("Integrity check failed: {e}"));
        }

        match self.classifier.reload_if_changed().await {
            Ok(true) => self.rules_changed().await,
            Ok(false) => {}
            Err(e) => warn!("Failed to reload category config {e:?}"),
        }

        let now = self.clock.time();
        let today = self.clock.today();
        let tick = self.monitor.tick(self.classifier.rules(), now).await;
        match &tick {
            MonitorTick::Switched { identity, category } => {
                self.events.publish(MonitorEvent::CategoryChanged {
                    identity: identity.clone(),
                    category: *category,
                });
            }
            MonitorTick::FocusLost => self.events.publish(MonitorEvent::FocusLost),
            _ => {}
        }

        let Some((identity, category, dwell_seconds)) = tick.activity() else {
            return Ok(());
        };

        let delta = self
            .ledger
            .apply_tick(category, dwell_seconds, now, today)
            .await;
        self.points_changed(delta).await;

        let points = self.ledger.current_points();
        let decision = self.blocker.evaluate(identity, category, points);
        if decision != BlockDecision::None {
            let applied = self.blocker.execute(decision, identity).await;
            debug!("{decision:?} against {identity} applied: {applied}");
        }
        Ok(())
    }

    async fn points_changed(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        let current_points = self.ledger.current_points();
        self.events.publish(MonitorEvent::PointsUpdated {
            delta,
            current_points,
        });
        if current_points > 0 {
            self.blocker.release_all().await;
        }
    }

    async fn rules_changed(&mut self) {
        self.monitor.invalidate_categories();
        let rules = self.classifier.rules();
        self.blocker
            .release_unless(|identity| rules.classify(identity) == Category::Entertainment)
            .await;
    }

    async fn handle(&mut self, command: SessionCommand) {
        debug!("Handling {command:?}");
        match command {
            SessionCommand::AdjustPoints {
                delta,
                reason,
                reply,
            } => {
                let applied = self
                    .ledger
                    .adjust(delta, &reason, self.clock.time(), self.clock.today())
                    .await;
                self.points_changed(applied).await;
                let _ = reply.send(applied);
            }
            SessionCommand::AddKeyword {
                list,
                keyword,
                reply,
            } => {
                let result = self.classifier.add(list, &keyword).await;
                if matches!(result, Ok(true)) {
                    self.rules_changed().await;
                }
                let _ = reply.send(result);
            }
            SessionCommand::RemoveKeyword {
                list,
                keyword,
                reply,
            } => {
                let result = self.classifier.remove(list, &keyword).await;
                if matches!(result, Ok(true)) {
                    self.rules_changed().await;
                }
                let _ = reply.send(result);
            }
            SessionCommand::SetBlockLevel { level } => self.blocker.set_level(level),
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let ledger = self.ledger.ledger();
        SessionSnapshot {
            current_points: ledger.current_points(),
            daily_points_earned: ledger.state().daily_points_earned,
            daily_points_spent: ledger.state().daily_points_spent,
            streak_seconds: ledger.streak().current_streak_seconds,
            tracked: self.monitor.tracked().cloned(),
            block_level: self.blocker.level(),
            blocked_processes: self
                .blocker
                .blocked_processes()
                .into_iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc::Receiver;

    use crate::{
        daemon::{
            blocking::{BlockController, BlockLevel},
            classifier::{Classifier, KeywordList, Whitelist},
            events::{EventPublisher, MonitorEvent},
            ledger::persistent::PersistentLedger,
            monitor::WindowMonitor,
            settings::Settings,
            storage::{documents::DataFiles, entities::CategoryConfigEntity},
        },
        utils::{
            clock::{testing::ManualClock, Clock},
            logging::TEST_LOGGING,
        },
        window_api::{
            testing::identity, AppIdentity, MockProcessController, MockWindowController,
            MockWindowManager, WindowState,
        },
    };

    use super::{
        commands::SessionHandle,
        integrity::{IntegrityProbe, MockIntegrityProbe},
        SessionParts,
    };

    const INTERVAL: Duration = Duration::from_millis(20);

    struct Fixture {
        _dir: TempDir,
        files: DataFiles,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            *TEST_LOGGING;
            let dir = tempdir()?;
            let files = DataFiles::new(dir.path().to_path_buf())?;
            Ok(Self {
                _dir: dir,
                files,
                clock: ManualClock::new(),
            })
        }

        async fn parts(
            &self,
            manager: MockWindowManager,
            windows: MockWindowController,
            integrity: Box<dyn IntegrityProbe>,
            settings: Settings,
            events: EventPublisher,
        ) -> Result<SessionParts> {
            self.files
                .categories()
                .save(&CategoryConfigEntity {
                    productivity_app: vec!["code".into()],
                    entertainment_app: vec!["steam".into()],
                    neutral_app: vec![],
                })
                .await?;
            let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
            let classifier =
                Classifier::load(self.files.categories(), Whitelist::from_entries([])).await?;
            let ledger = PersistentLedger::load(
                settings.ledger_config(),
                self.files.points(),
                self.files.daily_reports(),
                clock.today(),
            )
            .await?;
            let blocker = BlockController::new(
                settings.block_level,
                Box::new(windows),
                Box::new(MockProcessController::new()),
                clock.clone(),
                events.clone(),
            );

            Ok(SessionParts {
                classifier,
                ledger,
                monitor: WindowMonitor::new(Box::new(manager)),
                blocker,
                integrity,
                clock,
                events,
                interval: INTERVAL,
            })
        }
    }

    fn healthy() -> Box<dyn IntegrityProbe> {
        let mut probe = MockIntegrityProbe::new();
        probe.expect_verify().returning(|| Ok(()));
        Box::new(probe)
    }

    fn always_focused(identity: AppIdentity) -> MockWindowManager {
        let mut manager = MockWindowManager::new();
        manager
            .expect_get_active_identity()
            .returning(move || Ok(Some(identity.clone())));
        manager
    }

    fn drain(events: &mut Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut result = vec![];
        while let Ok(event) = events.try_recv() {
            result.push(event);
        }
        result
    }

    /// 62 ticks of 5 seconds: one switch tick and 61 ticks adding up to 305 seconds.
    #[tokio::test]
    async fn test_productive_session_earns_one_point() -> Result<()> {
        let fixture = Fixture::new()?;
        let settings = Settings::default();
        let parts = fixture
            .parts(
                always_focused(identity("Code.exe", "main.rs")),
                MockWindowController::new(),
                healthy(),
                settings,
                EventPublisher::disabled(),
            )
            .await?;

        let end = fixture.clock.time() + chrono::Duration::seconds(310);
        let handle = SessionHandle::start(parts);
        while fixture.clock.time() < end {
            tokio::time::sleep(INTERVAL).await;
        }
        let snapshot = handle.snapshot().await?;
        handle.stop_and_wait().await?;

        assert_eq!(snapshot.current_points, 1);
        assert_eq!(snapshot.daily_points_earned, 1);
        let stored = fixture.files.points().load().await?;
        assert_eq!(stored.current_points, 1);
        assert_eq!(stored.daily_points_earned, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_entertainment_without_points_warns_once() -> Result<()> {
        let fixture = Fixture::new()?;
        let (events, mut receiver) = EventPublisher::channel();
        let parts = fixture
            .parts(
                always_focused(identity("steam.exe", "Library")),
                MockWindowController::new(),
                healthy(),
                Settings::default(),
                events,
            )
            .await?;

        let handle = SessionHandle::start(parts);
        tokio::time::sleep(INTERVAL * 10).await;
        handle.stop_and_wait().await?;

        let warnings = drain(&mut receiver)
            .into_iter()
            .filter(|e| matches!(e, MonitorEvent::BlockedAppAccess { .. }))
            .count();
        assert_eq!(warnings, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_integrity_failure_stops_the_loop() -> Result<()> {
        let fixture = Fixture::new()?;
        let (events, mut receiver) = EventPublisher::channel();
        let mut probe = MockIntegrityProbe::new();
        let mut checks = 0;
        probe.expect_verify().returning(move || {
            checks += 1;
            if checks < 3 {
                Ok(())
            } else {
                Err(anyhow!("process renamed"))
            }
        });
        let parts = fixture
            .parts(
                always_focused(identity("Code.exe", "main.rs")),
                MockWindowController::new(),
                Box::new(probe),
                Settings::default(),
                events,
            )
            .await?;

        let handle = SessionHandle::start(parts);
        handle.finished().await;

        assert!(handle.stop_and_wait().await.is_err());
        let events = drain(&mut receiver);
        assert_eq!(
            events.last(),
            Some(&MonitorEvent::MonitoringStopped {
                reason: "process renamed".into()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_adjustment_releases_blocked_window() -> Result<()> {
        let fixture = Fixture::new()?;
        let mut windows = MockWindowController::new();
        windows.expect_window_state().returning(|_| {
            Ok(Some(WindowState {
                minimized: false,
                visible: true,
            }))
        });
        windows.expect_apply().returning(|_, _| Ok(true));
        let mut manager = MockWindowManager::new();
        let mut ticks = 0;
        manager.expect_get_active_identity().returning(move || {
            ticks += 1;
            // Minimized windows lose focus.
            Ok((ticks == 1).then(|| identity("steam.exe", "Library")))
        });
        let parts = fixture
            .parts(
                manager,
                windows,
                healthy(),
                Settings {
                    block_level: BlockLevel::Minimize,
                    ..Settings::default()
                },
                EventPublisher::disabled(),
            )
            .await?;

        let handle = SessionHandle::start(parts);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(
            handle.snapshot().await?.blocked_processes,
            vec!["steam.exe".to_string()]
        );

        assert_eq!(handle.adjust_points(5, "wager won").await?, 5);
        let snapshot = handle.snapshot().await?;
        handle.stop_and_wait().await?;

        assert_eq!(snapshot.current_points, 5);
        assert!(snapshot.blocked_processes.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() -> Result<()> {
        let fixture = Fixture::new()?;
        let parts = fixture
            .parts(
                always_focused(identity("gimp", "untitled")),
                MockWindowController::new(),
                healthy(),
                Settings::default(),
                EventPublisher::disabled(),
            )
            .await?;

        let handle = SessionHandle::start(parts);
        assert!(handle.add_keyword(KeywordList::Entertainment, "GIMP").await?);
        assert!(!handle.add_keyword(KeywordList::Entertainment, "gimp").await?);
        assert!(handle.remove_keyword(KeywordList::Entertainment, "gimp").await?);
        handle.set_block_level(BlockLevel::Terminate).await?;
        let snapshot = handle.snapshot().await?;
        handle.stop_and_wait().await?;

        assert_eq!(snapshot.block_level, BlockLevel::Terminate);
        assert!(fixture
            .files
            .categories()
            .load()
            .await?
            .entertainment_app
            .iter()
            .all(|v| v != "gimp"));
        Ok(())
    }
}
