use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use blocking::BlockController;
use classifier::{Classifier, Whitelist};
use events::{status::StatusWriter, EventModule, EventPublisher};
use fs4::tokio::AsyncFileExt;
use ledger::persistent::PersistentLedger;
use monitor::WindowMonitor;
use session::{
    commands::SessionHandle,
    integrity::{IntegrityProbe, SysinfoIntegrity},
    SessionParts,
};
use settings::Settings;
use storage::documents::DataFiles;
use tokio::fs::File;
use tracing::{error, info};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{
        process::SysinfoProcessController, GenericWindowManager, ProcessController,
        WindowController, WindowManager,
    },
};

pub mod args;
pub mod blocking;
pub mod classifier;
pub mod events;
pub mod ledger;
pub mod monitor;
pub mod session;
pub mod settings;
pub mod shutdown;
pub mod storage;

/// OS capabilities the session drives.
pub struct Platform {
    pub manager: Box<dyn WindowManager>,
    pub windows: Box<dyn WindowController>,
    pub processes: Box<dyn ProcessController>,
    pub integrity: Box<dyn IntegrityProbe>,
}

impl Platform {
    pub fn native() -> Result<Self> {
        Ok(Self {
            manager: Box::new(GenericWindowManager::new()?),
            windows: Box::new(GenericWindowManager::new()?),
            processes: Box::new(SysinfoProcessController::new()),
            integrity: Box::new(SysinfoIntegrity::new()?),
        })
    }
}

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let files = DataFiles::new(std::path::absolute(dir)?)?;
    let _lock = acquire_daemon_lock(&files).await?;
    std::env::set_current_dir("/")?;

    let settings = files
        .settings()
        .load()
        .await
        .inspect_err(|e| error!("Failed to load settings {e:?}"))?;
    info!("Starting daemon in {:?} with {settings:?}", files.dir());

    run_daemon(&files, &settings, Platform::native()?, Arc::new(DefaultClock)).await
}

async fn acquire_daemon_lock(files: &DataFiles) -> Result<File> {
    let lock = File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(files.daemon_lock())
        .await?;
    match lock.try_lock_exclusive() {
        Ok(()) => Ok(lock),
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            bail!("Another daemon is already running for {:?}", files.dir())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_daemon(
    files: &DataFiles,
    settings: &Settings,
    platform: Platform,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let (events, receiver) = EventPublisher::channel();
    let parts = create_session(files, settings, platform, clock.clone(), events).await?;

    let mut status = StatusWriter::new(
        files.status(),
        parts.ledger.current_points(),
        clock.clone(),
    );
    if let Err(e) = status.start().await {
        error!("Failed to write initial status {e:?}");
    }

    let handle = SessionHandle::start(parts);
    let shutdown_token = handle.shutdown_token();

    let (status_result, session_result) = tokio::join!(
        EventModule::new(receiver, status).run(),
        async move {
            tokio::select! {
                _ = shutdown::detect_shutdown(shutdown_token) => {},
                _ = handle.finished() => {},
            }
            handle.stop_and_wait().await
        },
    );

    if let Err(session_result) = session_result {
        error!("Monitoring session got an error {:?}", session_result);
    }

    if let Err(status_result) = status_result {
        error!("Status module got an error {:?}", status_result);
    }

    Ok(())
}

async fn create_session(
    files: &DataFiles,
    settings: &Settings,
    platform: Platform,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
) -> Result<SessionParts> {
    let classifier = Classifier::load(
        files.categories(),
        Whitelist::new(&settings.extra_whitelist),
    )
    .await?;
    let ledger = PersistentLedger::load(
        settings.ledger_config(),
        files.points(),
        files.daily_reports(),
        clock.today(),
    )
    .await?;
    let blocker = BlockController::new(
        settings.block_level,
        platform.windows,
        platform.processes,
        clock.clone(),
        events.clone(),
    );

    Ok(SessionParts {
        classifier,
        ledger,
        monitor: WindowMonitor::new(platform.manager),
        blocker,
        integrity: platform.integrity,
        clock,
        events,
        interval: settings.monitor_interval(),
    })
}
