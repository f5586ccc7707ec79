use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    daemon::settings::Settings,
    fs::operations::{modified_time, read_json_if_exists, read_json_or_reinit, write_json},
};

use super::entities::{CategoryConfigEntity, DailyReportEntity, LedgerEntity, StatusEntity};

pub const CATEGORIES_FILE: &str = "categories.json";
pub const POINTS_FILE: &str = "points.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DAILY_REPORTS_FILE: &str = "daily_reports.json";
pub const STATUS_FILE: &str = "status.json";

/// One JSON document on disk. Cheap to clone, holds nothing but the path.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _content: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonDocument<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> JsonDocument<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _content: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn modified(&self) -> Option<SystemTime> {
        modified_time(&self.path).await
    }
}

impl<T: Serialize + DeserializeOwned + Default> JsonDocument<T> {
    /// Loads the document, creating or repairing it when needed.
    pub async fn load(&self) -> Result<T> {
        read_json_or_reinit(&self.path).await
    }

    pub async fn save(&self, value: &T) -> Result<()> {
        write_json(&self.path, value).await
    }

    /// Loads the document without creating or repairing it.
    pub async fn peek(&self) -> Result<Option<T>> {
        read_json_if_exists(&self.path).await
    }
}

/// Knows where every document of an application directory lives. Constructed once and
/// handed to whoever needs persistence.
#[derive(Debug, Clone)]
pub struct DataFiles {
    dir: PathBuf,
}

impl DataFiles {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn categories(&self) -> JsonDocument<CategoryConfigEntity> {
        JsonDocument::new(self.dir.join(CATEGORIES_FILE))
    }

    pub fn points(&self) -> JsonDocument<LedgerEntity> {
        JsonDocument::new(self.dir.join(POINTS_FILE))
    }

    pub fn settings(&self) -> JsonDocument<Settings> {
        JsonDocument::new(self.dir.join(SETTINGS_FILE))
    }

    pub fn daily_reports(&self) -> JsonDocument<Vec<DailyReportEntity>> {
        JsonDocument::new(self.dir.join(DAILY_REPORTS_FILE))
    }

    pub fn status(&self) -> JsonDocument<StatusEntity> {
        JsonDocument::new(self.dir.join(STATUS_FILE))
    }

    pub fn logs(&self) -> PathBuf {
        self.dir.join("logs")
    }

    pub fn daemon_lock(&self) -> PathBuf {
        self.dir.join("daemon.lock")
    }
}

/// Adds `pending` counters into the report of the same day, creating it when missing.
/// Reports stay ordered by date.
pub fn merge_report(reports: &mut Vec<DailyReportEntity>, pending: &DailyReportEntity) {
    match reports.iter_mut().find(|r| r.date == pending.date) {
        Some(report) => report.merge(pending),
        None => {
            reports.push(pending.clone());
            reports.sort_by_key(|r| r.date);
        }
    }
}
