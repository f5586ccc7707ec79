use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::{debug, warn};

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_else(|| OsString::from("document"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Advisory lock shared by every process touching the same document. Writers replace the
/// document through a rename, so the lock lives in a separate `.lock` file.
async fn open_lock(path: &Path) -> Result<File, io::Error> {
    File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(sibling(path, ".lock"))
        .await
}

/// Replaces a file's content so that readers either see the old or the new version, never
/// a truncated one. The data is written into a temporary file, synced and renamed over.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let temp_path = sibling(path, ".tmp");
    let result = write_and_rename(&temp_path, path, contents).await;
    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

async fn write_and_rename(temp_path: &Path, path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let mut file = File::create(temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, path).await
}

async fn write_json_unlocked<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buffer = serde_json::to_vec_pretty(value)?;
    buffer.push(b'\n');
    write_atomic(path, &buffer)
        .await
        .with_context(|| format!("Failed to write {path:?}"))
}

/// Serializes `value` into `path` atomically under the document lock.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let lock = open_lock(path).await?;
    lock.lock_exclusive()?;
    let result = write_json_unlocked(path, value).await;
    lock.unlock_async().await?;
    result
}

/// Reads a JSON document. A missing document is created with the default value. An empty
/// or invalid one is moved aside to `<name>.corrupt`, reinitialized with the default value
/// and read once more.
pub async fn read_json_or_reinit<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let lock = open_lock(path).await?;
    lock.lock_exclusive()?;
    let result = read_json_or_reinit_unlocked(path).await;
    lock.unlock_async().await?;
    result
}

async fn read_json_or_reinit_unlocked<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{path:?} doesn't exist, creating it");
            let value = T::default();
            write_json_unlocked(path, &value).await?;
            return Ok(value);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("{path:?} is empty or corrupted, reinitializing it: {e}");
            if !bytes.is_empty() {
                fs::rename(path, sibling(path, ".corrupt"))
                    .await
                    .with_context(|| format!("Failed to move corrupted {path:?} aside"))?;
            }
            write_json_unlocked(path, &T::default()).await?;
            let bytes = fs::read(path).await?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("{path:?} is still unreadable after reinitializing"))
        }
    }
}

/// Reads a JSON document without creating or repairing it. Used by observers that must not
/// write into the daemon's files.
pub async fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).with_context(|| {
            format!("{path:?} is not a valid document")
        })?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {path:?}")),
    }
}

pub async fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).await.ok()?.modified().ok()
}
