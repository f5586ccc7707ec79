use anyhow::Result;

/// The daemon is a single polling loop plus a blocking pool for OS queries, one worker
/// thread is enough.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
