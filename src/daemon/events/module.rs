use anyhow::Result;

use super::MonitorEvent;

/// Represents a consumer of monitor events, e.g. the status file writer or a UI bridge.
pub trait EventProcessor {
    fn process_next(
        &mut self,
        event: MonitorEvent,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
