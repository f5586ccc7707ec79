use anyhow::{bail, Result};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tracing::{debug, instrument};

use super::ProcessController;

/// [ProcessController] backed by sysinfo. Works on every platform the daemon runs on.
pub struct SysinfoProcessController {
    system: System,
}

impl SysinfoProcessController {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh(&mut self, pid: Pid) {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    }
}

impl Default for SysinfoProcessController {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessController for SysinfoProcessController {
    #[instrument(skip(self))]
    fn request_termination(&mut self, pid: u32) -> Result<bool> {
        let pid = Pid::from_u32(pid);
        self.refresh(pid);
        let Some(process) = self.system.process(pid) else {
            return Ok(false);
        };
        // Windows has no SIGTERM equivalent, so a graceful request becomes a hard kill there.
        let sent = match process.kill_with(Signal::Term) {
            Some(sent) => sent,
            None => process.kill(),
        };
        debug!("Termination request sent: {sent}");
        Ok(true)
    }

    fn is_running(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.refresh(pid);
        self.system.process(pid).is_some()
    }

    #[instrument(skip(self))]
    fn force_kill(&mut self, pid: u32) -> Result<bool> {
        let pid = Pid::from_u32(pid);
        self.refresh(pid);
        let Some(process) = self.system.process(pid) else {
            return Ok(false);
        };
        if !process.kill() {
            bail!("Kill signal to {pid} was not delivered");
        }
        Ok(true)
    }
}
