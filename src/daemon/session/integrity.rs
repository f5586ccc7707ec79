use std::ffi::OsString;

use anyhow::{anyhow, bail, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Checks that the monitor still runs the way it was started. A failed check stops the
/// monitoring loop.
#[cfg_attr(test, mockall::automock)]
pub trait IntegrityProbe: Send {
    fn verify(&mut self) -> Result<()>;
}

/// Verifies that the daemon's own process is still discoverable under its original name.
pub struct SysinfoIntegrity {
    system: System,
    pid: Pid,
    expected_name: OsString,
}

impl SysinfoIntegrity {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("Can't find own pid: {e}"))?;
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let expected_name = system
            .process(pid)
            .map(|v| v.name().to_os_string())
            .ok_or_else(|| anyhow!("Own process {pid} is not visible"))?;

        Ok(Self {
            system,
            pid,
            expected_name,
        })
    }
}

impl IntegrityProbe for SysinfoIntegrity {
    fn verify(&mut self) -> Result<()> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        match self.system.process(self.pid) {
            None => bail!("Own process {} is no longer visible", self.pid),
            Some(process) if process.name() != self.expected_name => bail!(
                "Own process was renamed from {:?} to {:?}",
                self.expected_name,
                process.name()
            ),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{IntegrityProbe, SysinfoIntegrity};

    #[test]
    fn test_own_process_passes() -> Result<()> {
        let mut probe = SysinfoIntegrity::new()?;
        probe.verify()?;
        probe.verify()
    }
}
