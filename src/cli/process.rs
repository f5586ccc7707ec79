use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, bail, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

fn daemon_executable() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

/// Terminates every running daemon started from the executable next to this cli. Returns
/// how many were found.
pub fn kill_previous_servers() -> Result<usize> {
    let name = daemon_executable()?;
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own pid: {e}"))?;
    let mut stopped = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            info!("Stopping daemon {pid}");
            // SIGTERM lets the daemon flush the ledger. On Windows this is a forced kill.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}

/// Shuts down previous daemons and starts a new one for `dir`. The daemon binary detaches by
/// itself, so this only waits for the launcher to return.
pub fn restart_server(dir: &Path) -> Result<()> {
    kill_previous_servers()?;
    let daemon = daemon_executable()?;
    let mut command = std::process::Command::new(&daemon);
    command.arg("--dir").arg(dir);
    command.stdin(Stdio::null());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }

    println!("Spawning {}", daemon.display());
    let status = command.status()?;
    if !status.success() {
        bail!("Daemon launcher exited with {status}");
    }
    println!("Success");
    Ok(())
}
