use std::path::PathBuf;

pub const DAEMON_EXECUTABLE: &str = "backtowork-daemon";

/// The daemon binary is installed next to the cli binary.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_EXECUTABLE);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
