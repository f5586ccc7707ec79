//! Contains the capabilities the monitor needs from the operating system.
//! [GenericWindowManager] is the main artifact of this module that abstracts
//! over the platform backends. Process control is shared by every platform and
//! lives in [process].

pub mod process;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{collections::HashMap, fmt::Display, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Identity of the focused application at one point in time. Rebuilt on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Executable file name. For example 'Code.exe' or 'firefox'
    pub process_name: Arc<str>,
    /// Name of the window. For example 'bash in hello' or 'Vibing in YouTube - Chrome'
    pub window_title: Arc<str>,
    /// Full path to an executable. For example /usr/bin/nvim
    pub executable_path: Arc<str>,
    pub pid: u32,
}

impl AppIdentity {
    /// Two identities point to the same tracked window when both process and title match.
    pub fn same_window(&self, other: &AppIdentity) -> bool {
        self.process_name == other.process_name && self.window_title == other.window_title
    }
}

impl Display for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' (pid {})", self.process_name, self.window_title, self.pid)
    }
}

/// Visual state of a window captured before it gets blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub minimized: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Minimize,
    Hide,
    Restore,
    Show,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    /// Returns `None` when no window has focus, e.g. the desktop is shown.
    fn get_active_identity(&mut self) -> Result<Option<AppIdentity>>;
}

/// Changes the visual state of other applications' windows. Windows are looked up by
/// title, which is best-effort: the window may close between classification and action.
#[cfg_attr(test, mockall::automock)]
pub trait WindowController: Send {
    /// `None` when no window with this title exists.
    fn window_state(&mut self, title: &str) -> Result<Option<WindowState>>;

    /// Returns `false` when no window with this title exists.
    fn apply(&mut self, title: &str, action: WindowAction) -> Result<bool>;
}

/// Terminates processes by id.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessController: Send {
    /// Asks the process to exit. Returns `false` if the process is already gone.
    fn request_termination(&mut self, pid: u32) -> Result<bool>;

    fn is_running(&mut self, pid: u32) -> bool;

    /// Returns `false` if the process is already gone.
    fn force_kill(&mut self, pid: u32) -> Result<bool>;
}

/// Serves as a cross-compatible WindowManager and WindowController implementation.
pub struct GenericWindowManager {
    inner: Box<dyn PlatformWindows>,
}

/// Everything a platform backend provides.
trait PlatformWindows: WindowManager + WindowController {}

impl<T: WindowManager + WindowController> PlatformWindows for T {}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No window backend was compiled in. Build with the `win` or `x11` feature"
                ))
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_identity(&mut self) -> Result<Option<AppIdentity>> {
        self.inner.get_active_identity()
    }
}

impl WindowController for GenericWindowManager {
    fn window_state(&mut self, title: &str) -> Result<Option<WindowState>> {
        self.inner.window_state(title)
    }

    fn apply(&mut self, title: &str, action: WindowAction) -> Result<bool> {
        self.inner.apply(title, action)
    }
}

/// Windows this process withdrew from the desktop, by title. A hidden window drops out of
/// the lists the backends search, so its handle is kept until it shows up there again.
#[derive(Debug)]
pub struct WithdrawnWindows<W> {
    windows: HashMap<String, W>,
}

impl<W> Default for WithdrawnWindows<W> {
    fn default() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }
}

impl<W: Copy> WithdrawnWindows<W> {
    pub fn remember(&mut self, title: &str, window: W) {
        self.windows.insert(title.to_string(), window);
    }

    pub fn get(&self, title: &str) -> Option<W> {
        self.windows.get(title).copied()
    }

    pub fn forget(&mut self, title: &str) {
        self.windows.remove(title);
    }

    /// Prefers a window that is `listed` by the desktop, which also means it is no longer
    /// withdrawn.
    pub fn resolve(&mut self, title: &str, listed: Option<W>) -> Option<W> {
        match listed {
            Some(window) => {
                self.forget(title);
                Some(window)
            }
            None => self.get(title),
        }
    }
}

/// Extracts file name from an executable path. Falls back to the whole path.
pub fn process_name_from_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string())
        .unwrap_or_else(|| path.to_string())
}
