
use anyhow::{Result, anyhow};
use tracing::{error, instrument, warn};
use windows::{
    Win32::{
        Foundation::{BOOL, CloseHandle, GetLastError, HANDLE, HWND},
        System::{
            Diagnostics::Debug::{
                FORMAT_MESSAGE_FROM_SYSTEM,
                FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
                QueryFullProcessImageNameW,
            },
        },
        UI::WindowsAndMessaging::{
            FindWindowW, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
            IsIconic, IsWindowVisible, SHOW_WINDOW_CMD, SW_HIDE, SW_MINIMIZE, SW_RESTORE,
            SW_SHOW, ShowWindow,
        },
    },
    core::{HSTRING, PCWSTR, PWSTR},
};

use super::{
    AppIdentity, WindowAction, WindowController, WindowManager, WindowState,
    process_name_from_path,
};

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    String::from_utf16_lossy(&message_buffer[..size as usize])
}

#[instrument]
pub fn get_active() -> Result<Option<AppIdentity>> {
    let window = unsafe { GetForegroundWindow() };

    // Desktop or lock screen. Nothing holds focus.
    if window.is_invalid() {
        return Ok(None);
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Failed to get active window {}", last_error_message()));
    }

    // Access denied and processes exiting mid-poll both end up here, the caller skips the tick.
    let process_handle =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) }
            .inspect_err(|e| warn!("Failed to open process {id} {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let executable_path = unsafe { get_window_process_path(process_handle, &mut text) };
    let title = unsafe { get_window_title(window, &mut text) };

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    let executable_path =
        executable_path.inspect_err(|e| warn!("Failed to get window process path {e:?}"))?;

    Ok(Some(AppIdentity {
        process_name: process_name_from_path(&executable_path).into(),
        window_title: title.into(),
        executable_path: executable_path.into(),
        pid: id,
    }))
}

unsafe fn get_window_process_path(window_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            window_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len as usize])
}

fn find_window(title: &str) -> Option<HWND> {
    let window = unsafe { FindWindowW(PCWSTR::null(), &HSTRING::from(title)) }.ok()?;
    if window.is_invalid() {
        None
    } else {
        Some(window)
    }
}

pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsWindowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowManager for WindowsWindowManager {
    fn get_active_identity(&mut self) -> Result<Option<AppIdentity>> {
        get_active()
    }
}

impl WindowController for WindowsWindowManager {
    fn window_state(&mut self, title: &str) -> Result<Option<WindowState>> {
        let Some(window) = find_window(title) else {
            return Ok(None);
        };
        let minimized = unsafe { IsIconic(window) }.as_bool();
        let visible = unsafe { IsWindowVisible(window) }.as_bool();
        Ok(Some(WindowState { minimized, visible }))
    }

    #[instrument(skip(self))]
    fn apply(&mut self, title: &str, action: WindowAction) -> Result<bool> {
        let Some(window) = find_window(title) else {
            return Ok(false);
        };
        let command: SHOW_WINDOW_CMD = match action {
            WindowAction::Minimize => SW_MINIMIZE,
            WindowAction::Hide => SW_HIDE,
            WindowAction::Restore => SW_RESTORE,
            WindowAction::Show => SW_SHOW,
        };
        // The return value is the previous visibility, not success.
        let _ = unsafe { ShowWindow(window, command) };
        Ok(true)
    }
}
