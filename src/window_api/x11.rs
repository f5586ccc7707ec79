use anyhow::{Result, anyhow};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};
use xcb::{
    Connection, Xid,
    x::{
        self, ATOM_ANY, Atom, ClientMessageData, ClientMessageEvent, EventMask, GetProperty,
        GetWindowAttributes, GrabServer, InternAtom, MapState, MapWindow, SendEvent,
        SendEventDest, UngrabServer, UnmapWindow, Window,
    },
};

use super::{
    AppIdentity, WindowAction, WindowController, WindowManager, WindowState, WithdrawnWindows,
    process_name_from_path,
};

/// ICCCM IconicState, used with WM_CHANGE_STATE to minimize a window.
const ICONIC_STATE: u32 = 3;

fn intern(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_executable_path(system: &mut System, id: u32) -> Option<String> {
    let pid = Pid::from_u32(id);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    let process = system.process(pid)?;
    process
        .exe()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string())
        .or_else(|| process.name().to_str().map(|v| v.to_string()))
}

fn get_window_property(conn: &Connection, root: Window, atom: Atom) -> Result<Vec<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 4096,
    }))?;
    Ok(result.value::<Window>().to_vec())
}

pub fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value::<u8>()).into_owned())
}

pub struct LinuxWindowManager {
    connection: Connection,
    preferred_screen: i32,
    system: System,
    active_window_atom: Atom,
    client_list_atom: Atom,
    window_name_atom: Atom,
    wm_state_atom: Atom,
    wm_state_hidden_atom: Atom,
    change_state_atom: Atom,
    pid_atom: Atom,
    /// Unmapped windows leave `_NET_CLIENT_LIST`.
    withdrawn: WithdrawnWindows<Window>,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        Ok(Self {
            active_window_atom: intern(&connection, b"_NET_ACTIVE_WINDOW")?,
            client_list_atom: intern(&connection, b"_NET_CLIENT_LIST")?,
            window_name_atom: intern(&connection, b"_NET_WM_NAME")?,
            wm_state_atom: intern(&connection, b"_NET_WM_STATE")?,
            wm_state_hidden_atom: intern(&connection, b"_NET_WM_STATE_HIDDEN")?,
            change_state_atom: intern(&connection, b"WM_CHANGE_STATE")?,
            pid_atom: intern(&connection, b"_NET_WM_PID")?,
            connection,
            preferred_screen,
            system: System::new(),
            withdrawn: WithdrawnWindows::default(),
        })
    }

    fn root(&self) -> Result<Window> {
        // Currently the application only supports 1 x11 screen.
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("X11 screen {} is missing", self.preferred_screen))
    }

    #[instrument(skip(self))]
    fn get_active_inner(&mut self) -> Result<Option<AppIdentity>> {
        let root = self.root()?;
        let Some(active_window) =
            get_window_property(&self.connection, root, self.active_window_atom)?
                .first()
                .copied()
        else {
            return Ok(None);
        };
        if active_window == Window::none() {
            return Ok(None);
        }

        let window_title = get_name(&self.connection, active_window, self.window_name_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Active window has no _NET_WM_PID"))?;
        let executable_path = get_executable_path(&mut self.system, pid)
            .ok_or_else(|| anyhow!("Process {pid} exited or is not accessible"))?;

        Ok(Some(AppIdentity {
            process_name: process_name_from_path(&executable_path).into(),
            window_title: window_title.into(),
            executable_path: executable_path.into(),
            pid,
        }))
    }

    fn find_window(&self, title: &str) -> Result<Option<Window>> {
        let root = self.root()?;
        for window in get_window_property(&self.connection, root, self.client_list_atom)? {
            if get_name(&self.connection, window, self.window_name_atom)? == title {
                return Ok(Some(window));
            }
        }
        Ok(None)
    }

    /// Like [Self::find_window], but also finds windows hidden by [WindowAction::Hide].
    fn lookup(&mut self, title: &str) -> Result<Option<Window>> {
        let listed = self.find_window(title)?;
        Ok(self.withdrawn.resolve(title, listed))
    }

    fn is_minimized(&self, window: Window) -> Result<bool> {
        let reply = self.connection.wait_for_reply(self.connection.send_request(&GetProperty {
            delete: false,
            window,
            property: self.wm_state_atom,
            r#type: ATOM_ANY,
            long_offset: 0,
            long_length: 64,
        }))?;
        Ok(reply.value::<Atom>().contains(&self.wm_state_hidden_atom))
    }

    fn is_visible(&self, window: Window) -> Result<bool> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&GetWindowAttributes { window }))?;
        Ok(reply.map_state() == MapState::Viewable)
    }

    fn minimize(&self, window: Window) -> Result<()> {
        let root = self.root()?;
        let event = ClientMessageEvent::new(
            window,
            self.change_state_atom,
            ClientMessageData::Data32([ICONIC_STATE, 0, 0, 0, 0]),
        );
        self.connection.send_and_check_request(&SendEvent {
            propagate: false,
            destination: SendEventDest::Window(root),
            event_mask: EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event: &event,
        })?;
        Ok(())
    }
}

impl WindowManager for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_identity(&mut self) -> Result<Option<AppIdentity>> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        self.connection.flush()?;
        result
    }
}

impl WindowController for LinuxWindowManager {
    fn window_state(&mut self, title: &str) -> Result<Option<WindowState>> {
        let Some(window) = self.lookup(title)? else {
            return Ok(None);
        };
        Ok(Some(WindowState {
            minimized: self.is_minimized(window)?,
            visible: self.is_visible(window)?,
        }))
    }

    #[instrument(skip(self))]
    fn apply(&mut self, title: &str, action: WindowAction) -> Result<bool> {
        let Some(window) = self.lookup(title)? else {
            debug!("No window titled {title:?}");
            return Ok(false);
        };
        let result = match action {
            WindowAction::Minimize => self.minimize(window),
            WindowAction::Hide => self
                .connection
                .send_and_check_request(&UnmapWindow { window })
                .map_err(Into::into),
            WindowAction::Restore | WindowAction::Show => self
                .connection
                .send_and_check_request(&MapWindow { window })
                .map_err(Into::into),
        };
        if let Err(e) = result {
            // Most likely the window was destroyed while withdrawn.
            self.withdrawn.forget(title);
            return Err(e);
        }
        if action == WindowAction::Hide {
            self.withdrawn.remember(title, window);
        }
        self.connection.flush()?;
        Ok(true)
    }
}
