//! XInput2 connection to the X server
//!
//! Wraps an x11rb connection and translates XInput2 protocol structures
//! into the core's [`HierarchyRecord`]s. This is the only module that
//! knows about X11.

use std::os::fd::{AsRawFd, RawFd};

use inputplug_core::{DeviceNameLookup, HierarchyRecord, Notification};
use thiserror::Error;
use x11rb::connection::{Connection as _, RequestConnection as _};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};
use x11rb::protocol::xinput::{self, ConnectionExt as _, DeviceType, EventMask, XIEventMask};
use x11rb::protocol::xproto::Window;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::event_loop::HierarchySource;

/// `XIAllDevices`
const ALL_DEVICES: xinput::DeviceId = 0;

/// XInput version whose hierarchy events we consume
const XI_MAJOR_VERSION: u16 = 2;
const XI_MINOR_VERSION: u16 = 0;

/// Errors from the X server connection
#[derive(Debug, Error)]
pub enum XInputError {
    /// The display could not be opened
    #[error("Can't open X display: {0}")]
    Connect(#[source] ConnectError),

    /// The server does not offer the XInput extension
    #[error("X Input extension not available")]
    ExtensionMissing,

    /// The server speaks an XInput version without hierarchy events
    #[error("X Input {major}.{minor} does not support hierarchy events")]
    VersionTooOld { major: u16, minor: u16 },

    /// The connection failed while sending or receiving
    #[error("X connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A request was answered with an error
    #[error("X request failed: {0}")]
    Reply(#[from] ReplyError),

    /// The setup lists no screen with the number the display named
    #[error("X server has no screen {0}")]
    NoScreen(usize),

    /// Waiting on the connection failed
    #[error("Failed to wait for X events: {0}")]
    Wait(#[from] std::io::Error),
}

/// Live XInput2 connection
pub struct XInputSource {
    conn: RustConnection,
    root: Window,
    opcode: u8,
}

impl XInputSource {
    /// Connect to `display` (or `$DISPLAY`) and check for XInput2
    ///
    /// # Errors
    ///
    /// Returns `XInputError::Connect` if the display cannot be opened and
    /// `XInputError::ExtensionMissing` if XInput is absent. Both are fatal;
    /// the caller does not retry.
    pub fn connect(display: Option<&str>) -> Result<Self, XInputError> {
        let (conn, screen_num) = x11rb::connect(display).map_err(XInputError::Connect)?;

        let info = conn
            .extension_information(xinput::X11_EXTENSION_NAME)?
            .ok_or(XInputError::ExtensionMissing)?;

        let version = conn
            .xinput_xi_query_version(XI_MAJOR_VERSION, XI_MINOR_VERSION)?
            .reply()?;
        if version.major_version < XI_MAJOR_VERSION {
            return Err(XInputError::VersionTooOld {
                major: version.major_version,
                minor: version.minor_version,
            });
        }

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or(XInputError::NoScreen(screen_num))?;

        tracing::debug!(
            "X Input {}.{} available, opcode {}",
            version.major_version,
            version.minor_version,
            info.major_opcode
        );

        Ok(Self {
            conn,
            root,
            opcode: info.major_opcode,
        })
    }

    fn query_devices(
        &self,
        device_id: xinput::DeviceId,
    ) -> Result<Vec<xinput::XIDeviceInfo>, XInputError> {
        let reply = self.conn.xinput_xi_query_device(device_id)?.reply()?;
        Ok(reply.infos)
    }

    /// Translate one event; `None` for anything but our hierarchy events
    fn hierarchy_notification(&self, event: Event) -> Option<Notification> {
        match event {
            Event::XinputHierarchy(event) if event.extension == self.opcode => Some(
                event
                    .infos
                    .iter()
                    .map(|info| {
                        HierarchyRecord::from_raw(
                            info.deviceid,
                            class_code(info.type_),
                            u32::from(info.flags),
                        )
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Protocol device class code; out-of-range values map to 0 (unknown)
fn class_code(device_type: DeviceType) -> u8 {
    u8::try_from(u16::from(device_type)).unwrap_or(0)
}

impl DeviceNameLookup for XInputSource {
    fn device_name(&self, device_id: u16) -> Option<String> {
        match self.query_devices(device_id) {
            Ok(infos) => infos
                .iter()
                .find(|info| info.deviceid == device_id)
                .map(|info| String::from_utf8_lossy(&info.name).into_owned()),
            Err(e) => {
                // Removed devices can no longer be queried
                tracing::debug!(device_id, "Device name unavailable: {}", e);
                None
            }
        }
    }
}

impl HierarchySource for XInputSource {
    type Error = XInputError;

    fn wait_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    fn enumerate(&mut self) -> Result<Vec<HierarchyRecord>, XInputError> {
        let records = self
            .query_devices(ALL_DEVICES)?
            .into_iter()
            .filter_map(|info| {
                let name = String::from_utf8_lossy(&info.name).into_owned();
                HierarchyRecord::bootstrap(info.deviceid, class_code(info.type_), Some(name))
            })
            .collect();
        Ok(records)
    }

    fn select_hierarchy_events(&mut self) -> Result<(), XInputError> {
        self.conn
            .xinput_xi_select_events(
                self.root,
                &[EventMask {
                    deviceid: ALL_DEVICES,
                    mask: vec![XIEventMask::HIERARCHY.into()],
                }],
            )?
            .check()?;
        self.conn.flush()?;
        Ok(())
    }

    fn poll_notification(&mut self) -> Result<Option<Notification>, XInputError> {
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(notification) = self.hierarchy_notification(event) {
                return Ok(Some(notification));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), XInputError> {
        self.conn.flush()?;
        Ok(())
    }
}
