//! Dispatch of decoded hierarchy changes
//!
//! Each change becomes one invocation of the user's command:
//!
//! ```text
//! command <change> <device-id> <device-class> [<device-name>]
//! ```
//!
//! The device name slot is left out entirely when the name is unknown, so
//! scripts written against the shorter three-argument form keep working.
//! The same fields are mirrored to the announce sink as one space-joined
//! line.
//!
//! Children are started in their own process group and never waited on.
//! The daemon arranges for the kernel to reap them (see the daemon's
//! `SIGCHLD` setup), so dispatch never blocks on a slow command.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::announce::{AnnounceSink, NoAnnounce};
use crate::names::{ChangeKind, DeviceClass};

/// Behaviour switches for a [`Dispatcher`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Echo every command line to the diagnostic log
    pub verbose: bool,
    /// Echo command lines but never run them
    pub dry_run: bool,
    /// Prepended to change names (e.g. `XI` for `XIMasterAdded`)
    pub name_prefix: String,
}

impl DispatchOptions {
    /// Whether command lines are written to the diagnostic log
    pub fn echo(&self) -> bool {
        self.verbose || self.dry_run
    }
}

/// One fully resolved change, ready to be dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    pub change: ChangeKind,
    pub device_id: u16,
    /// `None` when the server reported a class we do not know
    pub device_class: Option<DeviceClass>,
    pub device_name: Option<String>,
}

impl DispatchEvent {
    /// The positional fields shared by the command line and the announce line
    pub fn fields(&self, name_prefix: &str) -> Vec<String> {
        let mut fields = Vec::with_capacity(4);
        fields.push(format!("{}{}", name_prefix, self.change.name()));
        fields.push(self.device_id.to_string());
        fields.push(self.device_class.map_or("", DeviceClass::name).to_string());
        if let Some(name) = &self.device_name {
            fields.push(name.clone());
        }
        fields
    }
}

/// Something that consumes [`DispatchEvent`]s
///
/// Implemented by [`Dispatcher`]; the notification decoder is generic over
/// this so it can be driven without spawning processes.
pub trait Dispatch {
    fn dispatch(&mut self, event: &DispatchEvent);
}

/// Runs the user's command and feeds the announce sink
pub struct Dispatcher {
    command: PathBuf,
    options: DispatchOptions,
    sink: Box<dyn AnnounceSink>,
}

impl Dispatcher {
    /// Create a dispatcher for `command` with no announce sink
    pub fn new(command: impl Into<PathBuf>, options: DispatchOptions) -> Self {
        Self::with_sink(command, options, Box::new(NoAnnounce))
    }

    pub fn with_sink(
        command: impl Into<PathBuf>,
        options: DispatchOptions,
        sink: Box<dyn AnnounceSink>,
    ) -> Self {
        Self {
            command: command.into(),
            options,
            sink,
        }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Arguments passed to the command for `event`
    pub fn args(&self, event: &DispatchEvent) -> Vec<String> {
        event.fields(&self.options.name_prefix)
    }

    /// Build the process invocation for `event` without running it
    pub fn command_for(&self, event: &DispatchEvent) -> Command {
        let mut command = Command::new(&self.command);
        command.args(self.args(event)).process_group(0);
        command
    }

    fn spawn(&self, mut command: Command, event: &DispatchEvent) {
        match command.spawn() {
            Ok(child) => {
                tracing::debug!(
                    pid = child.id(),
                    device_id = event.device_id,
                    "Spawned {} for {}",
                    self.command.display(),
                    event.change
                );
                // Dropping the handle does not wait; the child is reaped by
                // the kernel.
                drop(child);
            }
            Err(e) => {
                tracing::warn!("Command {} failed: {}", self.command.display(), e);
            }
        }
    }

    fn publish(&mut self, event: &DispatchEvent) {
        if !self.sink.is_live() {
            return;
        }
        let line = self.args(event).join(" ");
        if let Err(e) = self.sink.announce(&line) {
            tracing::debug!("Dropped announce line '{}': {}", line, e);
        }
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&mut self, event: &DispatchEvent) {
        let command = self.command_for(event);

        if self.options.echo() {
            tracing::info!("{:?}", command);
        }
        if !self.options.dry_run {
            self.spawn(command, event);
        }

        self.publish(event);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("command", &self.command)
            .field("options", &self.options)
            .field("announce", &self.sink.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::ffi::OsStr;
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::rc::Rc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Collects announced lines for inspection
    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Rc<RefCell<Vec<String>>>,
    }

    impl AnnounceSink for RecordingSink {
        fn announce(&mut self, line: &str) -> io::Result<()> {
            self.lines.borrow_mut().push(line.to_string());
            Ok(())
        }
    }

    struct BrokenSink;

    impl AnnounceSink for BrokenSink {
        fn announce(&mut self, _line: &str) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn dry_run() -> DispatchOptions {
        DispatchOptions {
            dry_run: true,
            ..Default::default()
        }
    }

    fn keyboard_event(change: ChangeKind) -> DispatchEvent {
        DispatchEvent {
            change,
            device_id: 12,
            device_class: Some(DeviceClass::SlaveKeyboard),
            device_name: Some("Logitech Keyboard".to_string()),
        }
    }

    #[test]
    fn test_args_without_name() {
        let dispatcher = Dispatcher::new("/usr/bin/true", dry_run());
        let event = DispatchEvent {
            change: ChangeKind::MasterAdded,
            device_id: 5,
            device_class: Some(DeviceClass::MasterKeyboard),
            device_name: None,
        };
        assert_eq!(
            dispatcher.args(&event),
            vec!["MasterAdded", "5", "MasterKeyboard"]
        );
    }

    #[test]
    fn test_args_with_name() {
        let dispatcher = Dispatcher::new("/usr/bin/true", dry_run());
        assert_eq!(
            dispatcher.args(&keyboard_event(ChangeKind::DeviceEnabled)),
            vec!["DeviceEnabled", "12", "SlaveKeyboard", "Logitech Keyboard"]
        );
    }

    #[test]
    fn test_unknown_class_gives_empty_slot() {
        let dispatcher = Dispatcher::new("/usr/bin/true", dry_run());
        let event = DispatchEvent {
            change: ChangeKind::SlaveRemoved,
            device_id: 9,
            device_class: None,
            device_name: None,
        };
        assert_eq!(dispatcher.args(&event), vec!["SlaveRemoved", "9", ""]);
    }

    #[test]
    fn test_name_prefix_applies_to_change_only() {
        let options = DispatchOptions {
            dry_run: true,
            name_prefix: "XI".to_string(),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new("/usr/bin/true", options);
        let args = dispatcher.args(&keyboard_event(ChangeKind::SlaveAdded));
        assert_eq!(args[0], "XISlaveAdded");
        assert_eq!(args[2], "SlaveKeyboard");
    }

    #[test]
    fn test_argument_vector_is_stable() {
        let dispatcher = Dispatcher::new("/usr/bin/true", dry_run());
        let event = keyboard_event(ChangeKind::SlaveAttached);
        assert_eq!(dispatcher.args(&event), dispatcher.args(&event));
        assert_eq!(
            format!("{:?}", dispatcher.command_for(&event)),
            format!("{:?}", dispatcher.command_for(&event))
        );
    }

    #[test]
    fn test_command_for_uses_command_path() {
        let dispatcher = Dispatcher::new("/usr/local/bin/on-change", dry_run());
        let command = dispatcher.command_for(&keyboard_event(ChangeKind::SlaveAdded));
        assert_eq!(command.get_program(), OsStr::new("/usr/local/bin/on-change"));
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(
            args,
            ["SlaveAdded", "12", "SlaveKeyboard", "Logitech Keyboard"]
                .map(OsStr::new)
                .to_vec()
        );
    }

    #[test]
    fn test_announce_mirrors_fields() {
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let mut dispatcher = Dispatcher::with_sink("/usr/bin/true", dry_run(), Box::new(sink));

        dispatcher.dispatch(&keyboard_event(ChangeKind::SlaveAdded));
        dispatcher.dispatch(&DispatchEvent {
            change: ChangeKind::MasterRemoved,
            device_id: 3,
            device_class: Some(DeviceClass::MasterPointer),
            device_name: None,
        });

        assert_eq!(
            *lines.borrow(),
            vec![
                "SlaveAdded 12 SlaveKeyboard Logitech Keyboard".to_string(),
                "MasterRemoved 3 MasterPointer".to_string(),
            ]
        );
    }

    #[test]
    fn test_announce_failure_is_ignored() {
        let mut dispatcher =
            Dispatcher::with_sink("/usr/bin/true", dry_run(), Box::new(BrokenSink));
        dispatcher.dispatch(&keyboard_event(ChangeKind::DeviceDisabled));
    }

    #[test]
    fn test_spawn_failure_is_not_fatal() {
        let mut dispatcher = Dispatcher::new(
            "/nonexistent/inputplug-test-command",
            DispatchOptions::default(),
        );
        dispatcher.dispatch(&keyboard_event(ChangeKind::SlaveDetached));
    }

    /// Shell hook writing its argument count, arguments, pid and process
    /// group to `out-<argc>` next to itself
    const RECORDING_HOOK: &str = r#"#!/bin/sh
dir=$(dirname "$0")
{
    echo "$#"
    for arg in "$@"; do echo "$arg"; done
    echo "$$"
    cut -d' ' -f5 /proc/$$/stat
} > "$dir/tmp-$#" && mv "$dir/tmp-$#" "$dir/out-$#"
"#;

    fn wait_for_file(path: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Ok(content) = std::fs::read_to_string(path) {
                return content;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("{} was never written", path.display());
    }

    #[test]
    fn test_command_runs_in_own_process_group() {
        let dir = TempDir::new().unwrap();
        let hook = dir.path().join("hook");
        std::fs::write(&hook, RECORDING_HOOK).unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut dispatcher = Dispatcher::new(&hook, DispatchOptions::default());
        dispatcher.dispatch(&DispatchEvent {
            change: ChangeKind::MasterAdded,
            device_id: 5,
            device_class: Some(DeviceClass::MasterKeyboard),
            device_name: None,
        });
        dispatcher.dispatch(&keyboard_event(ChangeKind::SlaveAdded));

        let unnamed = wait_for_file(&dir.path().join("out-3"));
        let lines: Vec<&str> = unnamed.lines().collect();
        assert_eq!(lines[..4], ["3", "MasterAdded", "5", "MasterKeyboard"]);
        // pid equals process group id
        assert_eq!(lines[4], lines[5]);
        assert_ne!(lines[5], std::process::id().to_string());

        let named = wait_for_file(&dir.path().join("out-4"));
        let lines: Vec<&str> = named.lines().collect();
        assert_eq!(
            lines[..5],
            ["4", "SlaveAdded", "12", "SlaveKeyboard", "Logitech Keyboard"]
        );
        assert_eq!(lines[5], lines[6]);
    }

    #[test]
    fn test_dry_run_never_spawns() {
        let dir = TempDir::new().unwrap();
        let hook = dir.path().join("hook");
        std::fs::write(&hook, RECORDING_HOOK).unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut dispatcher = Dispatcher::new(&hook, dry_run());
        dispatcher.dispatch(&keyboard_event(ChangeKind::DeviceEnabled));

        std::thread::sleep(Duration::from_millis(200));
        assert!(!dir.path().join("out-4").exists());
    }

    #[test]
    fn test_echo_follows_verbose_and_dry_run() {
        assert!(!DispatchOptions::default().echo());
        assert!(dry_run().echo());
        let verbose = DispatchOptions {
            verbose: true,
            ..Default::default()
        };
        assert!(verbose.echo());
    }
}
