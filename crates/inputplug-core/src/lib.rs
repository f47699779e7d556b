//! Core of inputplug
//!
//! Decodes XInput2 hierarchy notifications into individual device changes
//! and dispatches each change to an external command and an optional
//! announce sink. Nothing in this crate talks to the X server; the daemon
//! converts protocol structures into [`HierarchyRecord`]s and drives a
//! [`NotificationDecoder`].

pub mod announce;
mod error;
pub mod flags;
pub mod dispatch;
pub mod names;
pub mod notification;

pub use announce::{open_sink, AnnounceSink, NoAnnounce, ADDRESS_ENV};
pub use dispatch::{Dispatch, DispatchEvent, DispatchOptions, Dispatcher};
pub use error::CoreError;
pub use flags::{decode, ChangeFlags, ChangeKinds};
pub use names::{change_name_of, class_name_of, ChangeKind, DeviceClass};
pub use notification::{DeviceNameLookup, HierarchyRecord, Notification, NotificationDecoder};
