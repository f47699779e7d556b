//! Canonical names for XInput2 device classes and hierarchy changes
//!
//! The X server describes a device's role with a small integer (`use` in the
//! XInput2 protocol) and packs hierarchy changes into a bitmask. This module
//! maps both directions between those codes and the names handed to the
//! user's command.

use std::fmt;

/// The role a device plays in the XInput2 hierarchy
///
/// A device has exactly one class at any time, so lookups by code are exact
/// matches, never bitmask matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    MasterPointer,
    MasterKeyboard,
    SlavePointer,
    SlaveKeyboard,
    FloatingSlave,
}

impl DeviceClass {
    /// All classes in protocol order
    pub const ALL: [DeviceClass; 5] = [
        DeviceClass::MasterPointer,
        DeviceClass::MasterKeyboard,
        DeviceClass::SlavePointer,
        DeviceClass::SlaveKeyboard,
        DeviceClass::FloatingSlave,
    ];

    /// Protocol code (`XIMasterPointer` = 1 ... `XIFloatingSlave` = 5)
    pub const fn code(self) -> u8 {
        match self {
            DeviceClass::MasterPointer => 1,
            DeviceClass::MasterKeyboard => 2,
            DeviceClass::SlavePointer => 3,
            DeviceClass::SlaveKeyboard => 4,
            DeviceClass::FloatingSlave => 5,
        }
    }

    /// Exact-match lookup of a protocol code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DeviceClass::MasterPointer => "MasterPointer",
            DeviceClass::MasterKeyboard => "MasterKeyboard",
            DeviceClass::SlavePointer => "SlavePointer",
            DeviceClass::SlaveKeyboard => "SlaveKeyboard",
            DeviceClass::FloatingSlave => "FloatingSlave",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.name() == name)
    }

    /// Whether this is a master (logical) device
    pub const fn is_master(self) -> bool {
        matches!(self, DeviceClass::MasterPointer | DeviceClass::MasterKeyboard)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single hierarchy transition
///
/// Each kind owns one bit of the `flags` field of an XInput2 hierarchy
/// record. The order of [`ChangeKind::ALL`] is the order in which set bits
/// are reported, and therefore the order in which commands are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    MasterAdded,
    MasterRemoved,
    SlaveAdded,
    SlaveRemoved,
    SlaveAttached,
    SlaveDetached,
    DeviceEnabled,
    DeviceDisabled,
}

impl ChangeKind {
    /// All kinds in decode priority order (ascending bit value)
    pub const ALL: [ChangeKind; 8] = [
        ChangeKind::MasterAdded,
        ChangeKind::MasterRemoved,
        ChangeKind::SlaveAdded,
        ChangeKind::SlaveRemoved,
        ChangeKind::SlaveAttached,
        ChangeKind::SlaveDetached,
        ChangeKind::DeviceEnabled,
        ChangeKind::DeviceDisabled,
    ];

    /// Bit value in the hierarchy flags field
    pub const fn bit(self) -> u32 {
        match self {
            ChangeKind::MasterAdded => 1 << 0,
            ChangeKind::MasterRemoved => 1 << 1,
            ChangeKind::SlaveAdded => 1 << 2,
            ChangeKind::SlaveRemoved => 1 << 3,
            ChangeKind::SlaveAttached => 1 << 4,
            ChangeKind::SlaveDetached => 1 << 5,
            ChangeKind::DeviceEnabled => 1 << 6,
            ChangeKind::DeviceDisabled => 1 << 7,
        }
    }

    /// Lookup of a single bit value
    ///
    /// Combined values never match; use [`crate::flags::decode`] to split a
    /// flags field into kinds.
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.bit() == bit)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ChangeKind::MasterAdded => "MasterAdded",
            ChangeKind::MasterRemoved => "MasterRemoved",
            ChangeKind::SlaveAdded => "SlaveAdded",
            ChangeKind::SlaveRemoved => "SlaveRemoved",
            ChangeKind::SlaveAttached => "SlaveAttached",
            ChangeKind::SlaveDetached => "SlaveDetached",
            ChangeKind::DeviceEnabled => "DeviceEnabled",
            ChangeKind::DeviceDisabled => "DeviceDisabled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a device class code, or `""` if the code is unknown
pub fn class_name_of(code: u8) -> &'static str {
    DeviceClass::from_code(code).map_or("", DeviceClass::name)
}

/// Name of a single change bit, or `""` if the bit is unknown
pub fn change_name_of(bit: u32) -> &'static str {
    ChangeKind::from_bit(bit).map_or("", ChangeKind::name)
}
