//! Decoding of hierarchy change bitmasks
//!
//! A single hierarchy record can report several transitions at once, e.g. a
//! newly plugged keyboard arrives as `SlaveAdded | DeviceEnabled`. The flags
//! come straight from the X server, so the decoder must terminate on any
//! value, including ones with bits it does not know.

use std::fmt;

use crate::names::ChangeKind;

/// Upper bound on decode steps for one flags value
pub const MAX_DECODE_STEPS: usize = 16;

/// Raw hierarchy flags as received from the server
///
/// May carry bits outside the known [`ChangeKind`] table.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChangeFlags(u32);

impl ChangeFlags {
    pub const EMPTY: ChangeFlags = ChangeFlags(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[must_use]
    pub const fn with(self, kind: ChangeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    #[must_use]
    pub const fn without(self, kind: ChangeKind) -> Self {
        Self(self.0 & !kind.bit())
    }
}

impl From<ChangeKind> for ChangeFlags {
    fn from(kind: ChangeKind) -> Self {
        Self(kind.bit())
    }
}

impl FromIterator<ChangeKind> for ChangeFlags {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, ChangeFlags::with)
    }
}

impl fmt::Debug for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeFlags({:#x})", self.0)
    }
}

/// Iterator over the kinds set in a [`ChangeFlags`] value
///
/// Yields kinds in [`ChangeKind::ALL`] order and stops when no known bit
/// remains or after [`MAX_DECODE_STEPS`] steps, whichever comes first.
#[derive(Debug, Clone)]
pub struct ChangeKinds {
    remaining: ChangeFlags,
    steps: usize,
}

impl Iterator for ChangeKinds {
    type Item = ChangeKind;

    fn next(&mut self) -> Option<ChangeKind> {
        if self.remaining.is_empty() || self.steps >= MAX_DECODE_STEPS {
            return None;
        }
        self.steps += 1;

        let kind = ChangeKind::ALL
            .into_iter()
            .find(|kind| self.remaining.contains(*kind));

        match kind {
            Some(kind) => {
                self.remaining = self.remaining.without(kind);
                Some(kind)
            }
            None => {
                tracing::trace!(
                    "Unrecognized hierarchy flag bits {:#x}, stopping",
                    self.remaining.bits()
                );
                // Only unknown bits left; nothing more will ever match.
                self.remaining = ChangeFlags::EMPTY;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for ChangeKinds {}

/// Split a flags value into its individual change kinds
pub fn decode(flags: ChangeFlags) -> ChangeKinds {
    ChangeKinds {
        remaining: flags,
        steps: 0,
    }
}
