//! Execution flags accepted by the legacy queue, wait and timer APIs

use std::ops::{BitOr, BitOrAssign};

/// Execution flags (bitflags)
///
/// Only `EXECUTE_ONLY_ONCE` and `EXECUTE_IN_TIMER_THREAD` change behavior;
/// the rest are hints carried through to the callback site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExecuteFlags(u32);

impl ExecuteFlags {
    /// No flags
    pub const DEFAULT: Self = Self(0x00);
    /// Run the callback on an I/O-capable worker
    pub const EXECUTE_IN_IO_THREAD: Self = Self(0x01);
    /// Run the callback on the timer dispatcher thread itself
    pub const EXECUTE_IN_TIMER_THREAD: Self = Self(0x20);
    /// Callback may block for a long time
    pub const EXECUTE_LONG_FUNCTION: Self = Self(0x10);
    /// Wait registration fires at most once
    pub const EXECUTE_ONLY_ONCE: Self = Self(0x08);
    /// Run on a thread that never exits
    pub const EXECUTE_IN_PERSISTENT_THREAD: Self = Self(0x80);
    /// Callback inherits the caller's security context
    pub const TRANSFER_IMPERSONATION: Self = Self(0x100);

    const ALL: u32 = 0x01 | 0x08 | 0x10 | 0x20 | 0x80 | 0x100;

    /// Build from raw bits, rejecting unknown bits
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Raw bit value
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ExecuteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ExecuteFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
