//! Execution state of a [`crate::ExecutionEngine`].

use std::fmt;

/// Indicates the status of the VM.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VMState {
    /// Execution is in progress or has not yet begun.
    #[default]
    NONE = 0,

    /// Execution completed successfully.
    HALT = 1 << 0,

    /// Execution was aborted, e.g. because the live item ceiling was exceeded.
    FAULT = 1 << 1,

    /// Execution is paused between instructions.
    BREAK = 1 << 2,
}

impl VMState {
    #[inline]
    pub fn is_halt(self) -> bool {
        self == VMState::HALT
    }

    #[inline]
    pub fn is_fault(self) -> bool {
        self == VMState::FAULT
    }

    /// HALT and FAULT end the execution; no further instruction may run.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, VMState::HALT | VMState::FAULT)
    }
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VMState::NONE => "NONE",
            VMState::HALT => "HALT",
            VMState::FAULT => "FAULT",
            VMState::BREAK => "BREAK",
        };
        f.write_str(name)
    }
}
