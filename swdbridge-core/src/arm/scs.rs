// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M System Control Space debug registers
//!
//! These live in the target's memory map and are reached through MEM-AP
//! memory accesses, not as DP/AP registers.

/// Debug Halting Control and Status Register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dhcsr(u32);

impl Dhcsr {
    pub const ADDRESS: u32 = 0xE000_EDF0;

    /// Must be present in the upper half-word of any write
    pub const DBGKEY: u32 = 0xA05F << 16;

    pub const C_DEBUGEN: u32 = 1 << 0;
    pub const C_HALT: u32 = 1 << 1;
    pub const S_HALT: u32 = 1 << 17;
    pub const S_RESET_ST: u32 = 1 << 25;

    /// Write value that enables debug and requests a halt.
    pub fn halt_request() -> u32 {
        Self::DBGKEY | Self::C_DEBUGEN | Self::C_HALT
    }

    /// Write value that clears C_HALT and C_DEBUGEN, letting the core run
    /// as if no debugger were attached.
    pub fn release_request() -> u32 {
        Self::DBGKEY
    }

    pub fn halted(&self) -> bool {
        self.0 & Self::S_HALT != 0
    }

    /// Sticky: set when the core has been reset since DHCSR was last read.
    pub fn reset_occurred(&self) -> bool {
        self.0 & Self::S_RESET_ST != 0
    }
}

impl From<u32> for Dhcsr {
    fn from(value: u32) -> Self {
        Dhcsr(value)
    }
}

/// Debug Exception and Monitor Control Register
pub struct Demcr;

impl Demcr {
    pub const ADDRESS: u32 = 0xE000_EDFC;

    /// Halt on reset vector catch
    pub const VC_CORERESET: u32 = 1 << 0;
}

/// Application Interrupt and Reset Control Register
pub struct Aircr;

impl Aircr {
    pub const ADDRESS: u32 = 0xE000_ED0C;

    pub const VECTKEY: u32 = 0x05FA << 16;
    pub const SYSRESETREQ: u32 = 1 << 2;

    /// Write value requesting a system reset.
    pub fn reset_request() -> u32 {
        Self::VECTKEY | Self::SYSRESETREQ
    }
}
