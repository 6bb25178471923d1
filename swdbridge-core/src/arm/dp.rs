// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port registers

use core::fmt;

use crate::{register, register_value};

/// IDCODE register descriptor (read-only)
pub struct IdCodeRegister;
register!(IdCodeRegister, Dp, 0x00, IdCode, r);

/// ABORT register descriptor (write-only, shares address 0x0 with IDCODE)
pub struct AbortRegister;
register!(AbortRegister, Dp, 0x00, Abort, w);

/// CTRL/STAT register descriptor
pub struct CtrlStatRegister;
register!(CtrlStatRegister, Dp, 0x04, CtrlStat, rw);

/// SELECT register descriptor (write-only)
pub struct SelectRegister;
register!(SelectRegister, Dp, 0x08, Select, w);

/// RDBUFF register descriptor (read-only)
pub struct RdBuffRegister;
register!(RdBuffRegister, Dp, 0x0C, RdBuff, r);

/// 32-bit IDCODE value read from the target's Debug Port at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

register_value!(IdCode);

impl IdCode {
    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Revision (bits 31:28)
    pub fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// 12-bit part number field (bits 23:12), used to look up the target's
    /// MCU family.
    pub fn part_number(&self) -> u16 {
        ((self.0 >> 12) & 0xFFF) as u16
    }

    /// JEDEC designer ID (bits 11:1)
    pub fn designer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Bit 0 reads as one on any real Debug Port.  An all zeros or all ones
    /// value means nothing answered.
    pub fn is_valid(&self) -> bool {
        (self.0 & 1) == 1 && self.0 != 0xFFFF_FFFF
    }

    pub fn is_arm(&self) -> bool {
        self.designer_id() == 0x23B
    }
}

/// Value written to ABORT to clear sticky error flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

register_value!(Abort);

impl Abort {
    const DAPABORT: u32 = 1 << 0;
    const STKCMPCLR: u32 = 1 << 1;
    const STKERRCLR: u32 = 1 << 2;
    const WDERRCLR: u32 = 1 << 3;
    const ORUNERRCLR: u32 = 1 << 4;

    /// Clears every sticky flag without aborting an in-flight AP transaction.
    pub fn clear_all() -> Self {
        Abort(Self::STKCMPCLR | Self::STKERRCLR | Self::WDERRCLR | Self::ORUNERRCLR)
    }

    /// Also aborts the current AP transaction.
    pub fn dap_abort() -> Self {
        Abort(Self::clear_all().0 | Self::DAPABORT)
    }
}

/// CTRL/STAT register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

register_value!(CtrlStat);

impl CtrlStat {
    const STICKYORUN: u32 = 1 << 1;
    const STICKYCMP: u32 = 1 << 4;
    const STICKYERR: u32 = 1 << 5;
    const WDATAERR: u32 = 1 << 7;
    const CDBGPWRUPREQ: u32 = 1 << 28;
    const CDBGPWRUPACK: u32 = 1 << 29;
    const CSYSPWRUPREQ: u32 = 1 << 30;
    const CSYSPWRUPACK: u32 = 1 << 31;

    /// Requests debug and system domain power-up.
    pub fn power_up_request() -> Self {
        CtrlStat(Self::CDBGPWRUPREQ | Self::CSYSPWRUPREQ)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether both debug and system power-up have been acknowledged.
    pub fn powered_up(&self) -> bool {
        let acks = Self::CDBGPWRUPACK | Self::CSYSPWRUPACK;
        self.0 & acks == acks
    }

    pub fn has_errors(&self) -> bool {
        self.0 & (Self::STICKYORUN | Self::STICKYCMP | Self::STICKYERR | Self::WDATAERR) != 0
    }
}

/// SELECT register value: which AP, and which 16-byte bank of it, subsequent
/// AP accesses address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

register_value!(Select);

impl Select {
    const APSEL_SHIFT: u32 = 24;
    const APBANKSEL_MASK: u32 = 0xF;
    const APBANKSEL_SHIFT: u32 = 4;

    /// Selects bank `bank` of AP `ap`.
    pub fn new(ap: u8, bank: u8) -> Self {
        Select(
            ((ap as u32) << Self::APSEL_SHIFT)
                | (((bank as u32) & Self::APBANKSEL_MASK) << Self::APBANKSEL_SHIFT),
        )
    }

    pub fn ap(&self) -> u8 {
        (self.0 >> Self::APSEL_SHIFT) as u8
    }

    pub fn bank(&self) -> u8 {
        ((self.0 >> Self::APBANKSEL_SHIFT) & Self::APBANKSEL_MASK) as u8
    }
}

/// RDBUFF register value: the result of the previous AP read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

register_value!(RdBuff);

impl RdBuff {
    pub fn data(&self) -> u32 {
        self.0
    }
}

impl fmt::LowerHex for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
