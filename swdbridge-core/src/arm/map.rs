// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port registers

use crate::{register, register_value};

/// Control/Status Word register descriptor
pub struct CswRegister;
register!(CswRegister, Ap, 0x00, Csw, rw);

/// Transfer Address Register descriptor
pub struct TarRegister;
register!(TarRegister, Ap, 0x04, Tar, rw);

/// Data Read/Write register descriptor
pub struct DrwRegister;
register!(DrwRegister, Ap, 0x0C, Drw, rw);

/// Control/Status Word register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Csw(u32);

register_value!(Csw);

impl Csw {
    const SIZE_MASK: u32 = 0b111;
    const ADDRINC_MASK: u32 = 0b11;
    const ADDRINC_SHIFT: u32 = 4;
    const DEVICE_EN: u32 = 1 << 6;
    const DBG_SW_ENABLE: u32 = 1 << 31;

    pub const SIZE_8BIT: u32 = 0b000;
    pub const SIZE_16BIT: u32 = 0b001;
    pub const SIZE_32BIT: u32 = 0b010;

    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;

    /// Single 32-bit transfers, no address auto-increment, with DeviceEn and
    /// DbgSwEnable set.  This is the CSW written ahead of every memory access.
    pub fn word_access() -> Self {
        let mut csw = Csw(Self::DEVICE_EN | Self::DBG_SW_ENABLE);
        csw.set_size(Self::SIZE_32BIT);
        csw.set_addrinc(Self::ADDRINC_OFF);
        csw
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn size(&self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    pub fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }

    pub fn device_en(&self) -> bool {
        self.0 & Self::DEVICE_EN != 0
    }

    pub fn set_size(&mut self, size: u32) {
        self.0 = (self.0 & !Self::SIZE_MASK) | (size & Self::SIZE_MASK);
    }

    pub fn set_addrinc(&mut self, addrinc: u32) {
        self.0 = (self.0 & !(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT))
            | ((addrinc & Self::ADDRINC_MASK) << Self::ADDRINC_SHIFT);
    }
}

/// Transfer Address Register value: the target memory address of the next
/// DRW access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

register_value!(Tar);

impl Tar {
    pub fn target_address(&self) -> u32 {
        self.0
    }
}

/// Data Read/Write register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

register_value!(Drw);

impl Drw {
    pub fn data(&self) -> u32 {
        self.0
    }
}
