// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge-core - ARM debug and STM32 flash controller definitions.
//!
//! Provides the register layouts, identification tables and flash geometry
//! used by `swdbridge-swd` to program STM32 F1 and F4 devices over a
//! bit-banged Serial Wire Debug link.
//!
//! This library is `no_std` compatible and does not allocate.

#![cfg_attr(not(test), no_std)]

pub mod arm;
pub mod stm;

use core::fmt;
use serde::Serialize;

use crate::arm::dp::IdCode;
use crate::stm::{FamilyEntry, StmFamily};

/// Identification of the target MCU, established once per programming
/// session from its IDCODE and used to select the flash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct McuInfo {
    idcode: u32,
    family: StmFamily,
    name: &'static str,
    flash_size_kb: u32,
    page_size: u32,
    ram_size_kb: Option<u32>,
}

impl McuInfo {
    /// Identifies the target from the 12-bit part number held in bits 23:12
    /// of `idcode`.
    ///
    /// Returns `None` if the part number is not one of the known families.
    pub fn detect(idcode: IdCode) -> Option<Self> {
        Self::from_part_number(idcode, idcode.part_number())
    }

    /// As [`Self::detect`], but with the part number supplied separately,
    /// for example from the DBGMCU device ID.
    pub fn from_part_number(idcode: IdCode, part_number: u16) -> Option<Self> {
        stm::lookup_part(part_number).map(|entry| Self::from_entry(idcode, entry))
    }

    fn from_entry(idcode: IdCode, entry: &FamilyEntry) -> Self {
        Self {
            idcode: idcode.data(),
            family: entry.family,
            name: entry.name,
            flash_size_kb: entry.flash_size_kb,
            page_size: entry.page_size,
            ram_size_kb: entry.ram_size_kb,
        }
    }

    /// Replaces the table default flash size with the size reported by the
    /// device.  The F1 page size follows the flash size.
    pub fn with_flash_size_kb(mut self, flash_size_kb: u32) -> Self {
        self.flash_size_kb = flash_size_kb;
        if let Some(page_size) = stm::page_size(self.family, flash_size_kb) {
            self.page_size = page_size;
        }
        self
    }

    pub fn idcode(&self) -> IdCode {
        IdCode::new(self.idcode)
    }

    pub fn family(&self) -> StmFamily {
        self.family
    }

    /// Human-readable name, e.g. "STM32F4xx"
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn flash_base(&self) -> u32 {
        stm::FLASH_BASE
    }

    pub fn flash_size_kb(&self) -> u32 {
        self.flash_size_kb
    }

    pub fn flash_size_bytes(&self) -> u32 {
        self.flash_size_kb * 1024
    }

    /// Erase page size in bytes, or 0 if flash is sector-erased
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn ram_size_kb(&self) -> Option<u32> {
        self.ram_size_kb
    }

    /// Whether `addr..addr + len` lies entirely within main flash.
    pub fn contains_flash_range(&self, addr: u32, len: usize) -> bool {
        let start = self.flash_base() as u64;
        let end = start + self.flash_size_bytes() as u64;
        let addr = addr as u64;
        addr >= start && addr + len as u64 <= end
    }
}

impl fmt::Display for McuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} KB flash", self.name, self.flash_size_kb)?;
        if f.alternate() {
            write!(f, " (IDCODE: 0x{:08X}", self.idcode)?;
            if self.page_size != 0 {
                write!(f, ", {} byte pages", self.page_size)?;
            }
            if let Some(ram) = self.ram_size_kb {
                write!(f, ", {ram} KB RAM")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect_known_families() {
        let f1 = McuInfo::detect(IdCode::new(0x1041_0477)).unwrap();
        assert_eq!(f1.family(), StmFamily::F1);
        assert_eq!(f1.name(), "STM32F1xx");
        assert_eq!(f1.flash_size_kb(), 128);
        assert_eq!(f1.page_size(), 1024);

        let f4 = McuInfo::detect(IdCode::new(0x2041_3477)).unwrap();
        assert_eq!(f4.family(), StmFamily::F4);
        assert_eq!(f4.flash_size_kb(), 1024);
        assert_eq!(f4.page_size(), 0);

        let f7 = McuInfo::detect(IdCode::new(0x5045_1477)).unwrap();
        assert_eq!(f7.family(), StmFamily::F7);
        assert!(!f7.family().programmable());

        let h7 = McuInfo::detect(IdCode::new(0x6045_0477)).unwrap();
        assert_eq!(h7.family(), StmFamily::H7);
    }

    #[test]
    fn detect_unknown_fails() {
        assert!(McuInfo::detect(IdCode::new(0x2BA0_1477)).is_none());
        assert!(McuInfo::detect(IdCode::new(0)).is_none());
    }

    #[test]
    fn flash_size_override() {
        let f1 = McuInfo::detect(IdCode::new(0x1041_0477))
            .unwrap()
            .with_flash_size_kb(512);
        assert_eq!(f1.flash_size_bytes(), 512 * 1024);
        assert_eq!(f1.page_size(), 2048);

        let f4 = McuInfo::detect(IdCode::new(0x2041_3477))
            .unwrap()
            .with_flash_size_kb(512);
        assert_eq!(f4.page_size(), 0);
    }

    #[test]
    fn flash_range_check() {
        let f1 = McuInfo::detect(IdCode::new(0x1041_0477)).unwrap();
        assert!(f1.contains_flash_range(0x0800_0000, 128 * 1024));
        assert!(!f1.contains_flash_range(0x0800_0000, 128 * 1024 + 1));
        assert!(!f1.contains_flash_range(0x2000_0000, 4));
    }

    #[test]
    fn display() {
        let f4 = McuInfo::detect(IdCode::new(0x2041_3477)).unwrap();
        assert_eq!(format!("{f4}"), "STM32F4xx 1024 KB flash");
        assert_eq!(
            format!("{f4:#}"),
            "STM32F4xx 1024 KB flash (IDCODE: 0x20413477, 128 KB RAM)"
        );
    }
}
