// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge-core - STM32 specific objects
//!
//! Flash controller register maps for the F1 and F4 families, family
//! identification, and the page/sector geometry used to turn a flash address
//! into something the flash controller can erase.

use core::fmt;
use serde::Serialize;
use static_assertions::const_assert_eq;

/// Base address of main flash on all supported STM32 families
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Flash unlock keys, written to FLASH_KEYR in this order.  Identical on F1
/// and F4.
pub const FLASH_KEY1: u32 = 0x4567_0123;
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;

// STM32F1 FLASH register base address
const STM32F1_FLASH_REG_BASE: u32 = 0x4002_2000;

/// STM32F1 FLASH_KEYR register
pub struct Stm32F1FlashKeyr;

impl Stm32F1FlashKeyr {
    pub const ADDRESS: u32 = STM32F1_FLASH_REG_BASE + 0x04;
}

/// STM32F1 FLASH_SR register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stm32F1FlashSr(u32);

impl Stm32F1FlashSr {
    pub const ADDRESS: u32 = STM32F1_FLASH_REG_BASE + 0x0C;

    pub const BSY_BIT: u32 = 0;
    pub const PGERR_BIT: u32 = 2;
    pub const WRPRTERR_BIT: u32 = 4;
    pub const EOP_BIT: u32 = 5;

    /// Writing this back clears EOP and both error flags.
    pub const CLEAR_MASK: u32 =
        (1 << Self::EOP_BIT) | (1 << Self::WRPRTERR_BIT) | (1 << Self::PGERR_BIT);

    pub fn busy(&self) -> bool {
        (self.0 >> Self::BSY_BIT) & 1 != 0
    }

    /// Programming or write protection error
    pub fn errors(&self) -> bool {
        self.0 & ((1 << Self::PGERR_BIT) | (1 << Self::WRPRTERR_BIT)) != 0
    }
}

/// STM32F1 FLASH_CR register
pub struct Stm32F1FlashCr;

impl Stm32F1FlashCr {
    pub const ADDRESS: u32 = STM32F1_FLASH_REG_BASE + 0x10;

    pub const PG: u32 = 1 << 0;
    pub const PER: u32 = 1 << 1;
    pub const MER: u32 = 1 << 2;
    pub const STRT: u32 = 1 << 6;
    pub const LOCK: u32 = 1 << 7;
}

/// STM32F1 FLASH_AR register: page address for a page erase
pub struct Stm32F1FlashAr;

impl Stm32F1FlashAr {
    pub const ADDRESS: u32 = STM32F1_FLASH_REG_BASE + 0x14;
}

// STM32F4 FLASH register base address
const STM32F4_FLASH_REG_BASE: u32 = 0x4002_3C00;

/// STM32F4 FLASH_KEYR register
pub struct Stm32F4FlashKeyr;

impl Stm32F4FlashKeyr {
    pub const ADDRESS: u32 = STM32F4_FLASH_REG_BASE + 0x04;
}

/// STM32F4 FLASH_SR register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stm32F4FlashSr(u32);

impl Stm32F4FlashSr {
    pub const ADDRESS: u32 = STM32F4_FLASH_REG_BASE + 0x0C;

    pub const EOP_BIT: u32 = 0;
    pub const OPERR_BIT: u32 = 1;
    pub const WRPERR_BIT: u32 = 4;
    pub const PGAERR_BIT: u32 = 5;
    pub const PGPERR_BIT: u32 = 6;
    pub const PGSERR_BIT: u32 = 7;
    pub const BSY_BIT: u32 = 16;

    /// Written to clear EOP, OPERR and the four programming error flags
    /// before a program operation.
    pub const CLEAR_MASK: u32 = 0xF3;

    pub fn busy(&self) -> bool {
        (self.0 >> Self::BSY_BIT) & 1 != 0
    }

    pub fn errors(&self) -> bool {
        let error_mask = (1 << Self::OPERR_BIT)
            | (1 << Self::WRPERR_BIT)
            | (1 << Self::PGAERR_BIT)
            | (1 << Self::PGPERR_BIT)
            | (1 << Self::PGSERR_BIT);
        self.0 & error_mask != 0
    }
}

/// STM32F4 FLASH_CR register
pub struct Stm32F4FlashCr;

impl Stm32F4FlashCr {
    pub const ADDRESS: u32 = STM32F4_FLASH_REG_BASE + 0x10;

    pub const PG: u32 = 1 << 0;
    pub const SER: u32 = 1 << 1;
    pub const MER: u32 = 1 << 2;
    pub const STRT: u32 = 1 << 16;
    pub const LOCK: u32 = 1 << 31;

    pub const SNB_SHIFT: u32 = 3;
    pub const SNB_MASK: u32 = 0b1111;
    pub const PSIZE_SHIFT: u32 = 8;
    pub const PSIZE_MASK: u32 = 0b11 << Self::PSIZE_SHIFT;

    /// 32-bit parallelism.  Valid from 2.7V to 3.6V.
    pub const PSIZE_X32: u32 = 0b10 << Self::PSIZE_SHIFT;

    /// Sector number field for a sector erase
    pub fn snb(sector: u8) -> u32 {
        ((sector as u32) & Self::SNB_MASK) << Self::SNB_SHIFT
    }
}

macro_rules! status_conversions {
    ($name:ident) => {
        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            fn from(sr: $name) -> Self {
                sr.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}

status_conversions!(Stm32F1FlashSr);
status_conversions!(Stm32F4FlashSr);

/// STM32 product family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StmFamily {
    F1,
    F4,
    F7,
    H7,
    Unknown,
}

impl StmFamily {
    /// Whether this family was identified at all
    pub fn known(&self) -> bool {
        !matches!(self, StmFamily::Unknown)
    }

    /// Whether flash erase and program are implemented for this family.  F7
    /// and H7 are identified but not programmable.
    pub fn programmable(&self) -> bool {
        matches!(self, StmFamily::F1 | StmFamily::F4)
    }
}

impl fmt::Display for StmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmFamily::F1 => write!(f, "STM32F1"),
            StmFamily::F4 => write!(f, "STM32F4"),
            StmFamily::F7 => write!(f, "STM32F7"),
            StmFamily::H7 => write!(f, "STM32H7"),
            StmFamily::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One row of the family identification table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyEntry {
    pub part_number: u16,
    pub family: StmFamily,
    pub name: &'static str,
    pub flash_size_kb: u32,
    /// Erase page size in bytes, or 0 where flash is erased by sector
    pub page_size: u32,
    pub ram_size_kb: Option<u32>,
}

/// Known part numbers, with the default geometry assumed until the device's
/// flash size register has been read.
pub const FAMILY_TABLE: [FamilyEntry; 4] = [
    FamilyEntry {
        part_number: 0x410,
        family: StmFamily::F1,
        name: "STM32F1xx",
        flash_size_kb: 128,
        page_size: 1024,
        ram_size_kb: Some(20),
    },
    FamilyEntry {
        part_number: 0x413,
        family: StmFamily::F4,
        name: "STM32F4xx",
        flash_size_kb: 1024,
        page_size: 0,
        ram_size_kb: Some(128),
    },
    FamilyEntry {
        part_number: 0x451,
        family: StmFamily::F7,
        name: "STM32F7xx",
        flash_size_kb: 512,
        page_size: 0,
        ram_size_kb: None,
    },
    FamilyEntry {
        part_number: 0x450,
        family: StmFamily::H7,
        name: "STM32H7xx",
        flash_size_kb: 2048,
        page_size: 0,
        ram_size_kb: None,
    },
];

/// Looks up a 12-bit part number in [`FAMILY_TABLE`].
pub fn lookup_part(part_number: u16) -> Option<&'static FamilyEntry> {
    FAMILY_TABLE
        .iter()
        .find(|entry| entry.part_number == part_number)
}

/// STM32 DBGMCU_IDCODE
///
/// - Bits 31:16: REV_ID (silicon revision)
/// - Bits 11:0:  DEV_ID (device identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmDeviceId(u32);

impl StmDeviceId {
    /// Same address on F1 and F4
    pub const ADDRESS: u32 = 0xE004_2000;

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn revision(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn device_id(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }
}

impl fmt::Display for StmDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DEV_ID 0x{:03X} REV_ID 0x{:04X}",
            self.device_id(),
            self.revision()
        )
    }
}

/// STM32 flash size register: a 16-bit KB count in system memory.
pub struct StmFlashSize;

impl StmFlashSize {
    /// Word holding the F1 flash size in its low half-word
    pub const STM32F1_ADDRESS: u32 = 0x1FFF_F7E0;

    /// Word holding the F4 flash size (at 0x1FFF_7A22) in its high half-word
    pub const STM32F4_ADDRESS: u32 = 0x1FFF_7A20;

    /// Word-aligned address to read for this family.
    pub fn addr_from_family(family: StmFamily) -> Option<u32> {
        match family {
            StmFamily::F1 => Some(Self::STM32F1_ADDRESS),
            StmFamily::F4 => Some(Self::STM32F4_ADDRESS),
            _ => None,
        }
    }

    /// Extracts the size in KB from the word read at
    /// [`Self::addr_from_family`].  Erased or unprogrammed values (0 and
    /// 0xFFFF) yield `None`.
    pub fn kb_from_word(family: StmFamily, word: u32) -> Option<u32> {
        let kb = match family {
            StmFamily::F1 => word & 0xFFFF,
            StmFamily::F4 => word >> 16,
            _ => return None,
        };
        match kb {
            0 | 0xFFFF => None,
            kb => Some(kb),
        }
    }
}

/// F4 single bank sector sizes in KB.  A device uses a prefix of this table
/// covering its flash size.
const STM32F4_SECTOR_SIZES_KB: [u32; 12] = [16, 16, 16, 16, 64, 128, 128, 128, 128, 128, 128, 128];

const_assert_eq!(
    STM32F4_SECTOR_SIZES_KB[0]
        + STM32F4_SECTOR_SIZES_KB[1]
        + STM32F4_SECTOR_SIZES_KB[2]
        + STM32F4_SECTOR_SIZES_KB[3]
        + STM32F4_SECTOR_SIZES_KB[4],
    128
);

/// Highest F4 sector index the flash controller's SNB field is driven with
pub const STM32F4_MAX_SECTOR: u8 = 11;

/// Returns the sector sizes (KB) for a sector-erased device, keyed by family
/// and flash size.  `None` where the layout is not known, including dual
/// bank F4 parts above 1 MB.
fn sector_table(family: StmFamily, flash_size_kb: u32) -> Option<&'static [u32]> {
    match family {
        StmFamily::F4 if (16..=1024).contains(&flash_size_kb) => Some(&STM32F4_SECTOR_SIZES_KB),
        _ => None,
    }
}

/// Returns the F1 erase page size in bytes, keyed by flash size.
/// High-density and connectivity line parts (more than 128 KB) use 2 KB
/// pages.
pub fn page_size(family: StmFamily, flash_size_kb: u32) -> Option<u32> {
    match family {
        StmFamily::F1 if flash_size_kb > 128 => Some(2048),
        StmFamily::F1 => Some(1024),
        _ => None,
    }
}

/// Maps an absolute flash address to the sector containing it.
///
/// Returns `None` for addresses outside the device's flash, or for families
/// without a known sector layout.
pub fn sector_for_address(family: StmFamily, flash_size_kb: u32, addr: u32) -> Option<u8> {
    let table = sector_table(family, flash_size_kb)?;
    let offset = addr.checked_sub(FLASH_BASE)?;
    if offset >= flash_size_kb * 1024 {
        return None;
    }

    let mut end = 0u32;
    for (sector, size_kb) in table.iter().enumerate() {
        end += size_kb * 1024;
        if offset < end {
            return Some(sector as u8);
        }
    }
    None
}

/// Returns the absolute start address and size in bytes of a sector.
pub fn sector_range(family: StmFamily, flash_size_kb: u32, sector: u8) -> Option<(u32, u32)> {
    let table = sector_table(family, flash_size_kb)?;
    let size_kb = *table.get(sector as usize)?;
    let start_kb: u32 = table.iter().take(sector as usize).sum();
    if start_kb + size_kb > flash_size_kb {
        return None;
    }
    Some((FLASH_BASE + start_kb * 1024, size_kb * 1024))
}
