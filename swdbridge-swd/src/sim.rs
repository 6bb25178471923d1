// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SWD target for tests
//!
//! [`SimTarget`] answers transactions the way an STM32 behind a MEM-AP
//! does: DP and AP registers, posted AP reads returned through RDBUFF, a
//! sparse memory, the Cortex-M halt/reset registers and the F1 or F4 flash
//! controller (lock keys, write-1-to-clear status, program and erase).
//! Faults can be injected to exercise error paths.
//!
//! [`SimTimer`] is a clock that only advances when delayed.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use swdbridge_core::arm::dp::CtrlStat;
use swdbridge_core::arm::map::Csw;
use swdbridge_core::arm::scs::{Aircr, Demcr, Dhcsr};
use swdbridge_core::stm::{
    FLASH_BASE, FLASH_KEY1, FLASH_KEY2, StmDeviceId, StmFamily, StmFlashSize, Stm32F1FlashAr,
    Stm32F1FlashCr, Stm32F1FlashKeyr, Stm32F1FlashSr, Stm32F4FlashCr, Stm32F4FlashKeyr,
    Stm32F4FlashSr,
};

use crate::protocol::{SwdOp, SwdTransport};
use crate::{SwdError, Timer};

const FLASH_END: u32 = FLASH_BASE + 0x0010_0000;

/// Flash controller register map and bits for one family
#[derive(Debug, Clone, Copy)]
struct FlashRegs {
    keyr: u32,
    cr: u32,
    sr: u32,
    ar: Option<u32>,
    pg: u32,
    page_erase: u32,
    mer: u32,
    strt: u32,
    lock: u32,
    busy: u32,
    eop: u32,
}

impl FlashRegs {
    fn for_family(family: StmFamily) -> Option<Self> {
        match family {
            StmFamily::F1 => Some(Self {
                keyr: Stm32F1FlashKeyr::ADDRESS,
                cr: Stm32F1FlashCr::ADDRESS,
                sr: Stm32F1FlashSr::ADDRESS,
                ar: Some(Stm32F1FlashAr::ADDRESS),
                pg: Stm32F1FlashCr::PG,
                page_erase: Stm32F1FlashCr::PER,
                mer: Stm32F1FlashCr::MER,
                strt: Stm32F1FlashCr::STRT,
                lock: Stm32F1FlashCr::LOCK,
                busy: 1 << Stm32F1FlashSr::BSY_BIT,
                eop: 1 << Stm32F1FlashSr::EOP_BIT,
            }),
            StmFamily::F4 => Some(Self {
                keyr: Stm32F4FlashKeyr::ADDRESS,
                cr: Stm32F4FlashCr::ADDRESS,
                sr: Stm32F4FlashSr::ADDRESS,
                ar: None,
                pg: Stm32F4FlashCr::PG,
                page_erase: Stm32F4FlashCr::SER,
                mer: Stm32F4FlashCr::MER,
                strt: Stm32F4FlashCr::STRT,
                lock: Stm32F4FlashCr::LOCK,
                busy: 1 << Stm32F4FlashSr::BSY_BIT,
                eop: 1 << Stm32F4FlashSr::EOP_BIT,
            }),
            _ => None,
        }
    }
}

/// A flash erase the simulated controller carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimErase {
    /// F1 page erase, with the address from FLASH_AR
    Page(u32),
    /// F4 sector erase
    Sector(u8),
    Mass,
}

pub(crate) struct SimTarget {
    idcode: u32,
    flash: Option<FlashRegs>,

    // Debug port
    ctrl_stat: u32,
    select: u32,
    rdbuff: u32,
    line_resets: usize,
    hardware_resets: usize,

    // MEM-AP
    csw: u32,
    tar: u32,

    memory: HashMap<u32, u32>,

    // Core
    dhcsr: u32,
    demcr: u32,
    system_resets: usize,
    ignore_halt: bool,
    ignore_reset: bool,

    // Flash controller
    flash_cr: u32,
    flash_sr: u32,
    flash_ar: u32,
    key_stage: u8,
    key_writes: usize,
    reject_keys: bool,
    programs: Vec<(u32, u32)>,
    erases: Vec<SimErase>,
    program_error: Option<u32>,
    stuck_busy: bool,
    rejected_while_running: usize,
    fault_addr: Option<u32>,
}

impl SimTarget {
    pub const F1_IDCODE: u32 = 0x1041_0477;
    pub const F4_IDCODE: u32 = 0x2041_3477;

    pub fn new(idcode: u32, family: StmFamily) -> Self {
        let flash = FlashRegs::for_family(family);
        Self {
            idcode,
            flash,
            ctrl_stat: 0,
            select: 0,
            rdbuff: 0,
            line_resets: 0,
            hardware_resets: 0,
            csw: 0,
            tar: 0,
            memory: HashMap::new(),
            dhcsr: 0,
            demcr: 0,
            system_resets: 0,
            ignore_halt: false,
            ignore_reset: false,
            flash_cr: flash.map(|regs| regs.lock).unwrap_or(0),
            flash_sr: 0,
            flash_ar: 0,
            key_stage: 0,
            key_writes: 0,
            reject_keys: false,
            programs: Vec::new(),
            erases: Vec::new(),
            program_error: None,
            stuck_busy: false,
            rejected_while_running: 0,
            fault_addr: None,
        }
    }

    pub fn stm32f1() -> Self {
        Self::new(Self::F1_IDCODE, StmFamily::F1)
    }

    pub fn stm32f4() -> Self {
        Self::new(Self::F4_IDCODE, StmFamily::F4)
    }

    /// Presets a word of target memory.
    pub fn with_word(mut self, addr: u32, value: u32) -> Self {
        self.memory.insert(addr & !0b11, value);
        self
    }

    /// Presets DBGMCU_IDCODE.
    pub fn with_device_id(self, dev_id: u16) -> Self {
        self.with_word(StmDeviceId::ADDRESS, 0x1000_0000 | dev_id as u32)
    }

    /// Presets the flash size register.
    pub fn with_flash_size_kb(self, family: StmFamily, kb: u16) -> Self {
        match family {
            StmFamily::F1 => self.with_word(StmFlashSize::STM32F1_ADDRESS, 0xFFFF_0000 | kb as u32),
            StmFamily::F4 => self.with_word(StmFlashSize::STM32F4_ADDRESS, (kb as u32) << 16 | 0xFFFF),
            _ => self,
        }
    }

    pub fn set_ignore_halt(&mut self, ignore: bool) {
        self.ignore_halt = ignore;
    }

    pub fn set_ignore_reset(&mut self, ignore: bool) {
        self.ignore_reset = ignore;
    }

    /// Leaves the flash locked whatever keys are written.
    pub fn set_reject_keys(&mut self, reject: bool) {
        self.reject_keys = reject;
    }

    /// Status register bits raised by every subsequent program or erase.
    pub fn set_program_error(&mut self, sr_bits: Option<u32>) {
        self.program_error = sr_bits;
    }

    /// Holds the flash controller busy forever.
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Answers FAULT to any memory read from `addr`.
    pub fn set_fault_addr(&mut self, addr: Option<u32>) {
        self.fault_addr = addr;
    }

    /// Erases started or units programmed while the core was running.
    /// These are refused.
    pub fn rejected_while_running(&self) -> usize {
        self.rejected_while_running
    }

    pub fn line_resets(&self) -> usize {
        self.line_resets
    }

    pub fn hardware_resets(&self) -> usize {
        self.hardware_resets
    }

    pub fn system_resets(&self) -> usize {
        self.system_resets
    }

    pub fn powered_up(&self) -> bool {
        CtrlStat::from(self.ctrl_stat).powered_up()
    }

    pub fn flash_locked(&self) -> bool {
        self.flash
            .map(|regs| self.flash_cr & regs.lock != 0)
            .unwrap_or(true)
    }

    pub fn flash_cr(&self) -> u32 {
        self.flash_cr
    }

    /// Writes to the key register, correct or not.
    pub fn key_writes(&self) -> usize {
        self.key_writes
    }

    /// Programmed units as (address, value), half-words on F1 and words on
    /// F4, in order.
    pub fn programs(&self) -> &[(u32, u32)] {
        &self.programs
    }

    pub fn erases(&self) -> &[SimErase] {
        &self.erases
    }

    /// Reads a word of memory without going over the link.
    pub fn peek(&self, addr: u32) -> u32 {
        self.load(addr & !0b11)
    }

    fn load(&self, addr: u32) -> u32 {
        let default = if (FLASH_BASE..FLASH_END).contains(&addr) {
            0xFFFF_FFFF
        } else {
            0
        };
        self.memory.get(&addr).copied().unwrap_or(default)
    }

    fn store(&mut self, addr: u32, data: u32) {
        let word_addr = addr & !0b11;
        let mask = match self.csw & 0b111 {
            Csw::SIZE_8BIT => 0xFF << ((addr & 0b11) * 8),
            Csw::SIZE_16BIT => 0xFFFF << ((addr & 0b10) * 8),
            _ => 0xFFFF_FFFF,
        };
        let old = self.load(word_addr);
        self.memory.insert(word_addr, (old & !mask) | (data & mask));
    }

    fn mem_read(&mut self, addr: u32) -> u32 {
        let addr = addr & !0b11;
        if addr == Dhcsr::ADDRESS {
            let value = self.dhcsr;
            self.dhcsr &= !Dhcsr::S_RESET_ST;
            return value;
        }
        if addr == Demcr::ADDRESS {
            return self.demcr;
        }
        if let Some(regs) = self.flash {
            if addr == regs.cr {
                return self.flash_cr;
            }
            if addr == regs.sr {
                let busy = if self.stuck_busy { regs.busy } else { 0 };
                return self.flash_sr | busy;
            }
        }
        self.load(addr)
    }

    fn mem_write(&mut self, addr: u32, data: u32) {
        match addr & !0b11 {
            Dhcsr::ADDRESS => {
                if data & 0xFFFF_0000 == Dhcsr::DBGKEY {
                    let control = data & 0xFFFF;
                    self.dhcsr = (self.dhcsr & 0xFFFF_0000) | control;
                    if control & Dhcsr::C_HALT != 0 && !self.ignore_halt {
                        self.dhcsr |= Dhcsr::S_HALT;
                    } else if control & Dhcsr::C_HALT == 0 {
                        self.dhcsr &= !Dhcsr::S_HALT;
                    }
                }
            }
            Demcr::ADDRESS => self.demcr = data,
            Aircr::ADDRESS => {
                if data == Aircr::reset_request() && !self.ignore_reset {
                    self.system_reset();
                }
            }
            word_addr => {
                if let Some(regs) = self.flash {
                    if self.flash_write(regs, word_addr, addr, data) {
                        return;
                    }
                }
                self.store(addr, data);
            }
        }
    }

    fn system_reset(&mut self) {
        self.system_resets += 1;
        self.dhcsr |= Dhcsr::S_RESET_ST;
        if self.demcr & Demcr::VC_CORERESET != 0 {
            self.dhcsr |= Dhcsr::S_HALT;
        } else {
            self.dhcsr &= !Dhcsr::S_HALT;
        }
        self.reset_flash();
    }

    fn reset_flash(&mut self) {
        if let Some(regs) = self.flash {
            self.flash_cr = regs.lock;
            self.flash_sr = 0;
            self.key_stage = 0;
        }
    }

    // Returns true if the write was consumed by the flash controller
    fn flash_write(&mut self, regs: FlashRegs, word_addr: u32, addr: u32, data: u32) -> bool {
        let locked = self.flash_cr & regs.lock != 0;
        let halted = self.dhcsr & Dhcsr::S_HALT != 0;

        if word_addr == regs.keyr {
            self.key_writes += 1;
            self.key_stage = match (self.key_stage, data) {
                (0, FLASH_KEY1) => 1,
                (1, FLASH_KEY2) if !self.reject_keys => {
                    self.flash_cr &= !regs.lock;
                    0
                }
                _ => 0,
            };
            return true;
        }

        if word_addr == regs.sr {
            // Write 1 to clear, busy is read-only
            self.flash_sr &= !(data & !regs.busy);
            return true;
        }

        if Some(word_addr) == regs.ar {
            if !locked {
                self.flash_ar = data;
            }
            return true;
        }

        if word_addr == regs.cr {
            if locked {
                // Only LOCK is writable while locked
                return true;
            }
            self.flash_cr = data & !regs.strt;
            if data & regs.strt != 0 {
                if halted {
                    self.start_erase(regs, data);
                } else {
                    self.rejected_while_running += 1;
                }
            }
            return true;
        }

        if (FLASH_BASE..FLASH_END).contains(&word_addr) {
            if locked || self.flash_cr & regs.pg == 0 {
                return true;
            }
            if !halted {
                self.rejected_while_running += 1;
            } else {
                let value = match self.csw & 0b111 {
                    Csw::SIZE_16BIT => (data >> ((addr & 0b10) * 8)) & 0xFFFF,
                    _ => data,
                };
                self.programs.push((addr, value));
                self.store(addr, data);
                self.complete_operation(regs);
            }
            return true;
        }

        false
    }

    fn start_erase(&mut self, regs: FlashRegs, cr: u32) {
        if cr & regs.mer != 0 {
            self.erases.push(SimErase::Mass);
            self.memory
                .retain(|addr, _| !(FLASH_BASE..FLASH_END).contains(addr));
        } else if cr & regs.page_erase != 0 {
            match regs.ar {
                Some(_) => self.erases.push(SimErase::Page(self.flash_ar)),
                None => {
                    let sector = (cr >> Stm32F4FlashCr::SNB_SHIFT) & Stm32F4FlashCr::SNB_MASK;
                    self.erases.push(SimErase::Sector(sector as u8));
                }
            }
        } else {
            return;
        }
        self.complete_operation(regs);
    }

    fn complete_operation(&mut self, regs: FlashRegs) {
        match self.program_error {
            Some(bits) => self.flash_sr |= bits,
            None => self.flash_sr |= regs.eop,
        }
    }
}

impl SwdTransport for SimTarget {
    fn transfer(&mut self, op: SwdOp, data: u32) -> Result<u32, SwdError> {
        match op {
            SwdOp::DpRead(0x0) => {
                self.rdbuff = self.idcode;
                Ok(self.idcode)
            }
            SwdOp::DpRead(0x4) => {
                self.rdbuff = self.ctrl_stat;
                Ok(self.ctrl_stat)
            }
            SwdOp::DpRead(0xC) => Ok(self.rdbuff),
            SwdOp::DpRead(_) => Ok(0),
            SwdOp::DpWrite(0x4) => {
                // Acknowledge power-up requests
                self.ctrl_stat = data | ((data & 0x5000_0000) << 1);
                Ok(data)
            }
            SwdOp::DpWrite(0x8) => {
                self.select = data;
                Ok(data)
            }
            SwdOp::DpWrite(_) => Ok(data),
            SwdOp::ApRead(addr) => {
                if self.select != 0 {
                    return Err(SwdError::FaultAck);
                }
                // Posted: this transaction returns the previous result
                let previous = self.rdbuff;
                self.rdbuff = match addr {
                    0x0 => self.csw,
                    0x4 => self.tar,
                    0xC if Some(self.tar & !0b11) == self.fault_addr => {
                        return Err(SwdError::FaultAck);
                    }
                    0xC => self.mem_read(self.tar),
                    _ => 0,
                };
                Ok(previous)
            }
            SwdOp::ApWrite(addr) => {
                if self.select != 0 {
                    return Err(SwdError::FaultAck);
                }
                match addr {
                    0x0 => self.csw = data,
                    0x4 => self.tar = data,
                    0xC => self.mem_write(self.tar, data),
                    _ => {}
                }
                Ok(data)
            }
        }
    }

    fn line_reset(&mut self) {
        self.line_resets += 1;
    }

    fn jtag_to_swd(&mut self) {}

    fn idle(&mut self, _cycles: u32) {}

    fn hardware_reset(&mut self) -> Result<(), SwdError> {
        self.hardware_resets += 1;
        self.ctrl_stat = 0;
        self.dhcsr = Dhcsr::S_RESET_ST;
        self.reset_flash();
        Ok(())
    }
}

/// Simulated millisecond clock.  Clones share the same time.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimTimer(Rc<Cell<u64>>);

impl SimTimer {
    pub fn now(&self) -> u64 {
        self.0.get()
    }
}

impl Timer for SimTimer {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get() + ms as u64);
    }
}
