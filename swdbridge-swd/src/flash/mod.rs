// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32 Flash Programming
//!
//! [`FlashProgrammer`] is a programming session: it identifies the target,
//! halts it, unlocks its flash controller, erases, programs and verifies,
//! all through target memory accesses over SWD.
//!
//! The family's algorithm ([`FlashAlgorithm`]) is chosen once, when the
//! target is identified.  F1 parts erase by page and program half-words,
//! F4 parts erase by sector and program words.  F7 and H7 parts are
//! identified but refused.
//!
//! Nothing is assumed to persist between calls: every erase and program
//! halts the core and re-checks the controller's lock bit first, so an
//! intervening reset cannot leave an operation running against a locked
//! controller.

mod f1;
mod f4;

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use swdbridge_core::McuInfo;
use swdbridge_core::arm::dp::IdCode;
use swdbridge_core::stm::{
    self, FLASH_KEY1, FLASH_KEY2, Stm32F1FlashCr, Stm32F1FlashKeyr, Stm32F1FlashSr,
    Stm32F4FlashCr, Stm32F4FlashKeyr, Stm32F4FlashSr, StmDeviceId, StmFamily, StmFlashSize,
};

use crate::debug::DebugInterface;
use crate::protocol::SwdTransport;
use crate::{FlashTimeouts, SwdConfig, SwdError, Timer};

/// What [`FlashProgrammer::program()`] erases before programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EraseMode {
    /// Program only.  The range must already be erased.
    #[default]
    None,
    /// Erase every page or sector the data overlaps.
    Range,
    /// Mass erase.
    All,
}

/// Per-family flash algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlashAlgorithm {
    /// Page erase, half-word programming
    F1,
    /// Sector erase, word programming
    F4,
}

impl FlashAlgorithm {
    /// Returns the algorithm for `family`, or `None` if programming it is
    /// not supported.
    pub fn for_family(family: StmFamily) -> Option<Self> {
        match family {
            StmFamily::F1 => Some(FlashAlgorithm::F1),
            StmFamily::F4 => Some(FlashAlgorithm::F4),
            _ => None,
        }
    }

    pub fn family(&self) -> StmFamily {
        match self {
            FlashAlgorithm::F1 => StmFamily::F1,
            FlashAlgorithm::F4 => StmFamily::F4,
        }
    }

    /// Bytes programmed per unit
    pub fn unit_size(&self) -> usize {
        match self {
            FlashAlgorithm::F1 => 2,
            FlashAlgorithm::F4 => 4,
        }
    }

    fn keyr(&self) -> u32 {
        match self {
            FlashAlgorithm::F1 => Stm32F1FlashKeyr::ADDRESS,
            FlashAlgorithm::F4 => Stm32F4FlashKeyr::ADDRESS,
        }
    }

    fn cr(&self) -> u32 {
        match self {
            FlashAlgorithm::F1 => Stm32F1FlashCr::ADDRESS,
            FlashAlgorithm::F4 => Stm32F4FlashCr::ADDRESS,
        }
    }

    fn sr(&self) -> u32 {
        match self {
            FlashAlgorithm::F1 => Stm32F1FlashSr::ADDRESS,
            FlashAlgorithm::F4 => Stm32F4FlashSr::ADDRESS,
        }
    }

    fn lock_bit(&self) -> u32 {
        match self {
            FlashAlgorithm::F1 => Stm32F1FlashCr::LOCK,
            FlashAlgorithm::F4 => Stm32F4FlashCr::LOCK,
        }
    }

    // (busy, errors)
    fn decode_status(&self, sr: u32) -> (bool, bool) {
        match self {
            FlashAlgorithm::F1 => {
                let sr = Stm32F1FlashSr::from(sr);
                (sr.busy(), sr.errors())
            }
            FlashAlgorithm::F4 => {
                let sr = Stm32F4FlashSr::from(sr);
                (sr.busy(), sr.errors())
            }
        }
    }

    fn is_locked<T, C>(&self, debug: &mut DebugInterface<T, C>) -> Result<bool, SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        Ok(debug.read_mem(self.cr())? & self.lock_bit() != 0)
    }

    // Returns whether the key sequence had to be written
    fn unlock<T, C>(&self, debug: &mut DebugInterface<T, C>) -> Result<bool, SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        if !self.is_locked(debug)? {
            trace!("OK:    {} flash already unlocked", self.family());
            return Ok(false);
        }

        debug!("Unlocking {} flash", self.family());
        debug.write_mem(self.keyr(), FLASH_KEY1)?;
        debug.write_mem(self.keyr(), FLASH_KEY2)?;

        if self.is_locked(debug)? {
            warn!("{} flash still locked after key sequence", self.family());
            return Err(SwdError::FlashLocked);
        }
        Ok(true)
    }

    fn lock<T, C>(&self, debug: &mut DebugInterface<T, C>) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        debug!("Locking {} flash", self.family());
        let flash_cr = debug.read_mem(self.cr())?;
        debug.write_mem(self.cr(), flash_cr | self.lock_bit())
    }

    /// Waits for the controller to be idle.  Error flags left over from an
    /// earlier operation are ignored.
    fn wait_ready<T, C>(
        &self,
        debug: &mut DebugInterface<T, C>,
        timeout_ms: u32,
    ) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        let algorithm = *self;
        debug.poll(timeout_ms, |swd| {
            let (busy, _) = algorithm.decode_status(swd.read_mem(algorithm.sr())?);
            Ok(!busy)
        })
    }

    /// Waits for the operation just started to complete.  Any error flag
    /// fails immediately with the raw status register.
    fn wait_complete<T, C>(
        &self,
        debug: &mut DebugInterface<T, C>,
        timeout_ms: u32,
    ) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        let algorithm = *self;
        debug.poll(timeout_ms, |swd| {
            let sr = swd.read_mem(algorithm.sr())?;
            let (busy, errors) = algorithm.decode_status(sr);
            if errors {
                warn!("{} flash operation failed, SR 0x{sr:08X}", algorithm.family());
                return Err(SwdError::FlashError(sr));
            }
            Ok(!busy)
        })
    }

    fn clear_status<T, C>(&self, debug: &mut DebugInterface<T, C>) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        let mask = match self {
            FlashAlgorithm::F1 => Stm32F1FlashSr::CLEAR_MASK,
            FlashAlgorithm::F4 => Stm32F4FlashSr::CLEAR_MASK,
        };
        debug.write_mem(self.sr(), mask)
    }

    /// Clears the operation's `bits` from CR whether or not it succeeded.
    /// The operation's own error takes precedence.
    fn finish<T, C>(
        &self,
        debug: &mut DebugInterface<T, C>,
        result: Result<(), SwdError>,
        bits: u32,
    ) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        let cleared = debug
            .read_mem(self.cr())
            .and_then(|flash_cr| debug.write_mem(self.cr(), flash_cr & !bits));
        result.and(cleared)
    }

    fn erase_all<T, C>(&self, debug: &mut DebugInterface<T, C>) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        match self {
            FlashAlgorithm::F1 => f1::erase_all(debug),
            FlashAlgorithm::F4 => f4::erase_all(debug),
        }
    }

    // Programs up to one unit from `chunk`, padding with 0xFF
    fn program_unit<T, C>(
        &self,
        debug: &mut DebugInterface<T, C>,
        addr: u32,
        chunk: &[u8],
    ) -> Result<(), SwdError>
    where
        T: SwdTransport,
        C: Timer,
    {
        let mut unit = [0xFF; 4];
        unit[..chunk.len()].copy_from_slice(chunk);
        match self {
            FlashAlgorithm::F1 => {
                f1::program_half_word(debug, addr, u16::from_le_bytes([unit[0], unit[1]]))
            }
            FlashAlgorithm::F4 => f4::program_word(debug, addr, u32::from_le_bytes(unit)),
        }
    }
}

impl fmt::Display for FlashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashAlgorithm::F1 => write!(f, "STM32F1 page/half-word"),
            FlashAlgorithm::F4 => write!(f, "STM32F4 sector/word"),
        }
    }
}

/// STM32 flash programming session
///
/// Owns the [`DebugInterface`], and so the SWD link, for its lifetime.
/// Callers must serialise access: the session does no locking of its own.
///
/// ```rust,ignore
/// let mut programmer = FlashProgrammer::new(swd, timer, &SwdConfig::default(), FlashTimeouts::default());
/// let mcu = programmer.init()?;
/// info!("Found {mcu}");
/// programmer.program(0x0800_0000, &image, EraseMode::Range)?;
/// ```
pub struct FlashProgrammer<T, C> {
    debug: DebugInterface<T, C>,
    mcu: Option<McuInfo>,
    algorithm: Option<FlashAlgorithm>,
    unknown_idcode: Option<IdCode>,
    unlocked: bool,
}

impl<T, C> FlashProgrammer<T, C>
where
    T: SwdTransport,
    C: Timer,
{
    pub fn new(transport: T, timer: C, config: &SwdConfig, timeouts: FlashTimeouts) -> Self {
        Self::from_debug(DebugInterface::new(transport, timer, config, timeouts))
    }

    pub fn from_debug(debug: DebugInterface<T, C>) -> Self {
        Self {
            debug,
            mcu: None,
            algorithm: None,
            unknown_idcode: None,
            unlocked: false,
        }
    }

    pub fn debug(&self) -> &DebugInterface<T, C> {
        &self.debug
    }

    pub fn debug_mut(&mut self) -> &mut DebugInterface<T, C> {
        &mut self.debug
    }

    pub fn transport(&self) -> &T {
        self.debug.swd_if().transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.debug.swd_if_mut().transport_mut()
    }

    /// Ends the session and returns the transport.
    pub fn into_transport(self) -> T {
        self.debug.into_transport()
    }

    /// Starts a session: connects, identifies the target and reads its
    /// flash size.
    ///
    /// If the IDCODE's part number is not recognised, the STM32 DBGMCU
    /// device ID is tried instead.
    ///
    /// Returns:
    /// - `Ok(McuInfo)`: the identified target.
    /// - `Err(SwdError::UnknownTarget)`: the target is not a known STM32.
    /// - `Err(SwdError)`: the link could not be brought up.
    pub fn init(&mut self) -> Result<McuInfo, SwdError> {
        self.forget_target();
        let idcode = self.debug.connect()?;

        let mcu = match self.detect_mcu(idcode) {
            Ok(mcu) => mcu,
            Err(SwdError::UnknownTarget(_)) => {
                let device_id = match self.debug.read_mem(StmDeviceId::ADDRESS) {
                    Ok(word) => StmDeviceId::new(word),
                    Err(e) => {
                        // Not an STM32, or no DBGMCU at this address
                        debug!("Error: reading DBGMCU IDCODE: {e}");
                        if let Err(e) = self.debug.swd_if_mut().clear_errors() {
                            debug!("Error: clearing errors: {e}");
                        }
                        return Err(SwdError::UnknownTarget(idcode.data()));
                    }
                };
                debug!("Value: {device_id}");
                self.detect_part(idcode, device_id.device_id())?
            }
            Err(e) => return Err(e),
        };

        let mcu = self.refine_flash_size(mcu);
        self.mcu = Some(mcu);
        info!("Target: {mcu:#}");
        Ok(mcu)
    }

    /// Ends the session, locking the flash if this session unlocked it, and
    /// forgetting the target.
    pub fn deinit(&mut self) -> Result<(), SwdError> {
        let result = if self.unlocked { self.lock() } else { Ok(()) };
        self.forget_target();
        debug!("Flash session ended");
        result
    }

    /// Identifies the target from `idcode`, selecting the flash algorithm.
    ///
    /// Returns:
    /// - `Ok(McuInfo)`: the target family is known.  It may still not be
    ///   programmable.
    /// - `Err(SwdError::UnknownTarget)`: the part number is not known.  All
    ///   flash operations will fail until a target is identified.
    pub fn detect_mcu(&mut self, idcode: IdCode) -> Result<McuInfo, SwdError> {
        self.detect_part(idcode, idcode.part_number())
    }

    fn detect_part(&mut self, idcode: IdCode, part_number: u16) -> Result<McuInfo, SwdError> {
        self.forget_target();
        let Some(mcu) = McuInfo::from_part_number(idcode, part_number) else {
            warn!("Unknown target, IDCODE {idcode} part number 0x{part_number:03X}");
            self.unknown_idcode = Some(idcode);
            return Err(SwdError::UnknownTarget(idcode.data()));
        };

        self.algorithm = FlashAlgorithm::for_family(mcu.family());
        match self.algorithm {
            Some(algorithm) => debug!("Detected {mcu}, using {algorithm}"),
            None => warn!("Detected {mcu}, flash programming not supported"),
        }
        self.mcu = Some(mcu);
        Ok(mcu)
    }

    fn forget_target(&mut self) {
        self.mcu = None;
        self.algorithm = None;
        self.unknown_idcode = None;
        self.unlocked = false;
    }

    // The table's default flash size is replaced by the device's own flash
    // size register, if it can be read and looks plausible
    fn refine_flash_size(&mut self, mcu: McuInfo) -> McuInfo {
        let Some(addr) = StmFlashSize::addr_from_family(mcu.family()) else {
            return mcu;
        };

        match self.debug.read_mem(addr) {
            Ok(word) => match StmFlashSize::kb_from_word(mcu.family(), word) {
                Some(kb) => {
                    debug!("Value: flash size {kb} KB");
                    mcu.with_flash_size_kb(kb)
                }
                None => {
                    debug!("Value: flash size unset 0x{word:08X}");
                    mcu
                }
            },
            Err(e) => {
                warn!("Failed to read flash size: {e}");
                if let Err(e) = self.debug.swd_if_mut().clear_errors() {
                    debug!("Error: clearing errors: {e}");
                }
                mcu
            }
        }
    }

    /// The identified target, if any
    pub fn mcu(&self) -> Option<&McuInfo> {
        self.mcu.as_ref()
    }

    pub fn family(&self) -> StmFamily {
        self.mcu
            .map(|mcu| mcu.family())
            .unwrap_or(StmFamily::Unknown)
    }

    pub fn name(&self) -> Option<&'static str> {
        self.mcu.map(|mcu| mcu.name())
    }

    /// Flash size in bytes
    pub fn flash_size(&self) -> Option<u32> {
        self.mcu.map(|mcu| mcu.flash_size_bytes())
    }

    pub fn algorithm(&self) -> Option<FlashAlgorithm> {
        self.algorithm
    }

    /// Whether this session has unlocked the flash since the last reset.
    /// Operations re-check the controller regardless.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    // Fails fast unless a programmable target has been identified
    fn target(&self) -> Result<(McuInfo, FlashAlgorithm), SwdError> {
        let Some(mcu) = self.mcu else {
            return Err(match self.unknown_idcode {
                Some(idcode) => SwdError::UnknownTarget(idcode.data()),
                None => SwdError::NotReady,
            });
        };
        match self.algorithm {
            Some(algorithm) => Ok((mcu, algorithm)),
            None => {
                warn!("Flash operations on {} are not supported", mcu.family());
                Err(SwdError::Unsupported)
            }
        }
    }

    /// Halts the target core.
    pub fn halt_core(&mut self) -> Result<(), SwdError> {
        self.debug.halt_core()
    }

    /// Lets the core run.  Flash state is unaffected.
    pub fn run_core(&mut self) -> Result<(), SwdError> {
        self.debug.run_core()
    }

    /// Resets the target system, leaving the core halted at its reset
    /// vector.  The flash controller relocks on reset.
    pub fn reset_system(&mut self) -> Result<(), SwdError> {
        self.unlocked = false;
        self.debug.reset_system()
    }

    /// Pulses nRST and reconnects.  The flash controller relocks on reset.
    pub fn hardware_reset(&mut self) -> Result<(), SwdError> {
        self.unlocked = false;
        self.debug.hardware_reset().map(|_| ())
    }

    /// Unlocks the flash controller.
    ///
    /// Reads CR first: if it is already unlocked no keys are written.
    ///
    /// Returns:
    /// - `Ok(())`: the flash is unlocked.
    /// - `Err(SwdError::FlashLocked)`: the lock bit stayed set after the key
    ///   sequence.
    pub fn unlock(&mut self) -> Result<(), SwdError> {
        let (_, algorithm) = self.target()?;
        self.unlocked = false;
        if algorithm.unlock(&mut self.debug)? {
            debug!("Flash unlocked");
        }
        self.unlocked = true;
        Ok(())
    }

    /// Sets the flash controller's lock bit.
    pub fn lock(&mut self) -> Result<(), SwdError> {
        let (_, algorithm) = self.target()?;
        self.unlocked = false;
        algorithm.lock(&mut self.debug)
    }

    // Halts and unlocks ahead of any erase or program.  The lock bit is
    // read every time, whatever the session believes.
    fn prepare(&mut self) -> Result<(McuInfo, FlashAlgorithm), SwdError> {
        let target = self.target()?;
        self.debug.halt_core()?;
        self.unlock()?;
        Ok(target)
    }

    fn check_range(mcu: &McuInfo, addr: u32, len: usize) -> Result<(), SwdError> {
        if mcu.contains_flash_range(addr, len.max(1)) {
            Ok(())
        } else {
            warn!("0x{addr:08X} length {len} is outside {} flash", mcu.name());
            Err(SwdError::BadAddress(addr))
        }
    }

    /// Erases the F1 page containing `addr`.
    ///
    /// Returns `Err(SwdError::Unsupported)` on sector-erased families; use
    /// [`Self::erase_sector()`] there.
    pub fn erase_page(&mut self, addr: u32) -> Result<(), SwdError> {
        let (mcu, algorithm) = self.target()?;
        if algorithm != FlashAlgorithm::F1 {
            warn!("{} flash is not page erased", mcu.family());
            return Err(SwdError::Unsupported);
        }
        Self::check_range(&mcu, addr, 1)?;
        let page_addr = addr - (addr - mcu.flash_base()) % mcu.page_size();

        self.prepare()?;
        f1::erase_page(&mut self.debug, page_addr)
    }

    /// Erases F4 sector `sector`.
    ///
    /// Returns `Err(SwdError::BadAddress)` if the device has no such sector,
    /// and `Err(SwdError::Unsupported)` on page-erased families.
    pub fn erase_sector(&mut self, sector: u8) -> Result<(), SwdError> {
        let (mcu, algorithm) = self.target()?;
        if algorithm != FlashAlgorithm::F4 {
            warn!("{} flash is not sector erased", mcu.family());
            return Err(SwdError::Unsupported);
        }
        if sector > stm::STM32F4_MAX_SECTOR
            || stm::sector_range(mcu.family(), mcu.flash_size_kb(), sector).is_none()
        {
            warn!("No sector {sector} on {mcu}");
            return Err(SwdError::BadAddress(sector as u32));
        }

        self.prepare()?;
        f4::erase_sector(&mut self.debug, sector)
    }

    /// Mass erases main flash.
    pub fn erase_all(&mut self) -> Result<(), SwdError> {
        let (_, algorithm) = self.prepare()?;
        algorithm.erase_all(&mut self.debug)
    }

    /// Erases every page or sector overlapping `addr..addr + len`.
    pub fn erase_range(&mut self, addr: u32, len: usize) -> Result<(), SwdError> {
        let (mcu, algorithm) = self.target()?;
        if len == 0 {
            return Ok(());
        }
        Self::check_range(&mcu, addr, len)?;
        let last = addr + (len as u32 - 1);

        self.prepare()?;
        match algorithm {
            FlashAlgorithm::F1 => {
                let page_size = mcu.page_size();
                let mut page_addr = addr - (addr - mcu.flash_base()) % page_size;
                while page_addr <= last {
                    f1::erase_page(&mut self.debug, page_addr)?;
                    page_addr += page_size;
                }
            }
            FlashAlgorithm::F4 => {
                let sector_of = |addr| {
                    stm::sector_for_address(mcu.family(), mcu.flash_size_kb(), addr)
                        .ok_or(SwdError::BadAddress(addr))
                };
                let (first, last) = (sector_of(addr)?, sector_of(last)?);
                for sector in first..=last {
                    f4::erase_sector(&mut self.debug, sector)?;
                }
            }
        }
        debug!("Erased 0x{addr:08X} length {len}");
        Ok(())
    }

    /// Programs a single half-word.  F1 only.
    pub fn write_half_word(&mut self, addr: u32, data: u16) -> Result<(), SwdError> {
        self.write_single(FlashAlgorithm::F1, addr, &data.to_le_bytes())
    }

    /// Programs a single word.  F4 only.
    pub fn write_word(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        self.write_single(FlashAlgorithm::F4, addr, &data.to_le_bytes())
    }

    fn write_single(
        &mut self,
        required: FlashAlgorithm,
        addr: u32,
        unit: &[u8],
    ) -> Result<(), SwdError> {
        let (mcu, algorithm) = self.target()?;
        if algorithm != required {
            warn!("{} flash is not programmed {} bytes at a time", mcu.family(), unit.len());
            return Err(SwdError::Unsupported);
        }
        self.write_buffer(addr, unit)
    }

    /// Programs `data` at `addr`, in half-words on F1 and words on F4.  A
    /// trailing partial unit is padded with 0xFF.
    ///
    /// The core is halted and the flash unlocked first.  The range must
    /// have been erased.
    ///
    /// Returns:
    /// - `Ok(())`: all of `data` was programmed.
    /// - `Err(SwdError)`: the first failure.  Flash before the failing unit
    ///   has been programmed, and the rest has not.
    pub fn write_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), SwdError> {
        let (mcu, algorithm) = self.target()?;
        let unit_size = algorithm.unit_size();
        if addr as usize % unit_size != 0 {
            warn!("0x{addr:08X} is not aligned to {unit_size} bytes");
            return Err(SwdError::BadAddress(addr));
        }
        Self::check_range(&mcu, addr, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        self.prepare()?;
        debug!("Programming {} bytes at 0x{addr:08X}", data.len());
        let mut unit_addr = addr;
        for chunk in data.chunks(unit_size) {
            algorithm
                .program_unit(&mut self.debug, unit_addr, chunk)
                .inspect_err(|e| warn!("Program failed at 0x{unit_addr:08X}: {e}"))?;
            unit_addr += unit_size as u32;
        }
        Ok(())
    }

    /// Reads back `data.len()` bytes from `addr` and compares them with
    /// `data`.
    ///
    /// Returns:
    /// - `Ok(())`: every byte matches.
    /// - `Err(SwdError::VerifyMismatch)`: the first differing byte.
    /// - `Err(SwdError::BadAddress)`: the range runs past the end of the
    ///   address space.
    /// - `Err(SwdError)`: a read failed.
    pub fn verify_buffer(&mut self, addr: u32, data: &[u8]) -> Result<(), SwdError> {
        let last = u32::try_from(data.len())
            .ok()
            .and_then(|len| addr.checked_add(len.saturating_sub(1)));
        if last.is_none() {
            warn!("0x{addr:08X} length {} wraps the address space", data.len());
            return Err(SwdError::BadAddress(addr));
        }

        let mut offset = 0;
        while offset < data.len() {
            let byte_addr = addr + offset as u32;
            let word = self.debug.read_mem(byte_addr & !0b11)?.to_le_bytes();
            for &actual in &word[(byte_addr & 0b11) as usize..] {
                let Some(&expected) = data.get(offset) else {
                    break;
                };
                if actual != expected {
                    let addr = addr + offset as u32;
                    warn!("Verify failed at 0x{addr:08X}: expected 0x{expected:02X}, read 0x{actual:02X}");
                    return Err(SwdError::VerifyMismatch {
                        addr,
                        expected,
                        actual,
                    });
                }
                offset += 1;
            }
        }
        debug!("Verified {} bytes at 0x{addr:08X}", data.len());
        Ok(())
    }

    /// Erases as `erase` asks, programs `data` at `addr`, verifies it and
    /// locks the flash.
    pub fn program(&mut self, addr: u32, data: &[u8], erase: EraseMode) -> Result<(), SwdError> {
        let (mcu, _) = self.target()?;
        info!("Programming {} bytes at 0x{addr:08X} on {mcu}, erase {erase:?}", data.len());

        match erase {
            EraseMode::None => (),
            EraseMode::Range => self.erase_range(addr, data.len())?,
            EraseMode::All => self.erase_all()?,
        }
        self.write_buffer(addr, data)?;
        self.verify_buffer(addr, data)?;
        self.lock()?;

        info!("Programmed and verified {} bytes", data.len());
        Ok(())
    }
}

impl<T, C> fmt::Debug for FlashProgrammer<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashProgrammer")
            .field("mcu", &self.mcu)
            .field("algorithm", &self.algorithm)
            .field("unlocked", &self.unlocked)
            .finish()
    }
}
