// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F4 flash: sector erase and word programming, x32 parallelism

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdbridge_core::stm::{Stm32F4FlashCr, Stm32F4FlashSr, StmFamily};

use super::FlashAlgorithm;
use crate::debug::DebugInterface;
use crate::protocol::SwdTransport;
use crate::{SwdError, Timer};

const ALGORITHM: FlashAlgorithm = FlashAlgorithm::F4;

const SNB_FIELD: u32 = Stm32F4FlashCr::SNB_MASK << Stm32F4FlashCr::SNB_SHIFT;

/// Erases sector `sector`.  The caller has checked it exists on this
/// device.
pub(super) fn erase_sector<T, C>(
    debug: &mut DebugInterface<T, C>,
    sector: u8,
) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    debug!("Erasing STM32F4 flash sector {sector}");
    let timeout_ms = debug.timeouts().page_erase_ms;
    ALGORITHM.wait_ready(debug, timeout_ms)?;
    ALGORITHM.clear_status(debug)?;

    let mut flash_cr = debug.read_mem(Stm32F4FlashCr::ADDRESS)?;
    flash_cr &= !(SNB_FIELD | Stm32F4FlashCr::PSIZE_MASK);
    flash_cr |= Stm32F4FlashCr::SER | Stm32F4FlashCr::snb(sector) | Stm32F4FlashCr::PSIZE_X32;
    debug.write_mem(Stm32F4FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem(Stm32F4FlashCr::ADDRESS, flash_cr | Stm32F4FlashCr::STRT)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM.finish(
        debug,
        result,
        Stm32F4FlashCr::SER | SNB_FIELD | Stm32F4FlashCr::PSIZE_MASK | Stm32F4FlashCr::STRT,
    )
}

/// Erases all of main flash.
pub(super) fn erase_all<T, C>(debug: &mut DebugInterface<T, C>) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    debug!("Erasing all STM32F4 flash");
    let timeout_ms = debug.timeouts().mass_erase_ms_for(StmFamily::F4);
    ALGORITHM.wait_ready(debug, timeout_ms)?;
    ALGORITHM.clear_status(debug)?;

    let mut flash_cr = debug.read_mem(Stm32F4FlashCr::ADDRESS)?;
    flash_cr &= !Stm32F4FlashCr::PSIZE_MASK;
    flash_cr |= Stm32F4FlashCr::MER | Stm32F4FlashCr::PSIZE_X32;
    debug.write_mem(Stm32F4FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem(Stm32F4FlashCr::ADDRESS, flash_cr | Stm32F4FlashCr::STRT)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM.finish(
        debug,
        result,
        Stm32F4FlashCr::MER | Stm32F4FlashCr::PSIZE_MASK | Stm32F4FlashCr::STRT,
    )
}

/// Programs one word.  The flash must be unlocked and the target halted.
pub(super) fn program_word<T, C>(
    debug: &mut DebugInterface<T, C>,
    addr: u32,
    data: u32,
) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    let timeout_ms = debug.timeouts().program_ms;
    ALGORITHM.wait_ready(debug, timeout_ms)?;

    // Stale EOP and error flags from an earlier operation
    debug.write_mem(Stm32F4FlashSr::ADDRESS, Stm32F4FlashSr::CLEAR_MASK)?;

    let mut flash_cr = debug.read_mem(Stm32F4FlashCr::ADDRESS)?;
    flash_cr &= !Stm32F4FlashCr::PSIZE_MASK;
    flash_cr |= Stm32F4FlashCr::PG | Stm32F4FlashCr::PSIZE_X32;
    debug.write_mem(Stm32F4FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem(addr, data)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM
        .finish(debug, result, Stm32F4FlashCr::PG | Stm32F4FlashCr::PSIZE_MASK)
        .inspect(|_| trace!("OK:    0x{addr:08X} = 0x{data:08X}"))
}
