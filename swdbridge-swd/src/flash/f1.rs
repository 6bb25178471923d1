// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F1 flash: page erase and half-word programming

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdbridge_core::stm::{Stm32F1FlashAr, Stm32F1FlashCr, StmFamily};

use super::FlashAlgorithm;
use crate::debug::DebugInterface;
use crate::protocol::SwdTransport;
use crate::{SwdError, Timer};

const ALGORITHM: FlashAlgorithm = FlashAlgorithm::F1;

/// Erases the page starting at `page_addr`.
pub(super) fn erase_page<T, C>(
    debug: &mut DebugInterface<T, C>,
    page_addr: u32,
) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    debug!("Erasing STM32F1 flash page 0x{page_addr:08X}");
    let timeout_ms = debug.timeouts().page_erase_ms;
    ALGORITHM.wait_ready(debug, timeout_ms)?;
    ALGORITHM.clear_status(debug)?;

    let flash_cr = debug.read_mem(Stm32F1FlashCr::ADDRESS)? | Stm32F1FlashCr::PER;
    debug.write_mem(Stm32F1FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem(Stm32F1FlashAr::ADDRESS, page_addr)?;
    debug.write_mem(Stm32F1FlashCr::ADDRESS, flash_cr | Stm32F1FlashCr::STRT)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM.finish(debug, result, Stm32F1FlashCr::PER | Stm32F1FlashCr::STRT)
}

/// Erases all of main flash.
pub(super) fn erase_all<T, C>(debug: &mut DebugInterface<T, C>) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    debug!("Erasing all STM32F1 flash");
    let timeout_ms = debug.timeouts().mass_erase_ms_for(StmFamily::F1);
    ALGORITHM.wait_ready(debug, timeout_ms)?;
    ALGORITHM.clear_status(debug)?;

    let flash_cr = debug.read_mem(Stm32F1FlashCr::ADDRESS)? | Stm32F1FlashCr::MER;
    debug.write_mem(Stm32F1FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem(Stm32F1FlashCr::ADDRESS, flash_cr | Stm32F1FlashCr::STRT)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM.finish(debug, result, Stm32F1FlashCr::MER | Stm32F1FlashCr::STRT)
}

/// Programs one half-word.  The flash must be unlocked and the target
/// halted.
pub(super) fn program_half_word<T, C>(
    debug: &mut DebugInterface<T, C>,
    addr: u32,
    data: u16,
) -> Result<(), SwdError>
where
    T: SwdTransport,
    C: Timer,
{
    let timeout_ms = debug.timeouts().program_ms;
    ALGORITHM.wait_ready(debug, timeout_ms)?;
    ALGORITHM.clear_status(debug)?;

    let flash_cr = debug.read_mem(Stm32F1FlashCr::ADDRESS)? | Stm32F1FlashCr::PG;
    debug.write_mem(Stm32F1FlashCr::ADDRESS, flash_cr)?;
    debug.write_mem_u16(addr, data)?;

    let result = ALGORITHM.wait_complete(debug, timeout_ms);
    ALGORITHM
        .finish(debug, result, Stm32F1FlashCr::PG)
        .inspect(|_| trace!("OK:    0x{addr:08X} = 0x{data:04X}"))
}
