// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Link and timeout configuration
//!
//! Both structs follow the builder style used by `esp-hal`'s `Config`:
//!
//! ```rust
//! use swdbridge_swd::{FlashTimeouts, SwdConfig};
//!
//! let swd = SwdConfig::default().with_clock_delay_us(1).with_wait_retries(16);
//! let timeouts = FlashTimeouts::default().with_mass_erase_ms(60_000);
//! ```

use serde::{Deserialize, Serialize};
use swdbridge_core::stm::StmFamily;

/// SWD link configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwdConfig {
    /// Half of the SWCLK period, in microseconds.  The clock runs at
    /// roughly `1 / (2 * clock_delay_us)` MHz.
    pub clock_delay_us: u32,

    /// How many times a transaction answered with WAIT is re-issued before
    /// [`crate::SwdError::WaitAck`] is returned.  0 surfaces the first WAIT.
    pub wait_retries: u32,

    /// Whether read data parity is checked.  A mismatch is reported as
    /// [`crate::SwdError::ReadParity`].
    pub check_read_parity: bool,
}

impl SwdConfig {
    pub const DEFAULT_CLOCK_DELAY_US: u32 = 2;
    pub const DEFAULT_WAIT_RETRIES: u32 = 8;

    pub fn with_clock_delay_us(mut self, clock_delay_us: u32) -> Self {
        self.clock_delay_us = clock_delay_us;
        self
    }

    pub fn with_wait_retries(mut self, wait_retries: u32) -> Self {
        self.wait_retries = wait_retries;
        self
    }

    pub fn with_check_read_parity(mut self, check: bool) -> Self {
        self.check_read_parity = check;
        self
    }
}

impl Default for SwdConfig {
    fn default() -> Self {
        Self {
            clock_delay_us: Self::DEFAULT_CLOCK_DELAY_US,
            wait_retries: Self::DEFAULT_WAIT_RETRIES,
            check_read_parity: true,
        }
    }
}

/// Bounds, in milliseconds, for every polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashTimeouts {
    /// Waiting for S_HALT after a halt request
    pub halt_ms: u32,

    /// Fixed wait after requesting a system reset, before polling
    pub reset_settle_ms: u32,

    /// Waiting for S_RESET_ST after the settle delay
    pub reset_ms: u32,

    /// Waiting for busy to clear around a single half-word or word program
    pub program_ms: u32,

    /// Single page or sector erase
    pub page_erase_ms: u32,

    /// Mass erase.  `None` uses the family default, see
    /// [`FlashTimeouts::mass_erase_ms_for`].
    pub mass_erase_ms: Option<u32>,
}

impl FlashTimeouts {
    pub const F1_MASS_ERASE_MS: u32 = 40_000;
    pub const F4_MASS_ERASE_MS: u32 = 30_000;

    pub fn with_halt_ms(mut self, ms: u32) -> Self {
        self.halt_ms = ms;
        self
    }

    pub fn with_reset_settle_ms(mut self, ms: u32) -> Self {
        self.reset_settle_ms = ms;
        self
    }

    pub fn with_reset_ms(mut self, ms: u32) -> Self {
        self.reset_ms = ms;
        self
    }

    pub fn with_program_ms(mut self, ms: u32) -> Self {
        self.program_ms = ms;
        self
    }

    pub fn with_page_erase_ms(mut self, ms: u32) -> Self {
        self.page_erase_ms = ms;
        self
    }

    pub fn with_mass_erase_ms(mut self, ms: u32) -> Self {
        self.mass_erase_ms = Some(ms);
        self
    }

    /// Mass erase bound for `family`, honouring an explicit override.
    pub fn mass_erase_ms_for(&self, family: StmFamily) -> u32 {
        match (self.mass_erase_ms, family) {
            (Some(ms), _) => ms,
            (None, StmFamily::F1) => Self::F1_MASS_ERASE_MS,
            (None, _) => Self::F4_MASS_ERASE_MS,
        }
    }
}

impl Default for FlashTimeouts {
    fn default() -> Self {
        Self {
            halt_ms: 1000,
            reset_settle_ms: 100,
            reset_ms: 2000,
            program_ms: 100,
            page_erase_ms: 5000,
            mass_erase_ms: None,
        }
    }
}
