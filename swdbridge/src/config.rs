// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge - Firmware configuration
//!
//! Pin assignments are in `main.rs`, where the peripherals are taken:
//! SWDIO GPIO0, SWCLK GPIO1, nRST GPIO2.

use embassy_time::Duration;
use swdbridge_swd::{EraseMode, FlashTimeouts, SwdConfig};

// Heap size for the application.
pub const HEAP_SIZE: usize = 32 * 1024;

/// Where the image is programmed
pub const IMAGE_ADDRESS: u32 = 0x0800_0000;

/// How the image's flash is erased first
pub const IMAGE_ERASE: EraseMode = EraseMode::Range;

/// Time between attempts to find a target
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Time between checks that a programmed target is still attached
pub const ATTACHED_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Half-bit delay 1us, about 500kHz SWCLK with an ESP32-C3 at 160MHz.
pub fn swd_config() -> SwdConfig {
    SwdConfig::default().with_clock_delay_us(1)
}

pub fn flash_timeouts() -> FlashTimeouts {
    FlashTimeouts::default()
}
