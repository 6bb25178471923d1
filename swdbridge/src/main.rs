// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge - STM32 programming firmware
//!
//! Connects to an STM32 over SWD, identifies it and, if an image was built
//! in, erases, programs and verifies it.  Then waits for the target to be
//! removed before looking for the next one.
//!
//! To embed an image, set `SWDBRIDGE_IMAGE` to the path of a raw binary when
//! building.  Without one the firmware only identifies targets.
//!
//! Wiring:
//! - GPIO0: SWDIO
//! - GPIO1: SWCLK
//! - GPIO2: nRST (optional, open drain)
//!
//! Other configuration is in `config.rs`.

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

extern crate alloc;
use embassy_executor::Spawner;
use embassy_time::Timer;
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdbridge_swd::{FlashProgrammer, SwdError, SwdProtocol};

mod config;
mod hal;

use hal::{FlexSwdio, SysTimer};

include!(concat!(env!("OUT_DIR"), "/built.rs"));
pub const SWDBRIDGE_BUILD_TIME: &str = env!("SWDBRIDGE_BUILD_TIME");
pub const SWDBRIDGE_BUILD_DATE: &str = env!("SWDBRIDGE_BUILD_DATE");

// App descriptor for the esp-idf bootloader, carrying our own build time and
// date rather than esp-bootloader-esp-idf's.
esp_bootloader_esp_idf::esp_app_desc!(
    PKG_VERSION,
    PKG_NAME,
    SWDBRIDGE_BUILD_TIME,
    SWDBRIDGE_BUILD_DATE,
    esp_bootloader_esp_idf::ESP_IDF_COMPATIBLE_VERSION,
    esp_bootloader_esp_idf::MMU_PAGE_SIZE,
    0,
    u16::MAX
);

static IMAGE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/image.bin"));

type Programmer<'d> =
    FlashProgrammer<SwdProtocol<FlexSwdio<'d>, Output<'d>, Delay, Output<'d>>, SysTimer>;

// swdbridge's main function.
//
// - Set up the HAL and heap
// - Set up the SWD link and flash programmer
// - Loop forever, programming each target attached in turn
#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) -> ! {
    // Set up the logger
    esp_println::logger::init_logger_from_env();

    info!("*** swdbridge v{PKG_VERSION} built {SWDBRIDGE_BUILD_DATE} {SWDBRIDGE_BUILD_TIME} ***");

    // Set up the HAL
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    let clocks = esp_hal::clock::Clocks::get();
    info!(
        "Value: {} running at {}MHz",
        esp_hal::chip!(),
        clocks.cpu_clock.as_mhz()
    );

    // Set up the heap allocator
    esp_alloc::heap_allocator!(size: config::HEAP_SIZE);

    // Initialize embassy
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    // Set up the SWD link
    let swd_config = config::swd_config();
    let swdio = FlexSwdio::new(peripherals.GPIO0);
    let swclk = hal::swclk(peripherals.GPIO1);
    let nrst = hal::nrst(peripherals.GPIO2);
    let mut swd =
        SwdProtocol::new(swdio, swclk, Delay::new(), &swd_config).with_reset_pin(nrst);
    swd.init();

    let mut programmer = FlashProgrammer::new(
        swd,
        SysTimer::new(),
        &swd_config,
        config::flash_timeouts(),
    );

    if IMAGE.is_empty() {
        info!("No image built in, identifying targets only");
    } else {
        info!(
            "Image: {} bytes for 0x{:08X}",
            IMAGE.len(),
            config::IMAGE_ADDRESS
        );
    }

    loop {
        match session(&mut programmer) {
            Ok(()) => {
                wait_for_removal(&mut programmer).await;
                info!("Target removed");
            }
            Err(e) => {
                debug!("No target: {e}");
                // Recover SWDIO direction in case the session died mid-transaction
                programmer.transport_mut().init();
                Timer::after(config::CONNECT_RETRY_INTERVAL).await;
            }
        }
    }
}

// One programming session against whatever is attached.  A target that was
// found but failed to program is reported, and counts as handled.
fn session(programmer: &mut Programmer<'_>) -> Result<(), SwdError> {
    let mcu = programmer.init()?;
    info!("Found {mcu}");

    if IMAGE.is_empty() {
        return programmer.deinit();
    }

    let result = programmer
        .program(config::IMAGE_ADDRESS, IMAGE, config::IMAGE_ERASE)
        .and_then(|_| programmer.reset_system())
        .and_then(|_| programmer.run_core());
    match &result {
        Ok(()) => info!("Ok:    {mcu} programmed"),
        Err(e) => error!("Error: programming {mcu} failed: {e}"),
    }

    if let Err(e) = programmer.deinit() {
        warn!("Failed to lock flash: {e}");
    }

    match result {
        Err(e) if e.is_protocol_error() => Err(e),
        _ => Ok(()),
    }
}

// Polls the target's IDCODE until it stops answering.
async fn wait_for_removal(programmer: &mut Programmer<'_>) {
    loop {
        Timer::after(config::ATTACHED_POLL_INTERVAL).await;
        match programmer.debug_mut().connect() {
            Ok(idcode) => trace!("Target still attached, IDCODE {idcode}"),
            Err(e) => {
                debug!("Target gone: {e}");
                return;
            }
        }
    }
}
