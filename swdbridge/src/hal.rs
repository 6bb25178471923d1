// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge - ESP32-C3 bindings for the SWD stack

use esp_hal::delay::Delay;
use esp_hal::gpio::{
    DriveMode, DriveStrength, Flex, InputConfig, InputPin, Level, Output, OutputConfig, OutputPin,
    Pull,
};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdbridge_swd::{SwdioPin, Timer};

/// SWDIO on a flexible GPIO
pub struct FlexSwdio<'d> {
    pin: Flex<'d>,
}

impl<'d> FlexSwdio<'d> {
    /// Starts SWDIO as input.  We do not set a pull - it is the target's
    /// responsibility to pull SWDIO high, and it may not do so until it has
    /// seen the JTAG-to-SWD sequence.
    pub fn new(pin: impl InputPin + OutputPin + 'd) -> Self {
        let mut pin = Flex::new(pin);
        pin.apply_input_config(&InputConfig::default().with_pull(Pull::None));
        pin.apply_output_config(&output_config());
        pin.set_input_enable(true);
        Self { pin }
    }
}

impl SwdioPin for FlexSwdio<'_> {
    #[inline]
    fn set_output(&mut self) {
        self.pin.set_input_enable(false);
        self.pin.set_output_enable(true);
    }

    #[inline]
    fn set_input(&mut self) {
        self.pin.set_output_enable(false);
        self.pin.set_input_enable(true);
    }

    #[inline]
    fn set_level(&mut self, high: bool) {
        self.pin.set_level(if high { Level::High } else { Level::Low });
    }

    #[inline]
    fn is_high(&mut self) -> bool {
        self.pin.is_high()
    }
}

/// SWCLK, initially low
pub fn swclk<'d>(pin: impl OutputPin + 'd) -> Output<'d> {
    Output::new(pin, Level::Low, output_config())
}

/// nRST, initially released.  Open drain, as the target has its own pull-up
/// and may share the line with a reset button.
pub fn nrst<'d>(pin: impl OutputPin + 'd) -> Output<'d> {
    let config = OutputConfig::default()
        .with_drive_mode(DriveMode::OpenDrain)
        .with_pull(Pull::None);
    Output::new(pin, Level::High, config)
}

fn output_config() -> OutputConfig {
    OutputConfig::default()
        .with_drive_strength(DriveStrength::_20mA)
        .with_drive_mode(DriveMode::PushPull)
}

/// Millisecond clock for the flash programmer's polls, from the embassy time
/// driver.  Delays busy-wait, so an SWD session blocks the executor for its
/// duration.
#[derive(Clone, Copy)]
pub struct SysTimer {
    delay: Delay,
}

impl SysTimer {
    pub fn new() -> Self {
        Self {
            delay: Delay::new(),
        }
    }
}

impl Default for SysTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for SysTimer {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_millis(ms);
    }
}
