// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol Implementation
//!
//! [`SwdProtocol`] bit-bangs the SWD wire protocol over a bidirectional
//! SWDIO pin and an SWCLK output, with an optional nRST output.  It
//! implements [`SwdTransport`], the transaction-level interface everything
//! above it is written against.

use core::convert::Infallible;
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{SwdConfig, SwdError};

// JTAG-to-SWD sequence as documented: 0111100111100111
const JTAG_TO_SWD_DOCUMENTED: u16 = 0b0111100111100111; // 0x79E7

// Reversed for SWD LSB-first transmission
const JTAG_TO_SWD_SEQUENCE: u16 = JTAG_TO_SWD_DOCUMENTED.reverse_bits(); // 0xE79E

// Idle cycles, SWDIO low, following the JTAG-to-SWD sequence
const JTAG_TO_SWD_IDLE_CYCLES: u32 = 8;

// 50+ clock cycles with SWDIO high
const LINE_RESET_SWDIO_HIGH_CYCLES: u32 = 51;

// nRST low pulse, and the time allowed for the target to come out of reset
const HARDWARE_RESET_PULSE_MS: u32 = 1;
const HARDWARE_RESET_RECOVERY_MS: u32 = 1;

/// A bidirectional GPIO usable as SWDIO.
///
/// Direction changes must take effect immediately: the transport switches
/// direction between the request, ACK and data phases of every transaction.
/// The pin is expected to have been configured (drive strength, pulls) by
/// the caller before being handed over.
pub trait SwdioPin {
    /// Drive the pin, at whatever level was last set.
    fn set_output(&mut self);

    /// Release the pin to high impedance so the target can drive it.
    fn set_input(&mut self);

    /// Set the driven level.
    fn set_level(&mut self, high: bool);

    /// Sample the pin.
    fn is_high(&mut self) -> bool;
}

/// Stands in for the nRST pin when none is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetPin;

impl ErrorType for NoResetPin {
    type Error = Infallible;
}

impl OutputPin for NoResetPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single SWD transaction request: which port, which direction, and the
/// register's address within the port (0x0, 0x4, 0x8 or 0xC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    /// Encodes the 8-bit request header, parity included.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_cmd(&self) -> u8 {
        // SWD cmd: [start][APnDP][RnW][A2][A3][parity][stop][park]
        let (base, addr) = match self {
            // start=1, APnDP=0, RnW=1, park=1
            SwdOp::DpRead(a) => (0x85, a),
            // start=1, APnDP=0, RnW=0, park=1
            SwdOp::DpWrite(a) => (0x81, a),
            // start=1, APnDP=1, RnW=1, park=1
            SwdOp::ApRead(a) => (0x87, a),
            // start=1, APnDP=1, RnW=0, park=1
            SwdOp::ApWrite(a) => (0x83, a),
        };

        let cmd = base | ((addr & 0x0C) << 1); // A[3:2] to bits 4:3
        Self::add_parity(cmd)
    }

    fn add_parity(cmd: u8) -> u8 {
        // Parity covers APnDP, RnW and A[3:2], bits 1 to 4
        let parity = calculate_parity(cmd & 0x1E) as u8;
        cmd | (parity << 5)
    }

    pub fn is_read(&self) -> bool {
        matches!(self, SwdOp::DpRead(_) | SwdOp::ApRead(_))
    }

    pub fn is_ap(&self) -> bool {
        matches!(self, SwdOp::ApRead(_) | SwdOp::ApWrite(_))
    }

    pub fn addr(&self) -> u8 {
        match self {
            SwdOp::DpRead(a) | SwdOp::DpWrite(a) | SwdOp::ApRead(a) | SwdOp::ApWrite(a) => *a,
        }
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            SwdOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            SwdOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            SwdOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

/// Transaction-level access to an SWD link.
///
/// [`SwdProtocol`] is the bit-banged implementation.  [`crate::SwdInterface`]
/// and everything above it only use this trait.
#[cfg_attr(test, mockall::automock)]
pub trait SwdTransport {
    /// Performs one transaction.
    ///
    /// For a write `data` is sent and returned.  For a read `data` is ignored
    /// and the value read returned.  A non-OK ACK is returned as the
    /// matching [`SwdError`] without a data phase; no retry happens here.
    fn transfer(&mut self, op: SwdOp, data: u32) -> Result<u32, SwdError>;

    /// 50+ clocks with SWDIO high, returning the DP to its reset state.
    fn line_reset(&mut self);

    /// The JTAG-to-SWD switch sequence followed by idle clocks.
    fn jtag_to_swd(&mut self);

    /// `cycles` clocks with SWDIO low.
    fn idle(&mut self, cycles: u32);

    /// Pulses nRST, then line resets.
    fn hardware_reset(&mut self) -> Result<(), SwdError>;
}

/// SWD link handle.
///
/// Owns the SWDIO, SWCLK and optional nRST pins exclusively for its lifetime,
/// along with the delay source used for bit timing.  SWCLK idles low; each
/// bit is one pulse of `clock_delay_us` high then `clock_delay_us` low.
///
/// ```rust,ignore
/// let swd = SwdProtocol::new(swdio, swclk, delay, &SwdConfig::default())
///     .with_reset_pin(nrst);
/// ```
pub struct SwdProtocol<IO, CLK, D, RST = NoResetPin> {
    swdio: IO,
    swclk: CLK,
    nrst: Option<RST>,
    delay: D,
    clock_delay_us: u32,
    check_read_parity: bool,
    initialized: bool,
}

impl<IO, CLK, D> SwdProtocol<IO, CLK, D, NoResetPin>
where
    IO: SwdioPin,
    CLK: OutputPin,
    D: DelayNs,
{
    /// Creates the link handle.  Pins are not touched until [`Self::init`].
    pub fn new(swdio: IO, swclk: CLK, delay: D, config: &SwdConfig) -> Self {
        Self {
            swdio,
            swclk,
            nrst: None,
            delay,
            clock_delay_us: config.clock_delay_us,
            check_read_parity: config.check_read_parity,
            initialized: false,
        }
    }

    /// Adds a hardware reset (nRST) pin.
    pub fn with_reset_pin<RST: OutputPin>(self, nrst: RST) -> SwdProtocol<IO, CLK, D, RST> {
        SwdProtocol {
            swdio: self.swdio,
            swclk: self.swclk,
            nrst: Some(nrst),
            delay: self.delay,
            clock_delay_us: self.clock_delay_us,
            check_read_parity: self.check_read_parity,
            initialized: self.initialized,
        }
    }
}

impl<IO, CLK, D, RST> SwdProtocol<IO, CLK, D, RST>
where
    IO: SwdioPin,
    CLK: OutputPin,
    D: DelayNs,
    RST: OutputPin,
{
    /// Puts the pins into their idle state: SWCLK low, SWDIO driven high,
    /// nRST released high.  Safe to call again to recover pin direction.
    pub fn init(&mut self) {
        self.swclk.set_low().ok();
        self.swdio.set_level(true);
        self.swdio.set_output();
        if let Some(nrst) = self.nrst.as_mut() {
            nrst.set_high().ok();
        }
        self.initialized = true;
        debug!("SWD link initialized, clock delay {}us", self.clock_delay_us);
    }

    /// Releases SWDIO to input and leaves SWCLK low.
    pub fn deinit(&mut self) {
        self.swdio.set_input();
        self.swclk.set_low().ok();
        self.initialized = false;
        debug!("SWD link released");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn clock_delay_us(&self) -> u32 {
        self.clock_delay_us
    }

    pub fn set_clock_delay_us(&mut self, clock_delay_us: u32) {
        self.clock_delay_us = clock_delay_us;
    }

    pub fn set_check_read_parity(&mut self, check: bool) {
        self.check_read_parity = check;
    }

    /// One SWCLK pulse: high, wait, low, wait.
    #[inline]
    fn clock_pulse(&mut self) {
        self.swclk.set_high().ok();
        self.delay.delay_us(self.clock_delay_us);
        self.swclk.set_low().ok();
        self.delay.delay_us(self.clock_delay_us);
    }

    /// Drives SWDIO to `bit`, then clocks it out.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.swdio.set_level(bit);
        self.clock_pulse();
    }

    /// Samples SWDIO, then clocks.
    #[inline]
    pub fn read_bit(&mut self) -> bool {
        let bit = self.swdio.is_high();
        self.clock_pulse();
        bit
    }

    /// Eight bits, least significant first.
    pub fn write_byte(&mut self, byte: u8) {
        self.write_bits(8, byte as u64);
    }

    /// Eight bits, least significant first.
    pub fn read_byte(&mut self) -> u8 {
        self.read_bits(8) as u8
    }

    #[inline]
    fn write_bits(&mut self, count: usize, data: u64) {
        let mut data = data;
        for _ in 0..count {
            self.write_bit(data & 1 == 1);
            data >>= 1;
        }
    }

    #[inline]
    fn read_bits(&mut self, count: usize) -> u64 {
        let mut data = 0u64;
        for ii in 0..count {
            if self.read_bit() {
                data |= 1 << ii;
            }
        }
        data
    }

    /// Clocks `cycles` times without changing SWDIO.
    pub fn clock(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.clock_pulse();
        }
    }

    // Turnaround: one cycle in which neither side drives SWDIO
    #[inline]
    fn turnaround_to_input(&mut self) {
        self.swdio.set_input();
        self.clock_pulse();
    }

    #[inline]
    fn turnaround_to_output(&mut self) {
        self.clock_pulse();
        self.swdio.set_level(false);
        self.swdio.set_output();
    }

    // Leave SWDIO low after a trailing idle clock
    #[inline]
    fn park(&mut self) {
        self.write_bit(false);
    }

    fn read_ack(&mut self) -> Result<(), SwdError> {
        let ack = self.read_bits(3) as u8;
        SwdError::from_ack(ack)
    }
}

impl<IO, CLK, D, RST> SwdTransport for SwdProtocol<IO, CLK, D, RST>
where
    IO: SwdioPin,
    CLK: OutputPin,
    D: DelayNs,
    RST: OutputPin,
{
    fn transfer(&mut self, op: SwdOp, data: u32) -> Result<u32, SwdError> {
        let cmd = op.to_cmd();

        self.swdio.set_output();
        self.write_byte(cmd);
        self.turnaround_to_input();

        if let Err(e) = self.read_ack() {
            trace!("Exec:  {op} SWD: {cmd:#04X} ACK {e:?}");
            self.turnaround_to_output();
            self.park();
            return Err(e);
        }

        let result = if op.is_read() {
            let value = self.read_bits(32) as u32;
            let parity = self.read_bit();
            self.turnaround_to_output();
            if self.check_read_parity && parity != calculate_parity(value) {
                debug!("SWD read parity error: data=0x{value:08X}, parity={parity}");
                self.park();
                return Err(SwdError::ReadParity);
            }
            value
        } else {
            self.turnaround_to_output();
            self.write_bits(32, data as u64);
            self.write_bit(calculate_parity(data));
            data
        };

        self.park();
        trace!("Exec:  {op} SWD: {cmd:#04X} {result:#010X}");
        Ok(result)
    }

    fn line_reset(&mut self) {
        self.swdio.set_level(true);
        self.swdio.set_output();
        self.clock(LINE_RESET_SWDIO_HIGH_CYCLES);
    }

    fn jtag_to_swd(&mut self) {
        self.swdio.set_output();
        self.write_bits(16, JTAG_TO_SWD_SEQUENCE as u64);
        self.idle(JTAG_TO_SWD_IDLE_CYCLES);
    }

    fn idle(&mut self, cycles: u32) {
        self.swdio.set_level(false);
        self.swdio.set_output();
        self.clock(cycles);
    }

    fn hardware_reset(&mut self) -> Result<(), SwdError> {
        let Some(nrst) = self.nrst.as_mut() else {
            warn!("Hardware reset requested, but no nRST pin configured");
            return Err(SwdError::Unsupported);
        };

        debug!("Exec:  Hardware reset");
        nrst.set_low().ok();
        self.delay.delay_ms(HARDWARE_RESET_PULSE_MS);
        nrst.set_high().ok();
        self.delay.delay_ms(HARDWARE_RESET_RECOVERY_MS);
        self.line_reset();
        Ok(())
    }
}

/// SWD parity: true for an odd number of set bits.
pub fn calculate_parity<T>(value: T) -> bool
where
    T: Into<u64>,
{
    (value.into().count_ones() % 2) == 1
}
