// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swdbridge-swd library
//!
//! Bit-banged ARM Serial Wire Debug (SWD) and STM32 flash programming.
//!
//! The driver reimplements the
//! [ARM SWD protocol](https://developer.arm.com/documentation/ihi0031/latest/)
//! over two GPIO pins, and layers on it an unlock/erase/program/verify state
//! machine for STM32 F1 and F4 flash, driven entirely through memory-mapped
//! register accesses relayed over the link.
//!
//! ```text
//!      FlashProgrammer      per-family unlock/erase/program/verify
//! ----------------------
//!      DebugInterface       halt, reset, polling with timeouts
//! ----------------------
//!      SwdInterface         DP/AP registers, RDBUFF, WAIT retry,   SwdError
//! ----------------------    target memory via CSW/TAR/DRW
//!   SwdTransport (trait)
//! ----------------------
//!      SwdProtocol          request/ACK/data frames, bit timing
//! ----------------------                                       -----------
//!     GPIO pins         >=========================<           SWD Target
//!                          SWDIO/SWCLK(/nRST)/GND
//! ```
//!
//! * [`FlashProgrammer`] is the programming session object.  It owns
//!   everything below it and is the intended entry point.
//! * [`DebugInterface`] drives the Cortex-M debug registers.
//! * [`SwdInterface`] performs individual DP/AP and memory accesses.
//! * [`SwdProtocol`] implements the wire protocol by bit-banging any pins
//!   implementing [`SwdioPin`] and `embedded_hal` `OutputPin`.
//!
//! Everything is synchronous and busy-waits: a clock pulse or a register
//! poll never yields.  Time is supplied through the [`Timer`] trait so the
//! same code runs on a microcontroller and in host tests.
//!
//! This library is `no_std` and requires an `alloc` implementation.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod debug;
pub mod flash;
pub mod interface;
pub mod protocol;
pub mod timer;

#[cfg(test)]
pub(crate) mod sim;

#[doc(inline)]
pub use crate::config::{FlashTimeouts, SwdConfig};
#[doc(inline)]
pub use crate::debug::DebugInterface;
#[doc(inline)]
pub use crate::flash::{EraseMode, FlashProgrammer};
#[doc(inline)]
pub use crate::interface::SwdInterface;
#[doc(inline)]
pub use crate::protocol::{NoResetPin, SwdProtocol, SwdTransport, SwdioPin};
#[doc(inline)]
pub use crate::timer::Timer;

extern crate alloc;
use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::Serialize;

/// Core error type used by all swdbridge-swd objects
///
/// Every operation returns one of these rather than a bare failure, so a
/// caller can tell an unresponsive target from a failed verify.  Methods are
/// provided to help decide how to recover:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwdError {
    /// The target answered WAIT more times than the configured retry bound
    /// allows (see [`SwdConfig::wait_retries`]).
    WaitAck,

    /// The target answered FAULT.  Sticky errors need clearing, usually by
    /// reconnecting with [`SwdInterface::connect()`].
    FaultAck,

    /// No valid ACK.  The value received is included; 7 means SWDIO was high
    /// for the whole ACK phase, i.e. nothing drove it.
    NoAck(u8),

    /// Parity of a read data phase did not match the data.  The value read
    /// cannot be trusted.
    ReadParity,

    /// A bounded poll (halt, reset, flash busy) ran out of time.
    Timeout,

    /// The flash controller reported an error.  The raw status register is
    /// included.
    FlashError(u32),

    /// The flash controller stayed locked after the unlock key sequence.
    FlashLocked,

    /// Read-back of programmed flash differed from the source buffer.
    VerifyMismatch { addr: u32, expected: u8, actual: u8 },

    /// The target's part number is not in the family table.  The IDCODE
    /// read is included.
    UnknownTarget(u32),

    /// The address or range is outside the target's flash, or has no
    /// page/sector.
    BadAddress(u32),

    /// An operation needing an identified target was attempted before one
    /// was detected.
    NotReady,

    /// While there was no protocol error, the requested operation did not
    /// complete, for example debug power-up was never acknowledged.
    OperationFailed(String),

    /// Not supported for this target or configuration: F7/H7 flash, the
    /// wrong program unit for the family, or a hardware reset without an
    /// nRST pin.
    Unsupported,
}

impl SwdError {
    /// Decodes a 3-bit ACK value, received LSB first.
    pub fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            0b001 => Ok(()),
            0b010 => Err(SwdError::WaitAck),
            0b100 => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// Returns true if the link needs to be reconnected (line reset and
    /// sticky error clear) before further use.  If the error persists, the
    /// target may need a hardware reset.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            SwdError::NoAck(_) | SwdError::FaultAck | SwdError::ReadParity
        )
    }

    /// Returns true if the error is transient and the operation can simply
    /// be retried.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::WaitAck | SwdError::Timeout)
    }

    /// Returns true if the error came from the SWD link rather than from the
    /// target's flash controller or the caller.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SwdError::WaitAck | SwdError::FaultAck | SwdError::NoAck(_) | SwdError::ReadParity
        )
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "Wait ACK",
            SwdError::FaultAck => "Fault ACK",
            SwdError::NoAck(_) => "No ACK",
            SwdError::ReadParity => "Read Parity Error",
            SwdError::Timeout => "Timeout",
            SwdError::FlashError(_) => "Flash Error",
            SwdError::FlashLocked => "Flash Locked",
            SwdError::VerifyMismatch { .. } => "Verify Mismatch",
            SwdError::UnknownTarget(_) => "Unknown Target",
            SwdError::BadAddress(_) => "Bad Address",
            SwdError::NotReady => "Not Ready",
            SwdError::OperationFailed(_) => "Operation Failed",
            SwdError::Unsupported => "Unsupported Operation",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "wait ack",
            SwdError::FaultAck => "fault ack",
            SwdError::NoAck(_) => "no ack",
            SwdError::ReadParity => "read parity",
            SwdError::Timeout => "timeout",
            SwdError::FlashError(_) => "flash error",
            SwdError::FlashLocked => "flash locked",
            SwdError::VerifyMismatch { .. } => "verify mismatch",
            SwdError::UnknownTarget(_) => "unknown target",
            SwdError::BadAddress(_) => "bad address",
            SwdError::NotReady => "not ready",
            SwdError::OperationFailed(_) => "operation failed",
            SwdError::Unsupported => "unsupported",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            SwdError::NoAck(ack) => Some(format!("{ack}")),
            SwdError::FlashError(sr) => Some(format!("SR=0x{sr:08X}")),
            SwdError::VerifyMismatch {
                addr,
                expected,
                actual,
            } => Some(format!(
                "0x{addr:08X}: expected 0x{expected:02X}, read 0x{actual:02X}"
            )),
            SwdError::UnknownTarget(idcode) => Some(format!("IDCODE 0x{idcode:08X}")),
            SwdError::BadAddress(addr) => Some(format!("0x{addr:08X}")),
            SwdError::OperationFailed(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("detail", self.detail().as_deref().unwrap_or(""))?;
        state.end()
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.as_str()),
            None => write!(f, "{}", self.as_str()),
        }
    }
}
