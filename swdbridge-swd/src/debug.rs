// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M Debug Interface
//!
//! [`DebugInterface`] halts and resets the target core through the Cortex-M
//! debug registers, and provides the bounded polling used by everything
//! that waits on the target.
//!
//! If this module does not give you the control you need, use
//! [`DebugInterface::swd_if_mut()`] to get at the underlying
//! [`SwdInterface`].

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swdbridge_core::arm::dp::IdCode;
use swdbridge_core::arm::scs::{Aircr, Demcr, Dhcsr};

use crate::interface::SwdInterface;
use crate::protocol::SwdTransport;
use crate::{FlashTimeouts, SwdConfig, SwdError, Timer};

// Granularity of every bounded poll
const POLL_INTERVAL_MS: u32 = 1;

/// ARM Debug Interface object
///
/// Owns the [`SwdInterface`] (and so the link), the time source and the
/// timeouts that bound every poll.
///
/// ```rust,ignore
/// let mut debug = DebugInterface::new(swd, timer, &SwdConfig::default(), FlashTimeouts::default());
/// debug.connect()?;
/// debug.halt_core()?;
/// let value = debug.read_mem(0x2000_0000)?;
/// ```
pub struct DebugInterface<T, C> {
    swd: SwdInterface<T>,
    timer: C,
    timeouts: FlashTimeouts,
}

impl<T, C> DebugInterface<T, C>
where
    T: SwdTransport,
    C: Timer,
{
    pub fn new(transport: T, timer: C, config: &SwdConfig, timeouts: FlashTimeouts) -> Self {
        Self::from_swd_if(SwdInterface::new(transport, config), timer, timeouts)
    }

    /// Creates a `DebugInterface` around an existing [`SwdInterface`].
    pub fn from_swd_if(swd: SwdInterface<T>, timer: C, timeouts: FlashTimeouts) -> Self {
        Self {
            swd,
            timer,
            timeouts,
        }
    }

    pub fn swd_if(&self) -> &SwdInterface<T> {
        &self.swd
    }

    /// Returns a mutable reference to the underlying [`SwdInterface`], for
    /// lower-level SWD operations.
    pub fn swd_if_mut(&mut self) -> &mut SwdInterface<T> {
        &mut self.swd
    }

    pub fn timer(&self) -> &C {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut C {
        &mut self.timer
    }

    pub fn timeouts(&self) -> &FlashTimeouts {
        &self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: FlashTimeouts) {
        self.timeouts = timeouts;
    }

    /// Releases the transport.
    pub fn into_transport(self) -> T {
        self.swd.into_transport()
    }

    /// Connects to the target.  See [`SwdInterface::connect()`].
    pub fn connect(&mut self) -> Result<IdCode, SwdError> {
        self.swd.connect()
    }

    pub fn read_mem(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.swd.read_mem(addr)
    }

    pub fn write_mem(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        self.swd.write_mem(addr, data)
    }

    pub fn write_mem_u16(&mut self, addr: u32, data: u16) -> Result<(), SwdError> {
        self.swd.write_mem_u16(addr, data)
    }

    /// Halts the core.
    ///
    /// Enables debug and requests a halt through DHCSR, then polls DHCSR
    /// for S_HALT.
    ///
    /// Returns:
    /// - `Ok(())`: the core is halted.
    /// - `Err(SwdError::Timeout)`: S_HALT was not seen within the halt
    ///   timeout.
    /// - `Err(SwdError)`: a register access failed.
    pub fn halt_core(&mut self) -> Result<(), SwdError> {
        let dhcsr = Dhcsr::from(self.swd.read_mem(Dhcsr::ADDRESS)?);
        if dhcsr.halted() {
            trace!("OK:    Core already halted");
        }

        self.swd.write_mem(Dhcsr::ADDRESS, Dhcsr::halt_request())?;

        let timeout_ms = self.timeouts.halt_ms;
        self.poll(timeout_ms, |swd| {
            Ok(Dhcsr::from(swd.read_mem(Dhcsr::ADDRESS)?).halted())
        })
        .inspect(|_| debug!("Core halted"))
        .inspect_err(|e| warn!("Failed to halt core: {e}"))
    }

    /// Releases the core from debug halt and lets it run.
    pub fn run_core(&mut self) -> Result<(), SwdError> {
        self.swd.write_mem(Dhcsr::ADDRESS, Dhcsr::release_request())?;
        let dhcsr = Dhcsr::from(self.swd.read_mem(Dhcsr::ADDRESS)?);
        if dhcsr.halted() {
            warn!("Core still halted after release");
            return Err(SwdError::OperationFailed("core did not resume".into()));
        }
        debug!("Core running");
        Ok(())
    }

    /// Resets the target system, catching the core at the reset vector.
    ///
    /// Sets DEMCR.VC_CORERESET, requests a system reset through AIRCR, waits
    /// for the reset to settle and then polls DHCSR for S_RESET_ST.  Reads
    /// that fail while the target is in reset are tolerated.  VC_CORERESET
    /// is cleared again afterwards.
    ///
    /// Returns:
    /// - `Ok(())`: the reset was observed.
    /// - `Err(SwdError::Timeout)`: S_RESET_ST was not seen in time.
    /// - `Err(SwdError)`: a register access failed, including the final
    ///   write clearing VC_CORERESET.
    pub fn reset_system(&mut self) -> Result<(), SwdError> {
        let demcr = self.swd.read_mem(Demcr::ADDRESS)?;
        self.swd
            .write_mem(Demcr::ADDRESS, demcr | Demcr::VC_CORERESET)?;
        self.swd.write_mem(Aircr::ADDRESS, Aircr::reset_request())?;
        debug!("System reset requested");

        self.timer.delay_ms(self.timeouts.reset_settle_ms);

        let timeout_ms = self.timeouts.reset_ms;
        self.poll(timeout_ms, |swd| match swd.read_mem(Dhcsr::ADDRESS) {
            Ok(dhcsr) => Ok(Dhcsr::from(dhcsr).reset_occurred()),
            Err(e) => {
                trace!("Retry: DHCSR read during reset: {e:?}");
                // A faulted access leaves sticky errors behind
                if let Err(e) = swd.clear_errors() {
                    trace!("Error: ABORT during reset: {e:?}");
                }
                Ok(false)
            }
        })
        .inspect_err(|e| warn!("Reset not observed: {e}"))?;

        let demcr = self.swd.read_mem(Demcr::ADDRESS)?;
        self.swd
            .write_mem(Demcr::ADDRESS, demcr & !Demcr::VC_CORERESET)?;

        debug!("System reset complete");
        Ok(())
    }

    /// Pulses the target's nRST line, if one is wired, and reconnects.
    ///
    /// Returns `Err(SwdError::Unsupported)` without a reset pin.
    pub fn hardware_reset(&mut self) -> Result<IdCode, SwdError> {
        self.swd.transport_mut().hardware_reset()?;
        debug!("Hardware reset complete, reconnecting");
        self.swd.connect()
    }

    /// Repeatedly evaluates `done` at 1 ms intervals until it returns
    /// `Ok(true)`, an error, or `timeout_ms` elapses.
    ///
    /// `done` is always evaluated at least once, and an error from it is
    /// returned immediately, however much of the timeout remains.
    pub fn poll<F>(&mut self, timeout_ms: u32, mut done: F) -> Result<(), SwdError>
    where
        F: FnMut(&mut SwdInterface<T>) -> Result<bool, SwdError>,
    {
        let start = self.timer.now_ms();
        loop {
            if done(&mut self.swd)? {
                return Ok(());
            }

            if self.timer.elapsed_ms(start) >= timeout_ms as u64 {
                debug!("Error: Timed out after {timeout_ms}ms");
                return Err(SwdError::Timeout);
            }

            self.timer.delay_ms(POLL_INTERVAL_MS);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::MockSwdTransport;
    use crate::sim::{SimTarget, SimTimer};

    fn sim_debug(target: SimTarget) -> (DebugInterface<SimTarget, SimTimer>, SimTimer) {
        let timer = SimTimer::default();
        let mut debug = DebugInterface::new(
            target,
            timer.clone(),
            &SwdConfig::default(),
            FlashTimeouts::default(),
        );
        debug.connect().unwrap();
        (debug, timer)
    }

    #[test]
    fn halt_core() {
        let (mut debug, timer) = sim_debug(SimTarget::stm32f4());
        debug.halt_core().unwrap();

        let dhcsr = Dhcsr::from(debug.read_mem(Dhcsr::ADDRESS).unwrap());
        assert!(dhcsr.halted());
        assert!(timer.now() < 1000);
    }

    #[test]
    fn run_core_after_reset() {
        let (mut debug, _timer) = sim_debug(SimTarget::stm32f1());
        debug.reset_system().unwrap();
        debug.run_core().unwrap();

        let dhcsr = Dhcsr::from(debug.read_mem(Dhcsr::ADDRESS).unwrap());
        assert!(!dhcsr.halted());
    }

    #[test]
    fn halt_times_out() {
        let mut target = SimTarget::stm32f4();
        target.set_ignore_halt(true);
        let (mut debug, timer) = sim_debug(target);

        assert_eq!(debug.halt_core(), Err(SwdError::Timeout));
        assert!(timer.now() >= 1000);
        assert!(timer.now() < 1010);
    }

    #[test]
    fn reset_system_catches_core() {
        let (mut debug, timer) = sim_debug(SimTarget::stm32f1());
        debug.reset_system().unwrap();

        let target = debug.swd_if().transport();
        assert_eq!(target.system_resets(), 1);
        assert_eq!(debug.read_mem(Demcr::ADDRESS).unwrap() & Demcr::VC_CORERESET, 0);
        assert!(Dhcsr::from(debug.read_mem(Dhcsr::ADDRESS).unwrap()).halted());
        assert!(timer.now() >= 100);
    }

    #[test]
    fn reset_settle_is_configurable() {
        let timer = SimTimer::default();
        let mut debug = DebugInterface::new(
            SimTarget::stm32f1(),
            timer.clone(),
            &SwdConfig::default(),
            FlashTimeouts::default().with_reset_settle_ms(10),
        );
        debug.connect().unwrap();
        debug.reset_system().unwrap();
        assert!(timer.now() >= 10);
        assert!(timer.now() < 100);
    }

    #[test]
    fn reset_times_out_when_not_observed() {
        let mut target = SimTarget::stm32f1();
        target.set_ignore_reset(true);
        let (mut debug, timer) = sim_debug(target);

        assert_eq!(debug.reset_system(), Err(SwdError::Timeout));
        assert!(timer.now() >= 2100);
    }

    #[test]
    fn poll_stops_on_error() {
        let (mut debug, timer) = sim_debug(SimTarget::stm32f4());
        let mut calls = 0;
        let result = debug.poll(5000, |_| {
            calls += 1;
            if calls == 3 {
                Err(SwdError::FlashError(0x10))
            } else {
                Ok(false)
            }
        });
        assert_eq!(result, Err(SwdError::FlashError(0x10)));
        assert_eq!(timer.now(), 2);
    }

    #[test]
    fn hardware_reset_without_pin() {
        let mut mock = MockSwdTransport::new();
        mock.expect_hardware_reset()
            .times(1)
            .returning(|| Err(SwdError::Unsupported));

        let mut debug = DebugInterface::new(
            mock,
            SimTimer::default(),
            &SwdConfig::default(),
            FlashTimeouts::default(),
        );
        assert_eq!(debug.hardware_reset(), Err(SwdError::Unsupported));
    }

    #[test]
    fn hardware_reset_reconnects() {
        let (mut debug, _timer) = sim_debug(SimTarget::stm32f4());
        let idcode = debug.hardware_reset().unwrap();
        assert_eq!(idcode.data(), SimTarget::F4_IDCODE);
        assert_eq!(debug.swd_if().transport().hardware_resets(), 1);
    }
}
