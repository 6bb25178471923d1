// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWD Interface
//!
//! [`SwdInterface`] performs Debug Port and Access Port register accesses,
//! and 32-bit target memory accesses through the MEM-AP, on top of any
//! [`SwdTransport`].

use alloc::format;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::protocol::{SwdOp, SwdTransport};
use crate::{SwdConfig, SwdError};
use swdbridge_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister,
    Select, SelectRegister,
};
use swdbridge_core::arm::map::{Csw, CswRegister, DrwRegister, Tar, TarRegister};
use swdbridge_core::arm::register::{
    ApRegister, DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister,
};

// Number of CTRL/STAT reads waiting for debug power-up to be acknowledged
const POWER_UP_ATTEMPTS: u32 = 10;

// Idle cycles, SWDIO low, after the final line reset of a connect
const CONNECT_IDLE_CYCLES: u32 = 2;

/// DP/AP register access over an SWD transport.
///
/// Every read other than of RDBUFF is completed by a follow-up RDBUFF read,
/// whose data is returned.  Every transaction answered with WAIT is re-issued
/// up to `wait_retries` times.  Nothing (SELECT, CSW, TAR) is cached between
/// calls, so accesses survive intervening line resets.
///
/// ```rust,ignore
/// let mut swd_if = SwdInterface::new(swd, &SwdConfig::default());
/// let idcode = swd_if.connect()?;
/// let value = swd_if.read_mem(0x0800_0000)?;
/// ```
pub struct SwdInterface<T> {
    transport: T,
    wait_retries: u32,
    idcode: Option<IdCode>,
}

impl<T: SwdTransport> SwdInterface<T> {
    pub fn new(transport: T, config: &SwdConfig) -> Self {
        Self {
            transport,
            wait_retries: config.wait_retries,
            idcode: None,
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the interface, returning the transport so the caller can
    /// release the pins.
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn wait_retries(&self) -> u32 {
        self.wait_retries
    }

    /// Sets how many times a WAIT response is retried before giving up with
    /// [`SwdError::WaitAck`].
    pub fn set_wait_retries(&mut self, wait_retries: u32) {
        self.wait_retries = wait_retries;
    }

    /// IDCODE from the last successful [`Self::connect`]
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// Brings up the SWD link from scratch.
    ///
    /// Performs a line reset, the JTAG-to-SWD sequence, a second line reset
    /// and idle cycles, reads IDCODE, clears any sticky errors and powers up
    /// the debug domain.
    ///
    /// Returns:
    /// - `Ok(IdCode)` on success.
    /// - `Err(SwdError)` if the target did not respond, or did not complete
    ///   power-up.
    pub fn connect(&mut self) -> Result<IdCode, SwdError> {
        self.idcode = None;

        self.transport.line_reset();
        self.transport.jtag_to_swd();
        self.transport.line_reset();
        self.transport.idle(CONNECT_IDLE_CYCLES);

        let idcode = self.read_idcode()?;
        if !idcode.is_valid() {
            debug!("Error: Invalid IDCODE {idcode}");
            return Err(SwdError::OperationFailed(format!("invalid IDCODE {idcode}")));
        }
        debug!("Value: IDCODE {idcode}");

        self.clear_errors()?;
        self.power_up_debug_domain()?;

        self.idcode = Some(idcode);
        info!("Connected to target, IDCODE {idcode}");
        Ok(idcode)
    }

    /// Reads IDCODE as a single transaction.  The DP returns IDCODE in the
    /// read's own data phase, so no RDBUFF read follows.  This is the first
    /// access after a line reset.
    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        let data = self.do_op(SwdOp::DpRead(IdCodeRegister::ADDRESS), 0)?;
        Ok(IdCodeRegister::from_raw(data))
    }

    /// Clears all DP sticky error flags via ABORT.
    pub fn clear_errors(&mut self) -> Result<(), SwdError> {
        self.write_dp_register(AbortRegister, Abort::clear_all())
    }

    /// Requests debug and system power-up and waits for both to be
    /// acknowledged in CTRL/STAT.  CTRL/STAT is read directly, as IDCODE is.
    pub fn power_up_debug_domain(&mut self) -> Result<(), SwdError> {
        self.write_dp_register(CtrlStatRegister, CtrlStat::power_up_request())?;

        for _ in 0..POWER_UP_ATTEMPTS {
            let data = self.do_op(SwdOp::DpRead(CtrlStatRegister::ADDRESS), 0)?;
            let ctrl_stat = CtrlStatRegister::from_raw(data);
            if ctrl_stat.powered_up() {
                trace!("OK:    Debug domain powered up {ctrl_stat}");
                return Ok(());
            }
        }

        warn!("Debug domain power-up not acknowledged");
        Err(SwdError::OperationFailed(
            "debug power-up not acknowledged".into(),
        ))
    }

    /// Reads a DP register by address.
    ///
    /// Every read other than of RDBUFF takes two transactions.  The
    /// exceptions are [`Self::read_idcode()`] and the CTRL/STAT polls in
    /// [`Self::power_up_debug_domain()`], both used by [`Self::connect()`],
    /// which take the value from the read's own data phase.
    ///
    /// Arguments:
    /// - `addr`: DP register address (0x0, 0x4, 0x8, 0xC)
    ///
    /// Returns:
    /// - `Ok(u32)`: the value retrieved via RDBUFF, or read directly if
    ///   `addr` is RDBUFF.
    /// - `Err(SwdError)` if either transaction fails.
    pub fn read_dp(&mut self, addr: u8) -> Result<u32, SwdError> {
        let first = self.do_op(SwdOp::DpRead(addr), 0)?;
        if addr == RdBuffRegister::ADDRESS {
            return Ok(first);
        }
        self.read_rdbuff()
    }

    /// Writes a DP register by address.
    pub fn write_dp(&mut self, addr: u8, value: u32) -> Result<(), SwdError> {
        self.do_op(SwdOp::DpWrite(addr), value).map(|_| ())
    }

    /// Reads an AP register by address, in the currently selected AP and
    /// bank.
    ///
    /// Returns:
    /// - `Ok(u32)`: the value retrieved via RDBUFF.
    /// - `Err(SwdError)` if either transaction fails.
    pub fn read_ap(&mut self, addr: u8) -> Result<u32, SwdError> {
        self.do_op(SwdOp::ApRead(addr), 0)?;
        self.read_rdbuff()
    }

    /// Writes an AP register by address, in the currently selected AP and
    /// bank.
    pub fn write_ap(&mut self, addr: u8, value: u32) -> Result<(), SwdError> {
        self.do_op(SwdOp::ApWrite(addr), value).map(|_| ())
    }

    /// Reads a Debug Port register.
    ///
    /// ```rust,ignore
    /// use swdbridge_core::arm::dp::CtrlStatRegister;
    /// let value = swd_if.read_dp_register(CtrlStatRegister)?;
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let data = self.read_dp(R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Writes a Debug Port register.
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        R::Value: Into<u32>,
    {
        self.write_dp(R::ADDRESS, R::to_raw(value))
    }

    /// Reads an Access Port register.
    pub fn read_ap_register<R>(&mut self, _reg: R) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let data = self.read_ap(R::ADDRESS)?;
        Ok(R::from_raw(data))
    }

    /// Writes an Access Port register.
    ///
    /// ```rust,ignore
    /// use swdbridge_core::arm::map::TarRegister;
    /// swd_if.write_ap_register(TarRegister, 0x2000_0000.into())?;
    /// ```
    pub fn write_ap_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        R::Value: Into<u32>,
    {
        self.write_ap(R::ADDRESS, R::to_raw(value))
    }

    /// Reads a 32-bit word of target memory.
    ///
    /// Arguments:
    /// - `addr`: word aligned target address
    ///
    /// Returns:
    /// - `Ok(u32)`: the word read
    /// - `Err(SwdError)` if any step fails
    pub fn read_mem(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.setup_mem_access(addr)?;
        let data = self.read_ap_register(DrwRegister)?.data();
        trace!("Value: 0x{addr:08X} = 0x{data:08X}");
        Ok(data)
    }

    /// Writes a 32-bit word of target memory.
    ///
    /// Arguments:
    /// - `addr`: word aligned target address
    /// - `data`: the word to write
    pub fn write_mem(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        self.setup_mem_access(addr)?;
        self.write_ap_register(DrwRegister, data.into())?;
        trace!("Exec:  0x{addr:08X} <- 0x{data:08X}");
        Ok(())
    }

    /// Writes a 16-bit half-word of target memory with a half-word sized
    /// access.  The MEM-AP takes the data from the byte lanes selected by
    /// `addr`, so it is shifted into place here.
    ///
    /// Arguments:
    /// - `addr`: half-word aligned target address
    /// - `data`: the half-word to write
    pub fn write_mem_u16(&mut self, addr: u32, data: u16) -> Result<(), SwdError> {
        let mut csw = Csw::word_access();
        csw.set_size(Csw::SIZE_16BIT);
        self.setup_access(addr, csw)?;

        let lanes = (data as u32) << ((addr & 0b10) * 8);
        self.write_ap_register(DrwRegister, lanes.into())?;
        trace!("Exec:  0x{addr:08X} <- 0x{data:04X}");
        Ok(())
    }

    // SELECT, CSW and TAR ahead of a single DRW access
    fn setup_mem_access(&mut self, addr: u32) -> Result<(), SwdError> {
        self.setup_access(addr, Csw::word_access())
    }

    fn setup_access(&mut self, addr: u32, csw: Csw) -> Result<(), SwdError> {
        self.write_dp_register(SelectRegister, Select::new(0, 0))?;
        self.write_ap_register(CswRegister, csw)?;
        self.write_ap_register(TarRegister, Tar::from(addr))
    }

    fn read_rdbuff(&mut self) -> Result<u32, SwdError> {
        self.do_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), 0)
    }

    // A single transaction, re-issued while the target answers WAIT
    fn do_op(&mut self, op: SwdOp, data: u32) -> Result<u32, SwdError> {
        let mut attempt = 0;
        let result = loop {
            match self.transport.transfer(op, data) {
                Err(SwdError::WaitAck) => trace!("Wait:  {op}"),
                other => break other,
            }

            attempt += 1;
            if attempt > self.wait_retries {
                break Err(SwdError::WaitAck);
            } else {
                trace!("Retry: {op} {attempt}");
            }
        };

        if let Err(e) = &result {
            debug!("Error: {op} {data:#010X}: {e:?}");
        }

        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::MockSwdTransport;
    use crate::sim::SimTarget;
    use mockall::Sequence;
    use mockall::predicate::{always, eq};

    fn interface(mock: MockSwdTransport) -> SwdInterface<MockSwdTransport> {
        SwdInterface::new(mock, &SwdConfig::default())
    }

    #[test]
    fn ap_read_is_followed_by_rdbuff() {
        let mut mock = MockSwdTransport::new();
        let mut seq = Sequence::new();
        mock.expect_transfer()
            .with(eq(SwdOp::ApRead(0x0C)), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0xAAAA_AAAA));
        mock.expect_transfer()
            .with(eq(SwdOp::DpRead(0x0C)), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0x1234_5678));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.read_ap(0x0C), Ok(0x1234_5678));
    }

    #[test]
    fn dp_read_is_followed_by_rdbuff() {
        for addr in [0x0, 0x4, 0x8] {
            let mut mock = MockSwdTransport::new();
            let mut seq = Sequence::new();
            mock.expect_transfer()
                .with(eq(SwdOp::DpRead(addr)), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(1));
            mock.expect_transfer()
                .with(eq(SwdOp::DpRead(0x0C)), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(2));

            let mut swd_if = interface(mock);
            assert_eq!(swd_if.read_dp(addr), Ok(2));
        }
    }

    #[test]
    fn rdbuff_read_is_single_transaction() {
        let mut mock = MockSwdTransport::new();
        mock.expect_transfer()
            .with(eq(SwdOp::DpRead(0x0C)), always())
            .times(1)
            .returning(|_, _| Ok(0x55));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.read_dp(0x0C), Ok(0x55));
    }

    #[test]
    fn idcode_read_is_single_transaction() {
        let mut mock = MockSwdTransport::new();
        mock.expect_transfer()
            .with(eq(SwdOp::DpRead(0x0)), always())
            .times(1)
            .returning(|_, _| Ok(0x2BA0_1477));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.read_idcode().unwrap().data(), 0x2BA0_1477);
    }

    #[test]
    fn writes_are_single_transactions() {
        let mut mock = MockSwdTransport::new();
        mock.expect_transfer()
            .with(eq(SwdOp::ApWrite(0x04)), eq(0x2000_0000))
            .times(1)
            .returning(|_, data| Ok(data));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.write_ap(0x04, 0x2000_0000), Ok(()));
    }

    #[test]
    fn fault_aborts_read() {
        let mut mock = MockSwdTransport::new();
        mock.expect_transfer()
            .times(1)
            .returning(|_, _| Err(SwdError::FaultAck));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.read_ap(0x0C), Err(SwdError::FaultAck));
    }

    #[test]
    fn wait_is_retried_up_to_bound() {
        let mut mock = MockSwdTransport::new();
        let mut seq = Sequence::new();
        mock.expect_transfer()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SwdError::WaitAck));
        mock.expect_transfer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, data| Ok(data));

        let mut swd_if = interface(mock);
        swd_if.set_wait_retries(2);
        assert_eq!(swd_if.write_dp(0x08, 0), Ok(()));
    }

    #[test]
    fn wait_gives_up_after_bound() {
        let mut mock = MockSwdTransport::new();
        // Initial attempt plus three retries
        mock.expect_transfer()
            .times(4)
            .returning(|_, _| Err(SwdError::WaitAck));

        let mut swd_if = interface(mock);
        swd_if.set_wait_retries(3);
        assert_eq!(swd_if.write_dp(0x08, 0), Err(SwdError::WaitAck));
    }

    #[test]
    fn zero_retries_surfaces_first_wait() {
        let mut mock = MockSwdTransport::new();
        mock.expect_transfer()
            .times(1)
            .returning(|_, _| Err(SwdError::WaitAck));

        let mut swd_if = SwdInterface::new(mock, &SwdConfig::default().with_wait_retries(0));
        assert_eq!(swd_if.read_ap(0x0C), Err(SwdError::WaitAck));
    }

    #[test]
    fn memory_write_sequence() {
        let mut mock = MockSwdTransport::new();
        let mut seq = Sequence::new();
        for (op, data) in [
            (SwdOp::DpWrite(0x08), 0),
            (SwdOp::ApWrite(0x00), 0x8000_0042),
            (SwdOp::ApWrite(0x04), 0x4002_3C10),
            (SwdOp::ApWrite(0x0C), 0x0000_0201),
        ] {
            mock.expect_transfer()
                .with(eq(op), eq(data))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, data| Ok(data));
        }

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.write_mem(0x4002_3C10, 0x0000_0201), Ok(()));
    }

    #[test]
    fn memory_read_sequence_repeats_setup() {
        let mut mock = MockSwdTransport::new();
        let mut seq = Sequence::new();
        for _ in 0..2 {
            for op in [SwdOp::DpWrite(0x08), SwdOp::ApWrite(0x00), SwdOp::ApWrite(0x04)] {
                mock.expect_transfer()
                    .with(eq(op), always())
                    .times(1)
                    .in_sequence(&mut seq)
                    .returning(|_, data| Ok(data));
            }
            mock.expect_transfer()
                .with(eq(SwdOp::ApRead(0x0C)), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(0));
            mock.expect_transfer()
                .with(eq(SwdOp::DpRead(0x0C)), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(0xCAFE_F00D));
        }

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.read_mem(0x0800_0000), Ok(0xCAFE_F00D));
        assert_eq!(swd_if.read_mem(0x0800_0000), Ok(0xCAFE_F00D));
    }

    #[test]
    fn half_word_write_uses_byte_lanes() {
        let mut mock = MockSwdTransport::new();
        let mut seq = Sequence::new();
        for (op, data) in [
            (SwdOp::DpWrite(0x08), 0),
            (SwdOp::ApWrite(0x00), 0x8000_0041),
            (SwdOp::ApWrite(0x04), 0x0800_0002),
            (SwdOp::ApWrite(0x0C), 0xBEEF_0000),
        ] {
            mock.expect_transfer()
                .with(eq(op), eq(data))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, data| Ok(data));
        }

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.write_mem_u16(0x0800_0002, 0xBEEF), Ok(()));
    }

    #[test]
    fn connect_against_simulated_target() {
        let mut swd_if = SwdInterface::new(SimTarget::stm32f4(), &SwdConfig::default());
        let idcode = swd_if.connect().unwrap();
        assert_eq!(idcode.data(), SimTarget::F4_IDCODE);
        assert_eq!(swd_if.idcode(), Some(idcode));
        assert_eq!(swd_if.transport().line_resets(), 2);
        assert!(swd_if.transport().powered_up());
    }

    #[test]
    fn connect_rejects_silent_target() {
        let mut mock = MockSwdTransport::new();
        mock.expect_line_reset().times(2).return_const(());
        mock.expect_jtag_to_swd().times(1).return_const(());
        mock.expect_idle().times(1).return_const(());
        mock.expect_transfer()
            .times(1)
            .returning(|_, _| Err(SwdError::NoAck(7)));

        let mut swd_if = interface(mock);
        assert_eq!(swd_if.connect(), Err(SwdError::NoAck(7)));
        assert_eq!(swd_if.idcode(), None);
    }
}
