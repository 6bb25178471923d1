// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Typed SWD register descriptors
//!
//! Each DP or AP register is represented by a zero sized descriptor type
//! carrying its 4-byte aligned address within the port, plus a value type
//! that wraps the raw 32-bit word.  `swdbridge-swd` uses these to provide
//!
//! * `SwdInterface::read_dp_register`
//! * `SwdInterface::write_dp_register`
//! * `SwdInterface::read_ap_register`
//! * `SwdInterface::write_ap_register`
//!
//! so that, for example, a CSW value can only be written to the CSW
//! register.

/// Base trait for all DP and AP register descriptors
pub trait RegisterDescriptor {
    /// Register offset within its port (0x0, 0x4, 0x8 or 0xC)
    const ADDRESS: u8;

    /// Value type held by this register
    type Value;
}

/// Registers that can be read
pub trait ReadableRegister: RegisterDescriptor {
    fn from_raw(data: u32) -> Self::Value
    where
        Self::Value: From<u32>,
    {
        Self::Value::from(data)
    }
}

/// Registers that can be written
pub trait WritableRegister: RegisterDescriptor {
    fn to_raw(value: Self::Value) -> u32
    where
        Self::Value: Into<u32>,
    {
        value.into()
    }
}

/// Debug Port registers
pub trait DpRegister: RegisterDescriptor {}

/// Access Port registers
pub trait ApRegister: RegisterDescriptor {}

/// Declares a register descriptor type, with its port, address, value type
/// and access.
///
/// ```ignore
/// register!(TarRegister, Ap, 0x04, Tar, rw);
/// ```
#[macro_export]
macro_rules! register {
    ($desc:ident, $port:ident, $addr:expr, $value:ty, r) => {
        $crate::register!(@base $desc, $port, $addr, $value);
        impl $crate::arm::register::ReadableRegister for $desc {}
    };
    ($desc:ident, $port:ident, $addr:expr, $value:ty, w) => {
        $crate::register!(@base $desc, $port, $addr, $value);
        impl $crate::arm::register::WritableRegister for $desc {}
    };
    ($desc:ident, $port:ident, $addr:expr, $value:ty, rw) => {
        $crate::register!(@base $desc, $port, $addr, $value);
        impl $crate::arm::register::ReadableRegister for $desc {}
        impl $crate::arm::register::WritableRegister for $desc {}
    };
    (@base $desc:ident, Dp, $addr:expr, $value:ty) => {
        $crate::register!(@descriptor $desc, $addr, $value);
        impl $crate::arm::register::DpRegister for $desc {}
    };
    (@base $desc:ident, Ap, $addr:expr, $value:ty) => {
        $crate::register!(@descriptor $desc, $addr, $value);
        impl $crate::arm::register::ApRegister for $desc {}
    };
    (@descriptor $desc:ident, $addr:expr, $value:ty) => {
        impl $crate::arm::register::RegisterDescriptor for $desc {
            const ADDRESS: u8 = $addr;
            type Value = $value;
        }
    };
}

/// Implements the raw conversions and hex `Display` for a register value
/// newtype wrapping a `u32`.
#[macro_export]
macro_rules! register_value {
    ($name:ident) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}
