// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM debug architecture objects: DP and MEM-AP registers reached with SWD
//! transactions, and the Cortex-M debug registers reached through the MEM-AP.

pub mod dp;
pub mod map;
pub mod register;
pub mod scs;
