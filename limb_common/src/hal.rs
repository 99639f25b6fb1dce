//! Hardware abstraction layer types.
//!
//! This module contains the hardware capability trait, the per-device
//! configuration types and the error type shared by every limb device.

pub mod config;
pub mod error;
pub mod io;
