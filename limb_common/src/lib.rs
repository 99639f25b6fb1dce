//! Limb Common Library
//!
//! This crate provides shared constants, configuration loading and the
//! hardware capability trait for the limb HAL workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Wiring and calibration constants
//! - [`config`] - Configuration loading traits and the robot configuration
//! - [`hal`] - `HardwareIO` capability, device configuration and `HalError`
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use limb_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
