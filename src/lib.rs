//! # Thruster Bus Protocol Engine
//!
//! A framed command/response engine sitting between a high-level controller
//! and a bank of eight thruster outputs, with a heartbeat watchdog that kills
//! the outputs when the controller goes quiet.
//!
//! ## Features
//!
//! - **Checksummed framing**: `0x47 0x44` header, type byte, payload, one-byte
//!   rotating checksum
//! - **Kill switch**: kill status queries and kill/unkill commands with ACK/NACK
//! - **Thruster setpoints**: range-checked per-channel commands that survive a
//!   kill and come back when the bank is re-armed
//! - **Heartbeat watchdog**: periodic tokio task with explicit start/stop
//! - **Latest-wins request slot**: no queue, stale requests are simply replaced
//!
//! ## Quick Start
//!
//! ```rust
//! use thrustbus::SerialDriver;
//!
//! let mut driver = SerialDriver::new();
//!
//! // Get kill status
//! driver.send(&[0x47, 0x44, 0x02, 0x35]);
//! let response = driver.receive().expect("kill status is always answered");
//! assert_eq!(response.as_slice(), &[0x47, 0x44, 0x03, 0x00, 0x1B]);
//!
//! // Heartbeats take effect on send and are never answered
//! driver.send(&[0x47, 0x44, 0x04, 0x1B]);
//! assert!(driver.receive().is_none());
//! ```
//!
//! ## Architecture
//!
//! - [`checksum`] - Rotating single-byte integrity code
//! - [`frame`] - Frame validation and assembly
//! - [`actuator`] - Kill flag, live outputs and setpoints
//! - [`protocol`] - Command decoding and dispatch
//! - [`watchdog`] - Heartbeat timeout and the zero/restore tick
//! - [`driver`] - Public `send`/`receive` facade
//! - [`config`] - Driver configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

extern crate alloc;

pub mod actuator;
pub mod checksum;
pub mod config;
pub mod driver;
pub mod frame;
pub mod protocol;
pub mod watchdog;

// Re-export main public types for convenience
pub use actuator::{ActuatorState, ThrusterIndex, ThrusterOutput, THRUSTER_COUNT};
pub use config::DriverConfig;
pub use driver::{DriverError, Exchange, SerialDriver};
pub use frame::{FloatByteOrder, HEARTBEAT_FRAME};
pub use protocol::{Command, KillSemantics, Response};
