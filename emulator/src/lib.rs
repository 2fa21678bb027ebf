// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! In-process emulation of pluggable optical transceiver modules.
//!
//! This crate lets module-management software be exercised without physical
//! hardware. A [`Module`] models one transceiver conforming to SFF-8472,
//! SFF-8636 or CMIS 4.0: its paged memory map, its live telemetry and the
//! monitoring engine that encodes it, the CMIS module and data-path state
//! machines, and the sideband signals of its cage. A [`Cage`] or [`Bus`]
//! wraps modules in the two-wire interface a host driver actually sees.
//!
//! The emulator is single-threaded and cooperative. Nothing happens in the
//! background: telemetry is re-encoded and state machines advance only on an
//! explicit [`tick`](Module::tick), which keeps tests deterministic.
//!
//! ```no_run
//! # fn main() -> Result<(), transceiver_emulator::Error> {
//! use transceiver_emulator::Cage;
//! use transceiver_emulator::FormFactor;
//! use transceiver_emulator::ManagementInterface;
//! use transceiver_emulator::Module;
//! use transceiver_emulator::ModuleConfig;
//!
//! let log = slog::Logger::root(slog::Discard, slog::o!());
//! let config = ModuleConfig::builder(FormFactor::Sfp, ManagementInterface::Sff8472)
//!     .vendor_name("Test Vendor")
//!     .part_number("SFP-SR-25G")
//!     .build()?;
//! let mut cage = Cage::new(&log);
//! cage.attach(Module::new(config, &log)?)?;
//! assert_eq!(cage.read_register(0xa0, 0)?, 0x03);
//! # Ok(())
//! # }
//! ```

mod bus;
mod config;
mod module;
mod monitor;
mod sideband;
mod state;
mod telemetry;

pub use bus::Bus;
pub use bus::Cage;
pub use bus::DEVICE_A0;
pub use bus::DEVICE_A2;
pub use bus::DEVICE_MGMT;
pub use config::ConfigBuilder;
pub use config::FormFactor;
pub use config::MediaType;
pub use config::ModuleConfig;
pub use module::Module;
pub use sideband::Direction;
pub use sideband::Level;
pub use sideband::Sideband;
pub use sideband::Signal;
pub use state::DataPathState;
pub use state::ModuleState;
pub use state::StateConfig;
pub use telemetry::FaultKind;
pub use telemetry::Telemetry;

pub use transceiver_map::layout::AlarmSet;
pub use transceiver_map::layout::Thresholds;
pub use transceiver_map::DateCode;
pub use transceiver_map::Error as MapError;
pub use transceiver_map::Identifier;
pub use transceiver_map::ManagementInterface;

/// An error related to emulated transceivers.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("memory map error")]
    Map(#[from] transceiver_map::Error),

    #[error("no module attached at the slot")]
    NoModule,

    #[error("slot {0} is not configured on this bus")]
    UnknownSlot(u8),

    #[error("slot {0} already has a module attached")]
    SlotOccupied(u8),

    #[error("device address 0x{0:02x} is not decoded by this module")]
    InvalidAddress(u8),

    #[error("control write has no effect in the current module state: {0}")]
    InvalidState(&'static str),

    #[error("lane {lane} out of range for a {n_lanes}-lane module")]
    InvalidLane { lane: u8, n_lanes: u8 },

    #[error("signal {0} is not driven by the host")]
    NotHostDriven(Signal),

    #[error("signal {0} is not wired on this form factor")]
    SignalNotWired(Signal),

    #[error("fault kind {0} is not modeled for this module family")]
    UnsupportedFault(FaultKind),

    #[error("invalid module configuration: {0}")]
    InvalidConfig(String),
}
