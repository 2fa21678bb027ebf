// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The module façade: one emulated transceiver per family.
//!
//! Per-family behavior lives in the layout factories and the state-machine
//! transition tables, so `Module` is a tagged variant over the three
//! families rather than a type hierarchy. Each variant composes a memory
//! map, live telemetry, the monitoring engine, and the sideband block; the
//! CMIS variant adds the module and data-path state machines.

mod cmis;
mod sff8472;
mod sff8636;

pub use cmis::CmisModule;
pub use sff8472::Sff8472Module;
pub use sff8636::Sff8636Module;

use crate::config::ModuleConfig;
use crate::state::DataPathState;
use crate::state::ModuleState;
use crate::telemetry::all_lanes;
use crate::telemetry::lane_mask;
use crate::telemetry::FaultKind;
use crate::telemetry::Telemetry;
use crate::Error;
use crate::Level;
use crate::Sideband;
use crate::Signal;
use slog::Logger;
use transceiver_map::ManagementInterface;

/// The management device address shared by SFF-8636 and CMIS modules.
pub const DEVICE_MGMT: u8 = transceiver_map::layout::sff8636::DEVICE;

/// One emulated transceiver module.
#[derive(Debug)]
pub enum Module {
    Sff8472(Sff8472Module),
    Sff8636(Sff8636Module),
    Cmis(CmisModule),
}

impl Module {
    /// Build a module from its configuration.
    pub fn new(config: ModuleConfig, log: &Logger) -> Result<Self, Error> {
        match config.interface {
            ManagementInterface::Sff8472 => Ok(Module::Sff8472(Sff8472Module::new(config, log)?)),
            ManagementInterface::Sff8636 => Ok(Module::Sff8636(Sff8636Module::new(config, log)?)),
            ManagementInterface::Cmis => Ok(Module::Cmis(CmisModule::new(config, log)?)),
        }
    }

    /// The module's configuration.
    pub fn config(&self) -> &ModuleConfig {
        match self {
            Module::Sff8472(m) => &m.config,
            Module::Sff8636(m) => &m.config,
            Module::Cmis(m) => &m.config,
        }
    }

    /// The management interface the module conforms to.
    pub fn interface(&self) -> ManagementInterface {
        self.config().interface
    }

    /// The module's live telemetry.
    pub fn telemetry(&self) -> &Telemetry {
        match self {
            Module::Sff8472(m) => &m.telemetry,
            Module::Sff8636(m) => &m.telemetry,
            Module::Cmis(m) => &m.telemetry,
        }
    }

    /// The sideband signal block.
    pub fn sideband(&self) -> &Sideband {
        match self {
            Module::Sff8472(m) => &m.sideband,
            Module::Sff8636(m) => &m.sideband,
            Module::Cmis(m) => &m.sideband,
        }
    }

    /// Mutable access to the sideband block, e.g. to register observers.
    pub fn sideband_mut(&mut self) -> &mut Sideband {
        match self {
            Module::Sff8472(m) => &mut m.sideband,
            Module::Sff8636(m) => &mut m.sideband,
            Module::Cmis(m) => &mut m.sideband,
        }
    }

    /// Advance simulated time by one tick.
    ///
    /// Within a tick, telemetry is re-encoded first, flags re-evaluated
    /// second, and (on CMIS) the state machines stepped last.
    pub fn tick(&mut self) {
        match self {
            Module::Sff8472(m) => m.tick(),
            Module::Sff8636(m) => m.tick(),
            Module::Cmis(m) => m.tick(),
        }
    }

    /// A host read through the two-wire interface.
    pub fn read(&mut self, dev_addr: u8, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        match self {
            Module::Sff8472(m) => m.read(dev_addr, offset, len),
            Module::Sff8636(m) => m.read(dev_addr, offset, len),
            Module::Cmis(m) => m.read(dev_addr, offset, len),
        }
    }

    /// A host write through the two-wire interface.
    pub fn write(&mut self, dev_addr: u8, offset: u8, data: &[u8]) -> Result<(), Error> {
        match self {
            Module::Sff8472(m) => m.write(dev_addr, offset, data),
            Module::Sff8636(m) => m.write(dev_addr, offset, data),
            Module::Cmis(m) => m.write(dev_addr, offset, data),
        }
    }

    /// A host-driven sideband transition.
    pub fn set_host_signal(&mut self, signal: Signal, level: Level) -> Result<(), Error> {
        match self {
            Module::Sff8472(m) => m.set_host_signal(signal, level),
            Module::Sff8636(m) => m.set_host_signal(signal, level),
            Module::Cmis(m) => m.set_host_signal(signal, level),
        }
    }

    /// Set the case temperature, degrees C.
    ///
    /// The raw registers update on the next [`tick`](Self::tick).
    pub fn set_temperature(&mut self, degrees: f32) {
        self.telemetry_mut().temperature_c = degrees;
    }

    /// Set the supply voltage, Volts.
    pub fn set_voltage(&mut self, volts: f32) {
        self.telemetry_mut().supply_voltage_v = volts;
    }

    /// Set one lane's transmit power, mW.
    pub fn set_tx_power(&mut self, lane: u8, milliwatts: f32) -> Result<(), Error> {
        lane_mask(lane, self.config().n_lanes)?;
        self.telemetry_mut().tx_power_mw[usize::from(lane)] = milliwatts;
        Ok(())
    }

    /// Set one lane's receive power, mW.
    pub fn set_rx_power(&mut self, lane: u8, milliwatts: f32) -> Result<(), Error> {
        lane_mask(lane, self.config().n_lanes)?;
        self.telemetry_mut().rx_power_mw[usize::from(lane)] = milliwatts;
        Ok(())
    }

    /// Set one lane's laser bias current, mA.
    pub fn set_tx_bias(&mut self, lane: u8, milliamps: f32) -> Result<(), Error> {
        lane_mask(lane, self.config().n_lanes)?;
        self.telemetry_mut().tx_bias_ma[usize::from(lane)] = milliamps;
        Ok(())
    }

    /// Inject or clear a fault affecting the whole module.
    ///
    /// Lane kinds apply to every lane. Threshold kinds move the underlying
    /// telemetry past the configured threshold and surface on the next
    /// tick; lane kinds latch their status flags immediately, bypassing the
    /// monitoring engine.
    pub fn simulate_fault(&mut self, kind: FaultKind, active: bool) -> Result<(), Error> {
        if kind.is_lane_fault() {
            let mask = all_lanes(self.config().n_lanes);
            return self.apply_lane_fault(mask, kind, active);
        }
        if kind == FaultKind::ModuleFault {
            return match self {
                Module::Cmis(m) => {
                    if active {
                        m.latch_module_fault();
                    }
                    Ok(())
                }
                _ => Err(Error::UnsupportedFault(kind)),
            };
        }
        match self {
            Module::Sff8472(m) => {
                m.telemetry
                    .apply_threshold_fault(kind, active, &m.config.thresholds);
            }
            Module::Sff8636(m) => {
                m.telemetry
                    .apply_threshold_fault(kind, active, &m.config.thresholds);
            }
            Module::Cmis(m) => {
                m.telemetry
                    .apply_threshold_fault(kind, active, &m.config.thresholds);
            }
        }
        Ok(())
    }

    /// Inject or clear a fault on a single lane.
    pub fn simulate_lane_fault(
        &mut self,
        lane: u8,
        kind: FaultKind,
        active: bool,
    ) -> Result<(), Error> {
        if !kind.is_lane_fault() {
            return Err(Error::UnsupportedFault(kind));
        }
        let mask = lane_mask(lane, self.config().n_lanes)?;
        self.apply_lane_fault(mask, kind, active)
    }

    fn apply_lane_fault(&mut self, mask: u8, kind: FaultKind, active: bool) -> Result<(), Error> {
        match self {
            Module::Sff8472(m) => m.apply_lane_fault(mask, kind, active),
            Module::Sff8636(m) => m.apply_lane_fault(mask, kind, active),
            Module::Cmis(m) => m.apply_lane_fault(mask, kind, active),
        }
        Ok(())
    }

    /// Rewrite the checksum registers after register mutations.
    pub fn refresh_checksums(&mut self) {
        match self {
            Module::Sff8472(m) => m.refresh_checksums(),
            Module::Sff8636(m) => m.refresh_checksums(),
            Module::Cmis(m) => m.refresh_checksums(),
        }
    }

    /// The CMIS module state, if this is a CMIS module.
    pub fn state(&self) -> Option<ModuleState> {
        match self {
            Module::Cmis(m) => Some(m.state()),
            _ => None,
        }
    }

    /// The CMIS data-path state of one lane, if this is a CMIS module.
    pub fn lane_state(&self, lane: u8) -> Option<DataPathState> {
        match self {
            Module::Cmis(m) if lane < m.config.n_lanes => {
                Some(m.lane_state(usize::from(lane)))
            }
            _ => None,
        }
    }

    /// The application selector code applied to one lane's data path, if
    /// this is a CMIS module.
    pub fn active_application(&self, lane: u8) -> Option<u8> {
        match self {
            Module::Cmis(m) if lane < m.config.n_lanes => {
                Some(m.active_application(usize::from(lane)))
            }
            _ => None,
        }
    }

    fn telemetry_mut(&mut self) -> &mut Telemetry {
        match self {
            Module::Sff8472(m) => &mut m.telemetry,
            Module::Sff8636(m) => &mut m.telemetry,
            Module::Cmis(m) => &mut m.telemetry,
        }
    }
}
