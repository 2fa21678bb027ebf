// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The live, semantic telemetry behind a module's monitor registers.
//!
//! Test scenarios mutate these values through the module façade; the
//! monitoring engine encodes them into raw register bytes on each tick.

use crate::Error;
use serde::Deserialize;
use serde::Serialize;
use transceiver_map::layout::Thresholds;

/// Nominal case temperature of an idle module, degrees C.
pub const DEFAULT_TEMPERATURE_C: f32 = 25.0;

/// Nominal supply voltage, Volts.
pub const DEFAULT_VOLTAGE_V: f32 = 3.3;

/// Typical laser bias current for an optical module, mA.
pub const DEFAULT_TX_BIAS_MA: f32 = 30.0;

/// Typical transmit power for an optical module, mW.
pub const DEFAULT_TX_POWER_MW: f32 = 0.5;

/// Typical receive power for an optical module, mW.
pub const DEFAULT_RX_POWER_MW: f32 = 0.4;

/// Live monitored values for one module.
#[derive(Clone, Debug, PartialEq)]
pub struct Telemetry {
    /// Case temperature, degrees C.
    pub temperature_c: f32,
    /// Supply voltage, Volts.
    pub supply_voltage_v: f32,
    /// Per-lane laser bias current, mA.
    pub tx_bias_ma: Vec<f32>,
    /// Per-lane transmit power, mW.
    pub tx_power_mw: Vec<f32>,
    /// Per-lane receive power, mW.
    pub rx_power_mw: Vec<f32>,
}

impl Telemetry {
    /// Nominal telemetry for a fresh module.
    ///
    /// Copper cables have no laser, so their optical values are zero.
    pub(crate) fn new(n_lanes: u8, optical: bool) -> Self {
        let n = usize::from(n_lanes);
        let (bias, tx, rx) = if optical {
            (DEFAULT_TX_BIAS_MA, DEFAULT_TX_POWER_MW, DEFAULT_RX_POWER_MW)
        } else {
            (0.0, 0.0, 0.0)
        };
        Self {
            temperature_c: DEFAULT_TEMPERATURE_C,
            supply_voltage_v: DEFAULT_VOLTAGE_V,
            tx_bias_ma: vec![bias; n],
            tx_power_mw: vec![tx; n],
            rx_power_mw: vec![rx; n],
        }
    }

    // Drive a threshold-kind fault by pushing the stored telemetry past the
    // configured alarm threshold, or restoring the nominal value.
    pub(crate) fn apply_threshold_fault(
        &mut self,
        kind: FaultKind,
        active: bool,
        thresholds: &Thresholds,
    ) {
        match kind {
            FaultKind::TempHigh => {
                self.temperature_c = if active {
                    thresholds.temperature.high_alarm + 5.0
                } else {
                    DEFAULT_TEMPERATURE_C
                };
            }
            FaultKind::TempLow => {
                self.temperature_c = if active {
                    thresholds.temperature.low_alarm - 5.0
                } else {
                    DEFAULT_TEMPERATURE_C
                };
            }
            FaultKind::VccHigh => {
                self.supply_voltage_v = if active {
                    thresholds.supply_voltage.high_alarm + 0.2
                } else {
                    DEFAULT_VOLTAGE_V
                };
            }
            FaultKind::VccLow => {
                self.supply_voltage_v = if active {
                    thresholds.supply_voltage.low_alarm - 0.2
                } else {
                    DEFAULT_VOLTAGE_V
                };
            }
            // Lane faults latch flags instead of moving telemetry.
            FaultKind::TxFault | FaultKind::RxLos | FaultKind::ModuleFault => {}
        }
    }
}

/// A fault condition a test scenario can inject.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A transmitter fault on one or all lanes.
    TxFault,
    /// Receiver loss of signal on one or all lanes.
    RxLos,
    /// Case temperature above the high-alarm threshold.
    TempHigh,
    /// Case temperature below the low-alarm threshold.
    TempLow,
    /// Supply voltage above the high-alarm threshold.
    VccHigh,
    /// Supply voltage below the low-alarm threshold.
    VccLow,
    /// A latched module-level fault (CMIS `MODULE_FAULT`).
    ModuleFault,
}

impl FaultKind {
    /// True for the per-lane kinds.
    pub const fn is_lane_fault(&self) -> bool {
        matches!(self, FaultKind::TxFault | FaultKind::RxLos)
    }
}

impl core::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            FaultKind::TxFault => write!(f, "tx_fault"),
            FaultKind::RxLos => write!(f, "rx_los"),
            FaultKind::TempHigh => write!(f, "temp_high"),
            FaultKind::TempLow => write!(f, "temp_low"),
            FaultKind::VccHigh => write!(f, "vcc_high"),
            FaultKind::VccLow => write!(f, "vcc_low"),
            FaultKind::ModuleFault => write!(f, "module_fault"),
        }
    }
}

/// Latched fault state, per lane where the condition is per-lane.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct FaultState {
    /// Lanes with an active transmitter fault.
    pub tx_fault: u8,
    /// Lanes with receiver loss of signal.
    pub rx_los: u8,
}

impl FaultState {
    pub(crate) fn set_lanes(&mut self, kind: FaultKind, mask: u8, active: bool) {
        let field = match kind {
            FaultKind::TxFault => &mut self.tx_fault,
            FaultKind::RxLos => &mut self.rx_los,
            _ => return,
        };
        if active {
            *field |= mask;
        } else {
            *field &= !mask;
        }
    }
}

/// The bit mask addressing every lane of an `n_lanes` module.
pub(crate) fn all_lanes(n_lanes: u8) -> u8 {
    if n_lanes >= 8 {
        0xff
    } else {
        (1u8 << n_lanes) - 1
    }
}

/// The bit mask addressing a single lane, validated against the lane count.
pub(crate) fn lane_mask(lane: u8, n_lanes: u8) -> Result<u8, Error> {
    if lane < n_lanes {
        Ok(1 << lane)
    } else {
        Err(Error::InvalidLane { lane, n_lanes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let telemetry = Telemetry::new(4, true);
        assert_eq!(telemetry.temperature_c, DEFAULT_TEMPERATURE_C);
        assert_eq!(telemetry.tx_power_mw, vec![DEFAULT_TX_POWER_MW; 4]);

        let copper = Telemetry::new(1, false);
        assert_eq!(copper.tx_bias_ma, vec![0.0]);
    }

    #[test]
    fn test_threshold_fault_moves_telemetry() {
        let thresholds = Thresholds::default();
        let mut telemetry = Telemetry::new(1, true);
        telemetry.apply_threshold_fault(FaultKind::TempHigh, true, &thresholds);
        assert!(telemetry.temperature_c > thresholds.temperature.high_alarm);
        telemetry.apply_threshold_fault(FaultKind::TempHigh, false, &thresholds);
        assert_eq!(telemetry.temperature_c, DEFAULT_TEMPERATURE_C);
    }

    #[test]
    fn test_lane_masks() {
        assert_eq!(all_lanes(1), 0x01);
        assert_eq!(all_lanes(4), 0x0f);
        assert_eq!(all_lanes(8), 0xff);
        assert_eq!(lane_mask(2, 4).unwrap(), 0x04);
        assert_eq!(
            lane_mask(4, 4).unwrap_err(),
            Error::InvalidLane { lane: 4, n_lanes: 4 }
        );
    }

    #[test]
    fn test_fault_state_masks() {
        let mut faults = FaultState::default();
        faults.set_lanes(FaultKind::TxFault, 0x03, true);
        assert_eq!(faults.tx_fault, 0x03);
        faults.set_lanes(FaultKind::TxFault, 0x01, false);
        assert_eq!(faults.tx_fault, 0x02);
    }
}
