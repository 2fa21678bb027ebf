// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Concrete register layouts for the supported management specifications.
//!
//! Each submodule names the register locations of one specification and
//! provides a factory that builds a fully-populated [`MemoryMap`] from a
//! module's static description: identity strings in their fixed-width
//! fields, capability and advertisement bytes, alarm thresholds in their
//! raw encodings, and checksums over the spans the specification defines.
//!
//! [`MemoryMap`]: crate::MemoryMap

pub mod cmis;
pub mod sff8472;
pub mod sff8636;

use crate::Identifier;
use crate::Identity;

/// The static description a layout factory populates a map from.
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    /// The SFF-8024 identifier, byte 0 of every map.
    pub identifier: Identifier,
    /// Vendor identity strings.
    pub identity: Identity,
    /// The SFF-8024 connector type code.
    pub connector: u8,
    /// The media/compliance code advertised by the module.
    pub media_interface: u8,
    /// Nominal bit rate, Gb/s.
    pub bit_rate_gbps: f32,
    /// The set of rates the module can run, Gb/s. Drives CMIS application
    /// advertising.
    pub supported_rates_gbps: Vec<f32>,
    /// Number of lanes: 1 (SFP), 4 (QSFP), or 8 (OSFP).
    pub n_lanes: u8,
    /// Nominal laser wavelength, nm. `None` for copper cables.
    pub wavelength_nm: Option<f32>,
    /// Maximum power draw, Watts.
    pub max_power_w: f32,
    /// Maximum case temperature, degrees C.
    pub max_case_temp_c: f32,
    /// Whether digital diagnostic monitoring is implemented.
    pub has_dom: bool,
}

/// One monitored quantity's alarm and warning thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlarmSet {
    pub high_alarm: f32,
    pub low_alarm: f32,
    pub high_warning: f32,
    pub low_warning: f32,
}

impl AlarmSet {
    pub const fn new(high_alarm: f32, low_alarm: f32, high_warning: f32, low_warning: f32) -> Self {
        Self {
            high_alarm,
            low_alarm,
            high_warning,
            low_warning,
        }
    }
}

/// The full set of alarm/warning thresholds written into a module's
/// threshold registers.
///
/// The monitoring engine compares live telemetry against the thresholds *as
/// stored in the map*, so these are authoritative only at module build time.
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// Degrees C.
    pub temperature: AlarmSet,
    /// Volts.
    pub supply_voltage: AlarmSet,
    /// Milliamps.
    pub tx_bias: AlarmSet,
    /// Milliwatts.
    pub tx_power: AlarmSet,
    /// Milliwatts.
    pub rx_power: AlarmSet,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: AlarmSet::new(75.0, -5.0, 70.0, 0.0),
            supply_voltage: AlarmSet::new(3.6, 3.0, 3.5, 3.1),
            tx_bias: AlarmSet::new(80.0, 4.0, 70.0, 6.0),
            tx_power: AlarmSet::new(1.5, 0.05, 1.2, 0.1),
            rx_power: AlarmSet::new(1.5, 0.01, 1.2, 0.02),
        }
    }
}

/// The outcome of comparing one monitored value against an [`AlarmSet`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QuadFlags {
    pub high_alarm: bool,
    pub low_alarm: bool,
    pub high_warning: bool,
    pub low_warning: bool,
}

impl QuadFlags {
    /// Compare a monitored value against its thresholds.
    ///
    /// High comparisons are strictly greater-than, low comparisons strictly
    /// less-than.
    pub fn evaluate(value: f32, set: &AlarmSet) -> Self {
        Self {
            high_alarm: value > set.high_alarm,
            low_alarm: value < set.low_alarm,
            high_warning: value > set.high_warning,
            low_warning: value < set.low_warning,
        }
    }

    /// The 4-bit register encoding: high alarm, low alarm, high warning,
    /// low warning from the MSB down.
    pub fn nibble(&self) -> u8 {
        u8::from(self.high_alarm) << 3
            | u8::from(self.low_alarm) << 2
            | u8::from(self.high_warning) << 1
            | u8::from(self.low_warning)
    }

    /// True if any alarm or warning is raised.
    pub fn any(&self) -> bool {
        self.high_alarm || self.low_alarm || self.high_warning || self.low_warning
    }
}

// Encode one threshold quad in its register order: high alarm, low alarm,
// high warning, low warning.
pub(crate) fn threshold_quad(set: &AlarmSet, enc: fn(f32) -> [u8; 2]) -> [u8; 8] {
    let mut out = [0; 8];
    out[0..2].copy_from_slice(&enc(set.high_alarm));
    out[2..4].copy_from_slice(&enc(set.low_alarm));
    out[4..6].copy_from_slice(&enc(set.high_warning));
    out[6..8].copy_from_slice(&enc(set.low_warning));
    out
}

// The nominal-bit-rate byte shared by SFF-8472 and SFF-8636, in units of
// 100 Mb/s, saturating at 0xff.
pub(crate) fn nominal_bit_rate(gbps: f32) -> u8 {
    (gbps * 10.0).round().clamp(0.0, 255.0) as u8
}

// The wavelength field shared by the serial-ID pages, in whole nm.
pub(crate) fn wavelength(nm: Option<f32>) -> [u8; 2] {
    let nm = nm.unwrap_or(0.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    nm.to_be_bytes()
}
