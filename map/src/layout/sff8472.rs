// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The SFF-8472 memory maps for SFP modules.
//!
//! SFF-8472 splits module management across two two-wire device addresses:
//! A0h holds the read-only serial-ID data, and A2h holds the digital
//! diagnostics (thresholds, calibration constants, real-time monitors,
//! status/control, and the user-writable EEPROM). See SFF-8472 rev 12.4
//! tables 4-1 and 9-1 for the field locations reproduced here.

use crate::encode;
use crate::layout::threshold_quad;
use crate::layout::ModuleInfo;
use crate::layout::Thresholds;
use crate::Access;
use crate::MemoryMap;
use crate::PageRef;
use crate::WritePolicy;

/// The two-wire device address of the serial-ID map.
pub const DEVICE_A0: u8 = 0xa0;

/// The two-wire device address of the diagnostics map.
pub const DEVICE_A2: u8 = 0xa2;

// A0h field offsets.
pub const IDENTIFIER: u8 = 0;
pub const EXT_IDENTIFIER: u8 = 1;
pub const CONNECTOR: u8 = 2;
pub const TRANSCEIVER: u8 = 3;
pub const ENCODING: u8 = 11;
pub const BIT_RATE_NOMINAL: u8 = 12;
pub const VENDOR_NAME: u8 = 20;
pub const VENDOR_OUI: u8 = 37;
pub const VENDOR_PART: u8 = 40;
pub const VENDOR_REVISION: u8 = 56;
pub const WAVELENGTH: u8 = 60;
pub const CC_BASE: u8 = 63;
pub const OPTIONS: u8 = 64;
pub const VENDOR_SERIAL: u8 = 68;
pub const DATE_CODE: u8 = 84;
pub const DIAGNOSTIC_MONITORING_TYPE: u8 = 92;
pub const ENHANCED_OPTIONS: u8 = 93;
pub const SFF8472_COMPLIANCE: u8 = 94;
pub const CC_EXT: u8 = 95;

// A2h field offsets.
pub const TEMP_THRESHOLDS: u8 = 0;
pub const VCC_THRESHOLDS: u8 = 8;
pub const TX_BIAS_THRESHOLDS: u8 = 16;
pub const TX_POWER_THRESHOLDS: u8 = 24;
pub const RX_POWER_THRESHOLDS: u8 = 32;
pub const RX_POWER_CAL: u8 = 56;
pub const TX_BIAS_CAL: u8 = 76;
pub const TX_POWER_CAL: u8 = 80;
pub const TEMP_CAL: u8 = 84;
pub const VCC_CAL: u8 = 88;
pub const TEMPERATURE: u8 = 96;
pub const VOLTAGE: u8 = 98;
pub const TX_BIAS: u8 = 100;
pub const TX_POWER: u8 = 102;
pub const RX_POWER: u8 = 104;
pub const STATUS_CONTROL: u8 = 110;
pub const ALARM_FLAGS: u8 = 112;
pub const WARNING_FLAGS: u8 = 116;
pub const USER_EEPROM_START: u8 = 128;
pub const USER_EEPROM_END: u8 = 247;

bitflags::bitflags! {
    /// The A2h status/control byte at offset 110.
    ///
    /// Only the soft TX-disable select is host-writable; the module owns the
    /// remaining bits.
    pub struct StatusControl: u8 {
        const TX_DISABLE_STATE = 0b1000_0000;
        const SOFT_TX_DISABLE = 0b0100_0000;
        const RATE_SELECT_STATE = 0b0001_0000;
        const TX_FAULT = 0b0000_0100;
        const RX_LOS = 0b0000_0010;
        const DATA_READY_BAR = 0b0000_0001;
    }
}

bitflags::bitflags! {
    /// The first alarm or warning flag byte (offsets 112 and 116).
    pub struct MonitorFlags1: u8 {
        const TEMP_HIGH = 0b1000_0000;
        const TEMP_LOW = 0b0100_0000;
        const VCC_HIGH = 0b0010_0000;
        const VCC_LOW = 0b0001_0000;
        const TX_BIAS_HIGH = 0b0000_1000;
        const TX_BIAS_LOW = 0b0000_0100;
        const TX_POWER_HIGH = 0b0000_0010;
        const TX_POWER_LOW = 0b0000_0001;
    }
}

bitflags::bitflags! {
    /// The second alarm or warning flag byte (offsets 113 and 117).
    pub struct MonitorFlags2: u8 {
        const RX_POWER_HIGH = 0b1000_0000;
        const RX_POWER_LOW = 0b0100_0000;
    }
}

/// Build the A0h serial-ID map.
///
/// The entire map is read-only to the host; bytes 128..=255 are the
/// vendor-specific area and stay reserved.
pub fn id_map(info: &ModuleInfo) -> MemoryMap {
    let mut map = MemoryMap::flat(WritePolicy::SilentDrop);
    map.set_access(PageRef::Lower, 0..=127, Access::ReadOnly)
        .unwrap();

    let lower = PageRef::Lower;
    map.store_byte(lower, IDENTIFIER, info.identifier.into())
        .unwrap();
    // Ext identifier: serial ID per SFF-8472.
    map.store_byte(lower, EXT_IDENTIFIER, 0x04).unwrap();
    map.store_byte(lower, CONNECTOR, info.connector).unwrap();
    map.store_byte(lower, TRANSCEIVER, info.media_interface)
        .unwrap();
    let encoding = if info.bit_rate_gbps >= 10.0 { 0x06 } else { 0x01 };
    map.store_byte(lower, ENCODING, encoding).unwrap();
    map.store_byte(
        lower,
        BIT_RATE_NOMINAL,
        super::nominal_bit_rate(info.bit_rate_gbps),
    )
    .unwrap();
    map.store(lower, VENDOR_NAME, &info.identity.name).unwrap();
    map.store(lower, VENDOR_OUI, &info.identity.oui).unwrap();
    map.store(lower, VENDOR_PART, &info.identity.part).unwrap();
    map.store(lower, VENDOR_REVISION, &info.identity.revision)
        .unwrap();
    map.store(lower, WAVELENGTH, &super::wavelength(info.wavelength_nm))
        .unwrap();
    // Options: TX_DISABLE, TX_FAULT and LOS signals implemented.
    map.store(lower, OPTIONS, &[0x00, 0x2a]).unwrap();
    map.store(lower, VENDOR_SERIAL, &info.identity.serial)
        .unwrap();
    map.store(lower, DATE_CODE, &info.identity.date).unwrap();
    if info.has_dom {
        // DDM implemented, internally calibrated.
        map.store_byte(lower, DIAGNOSTIC_MONITORING_TYPE, 0x60)
            .unwrap();
        // Alarm/warning flags plus soft TX_DISABLE / TX_FAULT / RX_LOS.
        map.store_byte(lower, ENHANCED_OPTIONS, 0xf0).unwrap();
    }
    map.store_byte(lower, SFF8472_COMPLIANCE, 0x08).unwrap();

    refresh_id_checksums(&mut map);
    map
}

/// Rewrite the A0h CC_BASE and CC_EXT checksum bytes.
pub fn refresh_id_checksums(map: &mut MemoryMap) {
    let base = map.checksum(PageRef::Lower, 0..=62).unwrap();
    map.store_byte(PageRef::Lower, CC_BASE, base).unwrap();
    let ext = map.checksum(PageRef::Lower, 64..=94).unwrap();
    map.store_byte(PageRef::Lower, CC_EXT, ext).unwrap();
}

/// Build the A2h diagnostics map.
///
/// Thresholds, calibration constants and real-time monitors are read-only;
/// the status/control byte and the user EEPROM at 128..=247 are writable.
pub fn diagnostic_map(thresholds: &Thresholds) -> MemoryMap {
    let mut map = MemoryMap::flat(WritePolicy::SilentDrop);
    let lower = PageRef::Lower;

    map.set_access(lower, 0..=109, Access::ReadOnly).unwrap();
    map.set_access(lower, STATUS_CONTROL..=STATUS_CONTROL, Access::ReadWrite)
        .unwrap();
    map.set_access(lower, ALARM_FLAGS..=117, Access::ReadOnly)
        .unwrap();
    map.set_access(
        PageRef::upper(0),
        USER_EEPROM_START..=USER_EEPROM_END,
        Access::ReadWrite,
    )
    .unwrap();
    map.set_access(PageRef::upper(0), 248..=255, Access::ReadOnly)
        .unwrap();

    map.store(
        lower,
        TEMP_THRESHOLDS,
        &threshold_quad(&thresholds.temperature, encode::temperature),
    )
    .unwrap();
    map.store(
        lower,
        VCC_THRESHOLDS,
        &threshold_quad(&thresholds.supply_voltage, encode::supply_voltage),
    )
    .unwrap();
    map.store(
        lower,
        TX_BIAS_THRESHOLDS,
        &threshold_quad(&thresholds.tx_bias, encode::bias_current),
    )
    .unwrap();
    map.store(
        lower,
        TX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.tx_power, encode::optical_power),
    )
    .unwrap();
    map.store(
        lower,
        RX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.rx_power, encode::optical_power),
    )
    .unwrap();

    // Internally-calibrated modules still carry the external-calibration
    // constants, fixed at identity: Rx_PWR(1) = 1.0 and unity slopes.
    let mut rx_cal = [0u8; 20];
    rx_cal[12..16].copy_from_slice(&1.0f32.to_be_bytes());
    map.store(lower, RX_POWER_CAL, &rx_cal).unwrap();
    for offset in [TX_BIAS_CAL, TX_POWER_CAL, TEMP_CAL, VCC_CAL] {
        // Unity slope in unsigned fixed 8.8, zero offset.
        map.store(lower, offset, &[0x01, 0x00, 0x00, 0x00]).unwrap();
    }

    map
}
