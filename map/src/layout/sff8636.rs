// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The SFF-8636 memory map for QSFP+ and QSFP28 modules.
//!
//! A single device address with paged upper memory. The lower page carries
//! status, latched interrupt flags, free-side and per-channel monitors, and
//! the control bytes; upper page 00h carries the serial-ID data and 03h the
//! alarm/warning thresholds. Field locations follow SFF-8636 rev 2.10a
//! section 6.2.

use crate::encode;
use crate::layout::threshold_quad;
use crate::layout::ModuleInfo;
use crate::layout::QuadFlags;
use crate::layout::Thresholds;
use crate::Access;
use crate::MemoryMap;
use crate::PageRef;
use crate::WritePolicy;

/// The single two-wire device address of an SFF-8636 module.
pub const DEVICE: u8 = 0x50;

/// The number of channels the channel registers describe.
pub const N_LANES: usize = 4;

// Lower page offsets.
pub const IDENTIFIER: u8 = 0;
pub const REVISION_COMPLIANCE: u8 = 1;
pub const STATUS: u8 = 2;
pub const LOS_FLAGS: u8 = 3;
pub const TX_FAULT_FLAGS: u8 = 4;
pub const TEMP_FLAGS: u8 = 6;
pub const VCC_FLAGS: u8 = 7;
pub const RX_POWER_FLAGS: u8 = 9;
pub const TX_BIAS_FLAGS: u8 = 11;
pub const TX_POWER_FLAGS: u8 = 13;
pub const TEMPERATURE: u8 = 22;
pub const VOLTAGE: u8 = 26;
pub const RX_POWER: u8 = 34;
pub const TX_BIAS: u8 = 42;
pub const TX_POWER: u8 = 50;
pub const TX_DISABLE: u8 = 86;
pub const RATE_SELECT_RX: u8 = 87;
pub const RATE_SELECT_TX: u8 = 88;
pub const POWER_CONTROL: u8 = 93;

/// The span of latched interrupt-flag bytes, cleared by a host read.
pub const FLAG_SPAN: core::ops::RangeInclusive<u8> = 3..=21;

// Status byte bits.
pub const STATUS_DATA_NOT_READY: u8 = 0b0000_0001;
pub const STATUS_INTL: u8 = 0b0000_0010;
pub const STATUS_FLAT_MEM: u8 = 0b0000_0100;

/// Upper page 00h: serial-ID data.
pub mod page00 {
    pub const IDENTIFIER: u8 = 128;
    pub const EXT_IDENTIFIER: u8 = 129;
    pub const CONNECTOR: u8 = 130;
    pub const SPEC_COMPLIANCE: u8 = 131;
    pub const ENCODING: u8 = 139;
    pub const BIT_RATE_NOMINAL: u8 = 140;
    pub const VENDOR_NAME: u8 = 148;
    pub const VENDOR_OUI: u8 = 165;
    pub const VENDOR_PART: u8 = 168;
    pub const VENDOR_REVISION: u8 = 184;
    pub const WAVELENGTH: u8 = 186;
    pub const CC_BASE: u8 = 191;
    pub const ADVERTISED_PAGES: u8 = 195;
    pub const VENDOR_SERIAL: u8 = 196;
    pub const DATE_CODE: u8 = 212;
    pub const DIAGNOSTIC_MONITORING_TYPE: u8 = 220;
    pub const ENHANCED_OPTIONS: u8 = 221;
    pub const CC_EXT: u8 = 223;
}

/// Upper page 03h: alarm/warning thresholds.
pub mod page03 {
    pub const TEMP_THRESHOLDS: u8 = 128;
    pub const VCC_THRESHOLDS: u8 = 144;
    pub const RX_POWER_THRESHOLDS: u8 = 176;
    pub const TX_BIAS_THRESHOLDS: u8 = 184;
    pub const TX_POWER_THRESHOLDS: u8 = 192;
}

/// Pack per-lane flag quads into the two-byte nibble layout of the channel
/// flag registers: lane 0 takes the high nibble of the first byte, and each
/// nibble reads high alarm, low alarm, high warning, low warning from the
/// MSB down.
pub fn lane_flag_bytes(quads: &[QuadFlags; N_LANES]) -> [u8; 2] {
    [
        quads[0].nibble() << 4 | quads[1].nibble(),
        quads[2].nibble() << 4 | quads[3].nibble(),
    ]
}

/// The module-level flag nibble layout used by the temperature and supply
/// voltage flag bytes: bits 7..4 are high alarm, low alarm, high warning,
/// low warning.
pub fn module_flag_byte(quad: &QuadFlags) -> u8 {
    quad.nibble() << 4
}

// SFF-8636 encodes wavelength in units of 0.05 nm.
fn wavelength(nm: Option<f32>) -> [u8; 2] {
    let units = (nm.unwrap_or(0.0) * 20.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    units.to_be_bytes()
}

/// Build the SFF-8636 memory map: lower page plus upper pages 00h and 03h.
pub fn map(info: &ModuleInfo, thresholds: &Thresholds) -> MemoryMap {
    let mut map = MemoryMap::paged(WritePolicy::SilentDrop);
    map.install_page(0x00).unwrap();
    map.install_page(0x03).unwrap();

    let lower = PageRef::Lower;
    map.set_access(lower, 0..=85, Access::ReadOnly).unwrap();
    map.set_access(lower, 86..=99, Access::ReadWrite).unwrap();

    map.store_byte(lower, IDENTIFIER, info.identifier.into())
        .unwrap();
    map.store_byte(lower, REVISION_COMPLIANCE, 0x08).unwrap();
    // Paged memory, interrupt deasserted, data ready.
    map.store_byte(lower, STATUS, 0x00).unwrap();

    let page = PageRef::upper(0x00);
    map.set_access(page, 128..=255, Access::ReadOnly).unwrap();
    map.store_byte(page, page00::IDENTIFIER, info.identifier.into())
        .unwrap();
    map.store_byte(page, page00::CONNECTOR, info.connector)
        .unwrap();
    map.store_byte(page, page00::SPEC_COMPLIANCE, info.media_interface)
        .unwrap();
    map.store_byte(page, page00::ENCODING, 0x05).unwrap();
    map.store_byte(
        page,
        page00::BIT_RATE_NOMINAL,
        super::nominal_bit_rate(info.bit_rate_gbps),
    )
    .unwrap();
    map.store(page, page00::VENDOR_NAME, &info.identity.name)
        .unwrap();
    map.store(page, page00::VENDOR_OUI, &info.identity.oui)
        .unwrap();
    map.store(page, page00::VENDOR_PART, &info.identity.part)
        .unwrap();
    map.store(page, page00::VENDOR_REVISION, &info.identity.revision[..2])
        .unwrap();
    map.store(page, page00::WAVELENGTH, &wavelength(info.wavelength_nm))
        .unwrap();
    map.store(page, page00::VENDOR_SERIAL, &info.identity.serial)
        .unwrap();
    map.store(page, page00::DATE_CODE, &info.identity.date)
        .unwrap();
    if info.has_dom {
        // Average Rx power measurement.
        map.store_byte(page, page00::DIAGNOSTIC_MONITORING_TYPE, 0x04)
            .unwrap();
    }

    let page = PageRef::upper(0x03);
    map.set_access(page, 128..=255, Access::ReadOnly).unwrap();
    map.store(
        page,
        page03::TEMP_THRESHOLDS,
        &threshold_quad(&thresholds.temperature, encode::temperature),
    )
    .unwrap();
    map.store(
        page,
        page03::VCC_THRESHOLDS,
        &threshold_quad(&thresholds.supply_voltage, encode::supply_voltage),
    )
    .unwrap();
    map.store(
        page,
        page03::RX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.rx_power, encode::optical_power),
    )
    .unwrap();
    map.store(
        page,
        page03::TX_BIAS_THRESHOLDS,
        &threshold_quad(&thresholds.tx_bias, encode::bias_current),
    )
    .unwrap();
    map.store(
        page,
        page03::TX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.tx_power, encode::optical_power),
    )
    .unwrap();

    refresh_checksums(&mut map);
    map
}

/// Rewrite the page 00h CC_BASE and CC_EXT checksum bytes.
pub fn refresh_checksums(map: &mut MemoryMap) {
    let page = PageRef::upper(0x00);
    let base = map.checksum(page, 128..=190).unwrap();
    map.store_byte(page, page00::CC_BASE, base).unwrap();
    let ext = map.checksum(page, 192..=222).unwrap();
    map.store_byte(page, page00::CC_EXT, ext).unwrap();
}
