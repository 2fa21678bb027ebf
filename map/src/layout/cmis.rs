// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The CMIS 4.0 memory map for QSFP-DD and OSFP modules.
//!
//! A single device address with banked upper memory. The lower page carries
//! the module state byte, latched flags, module-level monitors, the global
//! control byte and the application advertisements; upper pages 00h--02h
//! carry administrative data and thresholds; banked pages 10h/11h carry
//! per-lane control and status.

use crate::encode;
use crate::layout::threshold_quad;
use crate::layout::ModuleInfo;
use crate::layout::QuadFlags;
use crate::layout::Thresholds;
use crate::Access;
use crate::MemoryMap;
use crate::PageRef;
use crate::WritePolicy;

/// The single two-wire device address of a CMIS module.
pub const DEVICE: u8 = 0x50;

/// The number of lanes one bank of the lane pages describes.
pub const LANES_PER_BANK: u8 = 8;

// Lower page offsets.
pub const IDENTIFIER: u8 = 0;
pub const REVISION: u8 = 1;
pub const CHARACTERISTICS: u8 = 2;
pub const MODULE_STATE: u8 = 3;
pub const MODULE_FLAGS: u8 = 8;
pub const TEMP_VCC_FLAGS: u8 = 9;
pub const TEMPERATURE: u8 = 14;
pub const VOLTAGE: u8 = 16;
pub const GLOBAL_CONTROLS: u8 = 26;
pub const MODULE_FLAG_MASKS: u8 = 31;
pub const TEMP_VCC_MASKS: u8 = 32;
pub const CC_BASE: u8 = 63;
pub const MEDIA_TYPE: u8 = 85;
pub const APPLICATIONS: u8 = 86;

/// The number of advertised application descriptor slots.
pub const N_APPLICATIONS: usize = 8;

/// The span of latched lower-page flag bytes, cleared by a host read.
pub const FLAG_SPAN: core::ops::RangeInclusive<u8> = 8..=11;

// Module state byte encoding: state in bits 3..1, IntL mirror in bit 0.
pub const STATE_SHIFT: u8 = 1;
pub const STATE_MASK: u8 = 0b0000_1110;
pub const INTL_DEASSERTED: u8 = 0b0000_0001;

// Global control bits (byte 26).
pub const LOW_PWR_REQUEST: u8 = 0b0100_0000;
pub const SOFT_RESET: u8 = 0b0000_1000;

// Module flag bits (byte 8).
pub const FLAG_MODULE_STATE_CHANGED: u8 = 0b0000_0001;

bitflags::bitflags! {
    /// The temperature / supply-voltage flag byte at offset 9.
    pub struct MonitorFlags: u8 {
        const TEMP_HIGH_ALARM = 0b0000_0001;
        const TEMP_LOW_ALARM = 0b0000_0010;
        const TEMP_HIGH_WARNING = 0b0000_0100;
        const TEMP_LOW_WARNING = 0b0000_1000;
        const VCC_HIGH_ALARM = 0b0001_0000;
        const VCC_LOW_ALARM = 0b0010_0000;
        const VCC_HIGH_WARNING = 0b0100_0000;
        const VCC_LOW_WARNING = 0b1000_0000;
    }
}

/// Encode the temperature and supply-voltage quads into the offset-9 flag
/// byte.
pub fn temp_vcc_flag_byte(temp: &QuadFlags, vcc: &QuadFlags) -> u8 {
    let mut flags = MonitorFlags::empty();
    flags.set(MonitorFlags::TEMP_HIGH_ALARM, temp.high_alarm);
    flags.set(MonitorFlags::TEMP_LOW_ALARM, temp.low_alarm);
    flags.set(MonitorFlags::TEMP_HIGH_WARNING, temp.high_warning);
    flags.set(MonitorFlags::TEMP_LOW_WARNING, temp.low_warning);
    flags.set(MonitorFlags::VCC_HIGH_ALARM, vcc.high_alarm);
    flags.set(MonitorFlags::VCC_LOW_ALARM, vcc.low_alarm);
    flags.set(MonitorFlags::VCC_HIGH_WARNING, vcc.high_warning);
    flags.set(MonitorFlags::VCC_LOW_WARNING, vcc.low_warning);
    flags.bits()
}

/// Upper page 00h: administrative data.
pub mod page00 {
    pub const IDENTIFIER: u8 = 128;
    pub const VENDOR_NAME: u8 = 129;
    pub const VENDOR_OUI: u8 = 145;
    pub const VENDOR_PART: u8 = 148;
    pub const VENDOR_REVISION: u8 = 164;
    pub const VENDOR_SERIAL: u8 = 166;
    pub const DATE_CODE: u8 = 182;
    pub const POWER_CLASS: u8 = 200;
    pub const MAX_POWER: u8 = 201;
    pub const MEDIA_INTERFACE_TECH: u8 = 212;
}

/// Upper page 01h: advertising.
pub mod page01 {
    pub const FIRMWARE_REVISION: u8 = 128;
    pub const HARDWARE_REVISION: u8 = 130;
    pub const SUPPORTED_LANES: u8 = 176;
}

/// Upper page 02h: module and lane thresholds.
pub mod page02 {
    pub const TEMP_THRESHOLDS: u8 = 128;
    pub const VCC_THRESHOLDS: u8 = 136;
    pub const TX_POWER_THRESHOLDS: u8 = 176;
    pub const TX_BIAS_THRESHOLDS: u8 = 184;
    pub const RX_POWER_THRESHOLDS: u8 = 192;
}

/// Banked page 10h: per-lane control.
pub mod page10 {
    pub const DATA_PATH_DEINIT: u8 = 128;
    pub const TX_DISABLE: u8 = 130;
    /// Staged control set: one byte per lane, the application selector
    /// code in bits 7..4 and the data-path ID in bits 3..1.
    pub const APP_SELECT: u8 = 145;
}

/// The default staged/active control byte: application 1, data path 0.
pub const APP_SELECT_DEFAULT: u8 = 0x10;

/// Banked page 11h: per-lane status.
pub mod page11 {
    pub const DATA_PATH_STATE: u8 = 128;
    pub const TX_FAULT_FLAGS: u8 = 135;
    pub const TX_LOS_FLAGS: u8 = 136;
    pub const RX_LOS_FLAGS: u8 = 138;
    // Monitor flag groups: one byte per severity (high alarm, low alarm,
    // high warning, low warning), one bit per lane.
    pub const TX_POWER_FLAGS: u8 = 139;
    pub const TX_BIAS_FLAGS: u8 = 143;
    pub const RX_POWER_FLAGS: u8 = 147;
    pub const TX_POWER: u8 = 154;
    pub const TX_BIAS: u8 = 170;
    pub const RX_POWER: u8 = 186;
    /// Active control set: one byte per lane, mirroring the staged byte
    /// that was applied when the lane's data path last initialized.
    pub const ACTIVE_APP_SELECT: u8 = 206;

    /// The span of latched lane flag bytes, cleared by a host read.
    pub const FLAG_SPAN: core::ops::RangeInclusive<u8> = 134..=150;
}

/// Encode per-lane flag quads into a monitor flag group: four bytes, one
/// per severity, with one bit per lane.
pub fn lane_flag_group(quads: &[QuadFlags]) -> [u8; 4] {
    let mut out = [0; 4];
    for (lane, quad) in quads.iter().enumerate() {
        out[0] |= u8::from(quad.high_alarm) << lane;
        out[1] |= u8::from(quad.low_alarm) << lane;
        out[2] |= u8::from(quad.high_warning) << lane;
        out[3] |= u8::from(quad.low_warning) << lane;
    }
    out
}

/// Encode one advertised application descriptor.
///
/// The descriptor is a simplified rendering of CMIS Table 8-18: a host
/// electrical interface code keyed by rate, the media interface code, the
/// host/media lane counts, and a lane-assignment option of "begins at lane
/// 0".
pub fn application_descriptor(rate_gbps: f32, n_lanes: u8, media_interface: u8) -> [u8; 4] {
    let host_id = match rate_gbps.round() as u32 {
        10 => 0x01,
        25 => 0x02,
        40 => 0x03,
        100 => 0x04,
        200 => 0x05,
        400 => 0x06,
        _ => 0x00,
    };
    [host_id, media_interface, n_lanes << 4 | n_lanes, 0x01]
}

// CMIS power classes 1..=8, from the maximum power draw.
fn power_class(max_power_w: f32) -> u8 {
    const CLASS_LIMITS: [f32; 7] = [1.5, 3.5, 7.0, 8.0, 10.0, 12.0, 14.0];
    CLASS_LIMITS
        .iter()
        .position(|limit| max_power_w <= *limit)
        .map(|i| i as u8 + 1)
        .unwrap_or(8)
}

/// Build the CMIS memory map: lower page, unbanked pages 00h--02h, and
/// banked pages 10h/11h.
pub fn map(info: &ModuleInfo, thresholds: &Thresholds) -> MemoryMap {
    let mut map = MemoryMap::banked(WritePolicy::Report);
    let n_banks = info.n_lanes.div_ceil(LANES_PER_BANK).max(1);
    map.install_page(0x00).unwrap();
    map.install_page(0x01).unwrap();
    map.install_page(0x02).unwrap();
    map.install_banked_page(0x10, n_banks).unwrap();
    map.install_banked_page(0x11, n_banks).unwrap();

    let lower = PageRef::Lower;
    map.set_access(lower, 0..=25, Access::ReadOnly).unwrap();
    map.set_access(lower, GLOBAL_CONTROLS..=GLOBAL_CONTROLS, Access::ReadWrite)
        .unwrap();
    map.set_access(lower, 27..=30, Access::ReadOnly).unwrap();
    map.set_access(lower, MODULE_FLAG_MASKS..=TEMP_VCC_MASKS, Access::ReadWrite)
        .unwrap();
    map.set_access(lower, 33..=125, Access::ReadOnly).unwrap();

    map.store_byte(lower, IDENTIFIER, info.identifier.into())
        .unwrap();
    // CMIS 4.0.
    map.store_byte(lower, REVISION, 0x40).unwrap();
    // Paged memory.
    map.store_byte(lower, CHARACTERISTICS, 0x00).unwrap();
    map.store_byte(lower, MODULE_STATE, 1 << STATE_SHIFT | INTL_DEASSERTED)
        .unwrap();
    map.store_byte(lower, MEDIA_TYPE, info.media_interface)
        .unwrap();
    for (i, rate) in info
        .supported_rates_gbps
        .iter()
        .take(N_APPLICATIONS)
        .enumerate()
    {
        map.store(
            lower,
            APPLICATIONS + 4 * i as u8,
            &application_descriptor(*rate, info.n_lanes, info.media_interface),
        )
        .unwrap();
    }

    let page = PageRef::upper(0x00);
    map.set_access(page, 128..=255, Access::ReadOnly).unwrap();
    map.store_byte(page, page00::IDENTIFIER, info.identifier.into())
        .unwrap();
    map.store(page, page00::VENDOR_NAME, &info.identity.name)
        .unwrap();
    map.store(page, page00::VENDOR_OUI, &info.identity.oui)
        .unwrap();
    map.store(page, page00::VENDOR_PART, &info.identity.part)
        .unwrap();
    map.store(page, page00::VENDOR_REVISION, &info.identity.revision[..2])
        .unwrap();
    map.store(page, page00::VENDOR_SERIAL, &info.identity.serial)
        .unwrap();
    map.store(page, page00::DATE_CODE, &info.identity.date)
        .unwrap();
    map.store_byte(page, page00::POWER_CLASS, (power_class(info.max_power_w) - 1) << 5)
        .unwrap();
    let quarter_watts = (info.max_power_w / 0.25).round().clamp(0.0, 255.0) as u8;
    map.store_byte(page, page00::MAX_POWER, quarter_watts).unwrap();
    map.store_byte(page, page00::MEDIA_INTERFACE_TECH, info.media_interface)
        .unwrap();

    let page = PageRef::upper(0x01);
    map.set_access(page, 128..=255, Access::ReadOnly).unwrap();
    map.store(page, page01::FIRMWARE_REVISION, &[0x00, 0x01])
        .unwrap();
    map.store(page, page01::HARDWARE_REVISION, &[0x01, 0x00])
        .unwrap();
    let lane_mask = if info.n_lanes >= 8 {
        0xff
    } else {
        (1u8 << info.n_lanes) - 1
    };
    map.store_byte(page, page01::SUPPORTED_LANES, lane_mask)
        .unwrap();

    let page = PageRef::upper(0x02);
    map.set_access(page, 128..=255, Access::ReadOnly).unwrap();
    map.store(
        page,
        page02::TEMP_THRESHOLDS,
        &threshold_quad(&thresholds.temperature, encode::temperature),
    )
    .unwrap();
    map.store(
        page,
        page02::VCC_THRESHOLDS,
        &threshold_quad(&thresholds.supply_voltage, encode::supply_voltage),
    )
    .unwrap();
    map.store(
        page,
        page02::TX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.tx_power, encode::optical_power),
    )
    .unwrap();
    map.store(
        page,
        page02::TX_BIAS_THRESHOLDS,
        &threshold_quad(&thresholds.tx_bias, encode::bias_current),
    )
    .unwrap();
    map.store(
        page,
        page02::RX_POWER_THRESHOLDS,
        &threshold_quad(&thresholds.rx_power, encode::optical_power),
    )
    .unwrap();

    for bank in 0..n_banks {
        let control = PageRef::banked(bank, 0x10);
        map.set_access(control, 128..=130, Access::ReadWrite).unwrap();
        map.set_access(
            control,
            page10::APP_SELECT..=page10::APP_SELECT + LANES_PER_BANK - 1,
            Access::ReadWrite,
        )
        .unwrap();
        let status = PageRef::banked(bank, 0x11);
        map.set_access(status, 128..=255, Access::ReadOnly).unwrap();
        // All lanes deactivated, provisioned for application 1.
        map.store(status, page11::DATA_PATH_STATE, &[0x11; 4]).unwrap();
        for idx in 0..LANES_PER_BANK {
            if u16::from(bank) * 8 + u16::from(idx) >= u16::from(info.n_lanes) {
                break;
            }
            map.store_byte(control, page10::APP_SELECT + idx, APP_SELECT_DEFAULT)
                .unwrap();
            map.store_byte(status, page11::ACTIVE_APP_SELECT + idx, APP_SELECT_DEFAULT)
                .unwrap();
        }
    }

    refresh_checksums(&mut map);
    map
}

/// Rewrite the lower-page CC_BASE checksum byte over bytes 0..=62.
pub fn refresh_checksums(map: &mut MemoryMap) {
    let base = map.checksum(PageRef::Lower, 0..=62).unwrap();
    map.store_byte(PageRef::Lower, CC_BASE, base).unwrap();
}
