// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The monitoring engine: encodes live telemetry into the monitor registers
//! and evaluates it against the threshold registers.
//!
//! Each refresh writes the telemetry bytes first and the flag bytes second,
//! so a host sampling value-then-flags always observes a coherent pair. The
//! thresholds are read back out of the map rather than from configuration:
//! what the host sees in the threshold registers is what the engine
//! compares against. A missing thresholds page leaves the flags untouched.
//!
//! The engine cannot fail. Register locations are fixed by the layout
//! factories, so the store calls below are infallible in practice; a
//! threshold fetch that does fail simply skips that comparison.

use crate::telemetry::FaultState;
use crate::telemetry::Telemetry;
use transceiver_map::encode;
use transceiver_map::layout::cmis;
use transceiver_map::layout::sff8472;
use transceiver_map::layout::sff8636;
use transceiver_map::layout::AlarmSet;
use transceiver_map::layout::QuadFlags;
use transceiver_map::MemoryMap;
use transceiver_map::PageRef;

/// Everything one refresh of the monitor registers depends on.
pub(crate) struct MonitorInputs<'a> {
    pub telemetry: &'a Telemetry,
    pub faults: &'a FaultState,
    /// Per-lane transmitter disable, from the pin, soft bit or lane mask.
    pub tx_disable: u8,
    /// False for copper cables, which carry no optical monitors.
    pub optical: bool,
}

impl MonitorInputs<'_> {
    fn n_lanes(&self) -> usize {
        self.telemetry.tx_power_mw.len()
    }

    // A disabled or faulted transmitter emits nothing; the stored telemetry
    // is untouched so clearing the condition restores it.
    fn tx_power(&self, lane: usize) -> f32 {
        let mask = 1u8 << lane;
        if self.tx_disable & mask != 0 || self.faults.tx_fault & mask != 0 {
            0.0
        } else {
            self.telemetry.tx_power_mw.get(lane).copied().unwrap_or(0.0)
        }
    }

    fn tx_bias(&self, lane: usize) -> f32 {
        let mask = 1u8 << lane;
        if self.tx_disable & mask != 0 || self.faults.tx_fault & mask != 0 {
            0.0
        } else {
            self.telemetry.tx_bias_ma.get(lane).copied().unwrap_or(0.0)
        }
    }

    fn rx_power(&self, lane: usize) -> f32 {
        if self.faults.rx_los & (1 << lane) != 0 {
            0.0
        } else {
            self.telemetry.rx_power_mw.get(lane).copied().unwrap_or(0.0)
        }
    }
}

// Read one threshold quad back out of the map.
fn read_alarm_set(
    map: &MemoryMap,
    page: PageRef,
    offset: u8,
    dec: fn([u8; 2]) -> f32,
) -> Option<AlarmSet> {
    let bytes = map.fetch(page, offset, 8).ok()?;
    let word = |i: usize| [bytes[i], bytes[i + 1]];
    Some(AlarmSet::new(
        dec(word(0)),
        dec(word(2)),
        dec(word(4)),
        dec(word(6)),
    ))
}

fn evaluate(
    map: &MemoryMap,
    page: PageRef,
    offset: u8,
    dec: fn([u8; 2]) -> f32,
    value: f32,
) -> QuadFlags {
    read_alarm_set(map, page, offset, dec)
        .map(|set| QuadFlags::evaluate(value, &set))
        .unwrap_or_default()
}

/// Refresh the A2h diagnostics of an SFF-8472 module.
///
/// SFF-8472 flags are live rather than latched: they are set and cleared on
/// every refresh. Returns true if any alarm or warning is raised.
pub(crate) fn refresh_sff8472(map: &mut MemoryMap, inputs: &MonitorInputs) -> bool {
    use sff8472::MonitorFlags1;
    use sff8472::MonitorFlags2;

    let lower = PageRef::Lower;
    let telemetry = inputs.telemetry;
    map.store(lower, sff8472::TEMPERATURE, &encode::temperature(telemetry.temperature_c))
        .unwrap();
    map.store(
        lower,
        sff8472::VOLTAGE,
        &encode::supply_voltage(telemetry.supply_voltage_v),
    )
    .unwrap();
    map.store(lower, sff8472::TX_BIAS, &encode::bias_current(inputs.tx_bias(0)))
        .unwrap();
    map.store(lower, sff8472::TX_POWER, &encode::optical_power(inputs.tx_power(0)))
        .unwrap();
    map.store(lower, sff8472::RX_POWER, &encode::optical_power(inputs.rx_power(0)))
        .unwrap();

    let temp = evaluate(
        map,
        lower,
        sff8472::TEMP_THRESHOLDS,
        encode::decode_temperature,
        telemetry.temperature_c,
    );
    let vcc = evaluate(
        map,
        lower,
        sff8472::VCC_THRESHOLDS,
        encode::decode_supply_voltage,
        telemetry.supply_voltage_v,
    );
    let (bias, tx, rx) = if inputs.optical {
        (
            evaluate(
                map,
                lower,
                sff8472::TX_BIAS_THRESHOLDS,
                encode::decode_bias_current,
                inputs.tx_bias(0),
            ),
            evaluate(
                map,
                lower,
                sff8472::TX_POWER_THRESHOLDS,
                encode::decode_optical_power,
                inputs.tx_power(0),
            ),
            evaluate(
                map,
                lower,
                sff8472::RX_POWER_THRESHOLDS,
                encode::decode_optical_power,
                inputs.rx_power(0),
            ),
        )
    } else {
        Default::default()
    };

    let pack1 = |temp: &QuadFlags, vcc: &QuadFlags, bias: &QuadFlags, tx: &QuadFlags, alarm: bool| {
        let pick = |quad: &QuadFlags| if alarm { (quad.high_alarm, quad.low_alarm) } else { (quad.high_warning, quad.low_warning) };
        let mut flags = MonitorFlags1::empty();
        let (high, low) = pick(temp);
        flags.set(MonitorFlags1::TEMP_HIGH, high);
        flags.set(MonitorFlags1::TEMP_LOW, low);
        let (high, low) = pick(vcc);
        flags.set(MonitorFlags1::VCC_HIGH, high);
        flags.set(MonitorFlags1::VCC_LOW, low);
        let (high, low) = pick(bias);
        flags.set(MonitorFlags1::TX_BIAS_HIGH, high);
        flags.set(MonitorFlags1::TX_BIAS_LOW, low);
        let (high, low) = pick(tx);
        flags.set(MonitorFlags1::TX_POWER_HIGH, high);
        flags.set(MonitorFlags1::TX_POWER_LOW, low);
        flags
    };
    let pack2 = |rx: &QuadFlags, alarm: bool| {
        let mut flags = MonitorFlags2::empty();
        let (high, low) = if alarm { (rx.high_alarm, rx.low_alarm) } else { (rx.high_warning, rx.low_warning) };
        flags.set(MonitorFlags2::RX_POWER_HIGH, high);
        flags.set(MonitorFlags2::RX_POWER_LOW, low);
        flags
    };

    let alarm1 = pack1(&temp, &vcc, &bias, &tx, true);
    let alarm2 = pack2(&rx, true);
    let warn1 = pack1(&temp, &vcc, &bias, &tx, false);
    let warn2 = pack2(&rx, false);
    map.store(lower, sff8472::ALARM_FLAGS, &[alarm1.bits(), alarm2.bits()])
        .unwrap();
    map.store(lower, sff8472::WARNING_FLAGS, &[warn1.bits(), warn2.bits()])
        .unwrap();

    !(alarm1.is_empty() && alarm2.is_empty() && warn1.is_empty() && warn2.is_empty())
}

/// Refresh the monitors and latched flags of an SFF-8636 module.
///
/// Flags are latched: new conditions are OR-ed in and stay set until the
/// host reads the flag bytes. Returns true if any flag byte is set
/// afterwards.
pub(crate) fn refresh_sff8636(map: &mut MemoryMap, inputs: &MonitorInputs) -> bool {
    let lower = PageRef::Lower;
    let telemetry = inputs.telemetry;
    map.store(lower, sff8636::TEMPERATURE, &encode::temperature(telemetry.temperature_c))
        .unwrap();
    map.store(
        lower,
        sff8636::VOLTAGE,
        &encode::supply_voltage(telemetry.supply_voltage_v),
    )
    .unwrap();
    for lane in 0..sff8636::N_LANES {
        let at = 2 * lane as u8;
        map.store(
            lower,
            sff8636::RX_POWER + at,
            &encode::optical_power(inputs.rx_power(lane)),
        )
        .unwrap();
        map.store(
            lower,
            sff8636::TX_BIAS + at,
            &encode::bias_current(inputs.tx_bias(lane)),
        )
        .unwrap();
        map.store(
            lower,
            sff8636::TX_POWER + at,
            &encode::optical_power(inputs.tx_power(lane)),
        )
        .unwrap();
    }

    let page = PageRef::upper(0x03);
    let temp = evaluate(
        map,
        page,
        sff8636::page03::TEMP_THRESHOLDS,
        encode::decode_temperature,
        telemetry.temperature_c,
    );
    map.update_byte(lower, sff8636::TEMP_FLAGS, |b| {
        b | sff8636::module_flag_byte(&temp)
    })
    .unwrap();
    let vcc = evaluate(
        map,
        page,
        sff8636::page03::VCC_THRESHOLDS,
        encode::decode_supply_voltage,
        telemetry.supply_voltage_v,
    );
    map.update_byte(lower, sff8636::VCC_FLAGS, |b| {
        b | sff8636::module_flag_byte(&vcc)
    })
    .unwrap();

    if inputs.optical {
        let lane_quads = |offset: u8, dec: fn([u8; 2]) -> f32, value: &dyn Fn(usize) -> f32| {
            let mut quads = [QuadFlags::default(); sff8636::N_LANES];
            if let Some(set) = read_alarm_set(map, page, offset, dec) {
                for (lane, quad) in quads.iter_mut().enumerate().take(inputs.n_lanes()) {
                    *quad = QuadFlags::evaluate(value(lane), &set);
                }
            }
            quads
        };
        let rx = lane_quads(sff8636::page03::RX_POWER_THRESHOLDS, encode::decode_optical_power, &|lane| {
            inputs.rx_power(lane)
        });
        let bias = lane_quads(sff8636::page03::TX_BIAS_THRESHOLDS, encode::decode_bias_current, &|lane| {
            inputs.tx_bias(lane)
        });
        let tx = lane_quads(sff8636::page03::TX_POWER_THRESHOLDS, encode::decode_optical_power, &|lane| {
            inputs.tx_power(lane)
        });
        for (offset, quads) in [
            (sff8636::RX_POWER_FLAGS, rx),
            (sff8636::TX_BIAS_FLAGS, bias),
            (sff8636::TX_POWER_FLAGS, tx),
        ] {
            let bytes = sff8636::lane_flag_bytes(&quads);
            map.update_byte(lower, offset, |b| b | bytes[0]).unwrap();
            map.update_byte(lower, offset + 1, |b| b | bytes[1]).unwrap();
        }
    }

    let lane_bits = inputs.faults.rx_los & 0x0f;
    map.update_byte(lower, sff8636::LOS_FLAGS, |b| b | lane_bits)
        .unwrap();
    let lane_bits = inputs.faults.tx_fault & 0x0f;
    map.update_byte(lower, sff8636::TX_FAULT_FLAGS, |b| b | lane_bits)
        .unwrap();

    any_flags_8636(map)
}

/// True if any latched SFF-8636 interrupt flag is set.
pub(crate) fn any_flags_8636(map: &MemoryMap) -> bool {
    let span = sff8636::FLAG_SPAN;
    let len = usize::from(span.end() - span.start()) + 1;
    map.fetch(PageRef::Lower, *span.start(), len)
        .map(|bytes| bytes.iter().any(|b| *b != 0))
        .unwrap_or(false)
}

/// Refresh the monitors and latched flags of a CMIS module.
///
/// Returns true if any unmasked flag is set afterwards.
pub(crate) fn refresh_cmis(map: &mut MemoryMap, inputs: &MonitorInputs) -> bool {
    let lower = PageRef::Lower;
    let telemetry = inputs.telemetry;
    map.store(lower, cmis::TEMPERATURE, &encode::temperature(telemetry.temperature_c))
        .unwrap();
    map.store(
        lower,
        cmis::VOLTAGE,
        &encode::supply_voltage(telemetry.supply_voltage_v),
    )
    .unwrap();

    let n_banks = (inputs.n_lanes() as u8).div_ceil(cmis::LANES_PER_BANK);
    for bank in 0..n_banks {
        let page = PageRef::banked(bank, 0x11);
        for idx in 0..cmis::LANES_PER_BANK {
            let lane = usize::from(bank * cmis::LANES_PER_BANK + idx);
            if lane >= inputs.n_lanes() {
                break;
            }
            let at = 2 * idx;
            map.store(page, cmis::page11::TX_POWER + at, &encode::optical_power(inputs.tx_power(lane)))
                .unwrap();
            map.store(page, cmis::page11::TX_BIAS + at, &encode::bias_current(inputs.tx_bias(lane)))
                .unwrap();
            map.store(page, cmis::page11::RX_POWER + at, &encode::optical_power(inputs.rx_power(lane)))
                .unwrap();
        }
    }

    let thresholds = PageRef::upper(0x02);
    let temp = evaluate(
        map,
        thresholds,
        cmis::page02::TEMP_THRESHOLDS,
        encode::decode_temperature,
        telemetry.temperature_c,
    );
    let vcc = evaluate(
        map,
        thresholds,
        cmis::page02::VCC_THRESHOLDS,
        encode::decode_supply_voltage,
        telemetry.supply_voltage_v,
    );
    let flags = cmis::temp_vcc_flag_byte(&temp, &vcc);
    map.update_byte(lower, cmis::TEMP_VCC_FLAGS, |b| b | flags)
        .unwrap();

    for bank in 0..n_banks {
        let page = PageRef::banked(bank, 0x11);
        if inputs.optical {
            let lane_quads = |offset: u8, dec: fn([u8; 2]) -> f32, value: &dyn Fn(usize) -> f32| {
                let mut quads = [QuadFlags::default(); 8];
                if let Some(set) = read_alarm_set(map, thresholds, offset, dec) {
                    for (idx, quad) in quads.iter_mut().enumerate() {
                        let lane = usize::from(bank) * 8 + idx;
                        if lane >= inputs.n_lanes() {
                            break;
                        }
                        *quad = QuadFlags::evaluate(value(lane), &set);
                    }
                }
                quads
            };
            let tx = lane_quads(cmis::page02::TX_POWER_THRESHOLDS, encode::decode_optical_power, &|lane| {
                inputs.tx_power(lane)
            });
            let bias = lane_quads(cmis::page02::TX_BIAS_THRESHOLDS, encode::decode_bias_current, &|lane| {
                inputs.tx_bias(lane)
            });
            let rx = lane_quads(cmis::page02::RX_POWER_THRESHOLDS, encode::decode_optical_power, &|lane| {
                inputs.rx_power(lane)
            });
            for (offset, quads) in [
                (cmis::page11::TX_POWER_FLAGS, tx),
                (cmis::page11::TX_BIAS_FLAGS, bias),
                (cmis::page11::RX_POWER_FLAGS, rx),
            ] {
                let group = cmis::lane_flag_group(&quads);
                for (i, byte) in group.iter().enumerate() {
                    map.update_byte(page, offset + i as u8, |b| b | byte).unwrap();
                }
            }
        }

        let shift = bank * cmis::LANES_PER_BANK;
        let lane_bits = (inputs.faults.tx_fault >> shift) & 0xff;
        map.update_byte(page, cmis::page11::TX_FAULT_FLAGS, |b| b | lane_bits)
            .unwrap();
        let lane_bits = (inputs.faults.rx_los >> shift) & 0xff;
        map.update_byte(page, cmis::page11::RX_LOS_FLAGS, |b| b | lane_bits)
            .unwrap();
    }

    any_unmasked_flags_cmis(map, inputs.n_lanes() as u8)
}

/// True if any unmasked CMIS flag is set: the lower-page module flags are
/// subject to their mask registers, lane flags are not.
pub(crate) fn any_unmasked_flags_cmis(map: &MemoryMap, n_lanes: u8) -> bool {
    let lower = PageRef::Lower;
    let module_flags = map.fetch_byte(lower, cmis::MODULE_FLAGS).unwrap_or(0);
    let module_mask = map.fetch_byte(lower, cmis::MODULE_FLAG_MASKS).unwrap_or(0);
    let monitor_flags = map.fetch_byte(lower, cmis::TEMP_VCC_FLAGS).unwrap_or(0);
    let monitor_mask = map.fetch_byte(lower, cmis::TEMP_VCC_MASKS).unwrap_or(0);
    if module_flags & !module_mask != 0 || monitor_flags & !monitor_mask != 0 {
        return true;
    }
    let n_banks = n_lanes.div_ceil(cmis::LANES_PER_BANK);
    for bank in 0..n_banks {
        let span = cmis::page11::FLAG_SPAN;
        let len = usize::from(span.end() - span.start()) + 1;
        let any = map
            .fetch(PageRef::banked(bank, 0x11), *span.start(), len)
            .map(|bytes| bytes.iter().any(|b| *b != 0))
            .unwrap_or(false);
        if any {
            return true;
        }
    }
    false
}
