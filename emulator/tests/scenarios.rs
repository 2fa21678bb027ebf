// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! End-to-end scenarios driving emulated modules through the bus fabric,
//! exactly as a host-side management driver would.

use slog::o;
use slog::Logger;
use transceiver_emulator::Cage;
use transceiver_emulator::Error;
use transceiver_emulator::FaultKind;
use transceiver_emulator::FormFactor;
use transceiver_emulator::Level;
use transceiver_emulator::ManagementInterface;
use transceiver_emulator::MediaType;
use transceiver_emulator::Module;
use transceiver_emulator::ModuleConfig;
use transceiver_emulator::ModuleState;
use transceiver_emulator::Signal;

const A0: u8 = 0xa0;
const A2: u8 = 0xa2;
const MGMT: u8 = 0x50;
const PAGE_SELECT: u8 = 127;

fn logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn sfp_cage(log: &Logger) -> Cage {
    let config = ModuleConfig::builder(FormFactor::Sfp, ManagementInterface::Sff8472)
        .media(MediaType::Mmf)
        .vendor_name("Test Vendor")
        .part_number("SFP-SR-25G")
        .serial_number("OPT00001")
        .revision("A1")
        .bit_rate_gbps(25.0)
        .build()
        .unwrap();
    let mut cage = Cage::new(log);
    cage.attach(Module::new(config, log).unwrap()).unwrap();
    cage
}

fn qsfp_cage(log: &Logger) -> Cage {
    let config = ModuleConfig::builder(FormFactor::Qsfp, ManagementInterface::Sff8636)
        .media(MediaType::Mmf)
        .vendor_name("Test Vendor")
        .part_number("QSFP-SR4-100G")
        .serial_number("OPT00003")
        .revision("A1")
        .bit_rate_gbps(100.0)
        .supported_rates_gbps(vec![40.0, 100.0])
        .build()
        .unwrap();
    let mut cage = Cage::new(log);
    cage.attach(Module::new(config, log).unwrap()).unwrap();
    cage
}

fn cmis_cage(log: &Logger) -> Cage {
    let config = ModuleConfig::builder(FormFactor::Osfp, ManagementInterface::Cmis)
        .media(MediaType::Smf)
        .vendor_name("Test Vendor")
        .part_number("OSFP-LR4-400G")
        .serial_number("OPT00006")
        .revision("A1")
        .bit_rate_gbps(400.0)
        .supported_rates_gbps(vec![200.0, 400.0])
        .max_power_w(4.5)
        .build()
        .unwrap();
    let mut cage = Cage::new(log);
    cage.attach(Module::new(config, log).unwrap()).unwrap();
    cage
}

// Scenario: an attached SFP answers its SFF-8024 identifier at A0h byte 0.
#[test]
fn test_identifier_read() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    assert_eq!(cage.read_register(A0, 0).unwrap(), 0x03);
}

// Scenario: the vendor name reads back as fixed-width, space-padded ASCII.
#[test]
fn test_vendor_string() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    assert_eq!(
        cage.read_block(A0, 20, 16).unwrap(),
        b"Test Vendor     ".to_vec()
    );
}

// Scenario: temperature telemetry lands in the A2h diagnostics after a
// tick, as a big-endian signed Q8.8.
#[test]
fn test_temperature_monitoring() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    cage.module_mut().unwrap().set_temperature(45.0);
    cage.tick();
    assert_eq!(cage.read_block(A2, 96, 2).unwrap(), vec![0x2d, 0x00]);
}

// Scenario: an injected transmitter fault shows in the status byte without
// an intervening tick.
#[test]
fn test_tx_fault_simulation() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    cage.module_mut()
        .unwrap()
        .simulate_fault(FaultKind::TxFault, true)
        .unwrap();
    assert_eq!(cage.read_register(A2, 110).unwrap() & 0x04, 0x04);
}

// Scenario: programming the SFF-8636 page-select register swaps the upper
// window and leaves the lower page alone.
#[test]
fn test_page_switch_sff8636() {
    let log = logger();
    let mut cage = qsfp_cage(&log);
    let lower_before = cage.read_block(MGMT, 0, 127).unwrap();
    let page00 = cage.read_block(MGMT, 128, 128).unwrap();

    cage.write_register(MGMT, PAGE_SELECT, 0x03).unwrap();
    assert_eq!(cage.read_register(MGMT, PAGE_SELECT).unwrap(), 0x03);
    let page03 = cage.read_block(MGMT, 128, 128).unwrap();
    // Page 03h holds thresholds, not the serial ID.
    assert_ne!(page03, page00);
    // Temp high alarm threshold: 75 C in Q8.8.
    assert_eq!(&page03[0..2], &[0x4b, 0x00]);

    assert_eq!(cage.read_block(MGMT, 0, 127).unwrap(), lower_before);
}

// Scenario: a fresh CMIS module sits in LowPwr while LPMode is high, and
// walks to Ready once the host releases it and time passes.
#[test]
fn test_cmis_state_transition() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    let state = cage.read_register(MGMT, 3).unwrap();
    assert_eq!((state >> 1) & 0x07, ModuleState::LowPwr.code());

    cage.set_gpio(Signal::LPMode, Level::Low).unwrap();
    for _ in 0..3 {
        cage.tick();
    }
    let state = cage.read_register(MGMT, 3).unwrap();
    assert_eq!((state >> 1) & 0x07, ModuleState::Ready.code());
}

// Invariant: no host write sequence changes a read-only byte.
#[test]
fn test_read_only_bytes_are_immutable() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    let before = cage.read_block(A0, 0, 96).unwrap();
    for offset in 0..96u8 {
        cage.write_register(A0, offset, 0xff).unwrap();
    }
    cage.write_block(A0, 0, &[0xaa; 64]).unwrap();
    assert_eq!(cage.read_block(A0, 0, 96).unwrap(), before);
}

// Invariant: the CMIS write policy reports the same rejection SFF drops
// silently.
#[test]
fn test_cmis_reports_denied_writes() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    assert!(matches!(
        cage.write_register(MGMT, 0, 0xff).unwrap_err(),
        Error::Map(transceiver_emulator::MapError::AccessDenied(0))
    ));
}

// Invariant: bytes 0..=126 are identical no matter which upper page is
// selected.
#[test]
fn test_lower_page_stable_across_selections() {
    let log = logger();
    let mut cage = qsfp_cage(&log);
    let baseline = cage.read_block(MGMT, 0, 127).unwrap();
    for page in [0x00, 0x03, 0x00] {
        cage.write_register(MGMT, PAGE_SELECT, page).unwrap();
        assert_eq!(cage.read_block(MGMT, 0, 127).unwrap(), baseline);
    }
}

// Invariant: CC_BASE equals the modulo-256 sum of bytes 0..=62 after a
// host write and a checksum refresh.
#[test]
fn test_cmis_checksum_tracks_control_writes() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    // LowPwrRequestSW is a writable byte inside the checksum span.
    cage.write_register(MGMT, 26, 0x40).unwrap();
    cage.tick();

    let span = cage.read_block(MGMT, 0, 63).unwrap();
    let expected = span.iter().fold(0u8, |sum, b| sum.wrapping_add(*b));
    assert_eq!(cage.read_register(MGMT, 63).unwrap(), expected);
}

// Invariant: a reset pulse lands the module in LowPwr within the
// configured hold time.
#[test]
fn test_reset_pulse_reaches_low_power() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    cage.set_gpio(Signal::LPMode, Level::Low).unwrap();
    for _ in 0..4 {
        cage.tick();
    }
    assert_eq!(
        cage.module().unwrap().state().unwrap(),
        ModuleState::Ready
    );

    cage.set_gpio(Signal::ResetL, Level::Low).unwrap();
    // Default reset hold time is two ticks.
    cage.tick();
    cage.tick();
    assert_eq!(
        cage.module().unwrap().state().unwrap(),
        ModuleState::LowPwr
    );
    cage.set_gpio(Signal::ResetL, Level::High).unwrap();
}

// Invariant: a block read equals the concatenation of single-byte reads.
#[test]
fn test_block_read_equals_single_reads() {
    let log = logger();
    let mut cage = qsfp_cage(&log);
    let block = cage.read_block(MGMT, 148, 32).unwrap();
    let singles: Vec<u8> = (0..32)
        .map(|i| cage.read_register(MGMT, 148 + i).unwrap())
        .collect();
    assert_eq!(block, singles);
}

// A transfer straddling the lower/upper boundary is rejected whole.
#[test]
fn test_cross_page_transfer_rejected() {
    let log = logger();
    let mut cage = qsfp_cage(&log);
    assert!(matches!(
        cage.read_block(MGMT, 120, 16).unwrap_err(),
        Error::Map(transceiver_emulator::MapError::CrossPage { .. })
    ));
}

// Hot-plug: presence tracks attach and detach, and a detached cage
// rejects bus traffic.
#[test]
fn test_hot_plug_semantics() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    assert_eq!(cage.gpio(Signal::ModPrsL).unwrap(), Level::Low);

    cage.detach().unwrap();
    assert_eq!(cage.gpio(Signal::ModPrsL).unwrap(), Level::High);
    assert_eq!(cage.read_register(A0, 0).unwrap_err(), Error::NoModule);
}

// A temperature past the high-alarm threshold raises the alarm flag on the
// next tick, and an SFP clears it again once the temperature recovers.
#[test]
fn test_high_temperature_alarm_cycle() {
    let log = logger();
    let mut cage = sfp_cage(&log);
    cage.module_mut()
        .unwrap()
        .simulate_fault(FaultKind::TempHigh, true)
        .unwrap();
    cage.tick();
    assert_eq!(cage.read_register(A2, 112).unwrap() & 0x80, 0x80);

    cage.module_mut()
        .unwrap()
        .simulate_fault(FaultKind::TempHigh, false)
        .unwrap();
    cage.tick();
    assert_eq!(cage.read_register(A2, 112).unwrap() & 0x80, 0x00);
}

// Per-lane fault injection on a CMIS module latches only the addressed
// lane's flag.
#[test]
fn test_cmis_lane_fault() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    cage.module_mut()
        .unwrap()
        .simulate_lane_fault(2, FaultKind::RxLos, true)
        .unwrap();
    let flags = cage.read_page(0x11, 138, 1).unwrap();
    assert_eq!(flags[0], 0x04);

    assert_eq!(
        cage.module_mut()
            .unwrap()
            .simulate_lane_fault(9, FaultKind::RxLos, true)
            .unwrap_err(),
        Error::InvalidLane { lane: 9, n_lanes: 8 }
    );
}

// A staged application selector applies to a lane when its data path
// re-initializes, and shows up in the active control set on page 11h.
#[test]
fn test_active_application_follows_staged_selection() {
    let log = logger();
    let mut cage = cmis_cage(&log);
    cage.set_gpio(Signal::LPMode, Level::Low).unwrap();
    for _ in 0..5 {
        cage.tick();
    }
    // Lanes come up provisioned for application 1.
    assert_eq!(cage.read_page(0x11, 206, 1).unwrap(), vec![0x10]);

    // Stage application 2 on lane 0 and bounce its data path.
    cage.write_page(0x10, 145, &[0x20]).unwrap();
    cage.write_page(0x10, 128, &[0x01]).unwrap();
    cage.tick();
    cage.tick();
    cage.write_page(0x10, 128, &[0x00]).unwrap();
    for _ in 0..3 {
        cage.tick();
    }
    assert_eq!(cage.read_page(0x11, 206, 2).unwrap(), vec![0x20, 0x10]);
}

// The interrupt line follows the latched flags: asserted while any flag is
// set, released once the host reads the flag bytes.
#[test]
fn test_interrupt_follows_flags() {
    let log = logger();
    let mut cage = qsfp_cage(&log);
    assert_eq!(cage.gpio(Signal::IntL).unwrap(), Level::High);

    cage.module_mut().unwrap().set_temperature(90.0);
    cage.tick();
    assert_eq!(cage.gpio(Signal::IntL).unwrap(), Level::Low);

    cage.module_mut().unwrap().set_temperature(25.0);
    // Reading the latched flag span clears it and releases IntL.
    cage.read_block(MGMT, 3, 19).unwrap();
    assert_eq!(cage.gpio(Signal::IntL).unwrap(), Level::High);
}

// The module-management view of a whole front panel: a bus with a mix of
// occupied and empty slots.
#[test]
fn test_front_panel_sweep() {
    let log = logger();
    let mut bus = transceiver_emulator::Bus::new(4, &log);
    let config = ModuleConfig::builder(FormFactor::Qsfp, ManagementInterface::Sff8636)
        .vendor_name("Test Vendor")
        .part_number("QSFP-SR4-100G")
        .build()
        .unwrap();
    bus.attach(1, Module::new(config.clone(), &log).unwrap()).unwrap();
    bus.attach(3, Module::new(config, &log).unwrap()).unwrap();

    let present: Vec<u8> = (0..4)
        .filter(|slot| bus.gpio(*slot, Signal::ModPrsL).unwrap() == Level::Low)
        .collect();
    assert_eq!(present, vec![1, 3]);

    bus.tick_all();
    for slot in present {
        assert_eq!(bus.read_register(slot, MGMT, 0).unwrap(), 0x11);
    }
}
