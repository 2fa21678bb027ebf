// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! QSFP-DD and OSFP modules with the CMIS 4.0 management interface.

use crate::config::ModuleConfig;
use crate::module::DEVICE_MGMT;
use crate::monitor;
use crate::monitor::MonitorInputs;
use crate::state::DataPathState;
use crate::state::Inputs;
use crate::state::ModuleState;
use crate::state::StateMachine;
use crate::telemetry::all_lanes;
use crate::telemetry::FaultKind;
use crate::telemetry::FaultState;
use crate::telemetry::Telemetry;
use crate::Error;
use crate::Level;
use crate::Sideband;
use crate::Signal;
use slog::debug;
use slog::o;
use slog::Logger;
use transceiver_map::layout::cmis;
use transceiver_map::layout::ModuleInfo;
use transceiver_map::MemoryMap;
use transceiver_map::PageRef;
use transceiver_map::PAGE_SIZE;

/// An emulated QSFP-DD/OSFP module.
///
/// Beyond the paged map, a CMIS module runs the module-level state machine
/// (`LowPwr` through `Ready`, driven by `ResetL`, `LPMode` and
/// `LowPwrRequestSW`) and one data-path state machine per lane (driven by
/// the `DataPathDeinit` and `OutputDisableTx` bits on page 10h). State
/// bytes, lane monitors and latched flags live where CMIS puts them; flag
/// reads clear the latches and release `IntL`.
#[derive(Debug)]
pub struct CmisModule {
    pub(crate) config: ModuleConfig,
    pub(crate) telemetry: Telemetry,
    pub(crate) faults: FaultState,
    pub(crate) sideband: Sideband,
    map: MemoryMap,
    info: ModuleInfo,
    sm: StateMachine,
    log: Logger,
}

impl CmisModule {
    pub(crate) fn new(config: ModuleConfig, log: &Logger) -> Result<Self, Error> {
        let info = config.module_info()?;
        let log = log.new(o!(
            "module" => "cmis",
            "part" => config.part_number.clone(),
        ));
        let telemetry = Telemetry::new(config.n_lanes, !config.media.is_copper());
        let sideband = Sideband::new(&[
            (Signal::ModPrsL, Level::Low),
            (Signal::ResetL, Level::High),
            (Signal::LPMode, Level::High),
            (Signal::IntL, Level::High),
        ]);
        let sm = StateMachine::new(config.n_lanes, config.state);
        let mut module = Self {
            map: cmis::map(&info, &config.thresholds),
            info,
            sm,
            config,
            telemetry,
            faults: FaultState::default(),
            sideband,
            log,
        };
        module.refresh();
        module.write_state_bytes();
        Ok(module)
    }

    pub fn state(&self) -> ModuleState {
        self.sm.state()
    }

    pub fn lane_state(&self, lane: usize) -> DataPathState {
        self.sm.lane_state(lane)
    }

    pub(crate) fn read(&mut self, dev_addr: u8, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        if dev_addr != DEVICE_MGMT {
            return Err(Error::InvalidAddress(dev_addr));
        }
        let out = self.map.read(offset, len)?;
        self.clear_read_flags(offset, len);
        Ok(out)
    }

    pub(crate) fn write(&mut self, dev_addr: u8, offset: u8, data: &[u8]) -> Result<(), Error> {
        if dev_addr != DEVICE_MGMT {
            return Err(Error::InvalidAddress(dev_addr));
        }
        self.map.write(offset, data)?;
        let end = usize::from(offset) + data.len();

        if usize::from(offset) <= usize::from(cmis::GLOBAL_CONTROLS)
            && end > usize::from(cmis::GLOBAL_CONTROLS)
        {
            let controls = self
                .map
                .fetch_byte(PageRef::Lower, cmis::GLOBAL_CONTROLS)?;
            if controls & cmis::SOFT_RESET != 0 {
                debug!(self.log, "software reset");
                // The reset bit is self-clearing.
                self.map
                    .store_byte(PageRef::Lower, cmis::GLOBAL_CONTROLS, 0)?;
                self.sm.soft_reset();
                self.reset_registers();
                self.write_state_bytes();
            }
        }

        // A write that clears DataPathDeinit bits is a request to activate
        // those data paths, which is only legal once the module is READY.
        // The register is stored regardless; only the side effect is
        // conditioned on state.
        if usize::from(offset) >= PAGE_SIZE && self.map.selected_page() == 0x10 {
            let page = PageRef::banked(self.map.selected_bank(), 0x10);
            let deinit_offset = usize::from(cmis::page10::DATA_PATH_DEINIT);
            if usize::from(offset) <= deinit_offset && end > deinit_offset {
                let deinit = self.map.fetch_byte(page, cmis::page10::DATA_PATH_DEINIT)?;
                let lanes = all_lanes(self.config.n_lanes);
                if !self.sm.is_ready() && deinit & lanes != lanes {
                    return Err(Error::InvalidState(
                        "data-path activation requires ModuleReady",
                    ));
                }
            }

            // Staged application selector codes must name an advertised
            // application. As above, the byte is stored either way; it is
            // applied only when the lane's data path next initializes.
            let n_apps = self
                .config
                .supported_rates_gbps
                .len()
                .min(cmis::N_APPLICATIONS) as u8;
            let staged_start = usize::from(cmis::page10::APP_SELECT);
            let staged_end =
                staged_start + usize::from(self.config.n_lanes.min(cmis::LANES_PER_BANK));
            let first = staged_start.max(usize::from(offset));
            let last = staged_end.min(end);
            for o in first..last {
                let code = self.map.fetch_byte(page, o as u8)? >> 4;
                if code == 0 || code > n_apps {
                    return Err(Error::InvalidState(
                        "application selector code is not advertised",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The application selector code applied to one lane's data path.
    pub fn active_application(&self, lane: usize) -> u8 {
        let bank = lane as u8 / cmis::LANES_PER_BANK;
        let idx = lane as u8 % cmis::LANES_PER_BANK;
        self.map
            .fetch_byte(
                PageRef::banked(bank, 0x11),
                cmis::page11::ACTIVE_APP_SELECT + idx,
            )
            .map(|byte| byte >> 4)
            .unwrap_or(0)
    }

    pub(crate) fn set_host_signal(&mut self, signal: Signal, level: Level) -> Result<(), Error> {
        let previous = self.sideband.set_host(signal, level)?;
        if previous != level {
            debug!(self.log, "sideband transition"; "signal" => %signal, "level" => ?level);
        }
        Ok(())
    }

    /// One tick: telemetry, then flags, then the state machines.
    pub(crate) fn tick(&mut self) {
        self.refresh_monitors();
        let inputs = self.control_inputs();
        let outcome = self.sm.tick(&inputs);
        if outcome.reset_completed {
            debug!(self.log, "hardware reset complete");
            self.reset_registers();
        }
        self.apply_staged_applications();
        if outcome.changed {
            debug!(self.log, "state transition"; "state" => %self.sm.state());
            self.write_state_bytes();
            self.map
                .update_byte(PageRef::Lower, cmis::MODULE_FLAGS, |byte| {
                    byte | cmis::FLAG_MODULE_STATE_CHANGED
                })
                .unwrap();
        }
        self.sync_intl();
        cmis::refresh_checksums(&mut self.map);
    }

    // A lane entering DataPathInit latches its staged control byte into
    // the active control set.
    fn apply_staged_applications(&mut self) {
        for lane in 0..usize::from(self.config.n_lanes) {
            if self.sm.lane_state(lane) != DataPathState::Init {
                continue;
            }
            let bank = lane as u8 / cmis::LANES_PER_BANK;
            let idx = lane as u8 % cmis::LANES_PER_BANK;
            let staged = self
                .map
                .fetch_byte(PageRef::banked(bank, 0x10), cmis::page10::APP_SELECT + idx)
                .unwrap();
            self.map
                .store_byte(
                    PageRef::banked(bank, 0x11),
                    cmis::page11::ACTIVE_APP_SELECT + idx,
                    staged,
                )
                .unwrap();
        }
    }

    pub(crate) fn apply_lane_fault(&mut self, mask: u8, kind: FaultKind, active: bool) {
        debug!(
            self.log, "fault injection";
            "kind" => %kind, "mask" => mask, "active" => active,
        );
        self.faults.set_lanes(kind, mask, active);
        // Latch the lane flags and zero the affected monitors immediately.
        self.refresh();
    }

    /// Latch a module-level fault; only a reset pulse clears it.
    pub(crate) fn latch_module_fault(&mut self) {
        debug!(self.log, "module fault latched");
        self.sm.latch_fault();
        self.write_state_bytes();
        self.map
            .update_byte(PageRef::Lower, cmis::MODULE_FLAGS, |byte| {
                byte | cmis::FLAG_MODULE_STATE_CHANGED
            })
            .unwrap();
        self.sync_intl();
    }

    pub(crate) fn refresh_checksums(&mut self) {
        cmis::refresh_checksums(&mut self.map);
    }

    pub(crate) fn refresh(&mut self) {
        self.refresh_monitors();
        self.sync_intl();
    }

    fn refresh_monitors(&mut self) {
        let tx_disable = self
            .map
            .fetch_byte(PageRef::banked(0, 0x10), cmis::page10::TX_DISABLE)
            .unwrap_or(0);
        let inputs = MonitorInputs {
            telemetry: &self.telemetry,
            faults: &self.faults,
            tx_disable,
            optical: !self.config.media.is_copper(),
        };
        monitor::refresh_cmis(&mut self.map, &inputs);
    }

    fn control_inputs(&self) -> Inputs {
        let controls = self
            .map
            .fetch_byte(PageRef::Lower, cmis::GLOBAL_CONTROLS)
            .unwrap_or(0);
        let page10 = PageRef::banked(0, 0x10);
        Inputs {
            reset_asserted: self
                .sideband
                .get(Signal::ResetL)
                .map(|level| level.is_low())
                .unwrap_or(false),
            low_power_requested: self
                .sideband
                .get(Signal::LPMode)
                .map(|level| level.is_high())
                .unwrap_or(false)
                || controls & cmis::LOW_PWR_REQUEST != 0,
            dp_deinit: self
                .map
                .fetch_byte(page10, cmis::page10::DATA_PATH_DEINIT)
                .unwrap_or(0),
            tx_disable: self
                .map
                .fetch_byte(page10, cmis::page10::TX_DISABLE)
                .unwrap_or(0),
        }
    }

    // Mirror the state machines into the state registers.
    fn write_state_bytes(&mut self) {
        let intl = self
            .map
            .fetch_byte(PageRef::Lower, cmis::MODULE_STATE)
            .unwrap_or(cmis::INTL_DEASSERTED)
            & cmis::INTL_DEASSERTED;
        self.map
            .store_byte(
                PageRef::Lower,
                cmis::MODULE_STATE,
                self.sm.state().code() << cmis::STATE_SHIFT | intl,
            )
            .unwrap();

        let n_lanes = usize::from(self.config.n_lanes);
        let n_banks = self.config.n_lanes.div_ceil(cmis::LANES_PER_BANK);
        for bank in 0..n_banks {
            let page = PageRef::banked(bank, 0x11);
            let mut nibbles = [0u8; 4];
            for idx in 0..usize::from(cmis::LANES_PER_BANK) {
                let lane = usize::from(bank) * 8 + idx;
                let code = if lane < n_lanes {
                    self.sm.lane_state(lane).code()
                } else {
                    DataPathState::Deactivated.code()
                };
                nibbles[idx / 2] |= code << (4 * (idx % 2));
            }
            self.map
                .store(page, cmis::page11::DATA_PATH_STATE, &nibbles)
                .unwrap();
        }
    }

    // A completed reset returns the control registers to defaults. Latched
    // lane faults describe external conditions and survive.
    fn reset_registers(&mut self) {
        self.map
            .store_byte(PageRef::Lower, cmis::GLOBAL_CONTROLS, 0)
            .unwrap();
        self.map
            .store(PageRef::Lower, cmis::MODULE_FLAGS, &[0; 4])
            .unwrap();
        let n_banks = self.config.n_lanes.div_ceil(cmis::LANES_PER_BANK);
        for bank in 0..n_banks {
            let control = PageRef::banked(bank, 0x10);
            self.map
                .store(control, cmis::page10::DATA_PATH_DEINIT, &[0; 3])
                .unwrap();
            let status = PageRef::banked(bank, 0x11);
            let span = cmis::page11::FLAG_SPAN;
            let len = usize::from(span.end() - span.start()) + 1;
            self.map.store(status, *span.start(), &vec![0; len]).unwrap();
            for idx in 0..cmis::LANES_PER_BANK {
                if u16::from(bank) * 8 + u16::from(idx) >= u16::from(self.config.n_lanes) {
                    break;
                }
                self.map
                    .store_byte(control, cmis::page10::APP_SELECT + idx, cmis::APP_SELECT_DEFAULT)
                    .unwrap();
                self.map
                    .store_byte(
                        status,
                        cmis::page11::ACTIVE_APP_SELECT + idx,
                        cmis::APP_SELECT_DEFAULT,
                    )
                    .unwrap();
            }
        }
        self.write_state_bytes();
    }

    // Clear latched flags covered by a host read, then recompute IntL.
    fn clear_read_flags(&mut self, offset: u8, len: usize) {
        let end = usize::from(offset) + len;
        let mut cleared = false;
        if usize::from(offset) < PAGE_SIZE {
            for flag in cmis::FLAG_SPAN {
                if flag >= offset && usize::from(flag) < end {
                    self.map.store_byte(PageRef::Lower, flag, 0).unwrap();
                    cleared = true;
                }
            }
        } else if self.map.selected_page() == 0x11 {
            let page = PageRef::banked(self.map.selected_bank(), 0x11);
            for flag in cmis::page11::FLAG_SPAN {
                if flag >= offset && usize::from(flag) < end {
                    if self.map.store_byte(page, flag, 0).is_ok() {
                        cleared = true;
                    }
                }
            }
        }
        if cleared {
            self.sync_intl();
        }
    }

    // Drive IntL and its mirror bit in the module state byte: the bit
    // reads 1 while the interrupt is deasserted.
    fn sync_intl(&mut self) {
        let interrupt = monitor::any_unmasked_flags_cmis(&self.map, self.config.n_lanes);
        self.sideband
            .set_module(Signal::IntL, Level::active_high(!interrupt));
        self.map
            .update_byte(PageRef::Lower, cmis::MODULE_STATE, |byte| {
                if interrupt {
                    byte & !cmis::INTL_DEASSERTED
                } else {
                    byte | cmis::INTL_DEASSERTED
                }
            })
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormFactor;
    use transceiver_map::encode;
    use transceiver_map::ManagementInterface;

    fn module() -> CmisModule {
        let log = Logger::root(slog::Discard, o!());
        let config = ModuleConfig::builder(FormFactor::Qsfp, ManagementInterface::Cmis)
            .vendor_name("Test Vendor")
            .part_number("QSFP-DR4-400G")
            .serial_number("OPT00004")
            .n_lanes(8)
            .supported_rates_gbps(vec![100.0, 400.0])
            .build()
            .unwrap();
        CmisModule::new(config, &log).unwrap()
    }

    fn state_byte(module: &mut CmisModule) -> u8 {
        module.read(DEVICE_MGMT, cmis::MODULE_STATE, 1).unwrap()[0]
    }

    #[test]
    fn test_fresh_module_is_low_power() {
        let mut module = module();
        assert_eq!(module.state(), ModuleState::LowPwr);
        assert_eq!(
            state_byte(&mut module) & cmis::STATE_MASK,
            ModuleState::LowPwr.code() << cmis::STATE_SHIFT
        );
    }

    #[test]
    fn test_power_up_to_ready() {
        let mut module = module();
        module
            .set_host_signal(Signal::LPMode, Level::Low)
            .unwrap();
        module.tick();
        assert_eq!(module.state(), ModuleState::PwrUp);
        module.tick();
        assert_eq!(module.state(), ModuleState::Ready);
        assert_eq!(
            state_byte(&mut module) & cmis::STATE_MASK,
            ModuleState::Ready.code() << cmis::STATE_SHIFT
        );
    }

    #[test]
    fn test_low_pwr_request_sw_holds_module_down() {
        let mut module = module();
        module
            .write(DEVICE_MGMT, cmis::GLOBAL_CONTROLS, &[cmis::LOW_PWR_REQUEST])
            .unwrap();
        module
            .set_host_signal(Signal::LPMode, Level::Low)
            .unwrap();
        for _ in 0..4 {
            module.tick();
        }
        assert_eq!(module.state(), ModuleState::LowPwr);

        module.write(DEVICE_MGMT, cmis::GLOBAL_CONTROLS, &[0]).unwrap();
        module.tick();
        module.tick();
        assert_eq!(module.state(), ModuleState::Ready);
    }

    #[test]
    fn test_data_paths_activate() {
        let mut module = module();
        module
            .set_host_signal(Signal::LPMode, Level::Low)
            .unwrap();
        for _ in 0..5 {
            module.tick();
        }
        assert_eq!(module.state(), ModuleState::Ready);
        for lane in 0..8 {
            assert_eq!(module.lane_state(lane), DataPathState::Activated);
        }
        // Lane 0 in the low nibble: both lanes of the first byte activated.
        module.write(DEVICE_MGMT, 127, &[0x11]).unwrap();
        let nibbles = module
            .read(DEVICE_MGMT, cmis::page11::DATA_PATH_STATE, 4)
            .unwrap();
        assert_eq!(nibbles, vec![0x44; 4]);
    }

    #[test]
    fn test_reset_pulse_returns_to_low_power() {
        let mut module = module();
        module
            .set_host_signal(Signal::LPMode, Level::Low)
            .unwrap();
        for _ in 0..5 {
            module.tick();
        }
        assert_eq!(module.state(), ModuleState::Ready);

        module.set_host_signal(Signal::ResetL, Level::Low).unwrap();
        module.tick();
        module.tick();
        assert_eq!(module.state(), ModuleState::LowPwr);
        module
            .set_host_signal(Signal::ResetL, Level::High)
            .unwrap();
    }

    #[test]
    fn test_dp_deinit_write_in_low_power_is_invalid() {
        let mut module = module();
        assert_eq!(module.state(), ModuleState::LowPwr);
        module.write(DEVICE_MGMT, 127, &[0x10]).unwrap();
        let err = module
            .write(DEVICE_MGMT, cmis::page10::DATA_PATH_DEINIT, &[0x00])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // The byte was stored regardless.
        assert_eq!(
            module
                .read(DEVICE_MGMT, cmis::page10::DATA_PATH_DEINIT, 1)
                .unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_application_selection() {
        let mut module = module();
        module
            .set_host_signal(Signal::LPMode, Level::Low)
            .unwrap();
        for _ in 0..5 {
            module.tick();
        }
        assert_eq!(module.active_application(0), 1);

        // Stage application 2 on lane 0 and bounce its data path.
        module.write(DEVICE_MGMT, 127, &[0x10]).unwrap();
        module
            .write(DEVICE_MGMT, cmis::page10::APP_SELECT, &[0x20])
            .unwrap();
        module
            .write(DEVICE_MGMT, cmis::page10::DATA_PATH_DEINIT, &[0x01])
            .unwrap();
        module.tick();
        module.tick();
        module
            .write(DEVICE_MGMT, cmis::page10::DATA_PATH_DEINIT, &[0x00])
            .unwrap();
        for _ in 0..3 {
            module.tick();
        }
        assert_eq!(module.lane_state(0), DataPathState::Activated);
        assert_eq!(module.active_application(0), 2);
        // The other lanes keep the default.
        assert_eq!(module.active_application(1), 1);
    }

    #[test]
    fn test_unadvertised_application_code_is_reported() {
        let mut module = module();
        module.write(DEVICE_MGMT, 127, &[0x10]).unwrap();
        let err = module
            .write(DEVICE_MGMT, cmis::page10::APP_SELECT, &[0xf0])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // The byte was stored regardless.
        assert_eq!(
            module
                .read(DEVICE_MGMT, cmis::page10::APP_SELECT, 1)
                .unwrap(),
            vec![0xf0]
        );
    }

    #[test]
    fn test_module_monitors() {
        let mut module = module();
        module.telemetry.temperature_c = 45.0;
        module.telemetry.supply_voltage_v = 3.25;
        module.tick();
        assert_eq!(
            module.read(DEVICE_MGMT, cmis::TEMPERATURE, 2).unwrap(),
            vec![0x2d, 0x00]
        );
        assert_eq!(
            module.read(DEVICE_MGMT, cmis::VOLTAGE, 2).unwrap(),
            encode::supply_voltage(3.25)
        );
    }

    #[test]
    fn test_lane_monitors_on_page_11() {
        let mut module = module();
        module.tick();
        module.write(DEVICE_MGMT, 127, &[0x11]).unwrap();
        let raw = module
            .read(DEVICE_MGMT, cmis::page11::TX_POWER, 2)
            .unwrap();
        assert_eq!(
            raw,
            encode::optical_power(crate::telemetry::DEFAULT_TX_POWER_MW)
        );
    }

    #[test]
    fn test_tx_fault_latches_lane_flags() {
        let mut module = module();
        module.apply_lane_fault(0x05, FaultKind::TxFault, true);
        module.write(DEVICE_MGMT, 127, &[0x11]).unwrap();
        let span = cmis::page11::FLAG_SPAN;
        let len = usize::from(span.end() - span.start()) + 1;
        let flags = module.read(DEVICE_MGMT, *span.start(), len).unwrap();
        let fault_index = usize::from(cmis::page11::TX_FAULT_FLAGS - span.start());
        assert_eq!(flags[fault_index], 0x05);
        assert_eq!(module.sideband.get(Signal::IntL).unwrap(), Level::Low);
        // Reading the span cleared every latch and released the interrupt.
        let flags = module.read(DEVICE_MGMT, *span.start(), len).unwrap();
        assert!(flags.iter().all(|byte| *byte == 0));
        assert_eq!(module.sideband.get(Signal::IntL).unwrap(), Level::High);
    }

    #[test]
    fn test_module_fault_cleared_by_reset() {
        let mut module = module();
        module.latch_module_fault();
        assert_eq!(module.state(), ModuleState::Fault);
        assert_eq!(
            state_byte(&mut module) & cmis::STATE_MASK,
            ModuleState::Fault.code() << cmis::STATE_SHIFT
        );

        module.set_host_signal(Signal::ResetL, Level::Low).unwrap();
        module.tick();
        module.tick();
        assert_eq!(module.state(), ModuleState::LowPwr);
    }

    #[test]
    fn test_checksum_refreshed_after_control_write() {
        let mut module = module();
        module
            .write(DEVICE_MGMT, cmis::GLOBAL_CONTROLS, &[cmis::LOW_PWR_REQUEST])
            .unwrap();
        module.tick();
        let sum = module.read(DEVICE_MGMT, cmis::CC_BASE, 1).unwrap()[0];
        let mut expected = 0u8;
        for byte in module.read(DEVICE_MGMT, 0, 63).unwrap() {
            expected = expected.wrapping_add(byte);
        }
        assert_eq!(sum, expected);
    }
}
