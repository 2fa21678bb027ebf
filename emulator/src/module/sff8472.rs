// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! SFP modules with the SFF-8472 management interface.

use crate::config::ModuleConfig;
use crate::monitor;
use crate::monitor::MonitorInputs;
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
use transceiver_map::layout::sff8472;
use transceiver_map::layout::sff8472::StatusControl;
use transceiver_map::MemoryMap;
use transceiver_map::PageRef;

/// An emulated SFP/SFP+/SFP28 module.
///
/// SFF-8472 has no explicit state machine: the module's "state" is the set
/// of control and status bits, plus the TxDisable/TxFault/RxLOS cage pins.
/// The serial-ID map at A0h always exists; the diagnostics map at A2h only
/// when the module implements DOM, and addressing A2h without it fails with
/// [`Error::InvalidAddress`].
#[derive(Debug)]
pub struct Sff8472Module {
    pub(crate) config: ModuleConfig,
    pub(crate) telemetry: Telemetry,
    pub(crate) faults: FaultState,
    pub(crate) sideband: Sideband,
    id_map: MemoryMap,
    diag: Option<MemoryMap>,
    soft_tx_disable: bool,
    log: Logger,
}

impl Sff8472Module {
    pub(crate) fn new(config: ModuleConfig, log: &Logger) -> Result<Self, Error> {
        let info = config.module_info()?;
        let log = log.new(o!(
            "module" => "sff8472",
            "part" => config.part_number.clone(),
        ));
        let diag = config
            .has_dom()
            .then(|| sff8472::diagnostic_map(&config.thresholds));
        let telemetry = Telemetry::new(config.n_lanes, !config.media.is_copper());
        let sideband = Sideband::new(&[
            (Signal::ModPrsL, Level::Low),
            (Signal::TxDisable, Level::Low),
            (Signal::TxFault, Level::Low),
            (Signal::RxLos, Level::Low),
        ]);
        let mut module = Self {
            id_map: sff8472::id_map(&info),
            diag,
            config,
            telemetry,
            faults: FaultState::default(),
            soft_tx_disable: false,
            sideband,
            log,
        };
        module.refresh();
        Ok(module)
    }

    pub(crate) fn read(&mut self, dev_addr: u8, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        match dev_addr {
            sff8472::DEVICE_A0 => Ok(self.id_map.read(offset, len)?),
            sff8472::DEVICE_A2 => {
                let diag = self.diag.as_ref().ok_or(Error::InvalidAddress(dev_addr))?;
                Ok(diag.read(offset, len)?)
            }
            _ => Err(Error::InvalidAddress(dev_addr)),
        }
    }

    pub(crate) fn write(&mut self, dev_addr: u8, offset: u8, data: &[u8]) -> Result<(), Error> {
        match dev_addr {
            sff8472::DEVICE_A0 => Ok(self.id_map.write(offset, data)?),
            sff8472::DEVICE_A2 => {
                let diag = self.diag.as_mut().ok_or(Error::InvalidAddress(dev_addr))?;
                diag.write(offset, data)?;
                let touches_control = offset <= sff8472::STATUS_CONTROL
                    && usize::from(offset) + data.len() > usize::from(sff8472::STATUS_CONTROL);
                if touches_control {
                    let byte = diag.fetch_byte(PageRef::Lower, sff8472::STATUS_CONTROL)?;
                    let soft = byte & StatusControl::SOFT_TX_DISABLE.bits() != 0;
                    if soft != self.soft_tx_disable {
                        debug!(self.log, "soft tx disable"; "disabled" => soft);
                        self.soft_tx_disable = soft;
                    }
                    self.refresh();
                }
                Ok(())
            }
            _ => Err(Error::InvalidAddress(dev_addr)),
        }
    }

    pub(crate) fn set_host_signal(&mut self, signal: Signal, level: Level) -> Result<(), Error> {
        let previous = self.sideband.set_host(signal, level)?;
        if signal == Signal::TxDisable && previous != level {
            debug!(self.log, "tx disable pin"; "level" => ?level);
            self.refresh();
        }
        Ok(())
    }

    pub(crate) fn tick(&mut self) {
        self.refresh();
    }

    pub(crate) fn apply_lane_fault(&mut self, mask: u8, kind: FaultKind, active: bool) {
        debug!(
            self.log, "fault injection";
            "kind" => %kind, "mask" => mask, "active" => active,
        );
        self.faults.set_lanes(kind, mask & 0x01, active);
        // Status bits and monitor registers reflect the fault immediately.
        self.refresh();
    }

    pub(crate) fn refresh_checksums(&mut self) {
        sff8472::refresh_id_checksums(&mut self.id_map);
    }

    fn tx_disabled(&self) -> bool {
        self.soft_tx_disable
            || self
                .sideband
                .get(Signal::TxDisable)
                .map(|level| level.is_high())
                .unwrap_or(false)
    }

    // Re-encode telemetry, re-evaluate thresholds, and recompute the status
    // byte and module-driven pins.
    pub(crate) fn refresh(&mut self) {
        let tx_disabled = self.tx_disabled();
        if let Some(diag) = self.diag.as_mut() {
            let inputs = MonitorInputs {
                telemetry: &self.telemetry,
                faults: &self.faults,
                tx_disable: u8::from(tx_disabled),
                optical: !self.config.media.is_copper(),
            };
            monitor::refresh_sff8472(diag, &inputs);

            let mut status = StatusControl::empty();
            status.set(StatusControl::SOFT_TX_DISABLE, self.soft_tx_disable);
            status.set(StatusControl::TX_DISABLE_STATE, tx_disabled);
            status.set(StatusControl::TX_FAULT, self.faults.tx_fault & 0x01 != 0);
            status.set(StatusControl::RX_LOS, self.faults.rx_los & 0x01 != 0);
            diag.store_byte(PageRef::Lower, sff8472::STATUS_CONTROL, status.bits())
                .unwrap();
        }
        self.sideband.set_module(
            Signal::TxFault,
            Level::active_high(self.faults.tx_fault & 0x01 != 0),
        );
        self.sideband.set_module(
            Signal::RxLos,
            Level::active_high(self.faults.rx_los & 0x01 != 0),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormFactor;
    use crate::config::MediaType;
    use crate::Error;
    use transceiver_map::encode;
    use transceiver_map::ManagementInterface;

    fn module() -> Sff8472Module {
        let log = Logger::root(slog::Discard, o!());
        let config = ModuleConfig::builder(FormFactor::Sfp, ManagementInterface::Sff8472)
            .vendor_name("Test Vendor")
            .part_number("SFP-SR-25G")
            .serial_number("OPT00001")
            .build()
            .unwrap();
        Sff8472Module::new(config, &log).unwrap()
    }

    #[test]
    fn test_identifier_and_vendor() {
        let mut module = module();
        assert_eq!(module.read(0xa0, 0, 1).unwrap(), vec![0x03]);
        assert_eq!(
            module.read(0xa0, sff8472::VENDOR_NAME, 16).unwrap(),
            b"Test Vendor     ".to_vec()
        );
    }

    #[test]
    fn test_temperature_encoding() {
        let mut module = module();
        module.telemetry.temperature_c = 45.0;
        module.tick();
        assert_eq!(
            module.read(0xa2, sff8472::TEMPERATURE, 2).unwrap(),
            vec![0x2d, 0x00]
        );
    }

    #[test]
    fn test_unknown_device_address() {
        let mut module = module();
        assert_eq!(
            module.read(0x50, 0, 1).unwrap_err(),
            Error::InvalidAddress(0x50)
        );
    }

    #[test]
    fn test_copper_module_has_no_dom() {
        let log = Logger::root(slog::Discard, o!());
        let config = ModuleConfig::builder(FormFactor::Sfp, ManagementInterface::Sff8472)
            .media(MediaType::CopperPassive)
            .build()
            .unwrap();
        let mut module = Sff8472Module::new(config, &log).unwrap();
        assert_eq!(
            module.read(0xa2, 0, 1).unwrap_err(),
            Error::InvalidAddress(0xa2)
        );
    }

    #[test]
    fn test_tx_fault_sets_status_and_pin() {
        let mut module = module();
        module.apply_lane_fault(0x01, FaultKind::TxFault, true);
        let status = module.read(0xa2, sff8472::STATUS_CONTROL, 1).unwrap()[0];
        assert_eq!(status & StatusControl::TX_FAULT.bits(), 0x04);
        assert_eq!(module.sideband.get(Signal::TxFault).unwrap(), Level::High);
        // Transmit power reads zero while faulted.
        assert_eq!(
            module.read(0xa2, sff8472::TX_POWER, 2).unwrap(),
            vec![0, 0]
        );

        module.apply_lane_fault(0x01, FaultKind::TxFault, false);
        let status = module.read(0xa2, sff8472::STATUS_CONTROL, 1).unwrap()[0];
        assert_eq!(status & StatusControl::TX_FAULT.bits(), 0);
        assert_eq!(
            module.read(0xa2, sff8472::TX_POWER, 2).unwrap(),
            encode::optical_power(crate::telemetry::DEFAULT_TX_POWER_MW)
        );
    }

    #[test]
    fn test_soft_tx_disable_via_register_write() {
        let mut module = module();
        module
            .write(
                0xa2,
                sff8472::STATUS_CONTROL,
                &[StatusControl::SOFT_TX_DISABLE.bits()],
            )
            .unwrap();
        let status = module.read(0xa2, sff8472::STATUS_CONTROL, 1).unwrap()[0];
        assert!(status & StatusControl::TX_DISABLE_STATE.bits() != 0);
        assert_eq!(
            module.read(0xa2, sff8472::TX_POWER, 2).unwrap(),
            vec![0, 0]
        );
    }

    #[test]
    fn test_tx_disable_pin() {
        let mut module = module();
        module
            .set_host_signal(Signal::TxDisable, Level::High)
            .unwrap();
        let status = module.read(0xa2, sff8472::STATUS_CONTROL, 1).unwrap()[0];
        assert!(status & StatusControl::TX_DISABLE_STATE.bits() != 0);
    }

    #[test]
    fn test_high_temp_alarm_flag() {
        let mut module = module();
        module.telemetry.temperature_c = 80.0;
        module.tick();
        let flags = module.read(0xa2, sff8472::ALARM_FLAGS, 1).unwrap()[0];
        assert!(flags & sff8472::MonitorFlags1::TEMP_HIGH.bits() != 0);

        // Flags are live, not latched.
        module.telemetry.temperature_c = 25.0;
        module.tick();
        let flags = module.read(0xa2, sff8472::ALARM_FLAGS, 1).unwrap()[0];
        assert!(flags & sff8472::MonitorFlags1::TEMP_HIGH.bits() == 0);
    }
}
