// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! QSFP+ and QSFP28 modules with the SFF-8636 management interface.

use crate::config::ModuleConfig;
use crate::module::DEVICE_MGMT;
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
use transceiver_map::layout::sff8636;
use transceiver_map::layout::ModuleInfo;
use transceiver_map::MemoryMap;
use transceiver_map::PageRef;
use transceiver_map::PAGE_SIZE;

/// An emulated QSFP+/QSFP28 module.
///
/// SFF-8636 has no explicit state machine; control is the TX-disable and
/// power-control bytes. Interrupt flags are latched: conditions are OR-ed in
/// by the monitoring engine and cleared when the host reads the flag bytes,
/// which also releases `IntL`.
#[derive(Debug)]
pub struct Sff8636Module {
    pub(crate) config: ModuleConfig,
    pub(crate) telemetry: Telemetry,
    pub(crate) faults: FaultState,
    pub(crate) sideband: Sideband,
    map: MemoryMap,
    info: ModuleInfo,
    log: Logger,
}

impl Sff8636Module {
    pub(crate) fn new(config: ModuleConfig, log: &Logger) -> Result<Self, Error> {
        let info = config.module_info()?;
        let log = log.new(o!(
            "module" => "sff8636",
            "part" => config.part_number.clone(),
        ));
        let telemetry = Telemetry::new(config.n_lanes, !config.media.is_copper());
        let sideband = Sideband::new(&[
            (Signal::ModPrsL, Level::Low),
            (Signal::ResetL, Level::High),
            (Signal::LPMode, Level::High),
            (Signal::IntL, Level::High),
        ]);
        let mut module = Self {
            map: sff8636::map(&info, &config.thresholds),
            info,
            config,
            telemetry,
            faults: FaultState::default(),
            sideband,
            log,
        };
        module.refresh();
        Ok(module)
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
        // Control writes take effect without waiting for a tick.
        let touches_control = offset <= 99 && usize::from(offset) + data.len() > 86;
        if usize::from(offset) < PAGE_SIZE && touches_control {
            self.refresh();
        }
        Ok(())
    }

    pub(crate) fn set_host_signal(&mut self, signal: Signal, level: Level) -> Result<(), Error> {
        let previous = self.sideband.set_host(signal, level)?;
        if signal == Signal::ResetL && previous.is_high() && level.is_low() {
            self.reset();
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
        self.faults.set_lanes(kind, mask & 0x0f, active);
        // Latch the flag and zero the affected monitors immediately.
        self.refresh();
    }

    pub(crate) fn refresh_checksums(&mut self) {
        sff8636::refresh_checksums(&mut self.map);
    }

    // A hardware reset returns every register to its initial image. Latched
    // fault state describes external conditions and survives.
    fn reset(&mut self) {
        debug!(self.log, "hardware reset");
        self.map = sff8636::map(&self.info, &self.config.thresholds);
        self.refresh();
    }

    pub(crate) fn refresh(&mut self) {
        let tx_disable = self
            .map
            .fetch_byte(PageRef::Lower, sff8636::TX_DISABLE)
            .unwrap_or(0)
            & 0x0f;
        let inputs = MonitorInputs {
            telemetry: &self.telemetry,
            faults: &self.faults,
            tx_disable,
            optical: !self.config.media.is_copper(),
        };
        let interrupt = monitor::refresh_sff8636(&mut self.map, &inputs);
        self.sync_intl(interrupt);
    }

    // Clear latched flags covered by a host read of the lower page.
    fn clear_read_flags(&mut self, offset: u8, len: usize) {
        if usize::from(offset) >= PAGE_SIZE {
            return;
        }
        let span = sff8636::FLAG_SPAN;
        let end = usize::from(offset) + len;
        let mut cleared = false;
        for flag in span {
            if flag >= offset && usize::from(flag) < end {
                self.map.store_byte(PageRef::Lower, flag, 0).unwrap();
                cleared = true;
            }
        }
        if cleared {
            let interrupt = monitor::any_flags_8636(&self.map);
            self.sync_intl(interrupt);
        }
    }

    // Drive IntL and its mirror bit in the status byte: the bit reads 1
    // while the interrupt is deasserted.
    fn sync_intl(&mut self, interrupt: bool) {
        self.sideband
            .set_module(Signal::IntL, Level::active_high(!interrupt));
        self.map
            .update_byte(PageRef::Lower, sff8636::STATUS, |byte| {
                if interrupt {
                    byte & !sff8636::STATUS_INTL
                } else {
                    byte | sff8636::STATUS_INTL
                }
            })
            .unwrap();
    }
}
