// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The two-wire bus fabric and sideband routing for module cages.
//!
//! A [`Cage`] is the host-facing contract for one module slot: register and
//! block transfers keyed by device address, page-programming helpers, and
//! the GPIO lines. A [`Bus`] multiplexes several cages keyed by slot id,
//! serializing all access through a single ownership point. Both present
//! the same flat `(device_address, offset)` space whether the module splits
//! it across two device addresses (SFF-8472) or pages a single one
//! (SFF-8636, CMIS).

use crate::module::Module;
use crate::Error;
use crate::Level;
use crate::ManagementInterface;
use crate::Signal;
use slog::debug;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use transceiver_map::PAGE_SELECT;

pub use crate::module::DEVICE_MGMT;
pub use transceiver_map::layout::sff8472::DEVICE_A0;
pub use transceiver_map::layout::sff8472::DEVICE_A2;

/// One module cage: a slot on the bus plus its sideband lines.
pub struct Cage {
    slot: u8,
    module: Option<Module>,
    log: Logger,
}

impl Cage {
    /// A standalone cage, reported as slot 0.
    pub fn new(log: &Logger) -> Self {
        Self::with_slot(0, log)
    }

    pub(crate) fn with_slot(slot: u8, log: &Logger) -> Self {
        Self {
            slot,
            module: None,
            log: log.new(o!("component" => "cage", "slot" => slot)),
        }
    }

    /// Seat a module in the cage. `ModPrsL` asserts (low) as a result.
    pub fn attach(&mut self, module: Module) -> Result<(), Error> {
        if self.module.is_some() {
            return Err(Error::SlotOccupied(self.slot));
        }
        debug!(
            self.log, "module attached";
            "interface" => %module.interface(),
            "part" => module.config().part_number.clone(),
        );
        self.module = Some(module);
        Ok(())
    }

    /// Remove the module. `ModPrsL` deasserts and the module's map is
    /// dropped with it unless the caller keeps the returned value.
    pub fn detach(&mut self) -> Result<Module, Error> {
        let module = self.module.take().ok_or(Error::NoModule)?;
        debug!(self.log, "module detached");
        Ok(module)
    }

    /// True if a module is seated.
    pub fn is_occupied(&self) -> bool {
        self.module.is_some()
    }

    /// The seated module, if any.
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    /// Mutable access to the seated module, for telemetry and fault
    /// injection.
    pub fn module_mut(&mut self) -> Option<&mut Module> {
        self.module.as_mut()
    }

    /// Read a single byte.
    pub fn read_register(&mut self, dev_addr: u8, offset: u8) -> Result<u8, Error> {
        Ok(self.seated()?.read(dev_addr, offset, 1)?[0])
    }

    /// Write a single byte.
    pub fn write_register(&mut self, dev_addr: u8, offset: u8, value: u8) -> Result<(), Error> {
        self.seated()?.write(dev_addr, offset, &[value])
    }

    /// Read a block of `len` bytes.
    pub fn read_block(&mut self, dev_addr: u8, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        self.seated()?.read(dev_addr, offset, len)
    }

    /// Write a block of bytes.
    pub fn write_block(&mut self, dev_addr: u8, offset: u8, data: &[u8]) -> Result<(), Error> {
        self.seated()?.write(dev_addr, offset, data)
    }

    /// Read from an upper page, programming the page-select register
    /// first.
    pub fn read_page(&mut self, page: u8, offset: u8, len: usize) -> Result<Vec<u8>, Error> {
        let dev_addr = self.mgmt_device()?;
        self.write_register(dev_addr, PAGE_SELECT, page)?;
        self.read_block(dev_addr, offset, len)
    }

    /// Write to an upper page, programming the page-select register first.
    pub fn write_page(&mut self, page: u8, offset: u8, data: &[u8]) -> Result<(), Error> {
        let dev_addr = self.mgmt_device()?;
        self.write_register(dev_addr, PAGE_SELECT, page)?;
        self.write_block(dev_addr, offset, data)
    }

    /// The level of a sideband signal.
    ///
    /// An empty cage still reports `ModPrsL` (high, absent); every other
    /// line floats and reads as an error.
    pub fn gpio(&self, signal: Signal) -> Result<Level, Error> {
        match &self.module {
            Some(module) => module.sideband().get(signal),
            None if signal == Signal::ModPrsL => Ok(Level::High),
            None => Err(Error::NoModule),
        }
    }

    /// Drive a host-driven sideband signal.
    pub fn set_gpio(&mut self, signal: Signal, level: Level) -> Result<(), Error> {
        self.seated()?.set_host_signal(signal, level)
    }

    /// Advance the seated module by one tick. Empty cages ignore ticks.
    pub fn tick(&mut self) {
        if let Some(module) = self.module.as_mut() {
            module.tick();
        }
    }

    fn seated(&mut self) -> Result<&mut Module, Error> {
        self.module.as_mut().ok_or(Error::NoModule)
    }

    fn mgmt_device(&mut self) -> Result<u8, Error> {
        match self.seated()?.interface() {
            ManagementInterface::Sff8636 | ManagementInterface::Cmis => Ok(DEVICE_MGMT),
            // SFF-8472 maps are flat; there is no page-select register to
            // program.
            ManagementInterface::Sff8472 => Err(Error::InvalidAddress(DEVICE_MGMT)),
        }
    }
}

/// A multi-slot bus fabric.
///
/// All module access on a bus funnels through this single owner; slots are
/// independent cages addressed by slot id.
pub struct Bus {
    slots: BTreeMap<u8, Cage>,
    log: Logger,
}

impl Bus {
    /// A bus with slots `0..n_slots`.
    pub fn new(n_slots: u8, log: &Logger) -> Self {
        let log = log.new(o!("component" => "bus"));
        let slots = (0..n_slots)
            .map(|slot| (slot, Cage::with_slot(slot, &log)))
            .collect();
        Self { slots, log }
    }

    /// The cage at `slot`.
    pub fn cage(&self, slot: u8) -> Result<&Cage, Error> {
        self.slots.get(&slot).ok_or(Error::UnknownSlot(slot))
    }

    /// Mutable access to the cage at `slot`.
    pub fn cage_mut(&mut self, slot: u8) -> Result<&mut Cage, Error> {
        self.slots.get_mut(&slot).ok_or(Error::UnknownSlot(slot))
    }

    /// Seat a module at `slot`.
    pub fn attach(&mut self, slot: u8, module: Module) -> Result<(), Error> {
        debug!(self.log, "attach"; "slot" => slot);
        self.cage_mut(slot)?.attach(module)
    }

    /// Remove the module at `slot`.
    pub fn detach(&mut self, slot: u8) -> Result<Module, Error> {
        debug!(self.log, "detach"; "slot" => slot);
        self.cage_mut(slot)?.detach()
    }

    /// Read a single byte from the module at `slot`.
    pub fn read_register(&mut self, slot: u8, dev_addr: u8, offset: u8) -> Result<u8, Error> {
        self.cage_mut(slot)?.read_register(dev_addr, offset)
    }

    /// Write a single byte to the module at `slot`.
    pub fn write_register(
        &mut self,
        slot: u8,
        dev_addr: u8,
        offset: u8,
        value: u8,
    ) -> Result<(), Error> {
        self.cage_mut(slot)?.write_register(dev_addr, offset, value)
    }

    /// Read a block from the module at `slot`.
    pub fn read_block(
        &mut self,
        slot: u8,
        dev_addr: u8,
        offset: u8,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        self.cage_mut(slot)?.read_block(dev_addr, offset, len)
    }

    /// Write a block to the module at `slot`.
    pub fn write_block(
        &mut self,
        slot: u8,
        dev_addr: u8,
        offset: u8,
        data: &[u8],
    ) -> Result<(), Error> {
        self.cage_mut(slot)?.write_block(dev_addr, offset, data)
    }

    /// The level of a sideband signal at `slot`.
    pub fn gpio(&self, slot: u8, signal: Signal) -> Result<Level, Error> {
        self.cage(slot)?.gpio(signal)
    }

    /// Drive a host-driven sideband signal at `slot`.
    pub fn set_gpio(&mut self, slot: u8, signal: Signal, level: Level) -> Result<(), Error> {
        self.cage_mut(slot)?.set_gpio(signal, level)
    }

    /// Advance every seated module by one tick.
    pub fn tick_all(&mut self) {
        for cage in self.slots.values_mut() {
            cage.tick();
        }
    }
}
