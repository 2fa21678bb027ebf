// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The sideband (GPIO) signals of a transceiver cage.
//!
//! Each signal has a fixed driving side. Host-driven lines are inputs to the
//! module and feed its state logic; module-driven lines are outputs the host
//! observes by polling, or through a registered change observer. A given
//! form factor wires only a subset of the signals: an SFP cage has
//! TxDisable/TxFault/RxLOS pins but no ResetL or LPMode, and the reverse
//! holds for QSFP and OSFP cages.

use crate::Error;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named sideband signal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Module present, active low. Module-driven.
    ModPrsL,
    /// Hardware reset, active low. Host-driven.
    ResetL,
    /// Force low-power mode, active high. Host-driven.
    LPMode,
    /// Interrupt, active low. Module-driven.
    IntL,
    /// Disable the transmitter, active high. Host-driven, SFP only.
    TxDisable,
    /// Receiver loss of signal, active high. Module-driven, SFP only.
    RxLos,
    /// Transmitter fault, active high. Module-driven, SFP only.
    TxFault,
}

impl Signal {
    /// Which side drives the signal.
    pub const fn direction(&self) -> Direction {
        match self {
            Signal::ResetL | Signal::LPMode | Signal::TxDisable => Direction::HostDriven,
            Signal::ModPrsL | Signal::IntL | Signal::RxLos | Signal::TxFault => {
                Direction::ModuleDriven
            }
        }
    }
}

impl core::fmt::Display for Signal {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Signal::ModPrsL => write!(f, "ModPrsL"),
            Signal::ResetL => write!(f, "ResetL"),
            Signal::LPMode => write!(f, "LPMode"),
            Signal::IntL => write!(f, "IntL"),
            Signal::TxDisable => write!(f, "TxDisable"),
            Signal::RxLos => write!(f, "RxLOS"),
            Signal::TxFault => write!(f, "TxFault"),
        }
    }
}

/// The driving side of a signal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HostDriven,
    ModuleDriven,
}

/// The level of a signal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn is_low(&self) -> bool {
        matches!(self, Level::Low)
    }

    pub const fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }

    // The level of an active-high output that is `active`.
    pub(crate) const fn active_high(active: bool) -> Self {
        if active {
            Level::High
        } else {
            Level::Low
        }
    }
}

type Observer = Box<dyn FnMut(Signal, Level)>;

/// The sideband signal block of one cage.
///
/// Only the signals wired for the module's form factor are present; driving
/// or reading an absent signal is an error.
pub struct Sideband {
    levels: BTreeMap<Signal, Level>,
    observers: Vec<Observer>,
}

impl Sideband {
    pub(crate) fn new(wired: &[(Signal, Level)]) -> Self {
        Self {
            levels: wired.iter().copied().collect(),
            observers: Vec::new(),
        }
    }

    /// The current level of a signal.
    pub fn get(&self, signal: Signal) -> Result<Level, Error> {
        self.levels
            .get(&signal)
            .copied()
            .ok_or(Error::SignalNotWired(signal))
    }

    /// True if the signal exists on this cage.
    pub fn is_wired(&self, signal: Signal) -> bool {
        self.levels.contains_key(&signal)
    }

    /// Register an observer for module-driven transitions.
    ///
    /// The emulator never pushes events otherwise; hosts that do not
    /// register simply poll.
    pub fn on_change(&mut self, observer: impl FnMut(Signal, Level) + 'static) {
        self.observers.push(Box::new(observer));
    }

    // A host-driven transition. Returns the previous level so callers can
    // detect edges.
    pub(crate) fn set_host(&mut self, signal: Signal, level: Level) -> Result<Level, Error> {
        if signal.direction() != Direction::HostDriven {
            return Err(Error::NotHostDriven(signal));
        }
        let slot = self
            .levels
            .get_mut(&signal)
            .ok_or(Error::SignalNotWired(signal))?;
        Ok(std::mem::replace(slot, level))
    }

    // A module-driven transition. Observers fire only on an actual change.
    pub(crate) fn set_module(&mut self, signal: Signal, level: Level) {
        let Some(slot) = self.levels.get_mut(&signal) else {
            return;
        };
        if *slot == level {
            return;
        }
        *slot = level;
        for observer in &mut self.observers {
            observer(signal, level);
        }
    }
}

impl core::fmt::Debug for Sideband {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Sideband")
            .field("levels", &self.levels)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Level;
    use super::Sideband;
    use super::Signal;
    use crate::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn block() -> Sideband {
        Sideband::new(&[
            (Signal::ModPrsL, Level::Low),
            (Signal::ResetL, Level::High),
            (Signal::LPMode, Level::High),
            (Signal::IntL, Level::High),
        ])
    }

    #[test]
    fn test_direction_enforced() {
        let mut sideband = block();
        assert_eq!(
            sideband.set_host(Signal::IntL, Level::Low).unwrap_err(),
            Error::NotHostDriven(Signal::IntL)
        );
        assert_eq!(
            sideband.set_host(Signal::LPMode, Level::Low).unwrap(),
            Level::High
        );
        assert_eq!(sideband.get(Signal::LPMode).unwrap(), Level::Low);
    }

    #[test]
    fn test_unwired_signal() {
        let sideband = block();
        assert!(!sideband.is_wired(Signal::TxDisable));
        assert_eq!(
            sideband.get(Signal::TxDisable).unwrap_err(),
            Error::SignalNotWired(Signal::TxDisable)
        );
    }

    #[test]
    fn test_observer_fires_on_change_only() {
        let mut sideband = block();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&seen);
        sideband.on_change(move |signal, level| inner.borrow_mut().push((signal, level)));

        sideband.set_module(Signal::IntL, Level::High);
        assert!(seen.borrow().is_empty());
        sideband.set_module(Signal::IntL, Level::Low);
        assert_eq!(seen.borrow().as_slice(), &[(Signal::IntL, Level::Low)]);
    }
}
