// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The CMIS module and data-path state machines.
//!
//! Time advances only on explicit ticks. The module-level machine follows
//! CMIS 4.0 section 6.3: a reset pulse lands the module in `LowPwr` after a
//! configurable hold time, releasing the low-power request walks it through
//! `PwrUp` to `Ready`, and re-asserting it walks back through `PwrDn`. Each
//! lane runs an independent data-path ladder driven by its `DataPathDeinit`
//! and `OutputDisableTx` bits, evaluated in lane-index order so simultaneous
//! transitions resolve deterministically.

use serde::Deserialize;
use serde::Serialize;

/// The CMIS module-level state, encoded in bits 3..1 of lower-page byte 3.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    LowPwr,
    PwrUp,
    Ready,
    PwrDn,
    Fault,
}

impl ModuleState {
    /// The register encoding of the state.
    pub const fn code(&self) -> u8 {
        match self {
            ModuleState::LowPwr => 1,
            ModuleState::PwrUp => 2,
            ModuleState::Ready => 3,
            ModuleState::PwrDn => 4,
            ModuleState::Fault => 5,
        }
    }
}

impl core::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ModuleState::LowPwr => write!(f, "ModuleLowPwr"),
            ModuleState::PwrUp => write!(f, "ModulePwrUp"),
            ModuleState::Ready => write!(f, "ModuleReady"),
            ModuleState::PwrDn => write!(f, "ModulePwrDn"),
            ModuleState::Fault => write!(f, "ModuleFault"),
        }
    }
}

/// The per-lane data-path state, encoded as a nibble in page 11h.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPathState {
    Deactivated,
    Init,
    Deinit,
    Activated,
    TxTurnOn,
    TxTurnOff,
    TxOff,
}

impl DataPathState {
    /// The register encoding of the state.
    pub const fn code(&self) -> u8 {
        match self {
            DataPathState::Deactivated => 1,
            DataPathState::Init => 2,
            DataPathState::Deinit => 3,
            DataPathState::Activated => 4,
            DataPathState::TxTurnOn => 5,
            DataPathState::TxTurnOff => 6,
            DataPathState::TxOff => 7,
        }
    }
}

impl core::fmt::Display for DataPathState {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            DataPathState::Deactivated => write!(f, "DataPathDeactivated"),
            DataPathState::Init => write!(f, "DataPathInit"),
            DataPathState::Deinit => write!(f, "DataPathDeinit"),
            DataPathState::Activated => write!(f, "DataPathActivated"),
            DataPathState::TxTurnOn => write!(f, "DataPathTxTurnOn"),
            DataPathState::TxTurnOff => write!(f, "DataPathTxTurnOff"),
            DataPathState::TxOff => write!(f, "DataPathTxOff"),
        }
    }
}

/// Timing of the state machines, in ticks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateConfig {
    /// How long `ResetL` must be held before the module resets.
    pub reset_hold_ticks: u8,
    /// How long the module spends in `PwrUp` before reaching `Ready`.
    pub init_ticks: u8,
    /// How long a lane spends in `DataPathInit`.
    pub dp_init_ticks: u8,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            reset_hold_ticks: 2,
            init_ticks: 1,
            dp_init_ticks: 1,
        }
    }
}

/// The inputs sampled by one tick of the state machine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Inputs {
    /// `ResetL` is asserted (low).
    pub reset_asserted: bool,
    /// Low power is requested, by the `LPMode` pin or `LowPwrRequestSW`.
    pub low_power_requested: bool,
    /// Per-lane `DataPathDeinit` bits.
    pub dp_deinit: u8,
    /// Per-lane `OutputDisableTx` bits.
    pub tx_disable: u8,
}

/// What one tick of the state machine did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct TickOutcome {
    /// Any module or lane state changed.
    pub changed: bool,
    /// The reset hold time expired on this tick.
    pub reset_completed: bool,
}

#[derive(Clone, Copy, Debug)]
struct Lane {
    state: DataPathState,
    timer: u8,
}

/// The composed module-level and per-lane state machines.
#[derive(Clone, Debug)]
pub(crate) struct StateMachine {
    config: StateConfig,
    state: ModuleState,
    timer: u8,
    reset_timer: u8,
    fault_latched: bool,
    lanes: Vec<Lane>,
}

impl StateMachine {
    pub fn new(n_lanes: u8, config: StateConfig) -> Self {
        Self {
            config,
            state: ModuleState::LowPwr,
            timer: 0,
            reset_timer: 0,
            fault_latched: false,
            lanes: vec![
                Lane {
                    state: DataPathState::Deactivated,
                    timer: 0,
                };
                usize::from(n_lanes)
            ],
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn lane_state(&self, lane: usize) -> DataPathState {
        self.lanes[lane].state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModuleState::Ready
    }

    /// Latch a module-level fault. Only a reset clears it.
    pub fn latch_fault(&mut self) {
        self.fault_latched = true;
        self.state = ModuleState::Fault;
        self.deactivate_lanes();
    }

    /// A software reset: takes effect immediately, unlike the pin.
    pub fn soft_reset(&mut self) {
        self.fault_latched = false;
        self.reset_timer = 0;
        self.state = ModuleState::LowPwr;
        self.deactivate_lanes();
    }

    /// Advance the machines by one tick.
    pub fn tick(&mut self, inputs: &Inputs) -> TickOutcome {
        let before = (self.state, self.lane_codes());
        let mut outcome = TickOutcome::default();

        if inputs.reset_asserted {
            self.reset_timer = self.reset_timer.saturating_add(1);
            if self.reset_timer >= self.config.reset_hold_ticks {
                outcome.reset_completed = self.fault_latched || self.state != ModuleState::LowPwr;
                self.fault_latched = false;
                self.state = ModuleState::LowPwr;
                self.deactivate_lanes();
            }
            outcome.changed = before != (self.state, self.lane_codes());
            return outcome;
        }
        self.reset_timer = 0;

        if self.fault_latched {
            self.state = ModuleState::Fault;
        } else {
            self.step_module(inputs.low_power_requested);
        }

        if self.is_ready() {
            // Lanes advance in index order.
            for (i, lane) in self.lanes.iter_mut().enumerate() {
                let deinit = inputs.dp_deinit & (1 << i) != 0;
                let tx_disable = inputs.tx_disable & (1 << i) != 0;
                step_lane(lane, deinit, tx_disable, &self.config);
            }
        } else {
            self.deactivate_lanes();
        }

        outcome.changed = before != (self.state, self.lane_codes());
        outcome
    }

    fn step_module(&mut self, low_power_requested: bool) {
        self.state = match self.state {
            ModuleState::LowPwr if !low_power_requested => {
                self.timer = self.config.init_ticks;
                ModuleState::PwrUp
            }
            ModuleState::LowPwr => ModuleState::LowPwr,
            ModuleState::PwrUp if low_power_requested => ModuleState::PwrDn,
            ModuleState::PwrUp => {
                if self.timer > 1 {
                    self.timer -= 1;
                    ModuleState::PwrUp
                } else {
                    ModuleState::Ready
                }
            }
            ModuleState::Ready if low_power_requested => ModuleState::PwrDn,
            ModuleState::Ready => ModuleState::Ready,
            ModuleState::PwrDn => ModuleState::LowPwr,
            ModuleState::Fault => ModuleState::Fault,
        };
    }

    fn deactivate_lanes(&mut self) {
        for lane in &mut self.lanes {
            lane.state = DataPathState::Deactivated;
            lane.timer = 0;
        }
    }

    fn lane_codes(&self) -> Vec<u8> {
        self.lanes.iter().map(|lane| lane.state.code()).collect()
    }
}

// One tick of a lane's data-path ladder.
fn step_lane(lane: &mut Lane, deinit: bool, tx_disable: bool, config: &StateConfig) {
    use DataPathState::*;
    lane.state = match lane.state {
        Deactivated if !deinit => {
            lane.timer = config.dp_init_ticks;
            Init
        }
        Deactivated => Deactivated,
        Init if deinit => Deinit,
        Init => {
            if lane.timer > 1 {
                lane.timer -= 1;
                Init
            } else if tx_disable {
                TxOff
            } else {
                TxTurnOn
            }
        }
        Deinit => Deactivated,
        TxTurnOn if deinit => Deinit,
        TxTurnOn => Activated,
        Activated if deinit => Deinit,
        Activated if tx_disable => TxTurnOff,
        Activated => Activated,
        TxTurnOff if deinit => Deinit,
        TxTurnOff => TxOff,
        TxOff if deinit => Deinit,
        TxOff if !tx_disable => TxTurnOn,
        TxOff => TxOff,
    };
}

#[cfg(test)]
mod tests {
    use super::DataPathState;
    use super::Inputs;
    use super::ModuleState;
    use super::StateConfig;
    use super::StateMachine;

    fn machine() -> StateMachine {
        StateMachine::new(4, StateConfig::default())
    }

    fn run(sm: &mut StateMachine, inputs: &Inputs, ticks: usize) {
        for _ in 0..ticks {
            sm.tick(inputs);
        }
    }

    #[test]
    fn test_power_up_sequence() {
        let mut sm = machine();
        assert_eq!(sm.state(), ModuleState::LowPwr);

        let low_power = Inputs {
            low_power_requested: true,
            ..Default::default()
        };
        sm.tick(&low_power);
        assert_eq!(sm.state(), ModuleState::LowPwr);

        let released = Inputs::default();
        sm.tick(&released);
        assert_eq!(sm.state(), ModuleState::PwrUp);
        sm.tick(&released);
        assert_eq!(sm.state(), ModuleState::Ready);
    }

    #[test]
    fn test_power_down_sequence() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 3);
        assert!(sm.is_ready());

        let low_power = Inputs {
            low_power_requested: true,
            ..Default::default()
        };
        sm.tick(&low_power);
        assert_eq!(sm.state(), ModuleState::PwrDn);
        // Leaving Ready deactivates every lane.
        assert_eq!(sm.lane_state(0), DataPathState::Deactivated);
        sm.tick(&low_power);
        assert_eq!(sm.state(), ModuleState::LowPwr);
    }

    #[test]
    fn test_reset_hold_time() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 3);
        assert!(sm.is_ready());

        let reset = Inputs {
            reset_asserted: true,
            ..Default::default()
        };
        let outcome = sm.tick(&reset);
        assert!(!outcome.reset_completed);
        assert!(sm.is_ready());
        let outcome = sm.tick(&reset);
        assert!(outcome.reset_completed);
        assert_eq!(sm.state(), ModuleState::LowPwr);
    }

    #[test]
    fn test_fault_latched_until_reset() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 3);
        sm.latch_fault();
        assert_eq!(sm.state(), ModuleState::Fault);

        // No amount of ordinary ticking clears it.
        run(&mut sm, &Inputs::default(), 5);
        assert_eq!(sm.state(), ModuleState::Fault);

        let reset = Inputs {
            reset_asserted: true,
            ..Default::default()
        };
        run(&mut sm, &reset, 2);
        assert_eq!(sm.state(), ModuleState::LowPwr);
        run(&mut sm, &Inputs::default(), 3);
        assert!(sm.is_ready());
    }

    #[test]
    fn test_lanes_activate_when_ready() {
        let mut sm = machine();
        sm.tick(&Inputs::default());
        assert!(!sm.is_ready());
        assert_eq!(sm.lane_state(0), DataPathState::Deactivated);

        // Deactivated -> Init -> TxTurnOn -> Activated, starting the tick
        // the module reaches Ready.
        sm.tick(&Inputs::default());
        assert!(sm.is_ready());
        assert_eq!(sm.lane_state(0), DataPathState::Init);
        sm.tick(&Inputs::default());
        assert_eq!(sm.lane_state(0), DataPathState::TxTurnOn);
        sm.tick(&Inputs::default());
        for lane in 0..4 {
            assert_eq!(sm.lane_state(lane), DataPathState::Activated);
        }
    }

    #[test]
    fn test_lane_deinit_and_reinit() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 6);
        assert_eq!(sm.lane_state(1), DataPathState::Activated);

        let deinit = Inputs {
            dp_deinit: 0b0010,
            ..Default::default()
        };
        sm.tick(&deinit);
        assert_eq!(sm.lane_state(1), DataPathState::Deinit);
        assert_eq!(sm.lane_state(0), DataPathState::Activated);
        sm.tick(&deinit);
        assert_eq!(sm.lane_state(1), DataPathState::Deactivated);

        run(&mut sm, &Inputs::default(), 3);
        assert_eq!(sm.lane_state(1), DataPathState::Activated);
    }

    #[test]
    fn test_lane_tx_disable() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 6);

        let disabled = Inputs {
            tx_disable: 0b0001,
            ..Default::default()
        };
        sm.tick(&disabled);
        assert_eq!(sm.lane_state(0), DataPathState::TxTurnOff);
        sm.tick(&disabled);
        assert_eq!(sm.lane_state(0), DataPathState::TxOff);
        sm.tick(&disabled);
        assert_eq!(sm.lane_state(0), DataPathState::TxOff);

        sm.tick(&Inputs::default());
        assert_eq!(sm.lane_state(0), DataPathState::TxTurnOn);
        sm.tick(&Inputs::default());
        assert_eq!(sm.lane_state(0), DataPathState::Activated);
    }

    #[test]
    fn test_soft_reset_is_immediate() {
        let mut sm = machine();
        run(&mut sm, &Inputs::default(), 3);
        assert!(sm.is_ready());
        sm.soft_reset();
        assert_eq!(sm.state(), ModuleState::LowPwr);
    }
}
