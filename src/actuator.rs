use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const THRUSTER_COUNT: usize = 8;
pub const MIN_OUTPUT: f32 = 0.0;
pub const MAX_OUTPUT: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ActuatorError {
    #[error("thruster index {0} out of range 0..8")]
    IndexOutOfRange(u8),
    #[error("thruster output {0} outside [0.0, 1.0]")]
    OutputOutOfRange(f32),
}

/// A thruster channel known to be in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThrusterIndex(u8);

impl ThrusterIndex {
    pub fn new(raw: u8) -> Result<Self, ActuatorError> {
        if usize::from(raw) < THRUSTER_COUNT {
            Ok(Self(raw))
        } else {
            Err(ActuatorError::IndexOutOfRange(raw))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn slot(self) -> usize {
        usize::from(self.0)
    }
}

/// A thruster command in `[0.0, 1.0]`. NaN never validates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ThrusterOutput(f32);

impl ThrusterOutput {
    pub fn new(value: f32) -> Result<Self, ActuatorError> {
        if (MIN_OUTPUT..=MAX_OUTPUT).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ActuatorError::OutputOutOfRange(value))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

/// Kill flag, live outputs, and the setpoints that survive a kill.
///
/// While killed every live output is `0.0`. Setpoints always hold the last
/// accepted per-channel command and are only copied back to the live outputs
/// once the bank is armed again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    killed: bool,
    thrusters: [f32; THRUSTER_COUNT],
    setpoints: [f32; THRUSTER_COUNT],
}

impl ActuatorState {
    pub fn new() -> Self {
        Self {
            killed: false,
            thrusters: [MIN_OUTPUT; THRUSTER_COUNT],
            setpoints: [MIN_OUTPUT; THRUSTER_COUNT],
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn thrusters(&self) -> &[f32; THRUSTER_COUNT] {
        &self.thrusters
    }

    pub fn setpoints(&self) -> &[f32; THRUSTER_COUNT] {
        &self.setpoints
    }

    pub fn thruster(&self, index: ThrusterIndex) -> f32 {
        self.thrusters[index.slot()]
    }

    pub fn setpoint(&self, index: ThrusterIndex) -> f32 {
        self.setpoints[index.slot()]
    }

    /// Assert the kill. Live outputs drop to zero immediately; the watchdog
    /// keeps them there on every tick.
    pub fn kill(&mut self) {
        self.killed = true;
        self.zero_outputs();
    }

    /// Clear the kill. Live outputs come back from the setpoints on the next
    /// watchdog tick.
    pub fn arm(&mut self) {
        self.killed = false;
    }

    /// Write a command to one channel. While killed the command is discarded
    /// and `false` is returned.
    pub fn command(&mut self, index: ThrusterIndex, output: ThrusterOutput) -> bool {
        if self.killed {
            return false;
        }
        self.thrusters[index.slot()] = output.get();
        self.setpoints[index.slot()] = output.get();
        true
    }

    /// Zero the live outputs if killed, otherwise restore them from the
    /// setpoints.
    pub fn enforce(&mut self) {
        if self.killed {
            self.zero_outputs();
        } else {
            self.thrusters = self.setpoints;
        }
    }

    fn zero_outputs(&mut self) {
        self.thrusters = [MIN_OUTPUT; THRUSTER_COUNT];
    }
}

impl Default for ActuatorState {
    fn default() -> Self {
        Self::new()
    }
}
