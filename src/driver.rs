use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::actuator::THRUSTER_COUNT;
use crate::config::{ConfigError, DriverConfig};
use crate::frame::{self, Datagram, FrameError, OutboundFrame, OversizedFrame};
use crate::protocol::{ProtocolHandler, ProtocolStats};
use crate::watchdog::{lock_control, ControlState, SharedControl, TickOutcome, Watchdog};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("watchdog is already running")]
    WatchdogAlreadyRunning,
    #[error("watchdog is not running")]
    WatchdogNotRunning,
    #[error("no tokio runtime to run the watchdog on: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The single request slot. Every `send` replaces it.
#[derive(Debug, Clone, Default)]
enum PendingDatagram {
    #[default]
    Empty,
    Staged(Datagram),
    /// The heartbeat sequence. Its effect was applied by `send` and is never
    /// repeated by `receive`.
    Heartbeat,
    /// Longer than the slot. Only the validated type code and length are kept.
    Oversized {
        len: usize,
        parsed: Result<OversizedFrame, FrameError>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub killed: bool,
    pub thrusters: [f32; THRUSTER_COUNT],
    pub setpoints: [f32; THRUSTER_COUNT],
    pub since_heartbeat_ms: u64,
    pub watchdog_running: bool,
    pub watchdog_ticks: u64,
    pub stats: ProtocolStats,
}

/// One request and what the engine answered. An empty `response` means no
/// frame was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(with = "serde_bytes")]
    pub request: alloc::vec::Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub response: alloc::vec::Vec<u8>,
}

impl Exchange {
    pub fn answered(&self) -> bool {
        !self.response.is_empty()
    }
}

/// Driver facade: stage a datagram with [`send`](Self::send), answer it with
/// [`receive`](Self::receive).
///
/// The heartbeat watchdog is not started by the constructor. Call
/// [`start`](Self::start) from inside a tokio runtime, or drive it by hand
/// with [`poll_watchdog`](Self::poll_watchdog).
#[derive(Debug)]
pub struct SerialDriver {
    config: DriverConfig,
    handler: ProtocolHandler,
    control: SharedControl,
    pending: PendingDatagram,
    watchdog: Watchdog,
}

impl SerialDriver {
    pub fn new() -> Self {
        Self::build(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DriverConfig) -> Self {
        let control = Arc::new(Mutex::new(ControlState::new(
            config.heartbeat_timeout(),
            Instant::now(),
        )));
        Self {
            handler: ProtocolHandler::new(config.float_byte_order, config.kill_semantics),
            watchdog: Watchdog::new(Arc::clone(&control), config.tick_period()),
            control,
            pending: PendingDatagram::Empty,
            config,
        }
    }

    /// Stage `datagram` as the current request, replacing whatever was there.
    ///
    /// The exact heartbeat sequence takes effect here; no `receive` is needed.
    pub fn send(&mut self, datagram: &[u8]) {
        if frame::is_heartbeat(datagram) {
            self.pending = PendingDatagram::Heartbeat;
            let mut state = lock_control(&self.control);
            self.handler.apply_heartbeat(&mut state, Instant::now());
            return;
        }

        self.pending = match Datagram::from_slice(datagram) {
            Ok(staged) => PendingDatagram::Staged(staged),
            Err(()) => {
                debug!("Datagram of {} bytes exceeds slot, keeping its header only", datagram.len());
                PendingDatagram::Oversized {
                    len: datagram.len(),
                    parsed: OversizedFrame::parse(datagram),
                }
            }
        };
    }

    /// Answer the current datagram. `None` means no frame is sent back.
    pub fn receive(&mut self) -> Option<OutboundFrame> {
        let response = match &self.pending {
            PendingDatagram::Empty => return None,
            PendingDatagram::Heartbeat => {
                trace!("Heartbeat already applied on send");
                return None;
            }
            PendingDatagram::Staged(datagram) => {
                let mut state = lock_control(&self.control);
                self.handler.handle(datagram, &mut state, Instant::now())
            }
            PendingDatagram::Oversized { parsed, .. } => {
                let mut state = lock_control(&self.control);
                self.handler.handle_oversized(*parsed, &mut state, Instant::now())
            }
        };
        response.map(|response| response.to_frame())
    }

    /// `send` followed by `receive`.
    pub fn exchange(&mut self, datagram: &[u8]) -> Exchange {
        self.send(datagram);
        let response = self.receive();
        Exchange {
            request: datagram.to_vec(),
            response: response.map(|frame| frame.to_vec()).unwrap_or_default(),
        }
    }

    pub fn start(&mut self) -> Result<(), DriverError> {
        self.watchdog.start()
    }

    pub fn stop(&mut self) -> Result<JoinHandle<()>, DriverError> {
        self.watchdog.stop()
    }

    pub fn is_running(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Run one watchdog step on the caller's thread.
    pub fn poll_watchdog(&self) -> TickOutcome {
        lock_control(&self.control).tick(Instant::now())
    }

    pub fn is_killed(&self) -> bool {
        lock_control(&self.control).actuators.is_killed()
    }

    pub fn thrusters(&self) -> [f32; THRUSTER_COUNT] {
        *lock_control(&self.control).actuators.thrusters()
    }

    pub fn setpoints(&self) -> [f32; THRUSTER_COUNT] {
        *lock_control(&self.control).actuators.setpoints()
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        let state = lock_control(&self.control);
        DriverSnapshot {
            killed: state.actuators.is_killed(),
            thrusters: *state.actuators.thrusters(),
            setpoints: *state.actuators.setpoints(),
            since_heartbeat_ms: state.clock.since_last(Instant::now()).as_millis() as u64,
            watchdog_running: self.watchdog.is_running(),
            watchdog_ticks: state.ticks(),
            stats: *self.handler.stats(),
        }
    }

    pub fn stats(&self) -> &ProtocolStats {
        self.handler.stats()
    }

    /// Size of the staged datagram, 0 if nothing is staged.
    pub fn pending_len(&self) -> usize {
        match &self.pending {
            PendingDatagram::Empty => 0,
            PendingDatagram::Staged(datagram) => datagram.len(),
            PendingDatagram::Heartbeat => frame::HEARTBEAT_FRAME.len(),
            PendingDatagram::Oversized { len, .. } => *len,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Shared handle to the control state, for hosts that read outputs from
    /// another task.
    pub fn control(&self) -> SharedControl {
        Arc::clone(&self.control)
    }
}

impl Default for SerialDriver {
    fn default() -> Self {
        Self::new()
    }
}
