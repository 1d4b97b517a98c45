//! Heartbeat watchdog.
//!
//! [`ControlState`] is everything the command path and the watchdog both touch:
//! the actuator bank and the heartbeat clock. It lives behind one mutex and is
//! locked once per dispatch and once per tick, so a command's read-decide-write
//! never interleaves with a tick.
//!
//! The periodic task is owned by [`Watchdog`], which is started and stopped
//! explicitly. [`ControlState::tick`] is the whole of the per-tick logic and
//! can be driven by hand when no runtime is available.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::actuator::ActuatorState;
use crate::driver::DriverError;

pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatClock {
    last_heartbeat: Instant,
    timeout: Duration,
}

impl HeartbeatClock {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            last_heartbeat: now,
            timeout,
        }
    }

    pub fn beat(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    pub fn since_last(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.since_last(now) >= self.timeout
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickOutcome {
    Armed,
    Killed,
    /// This tick found the heartbeat expired and asserted the kill.
    KillAsserted,
}

#[derive(Debug)]
pub struct ControlState {
    pub actuators: ActuatorState,
    pub clock: HeartbeatClock,
    ticks: u64,
}

impl ControlState {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            actuators: ActuatorState::new(),
            clock: HeartbeatClock::new(timeout, now),
            ticks: 0,
        }
    }

    /// Record a heartbeat and clear the kill. Returns `true` if this
    /// re-armed a killed bank.
    pub fn heartbeat(&mut self, now: Instant) -> bool {
        self.clock.beat(now);
        let was_killed = self.actuators.is_killed();
        self.actuators.arm();
        was_killed
    }

    /// One watchdog step: time out the heartbeat, then zero or restore the
    /// live outputs.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.ticks = self.ticks.wrapping_add(1);

        let mut asserted = false;
        if self.clock.is_expired(now) && !self.actuators.is_killed() {
            self.actuators.kill();
            asserted = true;
        }
        self.actuators.enforce();

        if asserted {
            TickOutcome::KillAsserted
        } else if self.actuators.is_killed() {
            TickOutcome::Killed
        } else {
            TickOutcome::Armed
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

pub type SharedControl = Arc<Mutex<ControlState>>;

/// Lock the control state. A panic while holding the lock cannot leave the
/// state half-written, so a poisoned lock is recovered rather than propagated.
pub fn lock_control(control: &SharedControl) -> MutexGuard<'_, ControlState> {
    control.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct WatchdogTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of the periodic tick task.
#[derive(Debug)]
pub struct Watchdog {
    control: SharedControl,
    period: Duration,
    task: Option<WatchdogTask>,
}

impl Watchdog {
    pub fn new(control: SharedControl, period: Duration) -> Self {
        Self {
            control,
            period,
            task: None,
        }
    }

    /// Spawn the tick task on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.is_running() {
            return Err(DriverError::WatchdogAlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()?;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(run(Arc::clone(&self.control), self.period, shutdown_rx));

        info!("Watchdog started ({} ms tick)", self.period.as_millis());
        self.task = Some(WatchdogTask { shutdown, handle });
        Ok(())
    }

    /// Signal the task to exit. The returned handle resolves once it has.
    pub fn stop(&mut self) -> Result<JoinHandle<()>, DriverError> {
        let task = self.task.take().ok_or(DriverError::WatchdogNotRunning)?;
        // The task may already have exited; the handle still resolves.
        let _ = task.shutdown.send(());
        info!("Watchdog stopping");
        Ok(task.handle)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.shutdown.send(());
        }
    }
}

async fn run(control: SharedControl, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (outcome, since) = {
                    let mut state = lock_control(&control);
                    let now = Instant::now();
                    (state.tick(now), state.clock.since_last(now))
                };
                if outcome == TickOutcome::KillAsserted {
                    warn!("Heartbeat lost for {} ms, killing thrusters", since.as_millis());
                }
            }
            _ = &mut shutdown => break,
        }
    }

    debug!("Watchdog task exited");
}
