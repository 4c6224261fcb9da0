//! In-process simulated stepper driver for running the shell without
//! physical hardware.
//!
//! [`SimStepper`] advances its position on a worker thread at the configured
//! maximum velocity and posts completion signals from that thread, the same
//! way an interrupt-driven driver would.  [`SimRegistry`] builds a
//! [`DeviceRegistry`] pre-populated with simulated devices.
//!
//! # Example
//!
//! ```rust
//! use stepctl_hal::sim::SimRegistry;
//!
//! let registry = SimRegistry::new()
//!     .with_stepper("stepper0")
//!     .with_stepper("stepper1")
//!     .build();
//!
//! let device = registry.get("stepper0").expect("bound");
//! device.enable(true).expect("sim enable must succeed");
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use stepctl_types::{Direction, MicroStepResolution, SignalResult, StepperError, errno};
use tracing::{debug, warn};

use crate::completion::CompletionChannel;
use crate::registry::DeviceRegistry;
use crate::stepper::Stepper;

/// Default maximum velocity of a simulated stepper, micro-steps per second.
pub const DEFAULT_MAX_VELOCITY: u32 = 1000;

/// Default simulation tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

// ────────────────────────────────────────────────────────────────────────────
// Simulated device state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Idle,
    Positioning { target: i32 },
    ConstantVelocity { direction: Direction, velocity: u32 },
}

/// A motion request as issued by a caller, resolved against the current
/// position under the state lock.
#[derive(Debug, Clone, Copy)]
enum Request {
    Relative(i32),
    Absolute(i32),
    ConstantVelocity { direction: Direction, velocity: u32 },
}

struct SimState {
    enabled: bool,
    position: i32,
    max_velocity: u32,
    resolution: MicroStepResolution,
    motion: Motion,
    /// Bumped on every new motion request; a worker whose generation is
    /// stale exits without touching the state.
    generation: u64,
    /// Completion channel of the motion in flight.
    pending: Option<Arc<CompletionChannel>>,
}

/// Distance covered in one tick at `velocity` micro-steps per second,
/// never less than one micro-step.
fn steps_per_tick(velocity: u32, tick: Duration) -> i64 {
    let steps = u128::from(velocity) * tick.as_micros() / 1_000_000;
    i64::try_from(steps).unwrap_or(i64::MAX).max(1)
}

fn clamp_position(position: i64) -> i32 {
    position.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// ────────────────────────────────────────────────────────────────────────────
// SimStepper
// ────────────────────────────────────────────────────────────────────────────

/// A simulated stepper.  Starts disabled at position 0 with
/// [`DEFAULT_MAX_VELOCITY`] and 1/16 micro-stepping.
pub struct SimStepper {
    name: String,
    tick: Duration,
    state: Arc<Mutex<SimState>>,
}

impl SimStepper {
    /// Create a new simulated stepper with the given name.
    pub fn new(name: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            name: name.into(),
            tick: DEFAULT_TICK,
            state: Arc::new(Mutex::new(SimState {
                enabled: false,
                position: 0,
                max_velocity: DEFAULT_MAX_VELOCITY,
                resolution: MicroStepResolution::Sixteenth,
                motion: Motion::Idle,
                generation: 0,
                pending: None,
            })),
        })
    }

    /// Override the simulation tick.
    pub fn with_tick(mut self: Box<Self>, tick: Duration) -> Box<Self> {
        self.tick = tick;
        self
    }

    /// Override the initial maximum velocity.
    pub fn with_max_velocity(self: Box<Self>, velocity: u32) -> Box<Self> {
        self.state.lock().max_velocity = velocity;
        self
    }

    /// Override the initial micro-step resolution.
    pub fn with_resolution(self: Box<Self>, resolution: MicroStepResolution) -> Box<Self> {
        self.state.lock().resolution = resolution;
        self
    }

    fn start(
        &self,
        request: Request,
        signal: Option<Arc<CompletionChannel>>,
    ) -> Result<(), StepperError> {
        let (motion, generation) = {
            let mut state = self.state.lock();
            if !state.enabled {
                warn!(device = %self.name, "motion requested while disabled");
                return Err(StepperError::OperationFailed(-errno::ECANCELED));
            }
            let motion = match request {
                Request::Relative(steps) => Motion::Positioning {
                    target: clamp_position(i64::from(state.position) + i64::from(steps)),
                },
                Request::Absolute(target) => Motion::Positioning { target },
                Request::ConstantVelocity {
                    direction,
                    velocity,
                } => Motion::ConstantVelocity {
                    direction,
                    velocity,
                },
            };
            if state.max_velocity == 0 && matches!(motion, Motion::Positioning { .. }) {
                return Err(StepperError::OperationFailed(-errno::EINVAL));
            }
            if let Motion::Positioning { target } = motion
                && target == state.position
            {
                // Nothing to do; complete right away.
                state.generation += 1;
                state.motion = Motion::Idle;
                state.pending = None;
                drop(state);
                if let Some(signal) = signal {
                    signal.signal(SignalResult::StepsCompleted);
                }
                return Ok(());
            }
            state.generation += 1;
            state.motion = motion;
            state.pending = signal;
            (motion, state.generation)
        };

        debug!(device = %self.name, ?motion, generation, "motion started");
        let state = Arc::clone(&self.state);
        let tick = self.tick;
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("sim-{}", self.name))
            .spawn(move || run_motion(&name, &state, generation, tick))
            .map_err(|e| {
                warn!(device = %self.name, error = %e, "failed to spawn motion worker");
                let mut state = self.state.lock();
                state.motion = Motion::Idle;
                state.pending = None;
                StepperError::OperationFailed(-errno::EIO)
            })?;
        Ok(())
    }
}

/// Worker loop: advance the simulated position until the target is reached
/// or a newer request supersedes this one.
fn run_motion(name: &str, state: &Mutex<SimState>, generation: u64, tick: Duration) {
    loop {
        thread::sleep(tick);
        let mut guard = state.lock();
        if guard.generation != generation {
            debug!(device = %name, generation, "motion superseded");
            return;
        }
        match guard.motion {
            Motion::Idle => return,
            Motion::Positioning { target } => {
                let step = steps_per_tick(guard.max_velocity, tick);
                let remaining = i64::from(target) - i64::from(guard.position);
                if remaining.abs() <= step {
                    guard.position = target;
                    guard.motion = Motion::Idle;
                    let pending = guard.pending.take();
                    drop(guard);
                    debug!(device = %name, position = target, "motion completed");
                    if let Some(signal) = pending {
                        signal.signal(SignalResult::StepsCompleted);
                    }
                    return;
                }
                guard.position =
                    clamp_position(i64::from(guard.position) + step * remaining.signum());
            }
            Motion::ConstantVelocity {
                direction,
                velocity,
            } => {
                let step = steps_per_tick(velocity, tick);
                guard.position = clamp_position(
                    i64::from(guard.position) + step * i64::from(direction.sign()),
                );
            }
        }
    }
}

impl Stepper for SimStepper {
    fn name(&self) -> &str {
        &self.name
    }

    fn enable(&self, enable: bool) -> Result<(), StepperError> {
        let mut state = self.state.lock();
        state.enabled = enable;
        if !enable && state.motion != Motion::Idle {
            state.generation += 1;
            state.motion = Motion::Idle;
            let pending = state.pending.take();
            drop(state);
            debug!(device = %self.name, "motion stopped by disable");
            if let Some(signal) = pending {
                signal.signal(SignalResult::Stopped);
            }
        }
        Ok(())
    }

    fn move_by(
        &self,
        micro_steps: i32,
        signal: Option<Arc<CompletionChannel>>,
    ) -> Result<(), StepperError> {
        self.start(Request::Relative(micro_steps), signal)
    }

    fn set_max_velocity(&self, velocity: u32) -> Result<(), StepperError> {
        self.state.lock().max_velocity = velocity;
        Ok(())
    }

    fn set_micro_step_res(&self, resolution: MicroStepResolution) -> Result<(), StepperError> {
        self.state.lock().resolution = resolution;
        Ok(())
    }

    fn micro_step_res(&self) -> Result<MicroStepResolution, StepperError> {
        Ok(self.state.lock().resolution)
    }

    fn set_actual_position(&self, position: i32) -> Result<(), StepperError> {
        self.state.lock().position = position;
        Ok(())
    }

    fn actual_position(&self) -> Result<i32, StepperError> {
        Ok(self.state.lock().position)
    }

    fn set_target_position(
        &self,
        position: i32,
        signal: Option<Arc<CompletionChannel>>,
    ) -> Result<(), StepperError> {
        self.start(Request::Absolute(position), signal)
    }

    fn is_moving(&self) -> Result<bool, StepperError> {
        Ok(self.state.lock().motion != Motion::Idle)
    }

    fn enable_constant_velocity_mode(
        &self,
        direction: Direction,
        velocity: u32,
    ) -> Result<(), StepperError> {
        if velocity == 0 {
            let mut state = self.state.lock();
            state.generation += 1;
            state.motion = Motion::Idle;
            state.pending = None;
            return Ok(());
        }
        self.start(
            Request::ConstantVelocity {
                direction,
                velocity,
            },
            None,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRegistry builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`DeviceRegistry`] pre-populated with simulated
/// steppers.
#[derive(Default)]
pub struct SimRegistry {
    devices: Vec<Box<dyn Stepper>>,
}

impl SimRegistry {
    /// Create an empty [`SimRegistry`] builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a [`SimStepper`] with default parameters.
    pub fn with_stepper(mut self, name: impl Into<String>) -> Self {
        self.devices.push(SimStepper::new(name));
        self
    }

    /// Add any driver, e.g. a pre-configured [`SimStepper`] or a test double.
    pub fn with_device(mut self, device: Box<dyn Stepper>) -> Self {
        self.devices.push(device);
        self
    }

    /// Consume the builder and return the populated [`DeviceRegistry`].
    pub fn build(self) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        for device in self.devices {
            registry.register(device);
        }
        registry
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
