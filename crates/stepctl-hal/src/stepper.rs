//! Generic `Stepper` trait for addressable stepper-motor controllers.
//!
//! Drivers implement this trait and register themselves with a
//! [`DeviceRegistry`][crate::registry::DeviceRegistry].  The command shell
//! only ever talks to the trait, so a simulated driver and a real one are
//! interchangeable.
//!
//! All methods take `&self`: a driver owns its own synchronisation because
//! motion completes on a context other than the one that requested it.

use std::sync::Arc;

use stepctl_types::{Direction, MicroStepResolution, StepperError};

use crate::completion::CompletionChannel;

/// A stepper-motor controller.
///
/// Positions and step counts are expressed in micro-steps, the smallest
/// addressable motion unit at the current resolution.
pub trait Stepper: Send + Sync {
    /// Stable device name, e.g. `"stepper0"`.
    fn name(&self) -> &str;

    /// Energise (`true`) or de-energise (`false`) the motor coils.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::OperationFailed`] with the driver's error code
    /// if the state cannot be applied.
    fn enable(&self, enable: bool) -> Result<(), StepperError>;

    /// Start a relative move of `micro_steps`.
    ///
    /// Returns as soon as the request is accepted.  When `signal` is given,
    /// the driver posts a [`SignalResult`][stepctl_types::SignalResult] to it
    /// once the motion ends.
    fn move_by(
        &self,
        micro_steps: i32,
        signal: Option<Arc<CompletionChannel>>,
    ) -> Result<(), StepperError>;

    /// Set the maximum velocity in micro-steps per second.
    fn set_max_velocity(&self, velocity: u32) -> Result<(), StepperError>;

    fn set_micro_step_res(&self, resolution: MicroStepResolution) -> Result<(), StepperError>;

    fn micro_step_res(&self) -> Result<MicroStepResolution, StepperError>;

    /// Redefine the current position without moving.
    fn set_actual_position(&self, position: i32) -> Result<(), StepperError>;

    fn actual_position(&self) -> Result<i32, StepperError>;

    /// Start a move to the absolute `position`.  Completion is reported on
    /// `signal` exactly like [`Stepper::move_by`].
    fn set_target_position(
        &self,
        position: i32,
        signal: Option<Arc<CompletionChannel>>,
    ) -> Result<(), StepperError>;

    fn is_moving(&self) -> Result<bool, StepperError>;

    /// Run continuously in `direction` at `velocity` micro-steps per second.
    /// A velocity of zero stops the motor.
    fn enable_constant_velocity_mode(
        &self,
        direction: Direction,
        velocity: u32,
    ) -> Result<(), StepperError>;
}
