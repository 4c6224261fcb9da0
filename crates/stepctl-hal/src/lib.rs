//! `stepctl-hal` – Stepper driver abstraction
//!
//! # Modules
//!
//! - [`stepper`] – [`Stepper`][stepper::Stepper]: the driver trait every
//!   stepper controller implements.
//! - [`registry`] – [`DeviceRegistry`][registry::DeviceRegistry]: resolves
//!   device names to borrowed driver handles and enumerates bound names.
//! - [`completion`] – [`CompletionChannel`][completion::CompletionChannel]:
//!   the single-slot notification a driver signals when a motion ends.
//! - [`sim`] – [`SimStepper`][sim::SimStepper] and
//!   [`SimRegistry`][sim::SimRegistry]: simulated hardware that completes
//!   motion on its own worker threads.

pub mod completion;
pub mod registry;
pub mod sim;
pub mod stepper;

pub use completion::{ChannelState, CompletionChannel};
pub use registry::DeviceRegistry;
pub use sim::{SimRegistry, SimStepper};
pub use stepper::Stepper;
