//! Rover Actuators
//!
//! Hardware outputs of the rover:
//! - Sprinkler: relay-driven timed spray with cooldown enforcement
//! - Motion: differential drive from directional commands
//!
//! Each has a sysfs-backed implementation and an in-memory one for the
//! simulated backend.

pub mod error;
pub mod gpio;
pub mod motion;
pub mod relay;
pub mod sprinkler;

pub use error::{ActuatorError, MotionError};
pub use motion::{Direction, GpioMotorDriver, LoggingMotorDriver, MotionPort, MotorConfig};
pub use relay::{Relay, SimulatedRelay, SysfsRelay};
pub use sprinkler::{ActuatorPort, Readiness, SprayOutcome, Sprinkler, SprinklerConfig};
