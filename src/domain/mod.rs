//! Domain layer containing the relay's core types.
//!
//! # Module Organization
//!
//! - `event` - Decoded broker events and their wire frame
//! - `subscription` - Upstream subscription lifecycle
//! - `health` - Health snapshot and report document
//! - `state_machine` - Transition contract shared by lifecycle enums

pub mod event;
pub mod health;
pub mod state_machine;
pub mod subscription;

pub use event::{DecodeError, RelayEvent};
pub use health::{HealthChecks, HealthReport, HealthSnapshot, HealthStatus};
pub use state_machine::{StateMachine, TransitionError};
pub use subscription::{SubscriptionPhase, SubscriptionState};
