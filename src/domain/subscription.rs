//! Upstream subscription lifecycle.
//!
//! ```text
//!                 ┌──────────── attempt failed ───────────┐
//!                 ▼                                       │
//! Disconnected ──────► Connecting ──────► Connected ──────┤
//!      ▲                                      │           │
//!      └──────────── transport error ─────────┘           │
//!                                                         │
//! any phase ───────────── shutdown ──────────────► Closed (terminal)
//! ```

use serde::Serialize;

use super::state_machine::{StateMachine, TransitionError};

/// Phase of the upstream broker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl StateMachine for SubscriptionPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionPhase::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Closed)
                | (Connecting, Closed)
                | (Connected, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionPhase::*;
        match self {
            Disconnected => vec![Connecting, Closed],
            Connecting => vec![Connected, Disconnected, Closed],
            Connected => vec![Disconnected, Closed],
            Closed => vec![],
        }
    }
}

/// Point-in-time connectivity of the upstream subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionState {
    pub phase: SubscriptionPhase,
    pub last_error: Option<String>,
}

impl SubscriptionState {
    pub fn is_connected(&self) -> bool {
        self.phase == SubscriptionPhase::Connected
    }

    /// Next state after moving to `phase`.
    ///
    /// `last_error` is cleared on a successful connect and replaced when
    /// `error` is given; otherwise it is carried over so the health report can
    /// keep explaining a pending reconnect.
    pub fn advance(
        &self,
        phase: SubscriptionPhase,
        error: Option<String>,
    ) -> Result<Self, TransitionError> {
        let phase = self.phase.transition_to(phase)?;
        let last_error = match (phase, error) {
            (SubscriptionPhase::Connected, _) => None,
            (_, Some(error)) => Some(error),
            (_, None) => self.last_error.clone(),
        };
        Ok(Self { phase, last_error })
    }
}
