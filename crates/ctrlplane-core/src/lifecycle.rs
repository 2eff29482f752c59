//! Instance lifecycle state machine.
//!
//! The adjacency table below is the single authority on which lifecycle
//! transitions are legal. States without outbound entries are terminal.

use crate::{CoreError, InstanceState, Result};

/// States reachable in one step from `state`
pub fn allowed_transitions(state: InstanceState) -> &'static [InstanceState] {
    use InstanceState::*;

    match state {
        Provisioning => &[Starting, Failed, Destroying],
        Starting => &[Running, Failed],
        Running => &[Stopping, Failed, Destroying],
        Stopping => &[Stopped, Failed],
        Stopped => &[Starting, Destroying],
        Failed => &[Starting, Destroying],
        Destroying => &[Destroyed, Failed],
        Destroyed => &[],
    }
}

pub fn can_transition(current: InstanceState, target: InstanceState) -> bool {
    allowed_transitions(current).contains(&target)
}

pub fn is_terminal(state: InstanceState) -> bool {
    allowed_transitions(state).is_empty()
}

/// Check that moving from `current` to `target` is allowed
pub fn validate_transition(current: InstanceState, target: InstanceState) -> Result<()> {
    if can_transition(current, target) {
        Ok(())
    } else {
        Err(CoreError::InvalidState {
            from: current,
            to: target,
        })
    }
}
