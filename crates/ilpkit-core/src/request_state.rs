use std::fmt;

use crate::error::CoreError;

/// Lifecycle of a pending incoming payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RequestState {
    /// Issued to a payer, waiting for the conditional transfer.
    Pending,
    /// The matching transfer arrived before the deadline. Final state.
    Fulfilled,
    /// The deadline elapsed first. Final state.
    Expired,
}

impl RequestState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Expired)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Fulfilled => write!(f, "Fulfilled"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

/// Triggers that settle a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// A conditional transfer matching the request id arrived.
    TransferArrived,
    /// The request deadline elapsed.
    DeadlineElapsed,
}

/// Valid transitions:
/// - Pending → Fulfilled (TransferArrived)
/// - Pending → Expired (DeadlineElapsed)
///
/// Whichever trigger observes `Pending` first wins; the other one is rejected
/// and must not perform any cleanup.
pub struct RequestStateMachine;

impl RequestStateMachine {
    pub fn transition(
        current: RequestState,
        event: RequestEvent,
    ) -> Result<RequestState, CoreError> {
        let target = match event {
            RequestEvent::TransferArrived => RequestState::Fulfilled,
            RequestEvent::DeadlineElapsed => RequestState::Expired,
        };

        if current != RequestState::Pending {
            return Err(CoreError::InvalidRequestTransition {
                from: current,
                to: target,
            });
        }

        tracing::debug!(from = %current, to = %target, event = ?event, "request state transition");
        Ok(target)
    }

    pub fn can_transition(current: RequestState, event: RequestEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fulfil_from_pending() {
        let state =
            RequestStateMachine::transition(RequestState::Pending, RequestEvent::TransferArrived)
                .unwrap();
        assert_eq!(state, RequestState::Fulfilled);
        assert!(state.is_final());
    }

    #[test]
    fn test_expire_from_pending() {
        let state =
            RequestStateMachine::transition(RequestState::Pending, RequestEvent::DeadlineElapsed)
                .unwrap();
        assert_eq!(state, RequestState::Expired);
    }

    #[test]
    fn test_late_transfer_rejected() {
        let result =
            RequestStateMachine::transition(RequestState::Expired, RequestEvent::TransferArrived);
        assert!(matches!(
            result,
            Err(CoreError::InvalidRequestTransition {
                from: RequestState::Expired,
                to: RequestState::Fulfilled,
            })
        ));
    }

    #[test]
    fn test_deadline_after_fulfilment_rejected() {
        assert!(!RequestStateMachine::can_transition(
            RequestState::Fulfilled,
            RequestEvent::DeadlineElapsed
        ));
    }

    #[test]
    fn test_pending_not_final() {
        assert!(!RequestState::Pending.is_final());
        assert_eq!(format!("{}", RequestState::Expired), "Expired");
    }
}
