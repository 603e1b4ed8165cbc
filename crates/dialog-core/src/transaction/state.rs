use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::transaction::error::{Error, Result};
use crate::transaction::TransactionKind;

/// Transaction states of RFC 3261 section 17, plus the `Accepted` state
/// RFC 6026 adds to both INVITE machines.
///
/// | kind               | path                                              |
/// |--------------------|---------------------------------------------------|
/// | INVITE client      | Calling → Proceeding → Completed / Accepted        |
/// | non-INVITE client  | Trying → Proceeding → Completed                    |
/// | INVITE server      | Proceeding → Completed → Confirmed, or → Accepted  |
/// | non-INVITE server  | Trying → Proceeding → Completed                    |
///
/// Every machine ends in `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Client transaction created but its request not yet sent
    Initial,
    Calling,
    Trying,
    Proceeding,
    Completed,
    /// A 2xx to an INVITE was sent or received (RFC 6026)
    Accepted,
    /// Server INVITE only: the ACK for a non-2xx final response arrived
    Confirmed,
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }

    fn as_u8(self) -> u8 {
        match self {
            TransactionState::Initial => 0,
            TransactionState::Calling => 1,
            TransactionState::Trying => 2,
            TransactionState::Proceeding => 3,
            TransactionState::Completed => 4,
            TransactionState::Accepted => 5,
            TransactionState::Confirmed => 6,
            TransactionState::Terminated => 7,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Initial,
            1 => TransactionState::Calling,
            2 => TransactionState::Trying,
            3 => TransactionState::Proceeding,
            4 => TransactionState::Completed,
            5 => TransactionState::Accepted,
            6 => TransactionState::Confirmed,
            _ => TransactionState::Terminated,
        }
    }
}

/// Lock-free holder for a transaction's current state, shared between the
/// transaction's event loop (the only writer) and the manager's readers.
#[derive(Debug)]
pub struct AtomicTransactionState {
    value: AtomicU8,
}

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        Self {
            value: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> TransactionState {
        TransactionState::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Store `new_state`, returning the previous state.
    pub fn set(&self, new_state: TransactionState) -> TransactionState {
        TransactionState::from_u8(self.value.swap(new_state.as_u8(), Ordering::AcqRel))
    }

    /// Check `from -> to` against the state machine of `kind`.
    ///
    /// Staying in the same state and moving to `Terminated` are always
    /// allowed.
    pub fn validate_transition(from: TransactionState, to: TransactionState, kind: TransactionKind) -> Result<()> {
        use TransactionState::*;

        if from == to || to == Terminated {
            return Ok(());
        }

        let allowed = match kind {
            TransactionKind::InviteClient => matches!(
                (from, to),
                (Initial, Calling)
                    | (Calling, Proceeding)
                    | (Calling, Completed)
                    | (Calling, Accepted)
                    | (Proceeding, Completed)
                    | (Proceeding, Accepted)
            ),
            TransactionKind::NonInviteClient => matches!(
                (from, to),
                (Initial, Trying) | (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::InviteServer => matches!(
                (from, to),
                (Initial, Proceeding) | (Proceeding, Completed) | (Proceeding, Accepted) | (Completed, Confirmed)
            ),
            TransactionKind::NonInviteServer => matches!(
                (from, to),
                (Initial, Trying) | (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidStateTransition { kind, from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_state() {
        let state = AtomicTransactionState::new(TransactionState::Calling);
        assert_eq!(state.set(TransactionState::Proceeding), TransactionState::Calling);
        assert_eq!(state.get(), TransactionState::Proceeding);
    }

    #[test]
    fn invite_client_transitions() {
        use TransactionState::*;
        let kind = TransactionKind::InviteClient;
        assert!(AtomicTransactionState::validate_transition(Calling, Proceeding, kind).is_ok());
        assert!(AtomicTransactionState::validate_transition(Proceeding, Accepted, kind).is_ok());
        assert!(AtomicTransactionState::validate_transition(Completed, Terminated, kind).is_ok());
        assert!(matches!(
            AtomicTransactionState::validate_transition(Completed, Proceeding, kind),
            Err(Error::InvalidStateTransition { .. })
        ));
        assert!(AtomicTransactionState::validate_transition(Calling, Trying, kind).is_err());
    }

    #[test]
    fn server_transitions() {
        use TransactionState::*;
        let invite = TransactionKind::InviteServer;
        assert!(AtomicTransactionState::validate_transition(Completed, Confirmed, invite).is_ok());
        assert!(AtomicTransactionState::validate_transition(Accepted, Confirmed, invite).is_err());

        let non_invite = TransactionKind::NonInviteServer;
        assert!(AtomicTransactionState::validate_transition(Trying, Completed, non_invite).is_ok());
        assert!(AtomicTransactionState::validate_transition(Completed, Proceeding, non_invite).is_err());
        assert!(AtomicTransactionState::validate_transition(Proceeding, Terminated, non_invite).is_ok());
    }
}
