//! Session lifecycle: `Unauthenticated → Authenticated → Closed`.

use crate::utils::{RelayError, Result};

/// Who a session speaks for. Set once, at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub project: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Unauthenticated,
    Authenticated,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(Identity),
    Closed,
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Unauthenticated => StateKind::Unauthenticated,
            SessionState::Authenticated(_) => StateKind::Authenticated,
            SessionState::Closed => StateKind::Closed,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Only `Unauthenticated → Authenticated` and `* → Closed` are allowed.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        let allowed = matches!(
            (&*self, &next),
            (SessionState::Unauthenticated, SessionState::Authenticated(_))
                | (_, SessionState::Closed)
        );
        if !allowed {
            return Err(RelayError::InvalidTransition {
                from: self.kind(),
                to: next.kind(),
            });
        }
        *self = next;
        Ok(())
    }
}
