//! Browser login flow as an explicit state machine.
//!
//! ```text
//!  Anonymous ──login──▶ PendingCallback ──callback──▶ Authenticated ──logout──▶ LoggedOut
//! ```
//!
//! The state is never stored; each handler derives it from the cookies it
//! sees and asks for the transition it is about to perform.

use std::fmt;

/// Where a browser is in the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// No login cookie, no session cookie.
    Anonymous,
    /// Login cookie present; waiting for the provider redirect.
    PendingCallback,
    /// Session cookie issued.
    Authenticated,
    /// Session deleted, cookies cleared.
    LoggedOut,
}

/// Something a handler is about to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    BeginLogin,
    CompleteCallback,
    Logout,
}

/// A transition the machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {event:?} from {from}")]
pub struct InvalidTransition {
    pub from: FlowState,
    pub event: FlowEvent,
}

impl FlowState {
    /// Derive the current state from the cookies on a request.
    ///
    /// A pending login wins over an existing session: the browser is
    /// mid-way through re-authenticating.
    pub fn observe(has_login_cookie: bool, has_session_cookie: bool) -> Self {
        if has_login_cookie {
            FlowState::PendingCallback
        } else if has_session_cookie {
            FlowState::Authenticated
        } else {
            FlowState::Anonymous
        }
    }

    /// Apply an event.
    pub fn on(self, event: FlowEvent) -> Result<FlowState, InvalidTransition> {
        use FlowEvent::*;
        use FlowState::*;

        let next = match (self, event) {
            // Login may be (re)started from anywhere.
            (_, BeginLogin) => PendingCallback,
            (PendingCallback, CompleteCallback) => Authenticated,
            (_, CompleteCallback) => return Err(InvalidTransition { from: self, event }),
            // Logout is idempotent.
            (_, Logout) => LoggedOut,
        };

        tracing::trace!(from = %self, ?event, to = %next, "Login flow transition");
        Ok(next)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Anonymous => "anonymous",
            FlowState::PendingCallback => "pending_callback",
            FlowState::Authenticated => "authenticated",
            FlowState::LoggedOut => "logged_out",
        };
        f.write_str(name)
    }
}
