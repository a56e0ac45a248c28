use std::collections::HashMap;

use tokio::sync::watch;
use tracing::warn;

/// Externally observable auth status, rendered by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// How far the current session has been verified against the server.
///
/// A session restored from the cached access credential at startup is
/// `Unconfirmed` until a request (or a renewal) proves it; sessions coming
/// out of a login or refresh round trip are `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrust {
    Unconfirmed,
    Confirmed,
}

/// Error payload surfaced to the UI: either a free-text message or a
/// field-to-message map for form validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    Message(String),
    Fields(HashMap<String, String>),
}

/// Session fields mirrored from the persisted metadata. Advisory only;
/// the server remains authoritative for expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: i64,
    pub token_type: String,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub session: Option<AuthSession>,
    pub trust: Option<SessionTrust>,
    pub error: Option<AuthErrorKind>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Success && self.session.is_some()
    }
}

/// Owner of the auth state with transition rules enforced at the edges.
///
/// Legal transitions: idle/success -> loading -> success | error.
/// An error state is terminal until `clear_error`; `reset` returns to the
/// initial empty state from anywhere. Illegal transitions are logged and
/// ignored rather than panicking, since a misbehaving caller should not
/// take the whole client down.
pub(crate) struct StateCell {
    tx: watch::Sender<AuthState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// idle/success -> loading. Refused while an uncleared error is showing.
    pub fn start_loading(&self) -> bool {
        let current = self.tx.borrow().status;
        match current {
            AuthStatus::Idle | AuthStatus::Success => {
                self.tx.send_modify(|state| {
                    state.status = AuthStatus::Loading;
                    state.error = None;
                });
                true
            }
            AuthStatus::Loading => {
                warn!("Auth action started while another is in flight");
                false
            }
            AuthStatus::Error => {
                warn!("Auth action started before the previous error was cleared");
                false
            }
        }
    }

    /// loading -> success, installing session fields.
    pub fn succeed_session(&self, session: AuthSession, trust: SessionTrust) {
        if !self.expect_loading("succeed") {
            return;
        }
        self.tx.send_modify(|state| {
            state.status = AuthStatus::Success;
            state.session = Some(session);
            state.trust = Some(trust);
            state.error = None;
        });
    }

    /// loading -> success without touching session fields (OTP flows).
    pub fn succeed(&self) {
        if !self.expect_loading("succeed") {
            return;
        }
        self.tx.send_modify(|state| {
            state.status = AuthStatus::Success;
            state.error = None;
        });
    }

    /// loading -> error.
    pub fn fail(&self, error: AuthErrorKind) {
        if !self.expect_loading("fail") {
            return;
        }
        self.tx.send_modify(|state| {
            state.status = AuthStatus::Error;
            state.error = Some(error);
        });
    }

    /// error -> idle, keeping session fields as they were.
    pub fn clear_error(&self) {
        self.tx.send_modify(|state| {
            if state.status == AuthStatus::Error {
                state.status = AuthStatus::Idle;
                state.error = None;
            }
        });
    }

    /// Back to the initial empty state, from anywhere.
    pub fn reset(&self) {
        self.tx.send_modify(|state| *state = AuthState::default());
    }

    fn expect_loading(&self, action: &str) -> bool {
        let current = self.tx.borrow().status;
        if current != AuthStatus::Loading {
            warn!(?current, action, "Auth transition outside of a loading action ignored");
            return false;
        }
        true
    }
}
