//! Session and credential management for the Coursedeck client.
//!
//! This module provides:
//! - `CredentialStore`: in-memory holder of the short-lived access credential
//! - `SessionStore`: durable storage for the renewal credential and session metadata
//! - `RefreshGate`: single-flight coordination for credential renewal
//! - `AuthState` and friends: the observable auth status consumed by frontends
//! - `OtpChallenge`: the one-time-passcode verification countdowns

pub mod credentials;
pub mod otp;
pub(crate) mod refresh;
pub mod state;
pub mod store;

pub use credentials::CredentialStore;
pub use otp::{ExpiredChallenge, OtpChallenge, OtpCountdown, CHALLENGE_EXPIRY_SECS, RESEND_COOLDOWN_SECS};
pub use state::{AuthErrorKind, AuthSession, AuthState, AuthStatus, SessionTrust};
pub use store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore};
