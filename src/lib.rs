//! Coursedeck client core - the authenticated API client behind the
//! Coursedeck education platform's frontends.
//!
//! The crate owns the pieces of the platform with real moving parts:
//! credential lifecycle (a memory-only access credential plus a persisted,
//! rotating renewal credential), single-flight renewal shared by every
//! request that hits a 401, session restoration at startup, and the
//! one-time-passcode countdowns for account verification. Page rendering,
//! routing, and content presentation live in the frontends consuming this
//! crate.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, AuthClient};
pub use auth::{AuthSession, AuthState, AuthStatus, OtpChallenge, SessionTrust};
pub use config::ClientConfig;
