//! REST API client module for the Coursedeck backend.
//!
//! This module provides the `AuthClient` for authenticated communication
//! with the Coursedeck API: bearer credential attachment, transparent
//! 401 recovery through single-flight credential renewal, and the
//! account lifecycle endpoints (login, registration, OTP verification).

pub mod client;
pub mod error;

pub use client::AuthClient;
pub use error::ApiError;
