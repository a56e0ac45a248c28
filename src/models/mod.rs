//! Wire types for the Coursedeck auth endpoints.
//!
//! Request bodies serialize to the backend's camelCase field names;
//! responses arrive wrapped in a `{"data": ...}` envelope.

pub mod auth;

pub use auth::{
    AuthPayload, Confirmation, Envelope, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, RegistrationPending, ResendOtpRequest, VerifyOtpRequest,
};
