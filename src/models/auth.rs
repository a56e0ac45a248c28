use serde::{Deserialize, Serialize};

// API request bodies

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendOtpRequest {
    pub email: String,
}

// API response shapes

/// Standard `{"data": ...}` envelope the backend wraps payloads in.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Credential payload issued by the login and refresh endpoints.
///
/// `refresh_token` is rotated on every refresh: the value received here
/// replaces the stored one, and the previous value must never be sent again.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "tokenType")]
    pub token_type: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: Option<i64>,
}

/// Registration outcome. The account stays pending until the emailed
/// one-time passcode is verified.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationPending {
    pub email: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl RegistrationPending {
    pub fn is_pending_verification(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("pending_verification"))
            .unwrap_or(true)
    }
}

/// Plain confirmation message returned by the OTP endpoints and logout.
#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub message: Option<String>,
}
