//! Authenticated API client for the Coursedeck backend.
//!
//! This module provides the `AuthClient` struct: the single owner of the
//! access credential, the renewal single-flight gate, and the observable
//! auth state. Every protected request flows through it so a 401 can be
//! recovered transparently with one credential renewal and one replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::credentials::CredentialStore;
use crate::auth::otp::{ExpiredChallenge, OtpChallenge};
use crate::auth::refresh::{GateEntry, RefreshGate, RenewalOutcome};
use crate::auth::state::{AuthErrorKind, AuthSession, AuthState, SessionTrust, StateCell};
use crate::auth::store::{FileSessionStore, PersistedSession, SessionStore};
use crate::config::ClientConfig;
use crate::models::{
    AuthPayload, Confirmation, Envelope, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, RegistrationPending, ResendOtpRequest, VerifyOtpRequest,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh-token";
const LOGOUT_PATH: &str = "/auth/logout";
const REGISTER_PATH: &str = "/auth/user/register";
const VERIFY_OTP_PATH: &str = "/auth/user/verify-otp";
const RESEND_OTP_PATH: &str = "/auth/user/resend-otp";

/// Authenticated API client for Coursedeck.
///
/// All coordination state (the renewal gate, the startup flag, the
/// credential stores) lives on this one instance; construct it once and
/// share it by reference.
pub struct AuthClient {
    http: Client,
    base_url: String,
    credentials: CredentialStore,
    session_store: Arc<dyn SessionStore>,
    state: StateCell,
    gate: RefreshGate,
    /// True only while `initialize` is restoring a session. Consulted by
    /// the renewal path so a 401 racing the initializer does not wipe the
    /// session the initializer is about to install.
    initializing: AtomicBool,
    initialized: AtomicBool,
    logout_hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl AuthClient {
    /// Create a client from the on-disk configuration.
    pub fn new() -> Result<Self> {
        let config = ClientConfig::load()?;
        Self::with_config(config)
    }

    /// Create a client with an explicit configuration and the default
    /// file-backed session store.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let path = match config.session_file.clone() {
            Some(path) => path,
            None => FileSessionStore::default_path()?,
        };
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(path));
        Self::with_store(config, store)
    }

    /// Create a client with a caller-provided session store.
    pub fn with_store(config: ClientConfig, session_store: Arc<dyn SessionStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url,
            credentials: CredentialStore::new(session_store.clone()),
            session_store,
            state: StateCell::new(),
            gate: RefreshGate::new(),
            initializing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            logout_hook: None,
        })
    }

    /// Register the navigation hook fired after a full credential clear.
    /// This is the one place the client reaches back into the UI.
    pub fn with_logout_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.logout_hook = Some(Box::new(hook));
        self
    }

    // =========================================================================
    // Observability
    // =========================================================================

    pub fn auth_state(&self) -> AuthState {
        self.state.snapshot()
    }

    /// Watch channel for frontends rendering the auth status reactively.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.snapshot().is_authenticated()
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    // =========================================================================
    // Session bootstrap
    // =========================================================================

    /// Restore session state from durable storage. Runs once per client;
    /// later calls return the current state unchanged.
    ///
    /// A missing or rejected renewal credential leaves the client
    /// anonymous and idle: an expired session at startup is expected
    /// steady state, never a user-facing error.
    pub async fn initialize(&self) -> AuthState {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session already initialized, skipping");
            return self.state.snapshot();
        }

        let persisted = match self.session_store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                debug!("No persisted session, starting anonymous");
                return self.state.snapshot();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session, starting anonymous");
                return self.state.snapshot();
            }
        };

        self.initializing.store(true, Ordering::SeqCst);
        self.state.start_loading();

        if let Some(access) = persisted.access_token.clone() {
            // Trust the cached access credential without a server round
            // trip; if it went stale, the first 401 renews it.
            debug!(user_id = persisted.user_id, "Restoring session from cached access credential");
            self.credentials.set(access);
            self.state
                .succeed_session(Self::persisted_fields(&persisted), SessionTrust::Unconfirmed);
        } else {
            match self.renew_credential().await {
                Ok(_) => match self.session_store.load() {
                    Ok(Some(renewed)) => {
                        info!(user_id = renewed.user_id, "Session restored via credential renewal");
                        self.state
                            .succeed_session(Self::persisted_fields(&renewed), SessionTrust::Confirmed);
                    }
                    _ => {
                        warn!("Renewed session missing from the store");
                        self.state.reset();
                    }
                },
                Err(e) => {
                    debug!(error = %e, "Stored renewal credential rejected, starting anonymous");
                    self.credentials.clear();
                    self.state.reset();
                }
            }
        }

        self.initializing.store(false, Ordering::SeqCst);
        self.state.snapshot()
    }

    // =========================================================================
    // Auth actions
    // =========================================================================

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        self.state.clear_error();
        self.state.start_loading();

        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        match self.auth_post::<Envelope<AuthPayload>, _>(LOGIN_PATH, &body).await {
            Ok(envelope) => {
                let payload = envelope.data;
                self.install_session(&payload);
                let session = Self::session_fields(&payload);
                self.state.succeed_session(session.clone(), SessionTrust::Confirmed);
                info!(user_id = payload.user_id, "Login successful");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.state.fail(Self::error_kind(&e));
                Err(e)
            }
        }
    }

    /// Server-side revocation is best effort: the local session is cleared
    /// whether or not the backend acknowledges the logout.
    pub async fn logout(&self) {
        let refresh_token = match self.session_store.load() {
            Ok(Some(persisted)) => Some(persisted.refresh_token),
            _ => None,
        };

        if let Some(refresh_token) = refresh_token {
            let body = LogoutRequest { refresh_token };
            let bearer = self.credentials.get();
            match self
                .dispatch(Method::POST, LOGOUT_PATH, Some(&body), bearer.as_deref())
                .await
            {
                Ok(response) if response.status().is_success() => {
                    debug!("Server-side logout acknowledged");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Logout rejected, clearing local session anyway");
                }
                Err(e) => {
                    warn!(error = %e, "Logout request failed, clearing local session anyway");
                }
            }
        }

        self.clear_all();
    }

    /// Reset to the initial anonymous state: drop both credentials, wipe
    /// the observable state, and fire the logout navigation hook.
    pub fn clear_all(&self) {
        self.credentials.clear();
        self.state.reset();
        if let Some(hook) = &self.logout_hook {
            hook();
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegistrationPending, ApiError> {
        self.state.clear_error();
        self.state.start_loading();

        match self
            .auth_post::<Envelope<RegistrationPending>, _>(REGISTER_PATH, request)
            .await
        {
            Ok(envelope) => {
                info!(email = %envelope.data.email, "Registration accepted, verification pending");
                self.state.succeed();
                Ok(envelope.data)
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                self.state.fail(Self::error_kind(&e));
                Err(e)
            }
        }
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Confirmation, ApiError> {
        self.state.clear_error();
        self.state.start_loading();

        let body = VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
        };

        match self.auth_post::<Confirmation, _>(VERIFY_OTP_PATH, &body).await {
            Ok(confirmation) => {
                info!(email, "Account verified");
                self.state.succeed();
                Ok(confirmation)
            }
            Err(e) => {
                error!(error = %e, "OTP verification failed");
                self.state.fail(Self::error_kind(&e));
                Err(e)
            }
        }
    }

    /// Submit the code entered for an open challenge. An expired challenge
    /// is rejected here, before any network traffic.
    pub async fn submit_otp(&self, challenge: &OtpChallenge, code: &str) -> Result<Confirmation, ApiError> {
        if challenge.check_submittable().is_err() {
            let mut fields = HashMap::new();
            fields.insert("otp".to_string(), ExpiredChallenge.to_string());
            return Err(ApiError::Validation(fields));
        }
        self.verify_otp(challenge.email(), code).await
    }

    /// Ask the backend for a fresh code, then restart both countdowns.
    pub async fn resend_otp(&self, challenge: &mut OtpChallenge) -> Result<Confirmation, ApiError> {
        let body = ResendOtpRequest {
            email: challenge.email().to_string(),
        };
        let confirmation: Confirmation = self.auth_post(RESEND_OTP_PATH, &body).await?;
        debug!(email = %challenge.email(), "Verification code resent");
        challenge.restart_timers();
        Ok(confirmation)
    }

    // =========================================================================
    // Protected requests
    // =========================================================================

    /// GET a protected resource, renewing the access credential once on 401.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// POST to a protected resource, renewing the access credential once on 401.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let bearer = self.credentials.get();
        let response = self
            .dispatch(method.clone(), path, body, bearer.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::parse_json(response).await;
        }

        debug!(path, "Request returned 401, renewing access credential");
        let fresh = self.renew_credential().await?;

        let response = self.dispatch(method, path, body, Some(&fresh)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Replayed once already; a second 401 is final.
            warn!(path, "Replayed request still unauthorized");
            return Err(ApiError::Unauthorized);
        }
        Self::parse_json(response).await
    }

    // =========================================================================
    // Credential renewal
    // =========================================================================

    /// Exchange the stored renewal credential for a fresh access
    /// credential. Single-flight: concurrent callers share one renewal
    /// round trip and all receive the same outcome.
    async fn renew_credential(&self) -> Result<String, ApiError> {
        match self.gate.enter() {
            GateEntry::Follower(rx) => {
                let outcome = rx
                    .await
                    .unwrap_or_else(|_| RenewalOutcome::Failed("renewal aborted".to_string()));
                outcome.into_result()
            }
            GateEntry::Leader(leader) => {
                let outcome = self.perform_renewal().await;
                // The guard settles on every path out, including a dropped
                // future, or every later 401 would queue forever.
                leader.finish(&outcome);
                outcome.into_result()
            }
        }
    }

    async fn perform_renewal(&self) -> RenewalOutcome {
        let persisted = match self.session_store.load() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                None
            }
        };

        let Some(persisted) = persisted else {
            if self.initializing.load(Ordering::SeqCst) {
                debug!("No renewal credential during startup, leaving state to the initializer");
                return RenewalOutcome::Deferred;
            }
            warn!("No renewal credential on record, clearing session");
            self.credentials.clear();
            return RenewalOutcome::Unauthenticated;
        };

        debug!("Renewing access credential");
        match self.call_refresh_endpoint(&persisted.refresh_token).await {
            Ok(payload) => {
                // The old renewal credential is spent the moment this
                // response arrives; persist its replacement before anyone
                // else can read the store.
                self.install_session(&payload);
                info!(user_id = payload.user_id, "Access credential renewed");
                RenewalOutcome::Renewed(payload.access_token)
            }
            Err(e) => {
                error!(error = %e, "Credential renewal failed, clearing session");
                self.credentials.clear();
                RenewalOutcome::Failed(e.to_string())
            }
        }
    }

    /// The renewal call itself: a bare request that skips the bearer
    /// interceptor and the 401 recovery path, so a rejected renewal can
    /// never recurse into another renewal.
    async fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<AuthPayload, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let envelope: Envelope<AuthPayload> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))?;
        Ok(envelope.data)
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Send one request, attaching the bearer credential when one is held.
    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }
        Ok(request.send().await?)
    }

    /// Unauthenticated action endpoints (login, register, OTP): parse the
    /// response directly, no renewal on 401.
    async fn auth_post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let bearer = self.credentials.get();
        let response = self
            .dispatch(Method::POST, path, Some(body), bearer.as_deref())
            .await?;
        Self::parse_json(response).await
    }

    /// Check if a response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Install a freshly issued credential pair: access credential in
    /// memory, rotated renewal credential and metadata in durable storage.
    fn install_session(&self, payload: &AuthPayload) {
        self.credentials.set(payload.access_token.clone());
        let persisted = PersistedSession::new(
            payload.refresh_token.clone(),
            payload.user_id,
            payload.token_type.clone(),
            payload.expires_in,
            Some(payload.access_token.clone()),
        );
        if let Err(e) = self.session_store.save(&persisted) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn session_fields(payload: &AuthPayload) -> AuthSession {
        AuthSession {
            user_id: payload.user_id,
            token_type: payload.token_type.clone(),
            expires_in: payload.expires_in,
        }
    }

    fn persisted_fields(persisted: &PersistedSession) -> AuthSession {
        AuthSession {
            user_id: persisted.user_id,
            token_type: persisted.token_type.clone(),
            expires_in: persisted.expires_in,
        }
    }

    fn error_kind(error: &ApiError) -> AuthErrorKind {
        match error {
            ApiError::Validation(fields) => AuthErrorKind::Fields(fields.clone()),
            ApiError::Unauthorized => AuthErrorKind::Message("Invalid email or password".to_string()),
            other => AuthErrorKind::Message(other.to_string()),
        }
    }
}
