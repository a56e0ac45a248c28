use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

/// Seconds before the resend button unlocks.
pub const RESEND_COOLDOWN_SECS: u32 = 59;

/// Seconds before the whole challenge expires.
pub const CHALLENGE_EXPIRY_SECS: u32 = 180;

/// Countdown state shared by the two timer tasks.
///
/// Each counter is driven by its own task and only ever decremented by it,
/// so stopping one timer freezes exactly one counter. `expired` flips once,
/// when the expiry counter reaches zero, and stays set until `restart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCountdown {
    resend_remaining: u32,
    expiry_remaining: u32,
    expired: bool,
}

impl OtpCountdown {
    pub fn new() -> Self {
        Self {
            resend_remaining: RESEND_COOLDOWN_SECS,
            expiry_remaining: CHALLENGE_EXPIRY_SECS,
            expired: false,
        }
    }

    pub fn tick_resend(&mut self) {
        if self.resend_remaining > 0 {
            self.resend_remaining -= 1;
        }
    }

    pub fn tick_expiry(&mut self) {
        if self.expiry_remaining > 0 {
            self.expiry_remaining -= 1;
            if self.expiry_remaining == 0 {
                self.expired = true;
            }
        }
    }

    /// Back to the initial values, un-expired. Used by the resend action.
    pub fn restart(&mut self) {
        *self = Self::new();
    }

    pub fn resend_remaining(&self) -> u32 {
        self.resend_remaining
    }

    pub fn expiry_remaining(&self) -> u32 {
        self.expiry_remaining
    }

    pub fn can_resend(&self) -> bool {
        self.resend_remaining == 0
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

impl Default for OtpCountdown {
    fn default() -> Self {
        Self::new()
    }
}

enum TimerKind {
    Resend,
    Expiry,
}

/// A one-time-passcode challenge for a pending registration.
///
/// Both countdowns start together when the challenge opens. They run as
/// separate tasks so the verification dialog can cancel one (say, when the
/// resend button unmounts) without touching the other. Dropping the
/// challenge stops both.
pub struct OtpChallenge {
    email: String,
    countdown: Arc<Mutex<OtpCountdown>>,
    resend_task: Option<JoinHandle<()>>,
    expiry_task: Option<JoinHandle<()>>,
}

impl OtpChallenge {
    /// Open a challenge for `email` and start both countdowns.
    pub fn start(email: String) -> Self {
        let countdown = Arc::new(Mutex::new(OtpCountdown::new()));
        let mut challenge = Self {
            email,
            countdown,
            resend_task: None,
            expiry_task: None,
        };
        challenge.spawn_timers();
        challenge
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Snapshot of the current countdown values.
    pub fn countdown(&self) -> OtpCountdown {
        self.countdown.lock().expect("otp countdown lock poisoned").clone()
    }

    pub fn can_resend(&self) -> bool {
        self.countdown().can_resend()
    }

    pub fn is_expired(&self) -> bool {
        self.countdown().is_expired()
    }

    /// Whether a submit should be allowed at all. An expired challenge is
    /// rejected locally; the backend is never contacted with a stale code.
    pub fn check_submittable(&self) -> Result<(), ExpiredChallenge> {
        if self.is_expired() {
            debug!(email = %self.email, "Rejecting OTP submit on expired challenge");
            return Err(ExpiredChallenge);
        }
        Ok(())
    }

    /// Restart both countdowns from their initial values. Called after the
    /// backend confirms a new code was sent.
    pub fn restart_timers(&mut self) {
        self.stop_resend_timer();
        self.stop_expiry_timer();
        self.countdown
            .lock()
            .expect("otp countdown lock poisoned")
            .restart();
        self.spawn_timers();
    }

    /// Stop only the resend countdown. The expiry countdown keeps running.
    pub fn stop_resend_timer(&mut self) {
        if let Some(task) = self.resend_task.take() {
            task.abort();
        }
    }

    /// Stop only the expiry countdown. The resend countdown keeps running.
    pub fn stop_expiry_timer(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }

    fn spawn_timers(&mut self) {
        self.resend_task = Some(Self::spawn_timer(self.countdown.clone(), TimerKind::Resend));
        self.expiry_task = Some(Self::spawn_timer(self.countdown.clone(), TimerKind::Expiry));
    }

    fn spawn_timer(countdown: Arc<Mutex<OtpCountdown>>, kind: TimerKind) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let mut state = countdown.lock().expect("otp countdown lock poisoned");
                match kind {
                    TimerKind::Resend => state.tick_resend(),
                    TimerKind::Expiry => state.tick_expiry(),
                }
            }
        })
    }
}

impl Drop for OtpChallenge {
    fn drop(&mut self) {
        self.stop_resend_timer();
        self.stop_expiry_timer();
    }
}

/// Marker error for a submit attempted after the challenge expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredChallenge;

impl std::fmt::Display for ExpiredChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verification code expired - request a new one")
    }
}

impl std::error::Error for ExpiredChallenge {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_both(countdown: &mut OtpCountdown, times: u32) {
        for _ in 0..times {
            countdown.tick_resend();
            countdown.tick_expiry();
        }
    }

    #[test]
    fn test_resend_unlocks_after_cooldown() {
        let mut countdown = OtpCountdown::new();
        tick_both(&mut countdown, RESEND_COOLDOWN_SECS);
        assert!(countdown.can_resend());
        assert!(!countdown.is_expired());
        assert_eq!(countdown.resend_remaining(), 0);
        assert_eq!(
            countdown.expiry_remaining(),
            CHALLENGE_EXPIRY_SECS - RESEND_COOLDOWN_SECS
        );
    }

    #[test]
    fn test_expiry_flips_exactly_at_zero() {
        let mut countdown = OtpCountdown::new();
        tick_both(&mut countdown, CHALLENGE_EXPIRY_SECS - 1);
        assert!(!countdown.is_expired());
        countdown.tick_expiry();
        assert!(countdown.is_expired());
    }

    #[test]
    fn test_ticking_past_the_floor_stays_at_zero() {
        let mut countdown = OtpCountdown::new();
        tick_both(&mut countdown, CHALLENGE_EXPIRY_SECS + 30);
        assert_eq!(countdown.resend_remaining(), 0);
        assert_eq!(countdown.expiry_remaining(), 0);
        assert!(countdown.is_expired());
    }

    #[test]
    fn test_restart_resets_both_counters_and_expired() {
        let mut countdown = OtpCountdown::new();
        tick_both(&mut countdown, 60);
        assert!(countdown.can_resend());

        countdown.restart();
        assert_eq!(countdown.resend_remaining(), RESEND_COOLDOWN_SECS);
        assert_eq!(countdown.expiry_remaining(), CHALLENGE_EXPIRY_SECS);
        assert!(!countdown.is_expired());
    }

    #[test]
    fn test_restart_after_expiry_clears_expired() {
        let mut countdown = OtpCountdown::new();
        tick_both(&mut countdown, CHALLENGE_EXPIRY_SECS);
        assert!(countdown.is_expired());

        countdown.restart();
        assert!(!countdown.is_expired());
        assert_eq!(countdown.expiry_remaining(), CHALLENGE_EXPIRY_SECS);
    }

    async fn let_timers_run() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_secs(secs: u64) {
        let_timers_run().await;
        tokio::time::advance(Duration::from_secs(secs)).await;
        let_timers_run().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_ticks_both_counters() {
        let challenge = OtpChallenge::start("student@example.edu".to_string());
        advance_secs(2).await;

        let snapshot = challenge.countdown();
        assert_eq!(snapshot.resend_remaining(), RESEND_COOLDOWN_SECS - 2);
        assert_eq!(snapshot.expiry_remaining(), CHALLENGE_EXPIRY_SECS - 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_one_timer_keeps_the_other_running() {
        let mut challenge = OtpChallenge::start("student@example.edu".to_string());
        advance_secs(2).await;

        challenge.stop_resend_timer();
        advance_secs(3).await;

        let snapshot = challenge.countdown();
        assert_eq!(snapshot.resend_remaining(), RESEND_COOLDOWN_SECS - 2);
        assert_eq!(snapshot.expiry_remaining(), CHALLENGE_EXPIRY_SECS - 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_challenge_rejects_submit_locally() {
        let challenge = OtpChallenge::start("student@example.edu".to_string());
        advance_secs(CHALLENGE_EXPIRY_SECS as u64).await;

        assert!(challenge.is_expired());
        assert_eq!(challenge.check_submittable(), Err(ExpiredChallenge));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_timers_resumes_ticking() {
        let mut challenge = OtpChallenge::start("student@example.edu".to_string());
        advance_secs(60).await;
        assert!(challenge.can_resend());

        challenge.restart_timers();
        let snapshot = challenge.countdown();
        assert_eq!(snapshot.resend_remaining(), RESEND_COOLDOWN_SECS);
        assert!(!snapshot.is_expired());

        advance_secs(1).await;
        assert_eq!(challenge.countdown().resend_remaining(), RESEND_COOLDOWN_SECS - 1);
    }
}
