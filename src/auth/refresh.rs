use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::api::ApiError;

/// How a renewal attempt ended. Cloneable so one outcome can be fanned
/// out to every queued waiter.
#[derive(Debug, Clone)]
pub(crate) enum RenewalOutcome {
    /// New access credential issued; waiters replay with this value.
    Renewed(String),
    /// No renewal credential on record; everything was cleared.
    Unauthenticated,
    /// No renewal credential, but the session initializer is still
    /// running - nothing was cleared, only this round fails.
    Deferred,
    /// The renewal endpoint rejected or errored; everything was cleared.
    Failed(String),
}

impl RenewalOutcome {
    pub fn into_result(self) -> Result<String, ApiError> {
        match self {
            RenewalOutcome::Renewed(credential) => Ok(credential),
            RenewalOutcome::Unauthenticated => {
                Err(ApiError::SessionExpired("not authenticated".to_string()))
            }
            RenewalOutcome::Deferred => Err(ApiError::Unauthorized),
            RenewalOutcome::Failed(message) => Err(ApiError::SessionExpired(message)),
        }
    }
}

/// What a caller hitting the gate should do next.
pub(crate) enum GateEntry<'a> {
    /// This caller performs the renewal and must settle the gate after.
    Leader(LeaderGuard<'a>),
    /// A renewal is already in flight; await its outcome here.
    Follower(oneshot::Receiver<RenewalOutcome>),
}

/// Proof of leadership. `finish` settles the gate with the real outcome;
/// if the leader's future is dropped mid-renewal instead, the guard
/// settles with a failure so queued callers are rejected rather than
/// parked forever.
pub(crate) struct LeaderGuard<'a> {
    gate: &'a RefreshGate,
    settled: bool,
}

impl LeaderGuard<'_> {
    pub fn finish(mut self, outcome: &RenewalOutcome) {
        self.settled = true;
        self.gate.settle(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate
                .settle(&RenewalOutcome::Failed("renewal interrupted".to_string()));
        }
    }
}

#[derive(Default)]
struct GateState {
    renewing: bool,
    // Non-empty only while `renewing`; drained synchronously at settle.
    waiters: Vec<oneshot::Sender<RenewalOutcome>>,
}

/// Single-flight gate around credential renewal.
///
/// The first caller to enter becomes the leader; everyone arriving while
/// the leader's renewal is in flight is parked on a oneshot and woken with
/// the shared outcome. The gate must settle on every exit path, or later
/// callers queue forever; the leader's guard guarantees that.
#[derive(Default)]
pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GateEntry<'_> {
        let mut state = self.state.lock().expect("refresh gate lock poisoned");
        if state.renewing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            debug!(queued = state.waiters.len(), "Renewal in flight, queueing caller");
            GateEntry::Follower(rx)
        } else {
            state.renewing = true;
            GateEntry::Leader(LeaderGuard {
                gate: self,
                settled: false,
            })
        }
    }

    /// Reset the gate and wake every waiter, oldest first.
    pub fn settle(&self, outcome: &RenewalOutcome) {
        let waiters = {
            let mut state = self.state.lock().expect("refresh gate lock poisoned");
            state.renewing = false;
            std::mem::take(&mut state.waiters)
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Renewal settled, waking queued callers");
        }
        for waiter in waiters {
            // A dropped receiver means the caller went away; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
    }

    #[cfg(test)]
    pub fn is_renewing(&self) -> bool {
        self.state.lock().expect("refresh gate lock poisoned").renewing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_caller_leads_rest_follow() {
        let gate = RefreshGate::new();
        let leader = gate.enter();
        assert!(matches!(leader, GateEntry::Leader(_)));
        assert!(gate.is_renewing());
        assert!(matches!(gate.enter(), GateEntry::Follower(_)));
        assert!(matches!(gate.enter(), GateEntry::Follower(_)));
    }

    #[tokio::test]
    async fn test_settle_wakes_followers_in_arrival_order() {
        let gate = RefreshGate::new();
        let GateEntry::Leader(leader) = gate.enter() else {
            panic!("expected leader");
        };
        let GateEntry::Follower(first) = gate.enter() else {
            panic!("expected follower");
        };
        let GateEntry::Follower(second) = gate.enter() else {
            panic!("expected follower");
        };

        leader.finish(&RenewalOutcome::Renewed("acc-2".to_string()));

        let first = first.await.expect("first waiter woken");
        let second = second.await.expect("second waiter woken");
        assert!(matches!(first, RenewalOutcome::Renewed(ref c) if c == "acc-2"));
        assert!(matches!(second, RenewalOutcome::Renewed(ref c) if c == "acc-2"));

        // Gate is reusable after settling
        assert!(!gate.is_renewing());
        assert!(matches!(gate.enter(), GateEntry::Leader(_)));
    }

    #[tokio::test]
    async fn test_settle_rejects_followers_on_failure() {
        let gate = RefreshGate::new();
        let GateEntry::Leader(leader) = gate.enter() else {
            panic!("expected leader");
        };
        let GateEntry::Follower(rx) = gate.enter() else {
            panic!("expected follower");
        };

        leader.finish(&RenewalOutcome::Failed("refresh rejected".to_string()));

        let outcome = rx.await.expect("waiter woken");
        let err = outcome.into_result().expect_err("failure propagates");
        assert!(matches!(err, ApiError::SessionExpired(_)));
        assert!(!gate.is_renewing());
    }

    #[tokio::test]
    async fn test_dropped_leader_rejects_waiters_instead_of_parking_them() {
        let gate = RefreshGate::new();
        let GateEntry::Leader(leader) = gate.enter() else {
            panic!("expected leader");
        };
        let GateEntry::Follower(rx) = gate.enter() else {
            panic!("expected follower");
        };

        // Leader future dropped mid-renewal
        drop(leader);

        let outcome = rx.await.expect("waiter woken");
        assert!(matches!(outcome, RenewalOutcome::Failed(_)));
        assert!(!gate.is_renewing());
    }

    #[test]
    fn test_settle_with_dropped_waiter_does_not_panic() {
        let gate = RefreshGate::new();
        let GateEntry::Leader(leader) = gate.enter() else {
            panic!("expected leader");
        };
        let GateEntry::Follower(rx) = gate.enter() else {
            panic!("expected follower");
        };
        drop(rx);

        leader.finish(&RenewalOutcome::Unauthenticated);
        assert!(!gate.is_renewing());
    }

    #[test]
    fn test_outcome_mapping() {
        assert!(RenewalOutcome::Renewed("a".into()).into_result().is_ok());
        assert!(matches!(
            RenewalOutcome::Unauthenticated.into_result(),
            Err(ApiError::SessionExpired(_))
        ));
        assert!(matches!(
            RenewalOutcome::Deferred.into_result(),
            Err(ApiError::Unauthorized)
        ));
    }
}
