use std::sync::{Arc, Mutex};

use tracing::warn;

use super::store::SessionStore;

/// In-process holder of the short-lived access credential.
///
/// The credential only ever lives here while the process runs; nothing is
/// written to durable storage by `set`. `clear` is the single point of
/// coupling to the persistent store: dropping the access credential also
/// drops the renewal credential and session metadata, so the two can never
/// disagree about whether a session exists.
pub struct CredentialStore {
    access: Mutex<Option<String>>,
    session_store: Arc<dyn SessionStore>,
}

impl CredentialStore {
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            access: Mutex::new(None),
            session_store,
        }
    }

    pub fn get(&self) -> Option<String> {
        self.access.lock().expect("credential lock poisoned").clone()
    }

    pub fn set(&self, credential: String) {
        *self.access.lock().expect("credential lock poisoned") = Some(credential);
    }

    pub fn clear(&self) {
        *self.access.lock().expect("credential lock poisoned") = None;
        if let Err(e) = self.session_store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }
}
