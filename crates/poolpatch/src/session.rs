//! Session tokens for the HTTP API

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Sessions opened with the shared pool secret
///
/// A session unused for longer than the idle timeout is dropped, so a client
/// that never logs out does not hold it forever.
pub struct SessionStore {
    secret: String,
    idle_timeout: Duration,
    /// Session id to last use
    sessions: Mutex<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new(secret: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            secret: secret.into(),
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A panic while holding the lock cannot leave the map inconsistent
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open a session if `secret` matches
    pub fn login(&self, secret: &str) -> Option<String> {
        if self.secret.is_empty() || secret != self.secret {
            return None;
        }
        let session = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();

        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, last_used| now.duration_since(*last_used) <= self.idle_timeout);
        if sessions.len() < before {
            debug!(expired = before - sessions.len(), "dropped idle sessions");
        }
        sessions.insert(session.clone(), now);

        debug!(session_prefix = &session[..8], "session opened");
        Some(session)
    }

    /// Whether `session` is open and not idle; a valid session counts as used
    #[must_use]
    pub fn is_valid(&self, session: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions();
        match sessions.get_mut(session) {
            Some(last_used) if now.duration_since(*last_used) <= self.idle_timeout => {
                *last_used = now;
                true
            }
            Some(_) => {
                sessions.remove(session);
                debug!("session expired");
                false
            }
            None => false,
        }
    }

    /// Close `session`; returns whether it was open
    pub fn logout(&self, session: &str) -> bool {
        self.sessions().remove(session).is_some()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_login_logout() {
        let store = SessionStore::new("s3cret", HOUR);

        assert!(store.login("wrong").is_none());

        let session = store.login("s3cret").unwrap();
        assert!(store.is_valid(&session));
        assert!(store.logout(&session));
        assert!(!store.is_valid(&session));
        assert!(!store.logout(&session));
    }

    #[test]
    fn test_empty_secret_never_matches() {
        let store = SessionStore::new("", HOUR);
        assert!(store.login("").is_none());
    }

    #[test]
    fn test_sessions_are_distinct() {
        let store = SessionStore::new("s3cret", HOUR);
        assert_ne!(store.login("s3cret"), store.login("s3cret"));
    }

    #[test]
    fn test_idle_session_expires() {
        let store = SessionStore::new("s3cret", Duration::from_millis(20));
        let session = store.login("s3cret").unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(!store.is_valid(&session));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_login_drops_abandoned_sessions() {
        let store = SessionStore::new("s3cret", Duration::from_millis(20));
        store.login("s3cret").unwrap();
        store.login("s3cret").unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let fresh = store.login("s3cret").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_valid(&fresh));
    }
}
