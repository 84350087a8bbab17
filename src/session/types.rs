//! Session identity and per-session bookkeeping.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Opaque, server-issued identifier naming one session.
///
/// Keys are generated once at session creation, never reused, and never
/// derived from client input; inbound header values are only ever used for
/// lookup, not for constructing keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    /// Generate a fresh, unguessable key.
    pub fn generate() -> Self {
        SessionKey(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        SessionKey(Arc::from(s))
    }
}

/// One live session: its engine and the recency bookkeeping the idle sweep
/// reads.
pub struct SessionEntry<E> {
    pub engine: Arc<E>,
    last_activity: Instant,
}

impl<E> SessionEntry<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            last_activity: Instant::now(),
        }
    }

    /// Refresh the activity timestamp. Called exactly once per successful
    /// inbound dispatch.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn key_borrows_as_str() {
        use std::collections::HashMap;

        let key = SessionKey::generate();
        let mut map = HashMap::new();
        map.insert(key.clone(), 1u32);
        assert_eq!(map.get(key.as_str()), Some(&1));
    }
}
