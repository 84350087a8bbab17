//! Session lifecycle manager.
//!
//! Wraps the bounded cache with the domain operations the transport needs:
//! create-on-initialize, reuse-by-key ("touch"), idle sweep, explicit close,
//! and eviction close. The registry is the single source of truth for
//! whether a key currently denotes a live session; no other component may
//! mutate membership behind its back.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{EvictionHook, SessionCache};
use super::types::{SessionEntry, SessionKey};
use crate::engine::ProtocolEngine;

/// Process-wide registry of live sessions.
///
/// Every mutation goes through the inner mutex, so a sweep tick and a
/// request touching the same session cannot interleave mid-mutation.
pub struct SessionRegistry<E> {
    sessions: Mutex<SessionCache<SessionEntry<E>>>,
}

impl<E: ProtocolEngine> SessionRegistry<E> {
    /// Create a registry bounded to `capacity` live sessions. Sessions
    /// evicted under capacity pressure have their engines closed in the
    /// background; close failures are logged and absorbed.
    pub fn new(capacity: usize) -> Self {
        let on_evict: EvictionHook<SessionEntry<E>> = Box::new(|key, entry| {
            warn!(session_key = %key, "session evicted under capacity pressure");
            close_engine_detached(key.clone(), entry.engine);
        });
        Self {
            sessions: Mutex::new(SessionCache::new(capacity, on_evict)),
        }
    }

    /// Register a freshly established session.
    pub fn insert(&self, key: SessionKey, engine: Arc<E>) {
        self.lock().insert(key, SessionEntry::new(engine));
    }

    /// Resolve a key to its engine, refreshing recency and the activity
    /// timestamp. This is the only path that grants recency credit.
    pub fn touch(&self, key: &str) -> Option<Arc<E>> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(key)?;
        entry.touch();
        Some(entry.engine.clone())
    }

    /// Membership test without recency credit.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().has(key)
    }

    /// Drop a session without closing its engine. Safe to call on absent
    /// keys, so racing close paths (timeout, terminate, peer disconnect)
    /// cannot fault.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop a session and hand its engine to the caller for closing.
    pub fn take(&self, key: &str) -> Option<Arc<E>> {
        self.lock().remove(key).map(|entry| entry.engine)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close every session idle longer than `idle_timeout`. Returns how many
    /// were closed. Stale entries are removed under the lock, then their
    /// engines closed outside it so one slow close cannot stall dispatch.
    pub async fn sweep(&self, idle_timeout: Duration) -> usize {
        let stale: Vec<(SessionKey, Arc<E>)> = {
            let mut sessions = self.lock();
            let now = Instant::now();
            let keys: Vec<SessionKey> = sessions
                .entries()
                .filter(|(_, entry)| entry.idle_for(now) > idle_timeout)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| {
                    sessions
                        .remove(key.as_str())
                        .map(|entry| (key, entry.engine))
                })
                .collect()
        };

        let count = stale.len();
        for (key, engine) in stale {
            info!(session_key = %key, "closing idle session");
            if let Err(err) = engine.close().await {
                warn!(session_key = %key, error = %err, "engine close failed");
            }
        }
        count
    }

    /// Close every live session, absorbing close failures, then clear the
    /// cache. Used at shutdown.
    pub async fn close_all(&self) {
        let live: Vec<(SessionKey, Arc<E>)> = {
            let mut sessions = self.lock();
            let keys: Vec<SessionKey> = sessions.entries().map(|(key, _)| key.clone()).collect();
            let drained = keys
                .into_iter()
                .filter_map(|key| {
                    sessions
                        .remove(key.as_str())
                        .map(|entry| (key, entry.engine))
                })
                .collect();
            sessions.clear();
            drained
        };

        for (key, engine) in live {
            if let Err(err) = engine.close().await {
                warn!(session_key = %key, error = %err, "engine close failed during shutdown");
            }
        }
    }

    /// Run the idle sweep on a fixed interval until `cancel` fires. Ticks
    /// run to completion inside one task, so they can never overlap.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        idle_timeout: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = self.sweep(idle_timeout).await;
                        if closed > 0 {
                            info!(closed, live = self.len(), "idle sweep closed sessions");
                        }
                    }
                }
            }
            debug!("idle sweep stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionCache<SessionEntry<E>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn close_engine_detached<E: ProtocolEngine>(key: SessionKey, engine: Arc<E>) {
    tokio::spawn(async move {
        if let Err(err) = engine.close().await {
            warn!(session_key = %key, error = %err, "engine close failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    struct StubEngine {
        closes: Arc<AtomicUsize>,
        fail_close: bool,
        push: broadcast::Sender<Value>,
        token: CancellationToken,
    }

    impl StubEngine {
        fn new(closes: Arc<AtomicUsize>) -> Arc<Self> {
            Self::with_failure(closes, false)
        }

        fn with_failure(closes: Arc<AtomicUsize>, fail_close: bool) -> Arc<Self> {
            let (push, _) = broadcast::channel(4);
            Arc::new(Self {
                closes,
                fail_close,
                push,
                token: CancellationToken::new(),
            })
        }
    }

    impl ProtocolEngine for StubEngine {
        async fn initialize(&self, _message: Value) -> Result<Value, EngineError> {
            Ok(json!({"ok": true}))
        }

        async fn handle(&self, _message: Value) -> Result<Option<Value>, EngineError> {
            Ok(None)
        }

        fn subscribe(&self) -> broadcast::Receiver<Value> {
            self.push.subscribe()
        }

        fn closed(&self) -> CancellationToken {
            self.token.clone()
        }

        async fn close(&self) -> Result<(), EngineError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            if self.fail_close {
                return Err(EngineError::Dispatch("close exploded".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn touch_resolves_live_sessions_only() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(4);
        let key = SessionKey::generate();
        registry.insert(key.clone(), StubEngine::new(closes));

        assert!(registry.touch(key.as_str()).is_some());
        assert!(registry.touch("forged-key").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(4);
        let key = SessionKey::generate();
        registry.insert(key.clone(), StubEngine::new(closes.clone()));

        assert!(registry.remove(key.as_str()));
        assert!(!registry.remove(key.as_str()));
        // Plain removal does not close the engine.
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sweep_closes_only_idle_sessions() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(4);
        let stale = SessionKey::generate();
        registry.insert(stale.clone(), StubEngine::new(closes.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = SessionKey::generate();
        registry.insert(fresh.clone(), StubEngine::new(closes.clone()));

        let closed = registry.sweep(Duration::from_millis(15)).await;
        assert_eq!(closed, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(registry.touch(stale.as_str()).is_none());
        assert!(registry.touch(fresh.as_str()).is_some());
    }

    #[tokio::test]
    async fn touch_defers_idle_expiry() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(4);
        let key = SessionKey::generate();
        registry.insert(key.clone(), StubEngine::new(closes.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.touch(key.as_str()).is_some());

        let closed = registry.sweep(Duration::from_millis(20)).await;
        assert_eq!(closed, 0);
        assert!(registry.touch(key.as_str()).is_some());
    }

    #[tokio::test]
    async fn eviction_closes_least_recent_engine() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(2);
        let oldest = SessionKey::generate();
        registry.insert(oldest.clone(), StubEngine::new(closes.clone()));
        registry.insert(SessionKey::generate(), StubEngine::new(closes.clone()));
        registry.insert(SessionKey::generate(), StubEngine::new(closes.clone()));

        // The eviction hook closes in a spawned task.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.len(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(registry.touch(oldest.as_str()).is_none());
    }

    #[tokio::test]
    async fn close_all_survives_a_failing_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(4);
        registry.insert(
            SessionKey::generate(),
            StubEngine::with_failure(closes.clone(), true),
        );
        registry.insert(SessionKey::generate(), StubEngine::new(closes.clone()));
        registry.insert(SessionKey::generate(), StubEngine::new(closes.clone()));

        registry.close_all().await;
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(SessionRegistry::new(4));
        let key = SessionKey::generate();
        registry.insert(key.clone(), StubEngine::new(closes.clone()));

        let cancel = CancellationToken::new();
        let sweeper = registry.clone().spawn_sweeper(
            Duration::from_millis(10),
            Duration::from_millis(20),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.is_empty(), "idle session should have been swept");

        cancel.cancel();
        sweeper.await.expect("sweeper should exit cleanly");
    }
}
