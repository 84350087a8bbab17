//! Process shutdown: signal waiting and bounded-grace session teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::ProtocolEngine;
use crate::session::SessionRegistry;

/// Wait for SIGTERM/SIGINT/SIGQUIT (or Ctrl-C off unix).
pub async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

/// Tear the session layer down: stop the idle sweeper, then best-effort
/// close every live session. Returns once everything is closed or `grace`
/// elapses, whichever comes first, so a hung downstream close cannot stall
/// process exit.
pub async fn drain<E: ProtocolEngine>(
    registry: Arc<SessionRegistry<E>>,
    sweeper: JoinHandle<()>,
    cancel: CancellationToken,
    grace: Duration,
) {
    cancel.cancel();
    if let Err(err) = sweeper.await {
        warn!(error = %err, "sweeper task failed during shutdown");
    }

    let live = registry.len();
    if live > 0 {
        info!(live, "closing live sessions");
    }
    tokio::select! {
        _ = registry.close_all() => info!("all sessions closed"),
        _ = tokio::time::sleep(grace) => {
            warn!(grace_ms = grace.as_millis() as u64, "grace period elapsed before all sessions closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::session::SessionKey;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::broadcast;

    struct SlowEngine {
        closes: Arc<AtomicUsize>,
        close_delay: Duration,
        push: broadcast::Sender<Value>,
        token: CancellationToken,
    }

    impl SlowEngine {
        fn new(closes: Arc<AtomicUsize>, close_delay: Duration) -> Arc<Self> {
            let (push, _) = broadcast::channel(4);
            Arc::new(Self {
                closes,
                close_delay,
                push,
                token: CancellationToken::new(),
            })
        }
    }

    impl ProtocolEngine for SlowEngine {
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
            tokio::time::sleep(self.close_delay).await;
            self.token.cancel();
            Ok(())
        }
    }

    fn sweeper_for(
        registry: &Arc<SessionRegistry<SlowEngine>>,
        cancel: &CancellationToken,
    ) -> JoinHandle<()> {
        registry.clone().spawn_sweeper(
            Duration::from_secs(60),
            Duration::from_secs(60),
            cancel.clone(),
        )
    }

    #[tokio::test]
    async fn drain_closes_every_session() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(SessionRegistry::new(8));
        for _ in 0..3 {
            registry.insert(
                SessionKey::generate(),
                SlowEngine::new(closes.clone(), Duration::ZERO),
            );
        }
        let cancel = CancellationToken::new();
        let sweeper = sweeper_for(&registry, &cancel);

        drain(registry.clone(), sweeper, cancel, Duration::from_secs(5)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn drain_is_bounded_by_the_grace_window() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(SessionRegistry::new(8));
        registry.insert(
            SessionKey::generate(),
            SlowEngine::new(closes.clone(), Duration::from_secs(60)),
        );
        let cancel = CancellationToken::new();
        let sweeper = sweeper_for(&registry, &cancel);

        let started = Instant::now();
        drain(registry, sweeper, cancel, Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        // The hung engine still received its close call.
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
