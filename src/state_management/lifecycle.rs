use tokio::sync::Notify;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::info;

/// Manages the lifecycle of the bridge: who asked for shutdown and with which exit code.
pub struct BridgeLifecycle {
    /// Signal for triggering and waiting for shutdown.
    shutdown_signal: Arc<Notify>,
    /// Boolean flag to indicate if shutdown has been triggered.
    shutdown_triggered: Arc<AtomicBool>,
    /// Process exit code requested by the first trigger.
    exit_code: AtomicI32,
}

impl Default for BridgeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeLifecycle {
    pub fn new() -> Self {
        Self {
            shutdown_signal: Arc::new(Notify::new()),
            shutdown_triggered: Arc::new(AtomicBool::new(false)),
            exit_code: AtomicI32::new(0),
        }
    }

    /// Waits for the shutdown signal.
    ///
    /// Returns immediately if shutdown was triggered before the call.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown_signal.notified();
        if self.is_shutdown_triggered() {
            return;
        }
        info!("Waiting for shutdown signal");
        notified.await;
        info!("Shutdown signal received");
    }

    /// Triggers the shutdown signal.
    ///
    /// Only the first trigger decides the exit code; later triggers just wake waiters again.
    pub fn trigger_shutdown(&self, exit_code: i32) {
        info!("Triggering shutdown (exit code {})", exit_code);
        if !self.shutdown_triggered.swap(true, Ordering::SeqCst) {
            self.exit_code.store(exit_code, Ordering::SeqCst);
        }
        self.shutdown_signal.notify_waiters();
    }

    pub fn is_shutdown_triggered(&self) -> bool {
        self.shutdown_triggered.load(Ordering::SeqCst)
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn first_trigger_decides_the_exit_code() {
        let lifecycle = BridgeLifecycle::new();
        lifecycle.trigger_shutdown(2);
        lifecycle.trigger_shutdown(0);
        assert!(lifecycle.is_shutdown_triggered());
        assert_eq!(lifecycle.exit_code(), 2);
    }

    #[tokio::test]
    async fn waiting_after_trigger_returns_immediately() {
        let lifecycle = BridgeLifecycle::new();
        lifecycle.trigger_shutdown(0);
        tokio::time::timeout(Duration::from_millis(100), lifecycle.wait_for_shutdown())
            .await
            .expect("shutdown already triggered");
    }

    #[tokio::test]
    async fn waiters_are_woken_by_a_trigger() {
        let lifecycle = Arc::new(BridgeLifecycle::new());
        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.wait_for_shutdown().await })
        };
        tokio::task::yield_now().await;
        lifecycle.trigger_shutdown(0);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
