//! @ai:module:intent Cooperative cancellation shared by stage workers
//! @ai:module:layer infrastructure
//! @ai:module:public_api CancelToken
//! @ai:module:stateless false

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// @ai:intent Cloneable flag that workers poll before starting and await while running
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// @ai:intent Create an uncancelled token
    /// @ai:effects pure
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// @ai:intent Cancel this token and every clone of it
    /// @ai:idempotent true
    /// @ai:effects state:write
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// @ai:intent Resolve once the token is cancelled
    /// @ai:effects state:read
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so wait_for only errors after drop.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// @ai:intent Token cancelled with its parent but cancellable on its own
    /// @ai:pre called inside a tokio runtime
    /// @ai:effects spawn
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();

        if self.is_cancelled() {
            child.cancel();
            return child;
        }

        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });

        child
    }

    /// @ai:intent Cancel after a wall-clock bound unless cancelled sooner
    /// @ai:pre called inside a tokio runtime
    /// @ai:effects spawn, time
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!("Stage timeout of {:?} reached, cancelling remaining work", timeout);
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_seen_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn test_child_follows_parent_but_not_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();

        let sibling = parent.child();
        sibling.cancel();
        assert!(!parent.is_cancelled());

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_fires() {
        let token = CancelToken::new();
        token.cancel_after(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }
}
