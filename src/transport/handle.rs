//! Handle to an in-flight connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::transport::TransportLink;
use crate::TransportError;

/// Connection state seen through a [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// `open()` has been dispatched but not confirmed.
    Pending,
    /// The remote endpoint accepted the session.
    Open,
    /// The handle was closed. Terminal.
    Closed,
}

/// Shared handle to the transport link.
///
/// Usable before the connection is confirmed: readers call
/// [`wait_open()`](Self::wait_open) and get the link once it exists, or
/// `None` if the handle closes first. Clones share state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<HandleState>,
    link: Mutex<Option<Arc<dyn TransportLink>>>,
}

impl SessionHandle {
    /// Creates a pending handle.
    pub fn new() -> Self {
        let (state, _) = watch::channel(HandleState::Pending);
        Self {
            inner: Arc::new(Inner {
                state,
                link: Mutex::new(None),
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> HandleState {
        *self.inner.state.borrow()
    }

    /// Returns `true` once the connection is confirmed and not yet closed.
    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    /// Returns `true` once the handle is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == HandleState::Closed
    }

    /// Attaches the confirmed link and moves to `Open`.
    ///
    /// Returns `false` if the handle was closed first; the caller then owns
    /// the link and must close it.
    pub(crate) fn mark_open(&self, link: Arc<dyn TransportLink>) -> bool {
        {
            let mut slot = self.inner.link.lock();
            if self.is_closed() {
                return false;
            }
            *slot = Some(link);
        }
        self.inner.state.send_if_modified(|state| {
            if *state == HandleState::Pending {
                *state = HandleState::Open;
                true
            } else {
                false
            }
        })
    }

    /// Waits until the handle leaves `Pending`.
    ///
    /// Returns the link if the handle opened, `None` if it closed.
    pub async fn wait_open(&self) -> Option<Arc<dyn TransportLink>> {
        let mut rx = self.inner.state.subscribe();
        let opened = {
            let state = rx.wait_for(|s| *s != HandleState::Pending).await.ok()?;
            *state == HandleState::Open
        };
        if opened {
            self.inner.link.lock().clone()
        } else {
            None
        }
    }

    /// Closes the handle and its link.
    ///
    /// Idempotent, and safe when the connection never opened.
    ///
    /// # Errors
    ///
    /// Returns the link's close error. The handle is closed regardless.
    pub async fn close(&self) -> Result<(), TransportError> {
        let previous = self.inner.state.send_replace(HandleState::Closed);
        let link = self.inner.link.lock().take();
        match link {
            Some(link) => {
                tracing::debug!(?previous, "closing transport link");
                link.close().await
            }
            None => Ok(()),
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EncodedFrame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLink {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl TransportLink for CountingLink {
        async fn send(&self, _frame: &EncodedFrame) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wait_open_resolves_after_mark_open() {
        let handle = SessionHandle::new();
        let reader = handle.clone();
        let waiter = tokio::spawn(async move { reader.wait_open().await.is_some() });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), HandleState::Pending);
        assert!(handle.mark_open(Arc::new(CountingLink::default())));

        assert!(waiter.await.unwrap());
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_close_before_open_wakes_waiter() {
        let handle = SessionHandle::new();
        let reader = handle.clone();
        let waiter = tokio::spawn(async move { reader.wait_open().await.is_none() });

        handle.close().await.unwrap();
        assert!(waiter.await.unwrap());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_mark_open_after_close_is_rejected() {
        let handle = SessionHandle::new();
        handle.close().await.unwrap();
        assert!(!handle.mark_open(Arc::new(CountingLink::default())));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let handle = SessionHandle::new();
        let link = Arc::new(CountingLink::default());
        assert!(handle.mark_open(link.clone()));

        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(link.closes.load(Ordering::SeqCst), 1);
    }
}
