//! Broadcast hub for the session change feed.
//!
//! A single `tokio::sync::broadcast` channel fans every [`SessionEvent`] out
//! to all connected feed sockets; each socket filters by table scope on its
//! own side. Slow receivers that fall behind skip events (`RecvError::Lagged`)
//! and catch up through their periodic reconcile.

use std::sync::Arc;

use tableside_client::events::SessionEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct FeedHub {
    sender: broadcast::Sender<Arc<SessionEvent>>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Each feed socket calls this once to get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionEvent>> {
        self.sender.subscribe()
    }

    /// Dispatches an event to all connected sockets.
    pub fn publish(&self, event: SessionEvent) {
        // send() errs when nobody is listening, which is fine for a feed.
        let _ = self.sender.send(Arc::new(event));
    }
}
