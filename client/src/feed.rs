//! Background task that keeps a coordinator in sync with its table.
//!
//! The task consumes the store's per-table change feed over a WebSocket and
//! forwards every event to the coordinator. Independently of the socket it
//! runs a periodic reconcile poll, so a lost connection (or a lossy one)
//! degrades to polling instead of going stale. It also watches the session's
//! hard expiry and stops on its own once the coordinator reaches `Ended`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::constants::FEED_RECONNECT_DELAY;
use crate::coordinator::{SessionCoordinator, SessionPhase};
use crate::events::SessionEvent;

/// Handle to a running feed task.
pub struct FeedHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl FeedHandle {
    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the feed task for `coordinator`.
///
/// `feed_url` is the table's WebSocket feed endpoint (see
/// [`crate::config::ClientConfig::feed_url`]). Dropping the handle stops
/// the task.
pub fn spawn_feed(
    coordinator: Arc<SessionCoordinator>,
    feed_url: String,
    reconcile_interval: Duration,
) -> FeedHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_feed(
        coordinator,
        feed_url,
        reconcile_interval,
        shutdown_rx,
    ));
    FeedHandle {
        shutdown: shutdown_tx,
        task,
    }
}

async fn run_feed(
    coordinator: Arc<SessionCoordinator>,
    feed_url: String,
    reconcile_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut states = coordinator.subscribe();
    let mut reconcile = time::interval(reconcile_interval);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);

    'outer: loop {
        if coordinator.state().phase == SessionPhase::Ended {
            break;
        }

        // Select only to obtain the connect result; the retry handling below
        // needs `states` again, so it must run outside this select.
        let connected = tokio::select! {
            _ = shutdown.changed() => break 'outer,
            _ = session_ended(&mut states) => break 'outer,
            result = tokio_tungstenite::connect_async(&feed_url) => result,
        };

        let mut ws = match connected {
            Ok((stream, _)) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "feed connect failed, polling until retry");
                let retry = time::sleep(FEED_RECONNECT_DELAY);
                tokio::pin!(retry);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break 'outer,
                        _ = session_ended(&mut states) => break 'outer,
                        _ = &mut retry => continue 'outer,
                        _ = reconcile.tick() => {
                            coordinator.reconcile().await;
                            coordinator.check_expiry().await;
                        }
                        _ = expiry_sleep(&coordinator) => coordinator.check_expiry().await,
                    }
                }
            }
        };
        tracing::debug!("feed connected");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = ws.close(None).await;
                    break 'outer;
                }
                _ = session_ended(&mut states) => {
                    let _ = ws.close(None).await;
                    break 'outer;
                }
                _ = reconcile.tick() => {
                    coordinator.reconcile().await;
                    coordinator.check_expiry().await;
                }
                _ = expiry_sleep(&coordinator) => coordinator.check_expiry().await,
                message = ws.next() => match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<SessionEvent>(text.as_str()) {
                        Ok(event) => coordinator.apply_event(&event).await,
                        Err(err) => {
                            tracing::debug!(error = %err, "ignoring unparseable feed frame");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("feed connection closed, reconnecting");
                        time::sleep(FEED_RECONNECT_DELAY).await;
                        continue 'outer;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "feed read failed, reconnecting");
                        time::sleep(FEED_RECONNECT_DELAY).await;
                        continue 'outer;
                    }
                },
            }
        }
    }
    tracing::debug!("feed task stopped");
}

/// Resolves once the coordinator reaches `Ended`. The state borrow from the
/// watch channel is released before this returns, so the caller's future
/// stays `Send` even when the select handler awaits afterwards.
async fn session_ended(states: &mut watch::Receiver<crate::coordinator::CoordinatorState>) {
    let _ = states
        .wait_for(|state| state.phase == SessionPhase::Ended)
        .await;
}

/// Sleeps until the own session's hard expiry. Re-armed on every loop
/// iteration, so the duration is always recomputed from the wall clock.
fn expiry_sleep(coordinator: &SessionCoordinator) -> time::Sleep {
    let remaining = coordinator
        .state()
        .session
        .as_ref()
        .map(|session| (session.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO));
    match remaining {
        Some(remaining) => time::sleep(remaining),
        // Without a session there is nothing to expire; park far out.
        None => time::sleep(Duration::from_secs(3600)),
    }
}
