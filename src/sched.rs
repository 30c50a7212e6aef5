//! Debounce scheduler - coalesces flush requests by key.
//!
//! One background task serves all debounced operations (config saves,
//! file-watch reloads). Scheduling a key that is already pending resets its
//! deadline instead of queuing a second run, so a burst of N requests
//! inside the window produces exactly one callback invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// Callback invoked when a key's quiet period elapses.
pub type FlushCallback = Arc<dyn Fn(String) + Send + Sync>;

enum Command {
    Schedule { key: String, delay: Duration },
    Cancel { key: String },
    /// Fire every pending key immediately and acknowledge.
    Drain(oneshot::Sender<()>),
}

/// Handle to the scheduler task. Cheap to clone.
#[derive(Clone)]
pub struct FlushScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl FlushScheduler {
    /// Spawn the scheduler task. `on_due` runs on the scheduler task, so it
    /// should hand real work off to its own task.
    pub fn spawn(on_due: FlushCallback) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, on_due));
        Self { tx }
    }

    /// Schedule `key` to flush after `delay`, resetting any pending
    /// deadline for the same key.
    pub fn schedule(&self, key: impl Into<String>, delay: Duration) {
        let _ = self.tx.send(Command::Schedule {
            key: key.into(),
            delay,
        });
    }

    /// Drop a pending key without flushing it.
    pub fn cancel(&self, key: &str) {
        let _ = self.tx.send(Command::Cancel {
            key: key.to_string(),
        });
    }

    /// Flush all pending keys now. Resolves once every callback has run.
    pub async fn drain(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Drain(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, on_due: FlushCallback) {
    let mut pending: HashMap<String, Instant> = HashMap::new();

    loop {
        let next_deadline = pending.values().min().copied();

        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Schedule { key, delay }) => {
                    pending.insert(key, Instant::now() + delay);
                }
                Some(Command::Cancel { key }) => {
                    pending.remove(&key);
                }
                Some(Command::Drain(ack)) => {
                    for (key, _) in pending.drain() {
                        on_due(key);
                    }
                    let _ = ack.send(());
                }
                // All handles dropped: flush what is left and stop.
                None => {
                    for (key, _) in pending.drain() {
                        on_due(key);
                    }
                    debug!("Flush scheduler stopped");
                    return;
                }
            },
            _ = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                let due: Vec<String> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in due {
                    pending.remove(&key);
                    on_due(key);
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (FlushCallback, Arc<Mutex<Vec<String>>>) {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let callback: FlushCallback = Arc::new(move |key| {
            sink.lock().unwrap().push(key);
        });
        (callback, fired)
    }

    #[tokio::test]
    async fn test_burst_coalesces_to_one_flush() {
        let (callback, fired) = recorder();
        let sched = FlushScheduler::spawn(callback);

        for _ in 0..5 {
            sched.schedule("ranks", Duration::from_millis(30));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(fired.lock().unwrap().as_slice(), ["ranks"]);
    }

    #[tokio::test]
    async fn test_distinct_keys_fire_independently() {
        let (callback, fired) = recorder();
        let sched = FlushScheduler::spawn(callback);

        sched.schedule("a", Duration::from_millis(20));
        sched.schedule("b", Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;

        let mut fired = fired.lock().unwrap().clone();
        fired.sort();
        assert_eq!(fired, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_reschedule_resets_deadline() {
        let (callback, fired) = recorder();
        let sched = FlushScheduler::spawn(callback);

        sched.schedule("k", Duration::from_millis(40));
        tokio::time::sleep(Duration::from_millis(25)).await;
        sched.schedule("k", Duration::from_millis(40));
        tokio::time::sleep(Duration::from_millis(25)).await;

        // First deadline has passed, but the reschedule pushed it out.
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_fires_pending_immediately() {
        let (callback, fired) = recorder();
        let sched = FlushScheduler::spawn(callback);

        sched.schedule("k", Duration::from_secs(60));
        sched.drain().await;

        assert_eq!(fired.lock().unwrap().as_slice(), ["k"]);
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_key() {
        let (callback, fired) = recorder();
        let sched = FlushScheduler::spawn(callback);

        sched.schedule("k", Duration::from_millis(20));
        sched.cancel("k");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(fired.lock().unwrap().is_empty());
    }
}
