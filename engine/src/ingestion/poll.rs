//! Pull path
//!
//! The loop asks its source for events at or after the cursor, moves the
//! cursor past each event and only then hands it off. A crash mid-dispatch
//! therefore loses the in-flight event instead of delivering it twice.

use super::{IngestionCursor, InboundEvent};
use async_trait::async_trait;
use sdk::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One event from a pull source. `event` is `None` for updates that carry
/// nothing to dispatch; they still advance the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PolledEvent {
    pub id: i64,
    pub event: Option<InboundEvent>,
}

/// A source of ordered, id-tagged events.
#[async_trait]
pub trait PollSource: Send + Sync {
    fn name(&self) -> &str;

    /// Events with id ≥ `cursor`, waiting at most `max_wait` for the first.
    async fn poll(&self, cursor: i64, max_wait: Duration) -> Result<Vec<PolledEvent>, EngineError>;
}

pub struct PollLoop<S: PollSource> {
    source: S,
    cursor: Arc<IngestionCursor>,
    sink: mpsc::Sender<InboundEvent>,
    max_wait: Duration,
    backoff: Duration,
}

impl<S: PollSource> PollLoop<S> {
    /// `backoff` is raised to one second if shorter.
    pub fn new(
        source: S,
        cursor: Arc<IngestionCursor>,
        sink: mpsc::Sender<InboundEvent>,
        max_wait: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            source,
            cursor,
            sink,
            max_wait,
            backoff: backoff.max(Duration::from_secs(1)),
        }
    }

    pub fn cursor(&self) -> &Arc<IngestionCursor> {
        &self.cursor
    }

    /// One poll round. Returns how many events were handed off.
    ///
    /// # Errors
    /// The source's error (the cursor has not moved), or `Transport` once
    /// the dispatch queue is closed.
    pub async fn run_once(&self) -> Result<usize, EngineError> {
        let mut batch = self.source.poll(self.cursor.get(), self.max_wait).await?;
        batch.sort_by_key(|e| e.id);

        let mut dispatched = 0;
        for polled in batch {
            if self.cursor.delivered(polled.id) {
                debug!(id = polled.id, "Skipping already delivered event");
                continue;
            }
            self.cursor.advance_to(polled.id + 1);

            if let Some(event) = polled.event {
                self.sink
                    .send(event)
                    .await
                    .map_err(|_| EngineError::Transport("dispatch queue closed".to_string()))?;
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Poll until the dispatch queue closes. Errors are logged and retried
    /// at the same cursor after the backoff.
    pub async fn run(&self) {
        info!(source = self.source.name(), cursor = self.cursor.get(), "Starting poll loop");

        loop {
            if self.sink.is_closed() {
                break;
            }
            match self.run_once().await {
                Ok(n) if n > 0 => debug!(dispatched = n, cursor = self.cursor.get(), "Batch handed off"),
                Ok(_) => {}
                Err(e) => {
                    if self.sink.is_closed() {
                        break;
                    }
                    warn!(
                        source = self.source.name(),
                        error = %crate::secrets::scrub(&e.to_string()),
                        backoff_secs = self.backoff.as_secs(),
                        "Poll failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }

        info!(source = self.source.name(), "Poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::Channel;
    use std::sync::Mutex;

    struct Scripted {
        rounds: Mutex<Vec<Result<Vec<i64>, EngineError>>>,
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl PollSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn poll(&self, cursor: i64, _max_wait: Duration) -> Result<Vec<PolledEvent>, EngineError> {
            self.seen.lock().unwrap().push(cursor);
            let round = self.rounds.lock().unwrap().remove(0)?;
            Ok(round
                .into_iter()
                .map(|id| PolledEvent {
                    id,
                    event: Some(InboundEvent::new(Channel::Telegram, "u", "c", id.to_string())),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_error_keeps_cursor() {
        let source = Scripted {
            rounds: Mutex::new(vec![
                Err(EngineError::Transport("down".into())),
                Ok(vec![4, 5]),
            ]),
            seen: Mutex::new(Vec::new()),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let lp = PollLoop::new(
            source,
            Arc::new(IngestionCursor::new(4)),
            tx,
            Duration::ZERO,
            Duration::ZERO,
        );

        assert!(lp.run_once().await.is_err());
        assert_eq!(lp.cursor().get(), 4);
        assert_eq!(lp.run_once().await.unwrap(), 2);
        assert_eq!(lp.cursor().get(), 6);
        assert_eq!(*lp.source.seen.lock().unwrap(), vec![4, 4]);
        assert_eq!(rx.recv().await.unwrap().text, "4");
    }

    #[test]
    fn test_backoff_floor() {
        let (tx, _rx) = mpsc::channel(1);
        let lp = PollLoop::new(
            Scripted {
                rounds: Mutex::new(Vec::new()),
                seen: Mutex::new(Vec::new()),
            },
            Arc::new(IngestionCursor::default()),
            tx,
            Duration::ZERO,
            Duration::ZERO,
        );
        assert_eq!(lp.backoff, Duration::from_secs(1));
    }
}
