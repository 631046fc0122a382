use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};

use crate::Value;

/// Well-known event kinds. Anything else is free-form (node implementations
/// may emit their own kinds), but the run lifecycle sticks to these.
pub mod kinds {
    pub const RUN_STARTED: &str = "run.started";
    pub const NODE_ENTER: &str = "node.enter";
    pub const NODE_EXIT: &str = "node.exit";
    pub const NODE_LOG: &str = "node.log";
    pub const RUN_FINISHED: &str = "run.finished";
}

/// A single streamed message emitted during a run.
///
/// `seq` is assigned by the emitting run and is strictly increasing per run,
/// which gives consumers FIFO ordering without any cross-run guarantee.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct InterComEvent {
    pub run_id: String,
    pub seq: u64,
    pub kind: String,
    pub ts: DateTime<Utc>,
    pub payload: Value,
}

impl InterComEvent {
    pub fn new(run_id: &str, seq: u64, kind: &str, payload: Value) -> Self {
        Self {
            run_id: run_id.to_string(),
            seq,
            kind: kind.to_string(),
            ts: Utc::now(),
            payload,
        }
    }
}

/// Callback invoked with batches of intercom events.
pub type InterComCallback =
    Arc<dyn Fn(Vec<InterComEvent>) -> BoxFuture<'static, crate::Result<()>> + Send + Sync>;

/// A no-op callback for callers that do not consume the stream.
pub fn noop_callback() -> InterComCallback {
    Arc::new(|_events| Box::pin(async { crate::Result::Ok(()) }))
}

/// Per-run event emitter. Stamps `seq` and forwards to the callback; the
/// channel between emitter and consumer is bounded so a slow consumer
/// applies backpressure instead of growing memory.
pub struct InterComEmitter {
    run_id: String,
    seq: AtomicU64,
    tx: mpsc::Sender<InterComEvent>,
}

impl InterComEmitter {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create an emitter plus the task draining it into `callback`.
    pub fn spawn(run_id: &str, callback: InterComCallback) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<InterComEvent>(Self::DEFAULT_CAPACITY);
        let emitter = Arc::new(Self {
            run_id: run_id.to_string(),
            seq: AtomicU64::new(0),
            tx,
        });

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = (callback)(vec![event]).await {
                    tracing::warn!("intercom callback failed: {:?}", err);
                }
            }
        });

        emitter
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// How many events have been emitted so far.
    pub fn emitted(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, kind: &str, payload: Value) -> crate::Result<InterComEvent> {
        let event = InterComEvent::new(&self.run_id, self.next_seq(), kind, payload);
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| crate::anyhow!("intercom channel closed"))?;
        Ok(event)
    }
}

/// Buffers events and flushes them to the wrapped callback either when the
/// buffer is full or when a flush interval elapses. Used by callers that
/// relay events over a network hop and want fewer, larger frames.
pub struct BufferedInterComHandler {
    inner: InterComCallback,
    buffer: Mutex<Vec<InterComEvent>>,
    capacity: usize,
}

impl BufferedInterComHandler {
    pub fn new(inner: InterComCallback, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            buffer: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        })
    }

    pub async fn push(&self, events: Vec<InterComEvent>) -> crate::Result<()> {
        let flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.extend(events);
            if buffer.len() >= self.capacity {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(batch) = flush {
            (self.inner)(batch).await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> crate::Result<()> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if !batch.is_empty() {
            (self.inner)(batch).await?;
        }
        Ok(())
    }

    /// Adapt into the plain callback type.
    pub fn into_callback(self: &Arc<Self>) -> InterComCallback {
        let this = self.clone();
        Arc::new(move |events| {
            let this = this.clone();
            Box::pin(async move { this.push(events).await })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn emitter_stamps_monotonic_seq() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        let callback: InterComCallback = Arc::new(move |events| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().await.extend(events);
                crate::Result::Ok(())
            })
        });

        let emitter = InterComEmitter::spawn("run-a", callback);
        for i in 0..5 {
            emitter
                .emit(kinds::NODE_LOG, serde_json::json!({ "i": i }))
                .await
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let events = collected.lock().await;
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as u64);
            assert_eq!(event.run_id, "run-a");
        }
    }

    #[tokio::test]
    async fn buffered_handler_flushes_at_capacity() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: InterComCallback = Arc::new(move |events| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(events.len(), Ordering::SeqCst);
                crate::Result::Ok(())
            })
        });

        let buffered = BufferedInterComHandler::new(callback, 2);
        buffered
            .push(vec![InterComEvent::new(
                "r",
                0,
                kinds::NODE_ENTER,
                Value::Null,
            )])
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        buffered
            .push(vec![InterComEvent::new(
                "r",
                1,
                kinds::NODE_EXIT,
                Value::Null,
            )])
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        buffered
            .push(vec![InterComEvent::new(
                "r",
                2,
                kinds::NODE_LOG,
                Value::Null,
            )])
            .await
            .unwrap();
        buffered.flush().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
