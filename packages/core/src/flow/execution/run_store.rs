use flowboard_types::intercom::{InterComEvent, kinds};
use flowboard_types::json;
use futures::StreamExt;
use object_store::{ObjectStore, path::Path};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::RunStatus;
use super::log::LogMessage;

/// Persisted record of a finished (or finalized mid-flight) run.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct LogMeta {
    pub app_id: String,
    pub run_id: String,
    pub board_id: String,
    /// Unix microseconds.
    pub start: u64,
    pub end: u64,
    pub status: RunStatus,
    pub log_level: u8,
    pub version: String,
    pub nodes: Option<Vec<(String, u8)>>,
    pub logs: Option<u64>,
    pub node_id: String,
    pub event_version: Option<String>,
    pub event_id: String,
    pub payload: Vec<u8>,
    /// Runtime-only field - not stored, set based on fetch source
    #[serde(default)]
    pub is_remote: bool,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct RunFilter {
    pub node_id: Option<String>,
    /// Unix microseconds, inclusive.
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub status: Option<RunStatus>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Run records live under `apps/{app_id}/runs/{run_id}/` as a `meta.json`
/// document plus an `events.log` with one JSON event per line. Finalized
/// records are append-only; nothing rewrites a sealed run.
pub struct RunStore {
    store: Arc<dyn ObjectStore>,
}

impl RunStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        RunStore { store }
    }

    fn run_dir(app_id: &str, run_id: &str) -> Path {
        Path::from("apps")
            .child(app_id)
            .child("runs")
            .child(run_id)
    }

    fn meta_path(app_id: &str, run_id: &str) -> Path {
        Self::run_dir(app_id, run_id).child("meta.json")
    }

    fn events_path(app_id: &str, run_id: &str) -> Path {
        Self::run_dir(app_id, run_id).child("events.log")
    }

    pub async fn write_meta(&self, meta: &LogMeta) -> flowboard_types::Result<()> {
        let path = Self::meta_path(&meta.app_id, &meta.run_id);
        let bytes = json::to_vec_pretty(meta)?;
        self.store.put(&path, bytes.into()).await?;
        Ok(())
    }

    pub async fn read_meta(
        &self,
        app_id: &str,
        run_id: &str,
    ) -> flowboard_types::Result<LogMeta> {
        let path = Self::meta_path(app_id, run_id);
        let bytes = self
            .store
            .get(&path)
            .await
            .map_err(|_| {
                flowboard_types::EngineError::not_found(format!("Run {} not found", run_id))
            })?
            .bytes()
            .await?;
        Ok(json::from_slice(&bytes)?)
    }

    /// Append events to the run's log. Object stores have no native append,
    /// so the existing tail is read back and rewritten with the new lines.
    pub async fn append_events(
        &self,
        app_id: &str,
        run_id: &str,
        events: &[InterComEvent],
    ) -> flowboard_types::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let path = Self::events_path(app_id, run_id);
        let mut buffer = match self.store.get(&path).await {
            Ok(existing) => existing.bytes().await?.to_vec(),
            Err(_) => Vec::new(),
        };

        for event in events {
            buffer.extend_from_slice(&json::to_vec(event)?);
            buffer.push(b'\n');
        }

        self.store.put(&path, buffer.into()).await?;
        Ok(())
    }

    pub async fn read_events(
        &self,
        app_id: &str,
        run_id: &str,
    ) -> flowboard_types::Result<Vec<InterComEvent>> {
        let path = Self::events_path(app_id, run_id);
        let bytes = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(_) => return Ok(vec![]),
        };

        let mut events = Vec::new();
        for line in bytes.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if let Ok(event) = json::from_slice::<InterComEvent>(line) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// List finalized runs of a board, newest first.
    pub async fn list_runs(
        &self,
        app_id: &str,
        board_id: &str,
        filter: &RunFilter,
    ) -> flowboard_types::Result<Vec<LogMeta>> {
        let prefix = Path::from("apps").child(app_id).child("runs");
        let mut listing = self.store.list(Some(&prefix));

        let mut metas = Vec::new();
        while let Some(Ok(object)) = listing.next().await {
            if object.location.filename() != Some("meta.json") {
                continue;
            }

            let bytes = match self.store.get(&object.location).await {
                Ok(result) => result.bytes().await?,
                Err(_) => continue,
            };
            let Ok(meta) = json::from_slice::<LogMeta>(&bytes) else {
                continue;
            };

            if meta.board_id != board_id {
                continue;
            }
            if let Some(node_id) = &filter.node_id {
                if &meta.node_id != node_id {
                    continue;
                }
            }
            if let Some(from) = filter.from {
                if meta.start < from {
                    continue;
                }
            }
            if let Some(to) = filter.to {
                if meta.start > to {
                    continue;
                }
            }
            if let Some(status) = filter.status {
                if meta.status != status {
                    continue;
                }
            }

            metas.push(meta);
        }

        metas.sort_by(|a, b| b.start.cmp(&a.start));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(100);
        Ok(metas.into_iter().skip(offset).take(limit).collect())
    }

    /// Query a run's log lines. `query` is a case-insensitive substring
    /// match over the message; empty matches everything.
    pub async fn query_run(
        &self,
        meta: &LogMeta,
        query: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> flowboard_types::Result<Vec<LogMessage>> {
        let events = self.read_events(&meta.app_id, &meta.run_id).await?;
        let needle = query.to_lowercase();

        let logs = events
            .into_iter()
            .filter(|event| event.kind == kinds::NODE_LOG)
            .filter_map(|event| {
                let message = event.payload.get("message")?.as_str()?.to_string();
                if !needle.is_empty() && !message.to_lowercase().contains(&needle) {
                    return None;
                }
                let level = event
                    .payload
                    .get("level")
                    .and_then(|l| l.as_u64())
                    .unwrap_or(0) as u8;
                let node_id = event
                    .payload
                    .get("node_id")
                    .and_then(|n| n.as_str())
                    .map(|n| n.to_string());

                let micros = event.ts.timestamp_micros().max(0) as u64;
                Some(LogMessage {
                    id: format!("{}-{}", event.run_id, event.seq),
                    message,
                    log_level: super::LogLevel::from_u8(level),
                    start: micros,
                    end: micros,
                    operation_id: None,
                    node_id,
                })
            })
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(500))
            .collect();

        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowboard_types::Value;
    use object_store::memory::InMemory;

    fn meta(run_id: &str, board_id: &str, start: u64, status: RunStatus) -> LogMeta {
        LogMeta {
            app_id: "app".to_string(),
            run_id: run_id.to_string(),
            board_id: board_id.to_string(),
            start,
            end: start + 10,
            status,
            log_level: 1,
            version: "v0.0.1".to_string(),
            nodes: None,
            logs: None,
            node_id: "start".to_string(),
            event_version: None,
            event_id: String::new(),
            payload: vec![],
            is_remote: false,
        }
    }

    #[tokio::test]
    async fn list_runs_filters_and_orders() {
        let store = RunStore::new(Arc::new(InMemory::new()));

        store
            .write_meta(&meta("r1", "b1", 100, RunStatus::Success))
            .await
            .unwrap();
        store
            .write_meta(&meta("r2", "b1", 200, RunStatus::Cancelled))
            .await
            .unwrap();
        store
            .write_meta(&meta("r3", "b2", 300, RunStatus::Success))
            .await
            .unwrap();

        let all = store
            .list_runs("app", "b1", &RunFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].run_id, "r2");

        let cancelled = store
            .list_runs(
                "app",
                "b1",
                &RunFilter {
                    status: Some(RunStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].run_id, "r2");
    }

    #[tokio::test]
    async fn events_roundtrip_and_query() {
        let store = RunStore::new(Arc::new(InMemory::new()));
        let run_meta = meta("r1", "b1", 100, RunStatus::Success);
        store.write_meta(&run_meta).await.unwrap();

        let events = vec![
            InterComEvent::new("r1", 0, kinds::RUN_STARTED, Value::Null),
            InterComEvent::new(
                "r1",
                1,
                kinds::NODE_LOG,
                serde_json::json!({ "node_id": "n1", "level": 1, "message": "hello world" }),
            ),
            InterComEvent::new(
                "r1",
                2,
                kinds::NODE_LOG,
                serde_json::json!({ "node_id": "n1", "level": 3, "message": "boom" }),
            ),
        ];
        store.append_events("app", "r1", &events).await.unwrap();

        let read = store.read_events("app", "r1").await.unwrap();
        assert_eq!(read.len(), 3);

        let hits = store
            .query_run(&run_meta, "hello", None, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "hello world");

        let all_logs = store.query_run(&run_meta, "", None, None).await.unwrap();
        assert_eq!(all_logs.len(), 2);
    }
}
