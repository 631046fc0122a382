use flowboard_types::create_id;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::LogLevel;

fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A single log line produced during node execution. Timestamps are unix
/// microseconds to keep the run log compact and sortable.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct LogMessage {
    pub id: String,
    pub message: String,
    pub log_level: LogLevel,
    pub start: u64,
    pub end: u64,
    pub operation_id: Option<String>,
    pub node_id: Option<String>,
}

impl LogMessage {
    pub fn new(message: &str, log_level: LogLevel, operation_id: Option<String>) -> Self {
        let now = now_micros();
        LogMessage {
            id: create_id(),
            message: message.to_string(),
            log_level,
            start: now,
            end: now,
            operation_id,
            node_id: None,
        }
    }

    pub fn end(&mut self) {
        self.end = now_micros();
    }
}
