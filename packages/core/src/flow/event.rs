use std::{collections::HashMap, time::SystemTime};

use flowboard_types::{EngineError, create_id, json};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    app::App,
    state::FlowboardState,
    utils::serde_helpers::{deserialize_systemtime, serialize_systemtime},
};

use super::{board::VersionType, pin::PinType, variable::Variable};

/// Simplified input pin metadata for events (used when the board can't be
/// fetched)
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct EventInput {
    pub id: String,
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    pub data_type: String,
    pub value_type: String,
    pub schema: Option<String>,
    pub default_value: Option<Vec<u8>>,
    pub index: u16,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub enum ReleaseNotes {
    NOTES(String),
    URL(String),
}

/// Weighted alternative target for staged rollouts of an event.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct CanaryEvent {
    pub weight: f32,
    pub variables: HashMap<String, Variable>,
    pub board_id: String,
    pub board_version: Option<(u32, u32, u32)>,
    pub node_id: String,
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub created_at: SystemTime,
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub updated_at: SystemTime,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub description: String,
    pub board_id: String,
    pub board_version: Option<(u32, u32, u32)>,
    pub node_id: String,
    pub variables: HashMap<String, Variable>,
    pub config: Vec<u8>,
    pub active: bool,

    pub canary: Option<CanaryEvent>,

    pub priority: u32,
    pub event_type: String,
    pub notes: Option<ReleaseNotes>,
    pub event_version: (u32, u32, u32),
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub created_at: SystemTime,
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub updated_at: SystemTime,

    /// Input pins copied from the node (populated at upsert time)
    #[serde(default)]
    pub inputs: Vec<EventInput>,
}

/// Feedback a user leaves on an event execution.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct EventFeedback {
    pub id: String,
    pub event_id: String,
    pub run_id: Option<String>,
    pub rating: i32,
    pub comment: Option<String>,
    pub context: Option<flowboard_types::Value>,
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub created_at: SystemTime,
}

pub fn canary_equal(a: &Option<CanaryEvent>, b: &Option<CanaryEvent>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.board_id == b.board_id
                && a.board_version == b.board_version
                && a.node_id == b.node_id
                && a.weight == b.weight
                && a.variables == b.variables
        }
        (None, None) => true,
        _ => false,
    }
}

impl Event {
    pub fn new(name: &str, board_id: &str, node_id: &str, event_type: &str) -> Self {
        Event {
            id: create_id(),
            name: name.to_string(),
            description: String::new(),
            board_id: board_id.to_string(),
            board_version: None,
            node_id: node_id.to_string(),
            variables: HashMap::new(),
            config: vec![],
            active: true,
            canary: None,
            priority: 0,
            event_type: event_type.to_string(),
            notes: None,
            event_version: (0, 0, 0),
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
            inputs: vec![],
        }
    }

    fn storage_root(app: &App) -> Path {
        Path::from("apps").child(app.id.clone()).child("events")
    }

    /// Populate the inputs field from the board's node pins
    pub async fn populate_inputs(&mut self, app: &App) -> flowboard_types::Result<()> {
        let board = app
            .open_board(self.board_id.clone(), Some(true), self.board_version)
            .await?;

        let board_guard = board.lock().await;

        if let Some(node) = board_guard.nodes.get(&self.node_id) {
            let mut inputs: Vec<EventInput> = node
                .pins
                .values()
                .filter(|pin| {
                    pin.pin_type == PinType::Output
                        && pin.data_type != super::variable::VariableType::Execution
                })
                .map(|pin| EventInput {
                    id: pin.id.clone(),
                    name: pin.name.clone(),
                    friendly_name: pin.friendly_name.clone(),
                    description: pin.description.clone(),
                    data_type: format!("{:?}", pin.data_type),
                    value_type: format!("{:?}", pin.value_type),
                    schema: pin.schema.clone(),
                    default_value: pin.default_value.clone(),
                    index: pin.index,
                })
                .collect();
            inputs.sort_by_key(|i| i.index);
            self.inputs = inputs;
        }

        Ok(())
    }

    pub async fn upsert(
        &mut self,
        app: &App,
        version_type: Option<VersionType>,
        enforce_id: bool,
    ) -> flowboard_types::Result<Self> {
        if self.id.is_empty() {
            self.id = create_id();
        }

        // A deactivated event skips board/node validation
        if self.active {
            self.validate_event_references(app).await?;
        }

        if let Err(e) = self.populate_inputs(app).await {
            tracing::warn!("Failed to populate event inputs during upsert: {}", e);
        }

        let old_event = Event::load(&self.id, app, None).await;
        if let Ok(mut old_event) = old_event {
            if old_event.node_id != self.node_id
                || old_event.board_id != self.board_id
                || !canary_equal(&old_event.canary, &self.canary)
                || version_type.is_some()
            {
                let version_type = version_type.unwrap_or(VersionType::Patch);
                old_event.save(app, Some(old_event.event_version)).await?;
                old_event.event_version = match version_type {
                    VersionType::Major => (old_event.event_version.0 + 1, 0, 0),
                    VersionType::Minor => {
                        (old_event.event_version.0, old_event.event_version.1 + 1, 0)
                    }
                    VersionType::Patch => (
                        old_event.event_version.0,
                        old_event.event_version.1,
                        old_event.event_version.2 + 1,
                    ),
                };
            }

            let updated_event = Event {
                id: old_event.id,
                event_version: old_event.event_version,
                created_at: old_event.created_at,
                updated_at: SystemTime::now(),
                ..self.clone()
            };

            updated_event.save(app, None).await?;
            return Ok(updated_event);
        }

        if !enforce_id {
            self.id = create_id();
        }
        self.event_version = (0, 0, 0);
        self.created_at = SystemTime::now();
        self.updated_at = SystemTime::now();
        self.save(app, None).await?;
        Ok(self.clone())
    }

    pub async fn get_versions(&self, app: &App) -> flowboard_types::Result<Vec<(u32, u32, u32)>> {
        let app_state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&app_state).await?;

        let versions_path = Self::storage_root(app)
            .child("versions")
            .child(self.id.clone());
        let mut list_stream = store
            .list(Some(&versions_path))
            .map_ok(|m| m.location)
            .boxed();

        let mut versions = Vec::new();
        while let Some(Ok(location)) = list_stream.next().await {
            if let Some(version_str) = location.filename() {
                let version_str = version_str.strip_suffix(".json").unwrap_or(version_str);
                let version = version_str.split('.').collect::<Vec<&str>>();
                if version.len() == 3 {
                    if let (Ok(major), Ok(minor), Ok(patch)) =
                        (version[0].parse(), version[1].parse(), version[2].parse())
                    {
                        versions.push((major, minor, patch));
                    }
                }
            }
        }

        versions.sort();
        Ok(versions)
    }

    pub async fn validate_event_references(&self, app: &App) -> flowboard_types::Result<()> {
        let board = app
            .open_board(self.board_id.clone(), Some(false), self.board_version)
            .await?;

        board.lock().await.nodes.get(&self.node_id).ok_or_else(|| {
            EngineError::not_found(format!(
                "Node with id {} not found in board {}",
                self.node_id, self.board_id
            ))
        })?;

        if let Some(canary) = &self.canary {
            let canary_board = app
                .open_board(canary.board_id.clone(), Some(false), canary.board_version)
                .await?;

            canary_board
                .lock()
                .await
                .nodes
                .get(&canary.node_id)
                .ok_or_else(|| {
                    EngineError::not_found(format!(
                        "Node with id {} not found in board {} (Canary)",
                        canary.node_id, canary.board_id
                    ))
                })?;
        }

        Ok(())
    }

    pub async fn load(
        id: &str,
        app: &App,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<Event> {
        let app_state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&app_state).await?;

        let event_path = match version {
            Some(version) => Self::storage_root(app)
                .child("versions")
                .child(id)
                .child(format!("{}.{}.{}.json", version.0, version.1, version.2)),
            None => Self::storage_root(app).child(format!("{}.json", id)),
        };

        let bytes = store
            .get(&event_path)
            .await
            .map_err(|_| EngineError::not_found(format!("Event {} not found", id)))?
            .bytes()
            .await?;
        Ok(json::from_slice(&bytes)?)
    }

    pub async fn load_all(app: &App) -> flowboard_types::Result<Vec<Event>> {
        let app_state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&app_state).await?;

        let root = Self::storage_root(app);
        let mut listing = store.list(Some(&root));
        let mut events = Vec::new();

        while let Some(Ok(meta)) = listing.next().await {
            // Versions live one level deeper; the listing is recursive.
            let relative = meta.location.as_ref();
            if relative.contains("/versions/") {
                continue;
            }
            if !relative.ends_with(".json") {
                continue;
            }

            if let Ok(result) = store.get(&meta.location).await {
                if let Ok(bytes) = result.bytes().await {
                    if let Ok(event) = json::from_slice::<Event>(&bytes) {
                        events.push(event);
                    }
                }
            }
        }

        events.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
        Ok(events)
    }

    pub async fn save(
        &self,
        app: &App,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<()> {
        let state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&state).await?;

        let event_path = match version {
            Some(version) => Self::storage_root(app)
                .child("versions")
                .child(self.id.clone())
                .child(format!("{}.{}.{}.json", version.0, version.1, version.2)),
            None => Self::storage_root(app).child(format!("{}.json", self.id)),
        };

        let bytes = json::to_vec_pretty(self)?;
        store.put(&event_path, bytes.into()).await?;
        Ok(())
    }

    pub async fn delete(&self, app: &App) -> flowboard_types::Result<()> {
        let state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&state).await?;

        let event_path = Self::storage_root(app).child(format!("{}.json", self.id));
        store.delete(&event_path).await?;

        // Remove all versions of the event
        let versions_path = Self::storage_root(app)
            .child("versions")
            .child(self.id.clone());

        let locations = store
            .list(Some(&versions_path))
            .map_ok(|m| m.location)
            .boxed();

        store
            .delete_stream(locations)
            .try_collect::<Vec<Path>>()
            .await?;

        Ok(())
    }

    /// An event sink is "active" when the event is enabled and declares a
    /// sink-style type (anything that waits for outside traffic).
    pub fn is_sink_active(&self) -> bool {
        const SINK_TYPES: &[&str] = &["api", "webhook", "mail", "schedule"];
        self.active && SINK_TYPES.contains(&self.event_type.as_str())
    }

    pub async fn save_feedback(
        &self,
        app: &App,
        feedback: EventFeedback,
    ) -> flowboard_types::Result<EventFeedback> {
        let state = app
            .app_state
            .clone()
            .ok_or(flowboard_types::anyhow!("App state not found"))?;
        let store = FlowboardState::app_meta_store(&state).await?;

        let path = Self::storage_root(app)
            .child("feedback")
            .child(self.id.clone())
            .child(format!("{}.json", feedback.id));
        let bytes = json::to_vec_pretty(&feedback)?;
        store.put(&path, bytes.into()).await?;
        Ok(feedback)
    }
}
