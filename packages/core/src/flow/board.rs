use super::{
    execution::LogLevel,
    node::{Node, NodeLogic},
    pin::Pin,
    variable::Variable,
};
use crate::{
    state::FlowboardState,
    utils::hash::digest_hasher,
    utils::serde_helpers::{deserialize_systemtime, serialize_systemtime},
};
use commands::GenericCommand;
use flowboard_types::{EngineError, create_id, json};
use futures::{StreamExt, TryStreamExt};
use highway::HighwayHash;
use object_store::{ObjectStore, path::Path};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::SystemTime,
};
use tracing::instrument;

pub mod cleanup;
pub mod commands;

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub enum ExecutionStage {
    Dev,
    Int,
    QA,
    PreProd,
    Prod,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Default, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Hybrid,
    Remote,
    Local,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub enum LayerType {
    Function,
    Macro,
    Collapsed,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub enum VersionType {
    Major,
    Minor,
    Patch,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct Layer {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub r#type: LayerType,
    pub nodes: HashMap<String, Node>,
    pub variables: HashMap<String, Variable>,
    pub comments: HashMap<String, Comment>,
    pub coordinates: (f32, f32, f32),
    pub in_coordinates: Option<(f32, f32, f32)>,
    pub out_coordinates: Option<(f32, f32, f32)>,
    pub pins: HashMap<String, Pin>,
    pub comment: Option<String>,
    pub error: Option<String>,
    pub color: Option<String>,
    pub hash: Option<u64>,
}

impl Layer {
    pub fn new(id: String, name: String, r#type: LayerType) -> Self {
        Layer {
            id,
            parent_id: None,
            name,
            r#type,
            nodes: HashMap::new(),
            variables: HashMap::new(),
            comments: HashMap::new(),
            coordinates: (0.0, 0.0, 0.0),
            in_coordinates: None,
            out_coordinates: None,
            pins: HashMap::new(),
            comment: None,
            error: None,
            color: None,
            hash: None,
        }
    }

    pub fn hash(&mut self) {
        let mut hasher = digest_hasher();

        hasher.append(self.id.as_bytes());
        hasher.append(self.name.as_bytes());
        hasher.append(format!("{:?}", self.r#type).as_bytes());

        if let Some(parent_id) = &self.parent_id {
            hasher.append(parent_id.as_bytes());
        }

        let mut sorted_nodes: Vec<_> = self.nodes.iter().collect();
        sorted_nodes.sort_by_key(|(id, _)| *id);
        for (id, node) in sorted_nodes {
            hasher.append(id.as_bytes());
            hasher.append(node.id.as_bytes());
        }

        let mut sorted_variables: Vec<_> = self.variables.iter().collect();
        sorted_variables.sort_by_key(|(id, _)| *id);
        for (id, variable) in sorted_variables {
            hasher.append(id.as_bytes());
            hasher.append(variable.id.as_bytes());
        }

        let mut sorted_comments: Vec<_> = self.comments.iter().collect();
        sorted_comments.sort_by_key(|(id, _)| *id);
        for (id, comment) in sorted_comments {
            hasher.append(id.as_bytes());
            hasher.append(comment.id.as_bytes());
        }

        let mut sorted_pins: Vec<_> = self.pins.iter().collect();
        sorted_pins.sort_by_key(|(id, _)| *id);
        for (_id, pin) in sorted_pins {
            pin.hash(&mut hasher);
        }

        hasher.append(&self.coordinates.0.to_le_bytes());
        hasher.append(&self.coordinates.1.to_le_bytes());
        hasher.append(&self.coordinates.2.to_le_bytes());

        if let Some(comment) = &self.comment {
            hasher.append(comment.as_bytes());
        }

        if let Some(color) = &self.color {
            hasher.append(color.as_bytes());
        }

        self.hash = Some(hasher.finalize64());
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Clone)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub description: String,
    pub nodes: HashMap<String, Node>,
    pub variables: HashMap<String, Variable>,
    pub comments: HashMap<String, Comment>,
    pub viewport: (f32, f32, f32),
    pub version: (u32, u32, u32),
    pub stage: ExecutionStage,
    pub log_level: LogLevel,
    pub execution_mode: ExecutionMode,
    pub refs: HashMap<String, String>,
    pub layers: HashMap<String, Layer>,

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

    #[serde(skip, default = "default_board_dir")]
    #[schemars(skip)]
    pub board_dir: Path,

    #[serde(skip)]
    #[schemars(skip)]
    pub logic_nodes: HashMap<String, Arc<dyn NodeLogic>>,

    #[serde(skip)]
    #[schemars(skip)]
    pub app_state: Option<Arc<FlowboardState>>,
}

fn default_board_dir() -> Path {
    Path::from("boards")
}

/// Per-user undo/redo bookkeeping persisted with the app settings. The
/// engine itself is stateless with respect to history; clients push the
/// inverse commands returned from `execute_command(s)`.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Default)]
pub struct BoardUndoRedoStack {
    pub undo_stack: Vec<String>,
    pub redo_stack: Vec<String>,
}

impl Board {
    /// Create a new board with a unique ID under the given directory.
    pub fn new(id: Option<String>, base_dir: Path, app_state: Arc<FlowboardState>) -> Self {
        let id = id.unwrap_or(create_id());

        Board {
            id,
            name: "New Board".to_string(),
            description: "Your new Workflow!".to_string(),
            nodes: HashMap::new(),
            variables: HashMap::new(),
            comments: HashMap::new(),
            log_level: LogLevel::Info,
            stage: ExecutionStage::Dev,
            execution_mode: ExecutionMode::Hybrid,
            viewport: (0.0, 0.0, 0.0),
            version: (0, 0, 1),
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
            layers: HashMap::new(),
            refs: HashMap::new(),
            board_dir: base_dir,
            logic_nodes: HashMap::new(),
            app_state: Some(app_state),
        }
    }

    async fn node_updates(&mut self, state: Arc<FlowboardState>) {
        let registry = state.node_registry.read().await.clone();

        const MAX_PASSES: usize = 10;
        for _ in 0..MAX_PASSES {
            let reference = Arc::new(self.clone());
            let mut changed = false;

            for node in self.nodes.values_mut() {
                let old_hash = node.hash;

                let node_logic = match self.logic_nodes.get(&node.name) {
                    Some(logic) => Arc::clone(logic),
                    None => match registry.instantiate(node) {
                        Ok(new_logic) => {
                            self.logic_nodes
                                .insert(node.name.clone(), Arc::clone(&new_logic));
                            new_logic
                        }
                        Err(_) => continue,
                    },
                };
                node_logic.on_update(node, reference.clone()).await;

                node.hash();

                if node.hash != old_hash {
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        for layer in self.layers.values_mut() {
            layer.hash();
        }

        for variable in self.variables.values_mut() {
            variable.hash();
        }

        for comment in self.comments.values_mut() {
            comment.hash();
        }
    }

    /// Apply a single command. On success the returned command carries the
    /// state needed to undo it.
    pub async fn execute_command(
        &mut self,
        command: GenericCommand,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<GenericCommand> {
        let mut command = command;
        command.execute(self, state.clone()).await?;
        self.node_updates(state).await;
        self.updated_at = SystemTime::now();
        self.cleanup();
        Ok(command)
    }

    /// Apply a batch as one logical transaction: commands run in order and
    /// the first failure rolls back everything applied before it.
    pub async fn execute_commands(
        &mut self,
        commands: Vec<GenericCommand>,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<Vec<GenericCommand>> {
        let mut applied: Vec<GenericCommand> = Vec::with_capacity(commands.len());

        for command in commands {
            let mut command = command;
            match command.execute(self, state.clone()).await {
                Ok(()) => applied.push(command),
                Err(err) => {
                    for prior in applied.iter_mut().rev() {
                        if let Err(undo_err) = prior.undo(self, state.clone()).await {
                            tracing::error!(
                                "Rollback failed while unwinding a command batch: {:?}",
                                undo_err
                            );
                        }
                    }
                    self.cleanup();
                    return Err(err);
                }
            }
        }

        self.node_updates(state).await;
        self.updated_at = SystemTime::now();
        self.cleanup();
        Ok(applied)
    }

    pub async fn undo(
        &mut self,
        commands: Vec<GenericCommand>,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let mut commands = commands;
        for command in commands.iter_mut().rev() {
            command.undo(self, state.clone()).await?;
        }
        self.node_updates(state).await;
        self.updated_at = SystemTime::now();
        self.cleanup();
        Ok(())
    }

    pub async fn redo(
        &mut self,
        commands: Vec<GenericCommand>,
        state: Arc<FlowboardState>,
    ) -> flowboard_types::Result<()> {
        let mut commands = commands;
        for command in commands.iter_mut() {
            command.execute(self, state.clone()).await?;
        }
        self.node_updates(state).await;
        self.updated_at = SystemTime::now();
        self.cleanup();
        Ok(())
    }

    pub fn get_pin_by_id(&self, pin_id: &str) -> Option<&Pin> {
        for node in self.nodes.values() {
            if let Some(pin) = node.pins.get(pin_id) {
                return Some(pin);
            }
        }

        for layer in self.layers.values() {
            if let Some(pin) = layer.pins.get(pin_id) {
                return Some(pin);
            }
        }

        None
    }

    /// Find the node owning `pin_id`.
    pub fn get_pin_owner(&self, pin_id: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|node| node.pins.contains_key(pin_id))
    }

    pub fn get_variable(&self, variable_id: &str) -> Option<&Variable> {
        self.variables.get(variable_id)
    }

    /// Walk a layer's parent chain; used to refuse cycles on upsert.
    pub fn layer_chain_contains(&self, start: &str, needle: &str) -> bool {
        let mut current = Some(start.to_string());
        let mut guard = 0usize;
        while let Some(id) = current {
            if id == needle {
                return true;
            }
            guard += 1;
            if guard > self.layers.len() + 1 {
                return true;
            }
            current = self.layers.get(&id).and_then(|l| l.parent_id.clone());
        }
        false
    }

    fn current_path(&self) -> Path {
        self.board_dir.child("current.json")
    }

    fn version_path(&self, version: (u32, u32, u32)) -> Path {
        self.board_dir
            .child("versions")
            .child(format!("{}.{}.{}.json", version.0, version.1, version.2))
    }

    async fn get_store(
        &self,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> flowboard_types::Result<Arc<dyn ObjectStore>> {
        match store {
            Some(s) => Ok(s),
            None => {
                let state = self
                    .app_state
                    .as_ref()
                    .ok_or_else(|| flowboard_types::anyhow!("app_state not set"))?;
                FlowboardState::app_meta_store(state).await
            }
        }
    }

    /// Snapshot the current document as an immutable version, then bump.
    pub async fn create_version(
        &mut self,
        version_type: VersionType,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> flowboard_types::Result<(u32, u32, u32)> {
        let version = self.version;
        let store = self.get_store(store).await?;

        let bytes = json::to_vec_pretty(&self)?;
        store
            .put(&self.version_path(version), bytes.into())
            .await?;

        let new_version = match version_type {
            VersionType::Major => (version.0 + 1, 0, 0),
            VersionType::Minor => (version.0, version.1 + 1, 0),
            VersionType::Patch => (version.0, version.1, version.2 + 1),
        };

        self.version = new_version;
        self.updated_at = SystemTime::now();
        self.save(Some(store)).await?;
        Ok(new_version)
    }

    pub async fn get_versions(
        &self,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> flowboard_types::Result<Vec<(u32, u32, u32)>> {
        let versions_dir = self.board_dir.child("versions");
        let store = self.get_store(store).await?;

        let mut versions = store.list(Some(&versions_dir));
        let mut version_list = Vec::new();

        while let Some(Ok(meta)) = versions.next().await {
            let file_name = match meta.location.filename() {
                Some(name) => name,
                None => continue,
            };
            let Some(version) = file_name.strip_suffix(".json") else {
                continue;
            };
            let version = version.split('.').collect::<Vec<&str>>();

            if version.len() < 3 {
                continue;
            }

            let version = (
                version[0].parse::<u32>().unwrap_or(0),
                version[1].parse::<u32>().unwrap_or(0),
                version[2].parse::<u32>().unwrap_or(0),
            );

            version_list.push(version);
        }
        version_list.sort();
        Ok(version_list)
    }

    #[instrument(name = "Board::load", skip(app_state), level = "debug")]
    pub async fn load(
        path: Path,
        id: &str,
        app_state: Arc<FlowboardState>,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<Self> {
        let store = FlowboardState::app_meta_store(&app_state).await?;

        let board_dir = path.clone();
        let document = if let Some(version) = version {
            path.child("versions")
                .child(format!("{}.{}.{}.json", version.0, version.1, version.2))
        } else {
            path.child("current.json")
        };

        let bytes = store
            .get(&document)
            .await
            .map_err(|_| EngineError::not_found(format!("Board {} not found", id)))?
            .bytes()
            .await?;
        let mut board: Board = json::from_slice(&bytes)?;
        board.board_dir = board_dir;
        board.app_state = Some(app_state.clone());
        board.logic_nodes = HashMap::new();

        board.node_updates(app_state).await;
        board.cleanup();

        Ok(board)
    }

    pub async fn save(&self, store: Option<Arc<dyn ObjectStore>>) -> flowboard_types::Result<()> {
        let store = self.get_store(store).await?;
        let bytes = json::to_vec_pretty(&self)?;
        store.put(&self.current_path(), bytes.into()).await?;
        Ok(())
    }

    pub async fn delete(&self, store: Option<Arc<dyn ObjectStore>>) -> flowboard_types::Result<()> {
        let store = self.get_store(store).await?;
        let locations = store
            .list(Some(&self.board_dir))
            .map_ok(|m| m.location)
            .boxed();
        store
            .delete_stream(locations)
            .try_collect::<Vec<Path>>()
            .await?;
        Ok(())
    }

    /// TEMPLATE FUNCTIONS
    ///
    /// A template is a reusable snapshot of a board with secret variable
    /// values stripped.

    fn template_path(board_dir: &Path, template_id: &str) -> Path {
        board_dir
            .child("templates")
            .child(format!("{}.json", template_id))
    }

    fn template_version_path(
        board_dir: &Path,
        template_id: &str,
        version: (u32, u32, u32),
    ) -> Path {
        board_dir
            .child("templates")
            .child("versions")
            .child(template_id)
            .child(format!("{}.{}.{}.json", version.0, version.1, version.2))
    }

    pub async fn create_template(
        &mut self,
        template_id: String,
        version_type: VersionType,
        old_template: Option<Board>,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> flowboard_types::Result<(u32, u32, u32)> {
        let store = self.get_store(store).await?;

        let version = old_template
            .as_ref()
            .map(|t| t.version)
            .unwrap_or((0, 0, 0));

        let mut new_version = (0, 0, 0);

        if let Some(old_template) = &old_template {
            let to = Self::template_version_path(&self.board_dir, &template_id, version);
            let bytes = json::to_vec_pretty(old_template)?;
            store.put(&to, bytes.into()).await?;

            new_version = match version_type {
                VersionType::Major => (version.0 + 1, 0, 0),
                VersionType::Minor => (version.0, version.1 + 1, 0),
                VersionType::Patch => (version.0, version.1, version.2 + 1),
            }
        }

        let mut template = self.clone();
        template.id = template_id.clone();
        template.version = new_version;
        template.updated_at = SystemTime::now();

        for variable in template.variables.values_mut() {
            if variable.secret {
                variable.default_value = None;
            }
        }

        let to = Self::template_path(&self.board_dir, &template_id);
        let bytes = json::to_vec_pretty(&template)?;
        store.put(&to, bytes.into()).await?;
        Ok(new_version)
    }

    pub async fn load_template(
        path: Path,
        template_id: &str,
        app_state: Arc<FlowboardState>,
        version: Option<(u32, u32, u32)>,
    ) -> flowboard_types::Result<Self> {
        let store = FlowboardState::app_meta_store(&app_state).await?;

        let document = if let Some(version) = version {
            Self::template_version_path(&path, template_id, version)
        } else {
            Self::template_path(&path, template_id)
        };

        let bytes = store
            .get(&document)
            .await
            .map_err(|_| EngineError::not_found(format!("Template {} not found", template_id)))?
            .bytes()
            .await?;
        let mut board: Board = json::from_slice(&bytes)?;
        board.board_dir = path;
        board.app_state = Some(app_state.clone());
        board.logic_nodes = HashMap::new();

        board.node_updates(app_state).await;
        board.cleanup();

        Ok(board)
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub enum CommentType {
    Text,
    Image,
    Video,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    pub content: String,
    pub comment_type: CommentType,
    #[serde(
        serialize_with = "serialize_systemtime",
        deserialize_with = "deserialize_systemtime"
    )]
    pub timestamp: SystemTime,
    pub coordinates: (f32, f32, f32),
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub layer: Option<String>,
    pub color: Option<String>,
    pub z_index: Option<i32>,
    pub hash: Option<u64>,
    pub is_locked: Option<bool>,
}

impl Comment {
    pub fn new(content: &str, coordinates: (f32, f32, f32)) -> Self {
        Comment {
            id: create_id(),
            author: None,
            content: content.to_string(),
            comment_type: CommentType::Text,
            timestamp: SystemTime::now(),
            coordinates,
            width: None,
            height: None,
            layer: None,
            color: None,
            z_index: None,
            hash: None,
            is_locked: None,
        }
    }

    pub fn hash(&mut self) {
        let mut hasher = digest_hasher();

        hasher.append(self.id.as_bytes());
        hasher.append(self.content.as_bytes());
        hasher.append(format!("{:?}", self.comment_type).as_bytes());

        if let Some(author) = &self.author {
            hasher.append(author.as_bytes());
        }

        hasher.append(&self.coordinates.0.to_le_bytes());
        hasher.append(&self.coordinates.1.to_le_bytes());
        hasher.append(&self.coordinates.2.to_le_bytes());

        if let Some(width) = self.width {
            hasher.append(&width.to_le_bytes());
        }

        if let Some(height) = self.height {
            hasher.append(&height.to_le_bytes());
        }

        if let Some(layer) = &self.layer {
            hasher.append(layer.as_bytes());
        }

        if let Some(color) = &self.color {
            hasher.append(color.as_bytes());
        }

        if let Some(z_index) = self.z_index {
            hasher.append(&z_index.to_le_bytes());
        }

        if let Some(is_locked) = self.is_locked {
            hasher.append(&[is_locked as u8]);
        }

        self.hash = Some(hasher.finalize64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FlowboardState;

    #[tokio::test]
    async fn serialize_board() {
        let state = FlowboardState::in_memory();
        let base_dir = Path::from("boards");
        let board = Board::new(None, base_dir, state);

        let buf = json::to_vec(&board).unwrap();
        let deser_board: Board = json::from_slice(&buf).unwrap();

        assert_eq!(board.id, deser_board.id);
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let state = FlowboardState::in_memory();
        let base_dir = Path::from("apps").child("app-a").child("boards").child("b1");
        let mut board = Board::new(Some("b1".to_string()), base_dir.clone(), state.clone());
        board.name = "My Board".to_string();
        board.save(None).await.unwrap();

        let loaded = Board::load(base_dir, "b1", state, None).await.unwrap();
        assert_eq!(loaded.name, "My Board");
        assert_eq!(loaded.id, "b1");
    }

    #[tokio::test]
    async fn versioning_bumps_and_lists() {
        let state = FlowboardState::in_memory();
        let base_dir = Path::from("apps").child("app-a").child("boards").child("b2");
        let mut board = Board::new(Some("b2".to_string()), base_dir, state);

        let v = board
            .create_version(VersionType::Patch, None)
            .await
            .unwrap();
        assert_eq!(v, (0, 0, 2));
        let v = board
            .create_version(VersionType::Minor, None)
            .await
            .unwrap();
        assert_eq!(v, (0, 1, 0));

        let versions = board.get_versions(None).await.unwrap();
        assert_eq!(versions, vec![(0, 0, 1), (0, 0, 2)]);
    }

    #[tokio::test]
    async fn template_scrubs_secrets() {
        use crate::flow::pin::ValueType;
        use crate::flow::variable::{Variable, VariableType};

        let state = FlowboardState::in_memory();
        let base_dir = Path::from("apps").child("app-a").child("boards").child("b3");
        let mut board = Board::new(Some("b3".to_string()), base_dir.clone(), state.clone());

        let mut secret = Variable::new("api_key", VariableType::String, ValueType::Normal);
        secret.set_secret(true);
        secret.set_default_value(serde_json::json!("super-secret"));
        board.variables.insert(secret.id.clone(), secret);

        board
            .create_template("tpl".to_string(), VersionType::Patch, None, None)
            .await
            .unwrap();

        let template = Board::load_template(base_dir, "tpl", state, None).await.unwrap();
        let variable = template.variables.values().next().unwrap();
        assert!(variable.default_value.is_none());
    }
}
