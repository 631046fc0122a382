use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use flowboard_types::EngineError;

use super::board::{Board, ExecutionMode};
use super::execution::RunPayload;
use super::node::Node;

/// A runtime-configured variable that needs a value before execution
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone)]
pub struct RuntimeVariable {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub data_type: String,
    pub value_type: String,
    pub secret: bool,
    pub schema: Option<String>,
}

/// OAuth provider requirement
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone)]
pub struct OAuthRequirement {
    pub provider_id: String,
    pub scopes: Vec<String>,
}

/// Result of the static pre-run analysis: everything a caller must supply
/// or decide before `execute_board` will accept the run.
#[derive(Debug, Serialize, Deserialize, JsonSchema, Clone)]
pub struct PrerunReport {
    /// Variables marked runtime_configured (need caller-provided values)
    pub runtime_variables: Vec<RuntimeVariable>,
    /// OAuth providers required by nodes in this board
    pub oauth_requirements: Vec<OAuthRequirement>,
    /// Whether the board can only run locally (has offline-only nodes)
    pub requires_local_execution: bool,
    /// Board's execution mode setting (Hybrid, Remote, Local)
    pub execution_mode: ExecutionMode,
    /// Whether the caller may host the run locally
    pub can_execute_locally: bool,
    /// Static configuration conflict, e.g. an offline-only node inside a
    /// Remote board. Execution refuses to start while this is set.
    pub static_error: Option<String>,
}

/// Where a run ends up after mode routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ExecutionLocation {
    Local,
    Remote,
}

/// Analyze a board to determine what's needed before execution.
pub fn analyze_board(board: &Board, can_execute_locally: bool) -> PrerunReport {
    let runtime_variables: Vec<RuntimeVariable> = board
        .variables
        .values()
        .filter(|v| v.runtime_configured)
        .map(|v| RuntimeVariable {
            id: v.id.clone(),
            name: v.name.clone(),
            description: v.description.clone(),
            data_type: format!("{:?}", v.data_type),
            value_type: format!("{:?}", v.value_type),
            secret: v.secret,
            schema: v.schema.clone(),
        })
        .collect();

    let mut oauth_scopes: HashMap<String, Vec<String>> = HashMap::new();
    let mut requires_local_execution = false;

    let mut process_node = |node: &Node| {
        if node.only_offline {
            requires_local_execution = true;
        }

        // Collect OAuth provider IDs
        if let Some(providers) = &node.oauth_providers {
            for provider_id in providers {
                oauth_scopes.entry(provider_id.clone()).or_default();
            }
        }

        // Scopes only count for providers a node actually registered;
        // required_oauth_scopes on its own documents, it doesn't trigger.
        if let Some(required_scopes) = &node.required_oauth_scopes {
            for (provider_id, scopes) in required_scopes {
                if let Some(entry) = oauth_scopes.get_mut(provider_id) {
                    for scope in scopes {
                        if !entry.contains(scope) {
                            entry.push(scope.clone());
                        }
                    }
                }
            }
        }
    };

    for node in board.nodes.values() {
        process_node(node);
    }

    for layer in board.layers.values() {
        for node in layer.nodes.values() {
            process_node(node);
        }
    }

    let mut oauth_requirements: Vec<OAuthRequirement> = oauth_scopes
        .into_iter()
        .map(|(provider_id, scopes)| OAuthRequirement {
            provider_id,
            scopes,
        })
        .collect();
    oauth_requirements.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));

    let static_error = if requires_local_execution
        && board.execution_mode == ExecutionMode::Remote
    {
        Some("Board is Remote but contains offline-only nodes".to_string())
    } else {
        None
    };

    PrerunReport {
        runtime_variables,
        oauth_requirements,
        requires_local_execution,
        execution_mode: board.execution_mode.clone(),
        can_execute_locally,
        static_error,
    }
}

/// Validate the caller's payload against the pre-run obligations. Nothing
/// runs (and no `run.started` is emitted) unless this passes.
pub fn ensure_payload(report: &PrerunReport, payload: &RunPayload) -> flowboard_types::Result<()> {
    if let Some(error) = &report.static_error {
        return Err(EngineError::local_only(error.clone()));
    }

    let empty_vars = std::collections::HashMap::new();
    let supplied_vars = payload.runtime_variables.as_ref().unwrap_or(&empty_vars);

    for required in &report.runtime_variables {
        let supplied = supplied_vars
            .get(&required.id)
            .and_then(|v| v.default_value.as_ref());
        if supplied.is_none() {
            return Err(EngineError::missing_runtime_variable(format!(
                "Runtime variable '{}' ({}) was not supplied",
                required.name, required.id
            )));
        }
    }

    let empty_tokens = std::collections::HashMap::new();
    let supplied_tokens = payload.oauth_tokens.as_ref().unwrap_or(&empty_tokens);

    for requirement in &report.oauth_requirements {
        let Some(token) = supplied_tokens.get(&requirement.provider_id) else {
            return Err(EngineError::missing_oauth(format!(
                "No OAuth token supplied for provider '{}'",
                requirement.provider_id
            )));
        };

        if !token.covers_scopes(&requirement.scopes) {
            return Err(EngineError::insufficient_scopes(format!(
                "Token for provider '{}' is missing required scopes",
                requirement.provider_id
            )));
        }
    }

    Ok(())
}

/// Decide where a run executes. `local_available` describes the caller's
/// runtime, `remote_available` whether a server-side executor is reachable.
pub fn route_execution(
    report: &PrerunReport,
    local_available: bool,
    remote_available: bool,
) -> flowboard_types::Result<ExecutionLocation> {
    match report.execution_mode {
        ExecutionMode::Local => {
            if !local_available {
                return Err(EngineError::local_only(
                    "Board requires local execution but no local executor is available",
                ));
            }
            Ok(ExecutionLocation::Local)
        }
        ExecutionMode::Remote => {
            if !remote_available {
                return Err(EngineError::remote_only(
                    "Board requires remote execution but no remote executor is available",
                ));
            }
            Ok(ExecutionLocation::Remote)
        }
        ExecutionMode::Hybrid => {
            if report.requires_local_execution || (local_available && report.can_execute_locally) {
                if !local_available {
                    return Err(EngineError::local_only(
                        "Board contains offline-only nodes but no local executor is available",
                    ));
                }
                return Ok(ExecutionLocation::Local);
            }
            if remote_available {
                return Ok(ExecutionLocation::Remote);
            }
            Err(EngineError::remote_only("No executor available"))
        }
    }
}

/// Remote dispatch never carries secret runtime values, regardless of the
/// caller's `filter_secrets` setting.
pub fn strip_secrets_for_remote(payload: &RunPayload) -> RunPayload {
    let mut stripped = payload.clone();
    if let Some(runtime_variables) = &mut stripped.runtime_variables {
        runtime_variables.retain(|_, variable| !variable.secret);
    }
    stripped.filter_secrets = Some(true);
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::oauth::OAuthToken;
    use crate::flow::pin::ValueType;
    use crate::flow::variable::{Variable, VariableType};
    use object_store::path::Path;

    fn test_board() -> Board {
        let state = crate::state::FlowboardState::in_memory();
        Board::new(None, Path::from("boards"), state)
    }

    #[test]
    fn runtime_variables_are_reported() {
        let mut board = test_board();
        let mut var = Variable::new("api_url", VariableType::String, ValueType::Normal);
        var.set_runtime_configured(true);
        board.variables.insert(var.id.clone(), var.clone());

        let report = analyze_board(&board, true);
        assert_eq!(report.runtime_variables.len(), 1);
        assert_eq!(report.runtime_variables[0].id, var.id);
    }

    #[test]
    fn missing_runtime_variable_is_rejected() {
        let mut board = test_board();
        let mut var = Variable::new("api_url", VariableType::String, ValueType::Normal);
        var.set_runtime_configured(true);
        let var_id = var.id.clone();
        board.variables.insert(var.id.clone(), var.clone());

        let report = analyze_board(&board, true);
        let payload = RunPayload::default();

        let err = ensure_payload(&report, &payload).unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::MissingRuntimeVariable
        );

        let mut supplied = var;
        supplied.set_default_value(serde_json::json!("https://example.com"));
        let payload = RunPayload {
            runtime_variables: Some([(var_id, supplied)].into_iter().collect()),
            ..Default::default()
        };
        assert!(ensure_payload(&report, &payload).is_ok());
    }

    #[test]
    fn oauth_gating_checks_presence_and_scopes() {
        let mut board = test_board();
        let mut node = crate::flow::node::Node::new("web_request", "Request", "", "Web");
        node.add_oauth_provider("github");
        node.require_oauth_scopes("github", &["repo"]);
        board.nodes.insert(node.id.clone(), node);

        let report = analyze_board(&board, true);
        assert_eq!(report.oauth_requirements.len(), 1);

        let err = ensure_payload(&report, &RunPayload::default()).unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::MissingOAuth
        );

        let payload = RunPayload {
            oauth_tokens: Some(
                [(
                    "github".to_string(),
                    OAuthToken::new("tok".to_string()).with_scopes(vec!["gist".to_string()]),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        };
        let err = ensure_payload(&report, &payload).unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::InsufficientScopes
        );

        let payload = RunPayload {
            oauth_tokens: Some(
                [(
                    "github".to_string(),
                    OAuthToken::new("tok".to_string()).with_scopes(vec!["repo".to_string()]),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        };
        assert!(ensure_payload(&report, &payload).is_ok());
    }

    #[test]
    fn offline_node_in_remote_board_is_a_static_error() {
        let mut board = test_board();
        board.execution_mode = ExecutionMode::Remote;
        let mut node = crate::flow::node::Node::new("fs_read", "Read File", "", "Storage");
        node.set_only_offline(true);
        board.nodes.insert(node.id.clone(), node);

        let report = analyze_board(&board, true);
        assert!(report.static_error.is_some());

        let err = ensure_payload(&report, &RunPayload::default()).unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::LocalOnly
        );
    }

    #[test]
    fn mode_routing() {
        let mut board = test_board();
        board.execution_mode = ExecutionMode::Remote;
        let report = analyze_board(&board, false);

        let err = route_execution(&report, true, false).unwrap_err();
        assert_eq!(
            flowboard_types::EngineError::kind_of(&err),
            flowboard_types::ErrorKind::RemoteOnly
        );
        assert_eq!(
            route_execution(&report, false, true).unwrap(),
            ExecutionLocation::Remote
        );

        let mut board = test_board();
        board.execution_mode = ExecutionMode::Hybrid;
        let report = analyze_board(&board, true);
        assert_eq!(
            route_execution(&report, true, true).unwrap(),
            ExecutionLocation::Local
        );
        assert_eq!(
            route_execution(&report, false, true).unwrap(),
            ExecutionLocation::Remote
        );
    }

    #[test]
    fn remote_dispatch_strips_secrets() {
        let mut secret = Variable::new("token", VariableType::String, ValueType::Normal);
        secret.set_secret(true);
        secret.set_default_value(serde_json::json!("hush"));
        let mut open = Variable::new("url", VariableType::String, ValueType::Normal);
        open.set_default_value(serde_json::json!("https://example.com"));

        let payload = RunPayload {
            runtime_variables: Some(
                [
                    (secret.id.clone(), secret.clone()),
                    (open.id.clone(), open.clone()),
                ]
                .into_iter()
                .collect(),
            ),
            filter_secrets: Some(false),
            ..Default::default()
        };

        let stripped = strip_secrets_for_remote(&payload);
        let vars = stripped.runtime_variables.unwrap();
        assert!(!vars.contains_key(&secret.id));
        assert!(vars.contains_key(&open.id));
        assert_eq!(stripped.filter_secrets, Some(true));
    }
}
