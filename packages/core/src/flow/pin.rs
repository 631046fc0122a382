use crate::utils::hash::resolve_ref;
use flowboard_types::create_id;
use highway::HighwayHash;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::variable::VariableType;

/// Behavioral sentinel pin names. These names carry semantics inside the
/// engine (generic routing, variable references, error forwarding) and must
/// stay stable across versions.
pub mod names {
    /// Generic pass-through input on reroute nodes; matches any pin.
    pub const ROUTE_IN: &str = "route_in";
    /// Generic pass-through output on reroute nodes; matches any pin.
    pub const ROUTE_OUT: &str = "route_out";
    /// Reference-typed value output, exempt from schema enforcement.
    pub const VALUE_REF: &str = "value_ref";
    /// Reference-typed value input, exempt from schema enforcement.
    pub const VALUE_IN: &str = "value_in";
    /// Holds a variable id on getter/setter nodes.
    pub const VAR_REF: &str = "var_ref";
    /// Execution output a failing node routes to instead of failing the run.
    pub const AUTO_HANDLE_ERROR: &str = "auto_handle_error";
    /// String output carrying the error message next to `auto_handle_error`.
    pub const AUTO_HANDLE_ERROR_STRING: &str = "auto_handle_error_string";
    /// Inner boundary node of a layer on the entry side.
    pub const LAYER_START: &str = "layer_start";
    /// Inner boundary node of a layer on the return side.
    pub const LAYER_RETURN: &str = "layer_return";
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub enum PinType {
    Input,
    Output,
}

impl PinType {
    pub fn inverted(&self) -> PinType {
        match self {
            PinType::Input => PinType::Output,
            PinType::Output => PinType::Input,
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Normal,
    Array,
    HashSet,
    HashMap,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Default, PartialEq)]
pub struct PinOptions {
    pub enforce_generic_value_type: Option<bool>,
    pub enforce_schema: Option<bool>,
    pub sensitive: Option<bool>,
    pub step: Option<f64>,
    pub range: Option<(Option<f64>, Option<f64>)>,
    pub valid_values: Option<Vec<String>>,
}

impl PinOptions {
    pub fn new() -> Self {
        PinOptions::default()
    }

    pub fn set_enforce_generic_value_type(mut self, enforce: bool) -> Self {
        self.enforce_generic_value_type = Some(enforce);
        self
    }

    pub fn set_enforce_schema(mut self, enforce: bool) -> Self {
        self.enforce_schema = Some(enforce);
        self
    }

    pub fn set_sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = Some(sensitive);
        self
    }

    pub fn set_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn set_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn set_valid_values(mut self, values: Vec<String>) -> Self {
        self.valid_values = Some(values);
        self
    }

    pub fn build(self) -> Self {
        self
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct Pin {
    pub id: String,
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    pub pin_type: PinType,
    pub data_type: VariableType,
    pub value_type: ValueType,
    /// 1-based ordering within `(owner, pin_type)`.
    pub index: u16,
    pub schema: Option<String>,
    pub options: Option<PinOptions>,
    pub default_value: Option<Vec<u8>>,
    /// Downstream pin ids this pin feeds.
    pub connected_to: BTreeSet<String>,
    /// Upstream pin ids this pin reads from.
    pub depends_on: BTreeSet<String>,
    /// Pin was added at runtime by its node rather than declared statically.
    pub dynamic: Option<bool>,
}

impl Pin {
    pub fn new(
        name: &str,
        friendly_name: &str,
        description: &str,
        pin_type: PinType,
        data_type: VariableType,
    ) -> Self {
        Pin {
            id: create_id(),
            name: name.to_string(),
            friendly_name: friendly_name.to_string(),
            description: description.to_string(),
            pin_type,
            data_type,
            value_type: ValueType::Normal,
            index: 1,
            schema: None,
            options: None,
            default_value: None,
            connected_to: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            dynamic: None,
        }
    }

    pub fn set_value_type(&mut self, value_type: ValueType) -> &mut Self {
        self.value_type = value_type;
        self
    }

    pub fn set_default_value(&mut self, default_value: Option<flowboard_types::Value>) -> &mut Self {
        self.default_value =
            default_value.and_then(|value| flowboard_types::json::to_vec(&value).ok());
        self
    }

    pub fn set_schema_string(&mut self, schema: String) -> &mut Self {
        self.schema = Some(schema);
        self
    }

    pub fn set_schema<T: JsonSchema>(&mut self) -> &mut Self {
        let schema = schemars::schema_for!(T);
        self.schema = flowboard_types::json::to_string(&schema).ok();
        self
    }

    pub fn set_options(&mut self, options: PinOptions) -> &mut Self {
        self.options = Some(options);
        self
    }

    pub fn set_index(&mut self, index: u16) -> &mut Self {
        self.index = index;
        self
    }

    pub fn set_dynamic(&mut self) -> &mut Self {
        self.dynamic = Some(true);
        self
    }

    pub fn is_execution(&self) -> bool {
        self.data_type == VariableType::Execution
    }

    pub fn is_sensitive(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.sensitive)
            .unwrap_or(false)
    }

    /// Fresh copy with a new id and no edges. Used by copy/paste and layer
    /// boundary synthesis.
    pub fn duplicate(&self) -> Self {
        let mut pin = self.clone();
        pin.id = create_id();
        pin.connected_to = BTreeSet::new();
        pin.depends_on = BTreeSet::new();
        pin
    }

    pub fn hash(&self, hasher: &mut highway::HighwayHasher) {
        hasher.append(self.id.as_bytes());
        hasher.append(self.name.as_bytes());
        hasher.append(self.friendly_name.as_bytes());
        hasher.append(self.description.as_bytes());
        hasher.append(format!("{:?}", self.pin_type).as_bytes());
        hasher.append(format!("{:?}", self.data_type).as_bytes());
        hasher.append(format!("{:?}", self.value_type).as_bytes());
        hasher.append(&self.index.to_le_bytes());

        if let Some(schema) = &self.schema {
            hasher.append(schema.as_bytes());
        }

        if let Some(default_value) = &self.default_value {
            hasher.append(default_value);
        }

        for connected in &self.connected_to {
            hasher.append(connected.as_bytes());
        }

        for dependency in &self.depends_on {
            hasher.append(dependency.as_bytes());
        }
    }
}

/// Stable RGB per data type. Renderers rely on these staying fixed, so the
/// table is frozen and covered by a test.
pub fn color_for(data_type: &VariableType) -> [u8; 3] {
    match data_type {
        VariableType::Execution => [248, 250, 252],
        VariableType::Boolean => [148, 0, 0],
        VariableType::Byte => [6, 182, 212],
        VariableType::Integer => [29, 229, 100],
        VariableType::Float => [132, 204, 22],
        VariableType::String => [234, 0, 255],
        VariableType::Date => [236, 72, 153],
        VariableType::PathBuf => [20, 184, 166],
        VariableType::Struct => [59, 130, 246],
        VariableType::Generic => [148, 163, 184],
    }
}

/// One side of a prospective connection. `boundary_inverted` is set when the
/// pin belongs to a layer and is viewed from inside that layer, where the
/// boundary flips direction (an `Input` boundary pin acts as an `Output` on
/// the layer's start node and vice versa).
#[derive(Clone, Copy)]
pub struct ConnectionCandidate<'a> {
    pub pin: &'a Pin,
    pub boundary_inverted: bool,
}

impl<'a> ConnectionCandidate<'a> {
    pub fn new(pin: &'a Pin) -> Self {
        ConnectionCandidate {
            pin,
            boundary_inverted: false,
        }
    }

    pub fn inverted(pin: &'a Pin) -> Self {
        ConnectionCandidate {
            pin,
            boundary_inverted: true,
        }
    }

    fn effective_pin_type(&self) -> PinType {
        if self.boundary_inverted {
            self.pin.pin_type.inverted()
        } else {
            self.pin.pin_type.clone()
        }
    }
}

/// The canonical connection-validity rule.
///
/// Checks run in order; the reroute sentinel short-circuits everything,
/// direction is checked next, then schema and type agreement.
pub fn do_pins_match(
    a: ConnectionCandidate<'_>,
    b: ConnectionCandidate<'_>,
    refs: &HashMap<String, String>,
) -> bool {
    let (pin_a, pin_b) = (a.pin, b.pin);

    let is_route = |pin: &Pin| {
        (pin.name == names::ROUTE_IN || pin.name == names::ROUTE_OUT)
            && pin.data_type == VariableType::Generic
    };
    if is_route(pin_a) || is_route(pin_b) {
        return true;
    }

    if a.effective_pin_type() == b.effective_pin_type() {
        return false;
    }

    let schema_a = pin_a.schema.as_deref().map(|s| resolve_ref(s, refs));
    let schema_b = pin_b.schema.as_deref().map(|s| resolve_ref(s, refs));

    if let (Some(schema_a), Some(schema_b)) = (schema_a, schema_b) {
        if schema_a != schema_b {
            return false;
        }
    }

    let enforce_generic_value_type = |pin: &Pin| {
        pin.options
            .as_ref()
            .and_then(|o| o.enforce_generic_value_type)
            .unwrap_or(false)
    };
    if (enforce_generic_value_type(pin_a) || enforce_generic_value_type(pin_b))
        && pin_a.value_type != pin_b.value_type
    {
        return false;
    }

    let either_execution = pin_a.data_type == VariableType::Execution
        || pin_b.data_type == VariableType::Execution;
    let either_generic =
        pin_a.data_type == VariableType::Generic || pin_b.data_type == VariableType::Generic;

    // Generic unifies with everything except Execution.
    if either_generic {
        return !either_execution || (pin_a.data_type == pin_b.data_type);
    }

    let enforce_schema = |pin: &Pin| {
        pin.options
            .as_ref()
            .and_then(|o| o.enforce_schema)
            .unwrap_or(false)
    };
    let is_value_ref = |pin: &Pin| pin.name == names::VALUE_REF || pin.name == names::VALUE_IN;
    if (enforce_schema(pin_a) || enforce_schema(pin_b))
        && !is_value_ref(pin_a)
        && !is_value_ref(pin_b)
        && (schema_a.is_none() || schema_b.is_none())
    {
        return false;
    }

    if pin_a.value_type != pin_b.value_type {
        return false;
    }

    pin_a.data_type == pin_b.data_type
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(
        name: &str,
        pin_type: PinType,
        data_type: VariableType,
        value_type: ValueType,
    ) -> Pin {
        let mut pin = Pin::new(name, name, "", pin_type, data_type);
        pin.set_value_type(value_type);
        pin
    }

    #[test]
    fn matching_types_connect() {
        let out = pin("result", PinType::Output, VariableType::String, ValueType::Normal);
        let input = pin("text", PinType::Input, VariableType::String, ValueType::Normal);
        assert!(do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn mismatched_types_reject() {
        let out = pin("result", PinType::Output, VariableType::String, ValueType::Normal);
        let input = pin("count", PinType::Input, VariableType::Integer, ValueType::Normal);
        assert!(!do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn same_direction_rejects() {
        let a = pin("a", PinType::Output, VariableType::String, ValueType::Normal);
        let b = pin("b", PinType::Output, VariableType::String, ValueType::Normal);
        assert!(!do_pins_match(
            ConnectionCandidate::new(&a),
            ConnectionCandidate::new(&b),
            &HashMap::new()
        ));
    }

    #[test]
    fn generic_bridges_data_types() {
        let out = pin("value", PinType::Output, VariableType::Generic, ValueType::Normal);
        let input = pin("text", PinType::Input, VariableType::String, ValueType::Normal);
        assert!(do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn execution_never_unifies_with_generic() {
        let out = pin("exec_out", PinType::Output, VariableType::Execution, ValueType::Normal);
        let input = pin("value", PinType::Input, VariableType::Generic, ValueType::Normal);
        assert!(!do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn route_pins_match_anything() {
        let route = pin("route_in", PinType::Input, VariableType::Generic, ValueType::Normal);
        let exec = pin("exec_out", PinType::Output, VariableType::Execution, ValueType::Normal);
        assert!(do_pins_match(
            ConnectionCandidate::new(&exec),
            ConnectionCandidate::new(&route),
            &HashMap::new()
        ));
    }

    #[test]
    fn interned_schemas_compare_resolved() {
        let mut refs = HashMap::new();
        let schema = r#"{"type":"object","properties":{"x":{"type":"number"}}}"#;
        let key = crate::utils::hash::intern(&mut refs, schema);

        let mut out = pin("a", PinType::Output, VariableType::Struct, ValueType::Normal);
        out.schema = Some(key);
        let mut input = pin("b", PinType::Input, VariableType::Struct, ValueType::Normal);
        input.schema = Some(schema.to_string());

        assert!(do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &refs
        ));
    }

    #[test]
    fn differing_schemas_reject() {
        let mut out = pin("a", PinType::Output, VariableType::Struct, ValueType::Normal);
        out.schema = Some(r#"{"type":"object"}"#.to_string());
        let mut input = pin("b", PinType::Input, VariableType::Struct, ValueType::Normal);
        input.schema = Some(r#"{"type":"array"}"#.to_string());

        assert!(!do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn enforced_value_type_rejects_generic_array_mismatch() {
        let mut out = pin("values", PinType::Output, VariableType::Generic, ValueType::Array);
        out.set_options(PinOptions::new().set_enforce_generic_value_type(true).build());
        let input = pin("value", PinType::Input, VariableType::String, ValueType::Normal);

        assert!(!do_pins_match(
            ConnectionCandidate::new(&out),
            ConnectionCandidate::new(&input),
            &HashMap::new()
        ));
    }

    #[test]
    fn boundary_inversion_flips_direction() {
        // Two inputs normally clash; one viewed from inside a layer behaves
        // as an output and connects.
        let a = pin("in_a", PinType::Input, VariableType::String, ValueType::Normal);
        let b = pin("in_b", PinType::Input, VariableType::String, ValueType::Normal);
        assert!(!do_pins_match(
            ConnectionCandidate::new(&a),
            ConnectionCandidate::new(&b),
            &HashMap::new()
        ));
        assert!(do_pins_match(
            ConnectionCandidate::inverted(&a),
            ConnectionCandidate::new(&b),
            &HashMap::new()
        ));
    }

    #[test]
    fn color_table_is_frozen() {
        assert_eq!(color_for(&VariableType::Execution), [248, 250, 252]);
        assert_eq!(color_for(&VariableType::String), [234, 0, 255]);
        assert_eq!(color_for(&VariableType::Generic), [148, 163, 184]);
    }
}
