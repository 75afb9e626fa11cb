//! Declarative agent spec: load, validation, digest, and input resolution.
//!
//! The spec document (YAML or JSON) is parsed into a closed set of typed
//! fields and validated eagerly, so a malformed descriptor fails at load
//! time rather than deep inside the iteration loop.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::{EngineError, Result};

/// Environment settings the agent's tools need.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvSpec {
    /// Descriptive user agent for outbound requests.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Declared type of a user input parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    String,
    Integer,
    Number,
    Boolean,
    StringList,
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringList => "string_list",
        };
        write!(f, "{s}")
    }
}

/// Optional constraints on a declared input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InputConstraints {
    /// Minimum numeric value (integer/number inputs).
    #[serde(default)]
    pub min: Option<f64>,

    /// Maximum numeric value (integer/number inputs).
    #[serde(default)]
    pub max: Option<f64>,

    /// Minimum length (string/string_list inputs).
    #[serde(default)]
    pub min_len: Option<usize>,

    /// Maximum length (string/string_list inputs).
    #[serde(default)]
    pub max_len: Option<usize>,

    /// Closed set of allowed values.
    #[serde(default)]
    pub one_of: Option<Vec<Value>>,
}

/// One declared input parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InputDecl {
    /// Parameter name.
    pub name: String,

    /// Declared type.
    #[serde(rename = "type")]
    pub ty: InputType,

    /// Default value when the caller omits the parameter.
    #[serde(default)]
    pub default: Option<Value>,

    /// Constraints applied after type checking.
    #[serde(default)]
    pub constraints: InputConstraints,
}

/// Declared output contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputsSpec {
    /// Inline JSON-schema document.
    #[serde(default)]
    pub schema: Option<Value>,

    /// Path to a JSON-schema file, resolved relative to the spec document.
    #[serde(default)]
    pub schema_ref: Option<String>,
}

/// Pricing model kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    PerIteration,
    Flat,
}

/// Cost accounting declaration.
///
/// `base_cost` is the minimum committed cost of one iteration (used for the
/// proactive budget pre-check); `per_call_cost` meters each tool call;
/// `max_cost` is the authorized budget for the whole session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PricingSpec {
    pub model: PricingModel,
    pub base_cost: f64,
    #[serde(default)]
    pub per_call_cost: f64,
    pub max_cost: f64,
    pub currency: String,
}

/// Execution requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequirementsSpec {
    /// Tools the agent needs; each must have a registered implementation.
    pub tool_names: Vec<String>,

    /// Hard iteration bound.
    pub max_iterations: u32,

    /// Per-tool-call timeout in seconds.
    pub timeout: u64,

    /// Bounded fan-out for concurrent tool calls within an iteration.
    #[serde(default)]
    pub fan_out: Option<usize>,
}

/// Immutable agent descriptor, loaded once per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub env: EnvSpec,
    pub inputs: Vec<InputDecl>,
    pub outputs: OutputsSpec,
    pub pricing: PricingSpec,
    pub requirements: RequirementsSpec,
}

impl AgentSpec {
    /// Parse a YAML spec document and validate it.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let spec: AgentSpec = serde_yaml::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a JSON spec document and validate it.
    pub fn from_json_value(value: Value) -> Result<Self> {
        let spec: AgentSpec = serde_json::from_value(value)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a spec document from disk, resolving `outputs.schema_ref`
    /// relative to the document's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut spec: AgentSpec = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };

        if spec.outputs.schema.is_none() {
            if let Some(schema_ref) = &spec.outputs.schema_ref {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                let schema_path = base.join(schema_ref);
                let schema_text = std::fs::read_to_string(&schema_path)?;
                spec.outputs.schema = Some(serde_json::from_str(&schema_text)?);
            }
        }

        spec.validate()?;
        Ok(spec)
    }

    /// Fail-fast validation of the descriptor itself.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidSpec("name cannot be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(EngineError::InvalidSpec("version cannot be empty".into()));
        }
        if self.requirements.tool_names.is_empty() {
            return Err(EngineError::InvalidSpec(
                "requirements.tool_names cannot be empty".into(),
            ));
        }
        if self.requirements.max_iterations == 0 {
            return Err(EngineError::InvalidSpec(
                "requirements.max_iterations must be at least 1".into(),
            ));
        }
        if self.requirements.timeout == 0 {
            return Err(EngineError::InvalidSpec(
                "requirements.timeout must be at least 1 second".into(),
            ));
        }
        if self.pricing.base_cost < 0.0 || self.pricing.per_call_cost < 0.0 {
            return Err(EngineError::InvalidSpec(
                "pricing costs cannot be negative".into(),
            ));
        }
        if self.pricing.max_cost <= 0.0 {
            return Err(EngineError::InvalidSpec(
                "pricing.max_cost must be positive".into(),
            ));
        }
        if self.pricing.currency.trim().is_empty() {
            return Err(EngineError::InvalidSpec("pricing.currency cannot be empty".into()));
        }
        if self.outputs.schema.is_none() && self.outputs.schema_ref.is_none() {
            return Err(EngineError::InvalidSpec(
                "outputs must declare a schema or a schema_ref".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for decl in &self.inputs {
            if !seen.insert(decl.name.as_str()) {
                return Err(EngineError::InvalidSpec(format!(
                    "duplicate input declaration: {}",
                    decl.name
                )));
            }
            if let Some(default) = &decl.default {
                check_value(decl, default)
                    .map_err(|e| EngineError::InvalidSpec(format!("bad default: {e}")))?;
            }
        }

        Ok(())
    }

    /// Declared output schema. Only callable on a spec whose document
    /// carried an inline schema or whose `schema_ref` was resolved by
    /// [`AgentSpec::load`].
    pub fn output_schema(&self) -> Result<&Value> {
        self.outputs.schema.as_ref().ok_or_else(|| {
            EngineError::InvalidSpec("output schema_ref was never resolved".into())
        })
    }

    /// SHA-256 hex digest of the canonical JSON form.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// User inputs after validation and defaulting, keyed by declared name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolvedInputs {
    values: BTreeMap<String, Value>,
}

impl ResolvedInputs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    pub fn get_usize(&self, name: &str) -> Option<usize> {
        self.get(name).and_then(|v| v.as_u64()).map(|v| v as usize)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    pub fn get_str_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The resolved inputs as a JSON object.
    pub fn as_json(&self) -> Value {
        serde_json::to_value(&self.values).unwrap_or(Value::Null)
    }
}

/// Resolve user-supplied inputs against the spec's declarations.
///
/// Rejects unknown keys, missing required parameters, type mismatches, and
/// constraint violations; applies declared defaults for omitted parameters.
pub fn resolve_inputs(spec: &AgentSpec, user: &Value) -> Result<ResolvedInputs> {
    let empty = serde_json::Map::new();
    let supplied = match user {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(EngineError::InvalidInput(
                "inputs must be a JSON object".into(),
            ))
        }
    };

    for key in supplied.keys() {
        if !spec.inputs.iter().any(|d| &d.name == key) {
            return Err(EngineError::InvalidInput(format!(
                "unknown input parameter: {key}"
            )));
        }
    }

    let mut values = BTreeMap::new();
    for decl in &spec.inputs {
        let value = match supplied.get(&decl.name) {
            Some(v) => v.clone(),
            None => match &decl.default {
                Some(d) => d.clone(),
                None => {
                    return Err(EngineError::InvalidInput(format!(
                        "missing required input: {}",
                        decl.name
                    )))
                }
            },
        };

        check_value(decl, &value).map_err(EngineError::InvalidInput)?;
        values.insert(decl.name.clone(), value);
    }

    Ok(ResolvedInputs { values })
}

/// Type + constraint check for one declared input.
fn check_value(decl: &InputDecl, value: &Value) -> std::result::Result<(), String> {
    let name = &decl.name;
    match decl.ty {
        InputType::String => {
            let Some(s) = value.as_str() else {
                return Err(format!("input '{name}' must be a string"));
            };
            check_len(name, s.chars().count(), &decl.constraints)?;
        }
        InputType::Integer => {
            if value.as_i64().is_none() {
                return Err(format!("input '{name}' must be an integer"));
            }
            check_range(name, value.as_f64(), &decl.constraints)?;
        }
        InputType::Number => {
            if value.as_f64().is_none() {
                return Err(format!("input '{name}' must be a number"));
            }
            check_range(name, value.as_f64(), &decl.constraints)?;
        }
        InputType::Boolean => {
            if !value.is_boolean() {
                return Err(format!("input '{name}' must be a boolean"));
            }
        }
        InputType::StringList => {
            let Some(items) = value.as_array() else {
                return Err(format!("input '{name}' must be a list of strings"));
            };
            if items.iter().any(|i| !i.is_string()) {
                return Err(format!("input '{name}' must contain only strings"));
            }
            check_len(name, items.len(), &decl.constraints)?;
        }
    }

    if let Some(allowed) = &decl.constraints.one_of {
        if !allowed.contains(value) {
            return Err(format!("input '{name}' must be one of the declared values"));
        }
    }
    Ok(())
}

fn check_range(
    name: &str,
    value: Option<f64>,
    constraints: &InputConstraints,
) -> std::result::Result<(), String> {
    let Some(v) = value else { return Ok(()) };
    if let Some(min) = constraints.min {
        if v < min {
            return Err(format!("input '{name}' must be >= {min}"));
        }
    }
    if let Some(max) = constraints.max {
        if v > max {
            return Err(format!("input '{name}' must be <= {max}"));
        }
    }
    Ok(())
}

fn check_len(
    name: &str,
    len: usize,
    constraints: &InputConstraints,
) -> std::result::Result<(), String> {
    if let Some(min_len) = constraints.min_len {
        if len < min_len {
            return Err(format!("input '{name}' needs at least {min_len} item(s)"));
        }
    }
    if let Some(max_len) = constraints.max_len {
        if len > max_len {
            return Err(format!("input '{name}' allows at most {max_len} item(s)"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC_YAML: &str = r#"
name: reddit-scout
version: 0.2.0
runtime: scout
description: Finds users with payment intent.
env:
  user_agent: "scout:reddit-scout:v0.2.0"
inputs:
  - name: query
    type: string
    constraints:
      min_len: 1
  - name: target_subreddits
    type: string_list
    constraints:
      min_len: 1
  - name: max_users
    type: integer
    default: 5
    constraints:
      min: 1
      max: 50
  - name: min_intent_score
    type: number
    default: 0.7
    constraints:
      min: 0.0
      max: 1.0
outputs:
  schema:
    type: object
    required: [results, summary]
pricing:
  model: per_iteration
  base_cost: 0.01
  per_call_cost: 0.002
  max_cost: 1.0
  currency: USD
requirements:
  tool_names: [reddit_search, reddit_comments]
  max_iterations: 10
  timeout: 30
"#;

    fn spec() -> AgentSpec {
        AgentSpec::from_yaml_str(SPEC_YAML).expect("parse spec")
    }

    #[test]
    fn test_spec_parses_from_yaml() {
        let spec = spec();
        assert_eq!(spec.name, "reddit-scout");
        assert_eq!(spec.requirements.max_iterations, 10);
        assert_eq!(spec.inputs.len(), 4);
        assert_eq!(spec.pricing.model, PricingModel::PerIteration);
    }

    #[test]
    fn test_spec_digest_stable() {
        let d1 = spec().digest().expect("digest");
        let d2 = spec().digest().expect("digest");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn test_spec_rejects_unknown_fields() {
        let text = SPEC_YAML.replace("runtime: scout", "runtime: scout\nmystery_field: 1");
        assert!(AgentSpec::from_yaml_str(&text).is_err());
    }

    #[test]
    fn test_spec_rejects_zero_iterations() {
        let text = SPEC_YAML.replace("max_iterations: 10", "max_iterations: 0");
        let err = AgentSpec::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_spec_rejects_missing_schema() {
        let mut spec = spec();
        spec.outputs.schema = None;
        spec.outputs.schema_ref = None;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let resolved = resolve_inputs(
            &spec(),
            &json!({"query": "language apps", "target_subreddits": ["languagelearning"]}),
        )
        .expect("resolve");

        assert_eq!(resolved.get_usize("max_users"), Some(5));
        assert_eq!(resolved.get_f64("min_intent_score"), Some(0.7));
        assert_eq!(resolved.get_str("query"), Some("language apps"));
    }

    #[test]
    fn test_resolve_rejects_unknown_key() {
        let err = resolve_inputs(
            &spec(),
            &json!({"query": "q", "target_subreddits": ["a"], "surprise": true}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown input"));
    }

    #[test]
    fn test_resolve_rejects_missing_required() {
        let err = resolve_inputs(&spec(), &json!({"query": "q"})).unwrap_err();
        assert!(err.to_string().contains("target_subreddits"));
    }

    #[test]
    fn test_resolve_rejects_type_mismatch() {
        let err = resolve_inputs(
            &spec(),
            &json!({"query": 42, "target_subreddits": ["a"]}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_resolve_rejects_constraint_violation() {
        let err = resolve_inputs(
            &spec(),
            &json!({
                "query": "q",
                "target_subreddits": ["a"],
                "max_users": 500
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("<= 50"));
    }

    #[test]
    fn test_resolve_rejects_empty_list() {
        let err = resolve_inputs(
            &spec(),
            &json!({"query": "q", "target_subreddits": []}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_load_resolves_schema_ref() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema_path = dir.path().join("output.schema.json");
        std::fs::write(
            &schema_path,
            r#"{"type": "object", "required": ["results", "summary"]}"#,
        )
        .expect("write schema");

        let text = SPEC_YAML.replace(
            "  schema:\n    type: object\n    required: [results, summary]",
            "  schema_ref: output.schema.json",
        );
        let spec_path = dir.path().join("agent.yaml");
        std::fs::write(&spec_path, text).expect("write spec");

        let spec = AgentSpec::load(&spec_path).expect("load");
        let schema = spec.output_schema().expect("schema resolved");
        assert_eq!(schema["required"][0], "results");
    }

    #[test]
    fn test_default_must_typecheck() {
        let text = SPEC_YAML.replace("default: 5", "default: \"five\"");
        let err = AgentSpec::from_yaml_str(&text).unwrap_err();
        assert!(err.to_string().contains("bad default"));
    }
}
