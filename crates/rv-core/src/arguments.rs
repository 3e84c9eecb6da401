//! Reduction arguments (run variables)
//!
//! Every run stores the variables its reduction script was called with, split
//! into standard and advanced groups. Instruments also ship default values.
//! The helpers here line the two up for display and turn submitted form
//! fields back into arguments.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Value shown for a variable that has no default
pub const DEFAULT_WHEN_NO_VALUE: &str = "";

const STANDARD_PREFIX: &str = "var-standard-";
const ADVANCED_PREFIX: &str = "var-advanced-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableHelp {
    #[serde(default)]
    pub standard_vars: Map<String, Value>,
    #[serde(default)]
    pub advanced_vars: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionArguments {
    #[serde(default)]
    pub standard_vars: Map<String, Value>,
    #[serde(default)]
    pub advanced_vars: Map<String, Value>,
    #[serde(default)]
    pub variable_help: VariableHelp,
}

impl ReductionArguments {
    /// Split a stored arguments document into its parts. Missing parts are empty.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self.standard_vars.is_empty() && self.advanced_vars.is_empty()
    }

    /// Form-ready view: every variable with its current and default value.
    pub fn for_render(&self, defaults: &ReductionArguments) -> RenderedArguments {
        RenderedArguments {
            standard_vars: combine_arguments(&self.standard_vars, &defaults.standard_vars),
            advanced_vars: combine_arguments(&self.advanced_vars, &defaults.advanced_vars),
            variable_help: defaults.variable_help.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedArgument {
    pub current: Value,
    pub default: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedArguments {
    pub standard_vars: BTreeMap<String, CombinedArgument>,
    pub advanced_vars: BTreeMap<String, CombinedArgument>,
    pub variable_help: VariableHelp,
}

/// Pair up current and default values for every known variable name.
///
/// With no current values, the defaults are used for both.
pub fn combine_arguments(
    current: &Map<String, Value>,
    default: &Map<String, Value>,
) -> BTreeMap<String, CombinedArgument> {
    let current = if current.is_empty() { default } else { current };

    current
        .keys()
        .chain(default.keys())
        .map(|name| {
            let default_value = default
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::String(DEFAULT_WHEN_NO_VALUE.to_string()));
            let current_value = current
                .get(name)
                .cloned()
                .unwrap_or_else(|| default_value.clone());
            (
                name.clone(),
                CombinedArgument {
                    current: current_value,
                    default: default_value,
                },
            )
        })
        .collect()
}

/// Interpret a value typed into the variables form.
///
/// Valid JSON is taken as-is. Otherwise `none`/`null`, `true`/`false` are
/// recognised case-insensitively, bare comma lists become lists and single
/// quotes are treated as double quotes. Anything else stays a string.
pub fn convert_argument_value(value: &str) -> Value {
    if let Ok(parsed) = serde_json::from_str::<Value>(value) {
        return parsed;
    }

    let lowered = value.to_lowercase();
    match lowered.as_str() {
        "none" | "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if value.contains(',') && !value.contains('[') && !value.contains(']') {
        return convert_argument_value(&format!("[{}]", value));
    }
    if value.contains('\'') {
        return convert_argument_value(&value.replace('\'', "\""));
    }

    Value::String(value.to_string())
}

/// Variable names travel base64-encoded (URL-safe alphabet) in form field names.
pub fn decode_variable_name(encoded: &str) -> Result<String> {
    let bytes = URL_SAFE
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|e| Error::VariableName(format!("{}: {}", encoded, e)))?;
    String::from_utf8(bytes).map_err(|e| Error::VariableName(format!("{}: {}", encoded, e)))
}

pub fn encode_variable_name(name: &str) -> String {
    URL_SAFE.encode(name.as_bytes())
}

/// Collect `var-standard-<name>` / `var-advanced-<name>` form fields.
///
/// Other fields are ignored.
pub fn read_variables_from_form<I, K, V>(fields: I) -> Result<ReductionArguments>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut arguments = ReductionArguments::default();

    for (key, value) in fields {
        let key = key.as_ref();
        let (target, encoded) = if let Some(encoded) = key.strip_prefix(STANDARD_PREFIX) {
            (&mut arguments.standard_vars, encoded)
        } else if let Some(encoded) = key.strip_prefix(ADVANCED_PREFIX) {
            (&mut arguments.advanced_vars, encoded)
        } else {
            continue;
        };

        let name = decode_variable_name(encoded)?;
        target.insert(name, convert_argument_value(value.as_ref()));
    }

    Ok(arguments)
}

/// Overlay submitted values on the instrument defaults.
///
/// A submitted name the defaults do not know about is an error: the form and
/// the instrument's variables file have drifted apart.
pub fn merge_arguments(
    submitted: &ReductionArguments,
    defaults: &ReductionArguments,
) -> Result<ReductionArguments> {
    let mut merged = defaults.clone();

    for (name, value) in &submitted.standard_vars {
        let slot = merged
            .standard_vars
            .get_mut(name)
            .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
        *slot = value.clone();
    }
    for (name, value) in &submitted.advanced_vars {
        let slot = merged
            .advanced_vars
            .get_mut(name)
            .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
        *slot = value.clone();
    }

    Ok(merged)
}
