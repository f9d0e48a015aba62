//! Option value model and the option type registry.

use crate::config::{ConfigError, OptionSpec};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    String(String),
    Number(f64),
    Integer(i64),
    Date(DateTime<Utc>),
    Array(Vec<OptionValue>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of a `Number` or `Integer`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            OptionValue::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[OptionValue]> {
        match self {
            OptionValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Converts one raw option argument into a value.
///
/// Receives the option spec, the option string as the user wrote it (`--count`,
/// `-c`, or the environment variable name) and the raw argument, which is
/// `None` for an argv occurrence of an option that takes no argument. On
/// failure returns a reason phrase completing "is not ...", such as
/// `"a positive integer"`.
pub type ParseArgFn = fn(&OptionSpec, &str, Option<&str>) -> Result<OptionValue, String>;

/// Descriptor of an option type.
#[derive(Debug, Clone)]
pub struct OptionType {
    pub name: String,
    /// Whether the option consumes an argument
    pub takes_arg: bool,
    /// Help placeholder for the argument, e.g. `INT`
    pub help_arg: Option<String>,
    pub parse_arg: ParseArgFn,
    /// Occurrences accumulate into an array
    pub array: bool,
    /// Array values returned by `parse_arg` are spliced into the accumulated array
    pub array_flatten: bool,
    /// Value used when the option is not given at all
    pub default: Option<OptionValue>,
    /// Bash completion hint for the argument
    pub completion_type: Option<String>,
}

impl OptionType {
    /// A scalar type taking one argument.
    pub fn new(name: impl Into<String>, parse_arg: ParseArgFn) -> Self {
        Self {
            name: name.into(),
            takes_arg: true,
            help_arg: None,
            parse_arg,
            array: false,
            array_flatten: false,
            default: None,
            completion_type: None,
        }
    }

    pub fn help_arg(mut self, help_arg: impl Into<String>) -> Self {
        self.help_arg = Some(help_arg.into());
        self
    }

    pub fn completion_type(mut self, completion_type: impl Into<String>) -> Self {
        self.completion_type = Some(completion_type.into());
        self
    }

    pub fn default_value(mut self, default: OptionValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn array_flatten(mut self) -> Self {
        self.array = true;
        self.array_flatten = true;
        self
    }

    fn flag(name: impl Into<String>, parse_arg: ParseArgFn) -> Self {
        Self {
            takes_arg: false,
            ..Self::new(name, parse_arg)
        }
    }

    /// The `arrayOf<Name>` variant of this type.
    fn array_variant(&self) -> Self {
        let mut chars = self.name.chars();
        let capitalized: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self {
            name: format!("arrayOf{}", capitalized),
            array: true,
            ..self.clone()
        }
    }
}

/// Name-keyed set of option types.
///
/// Registration needs `&mut self`, so a registry is filled in before any
/// parser borrows it; compiled tables keep their own handles to the types.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<OptionType>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry seeded with the built-in types and their array variants.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let scalars = [
            OptionType::flag("bool", parse_bool),
            OptionType::new("string", parse_string).help_arg("ARG"),
            OptionType::new("number", parse_number)
                .help_arg("NUM")
                .completion_type("none"),
            OptionType::new("integer", parse_integer)
                .help_arg("INT")
                .completion_type("none"),
            OptionType::new("positiveInteger", parse_positive_integer)
                .help_arg("INT")
                .completion_type("none"),
            OptionType::new("date", parse_date)
                .help_arg("DATE")
                .completion_type("none"),
        ];
        for scalar in scalars {
            let array = scalar.array_variant();
            registry.insert(scalar);
            registry.insert(array);
        }
        registry
    }

    /// A registry without any types.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    fn insert(&mut self, option_type: OptionType) {
        self.types
            .insert(option_type.name.clone(), Arc::new(option_type));
    }

    /// Add a custom option type.
    pub fn register(&mut self, option_type: OptionType) -> Result<(), ConfigError> {
        if self.types.contains_key(&option_type.name) {
            return Err(ConfigError::DuplicateType(option_type.name));
        }
        tracing::debug!(name = %option_type.name, "registered option type");
        self.insert(option_type);
        Ok(())
    }

    /// Look up an option type by name.
    pub fn get(&self, name: &str) -> Result<Arc<OptionType>, ConfigError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

fn parse_bool(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
    let value = match raw {
        None => true,
        Some(raw) => !matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off"
        ),
    };
    Ok(OptionValue::Bool(value))
}

fn parse_string(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
    Ok(OptionValue::String(raw.unwrap_or_default().to_string()))
}

fn parse_number(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
    let raw = raw.unwrap_or_default().trim();
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(OptionValue::Number(n)),
        _ => Err("a number".to_string()),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_integer(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
    let raw = raw.unwrap_or_default().trim();
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if !is_digits(digits) {
        return Err("an integer".to_string());
    }
    raw.parse::<i64>()
        .map(OptionValue::Integer)
        .map_err(|_| "an integer".to_string())
}

fn parse_positive_integer(
    _: &OptionSpec,
    _: &str,
    raw: Option<&str>,
) -> Result<OptionValue, String> {
    let raw = raw.unwrap_or_default().trim();
    match raw.parse::<i64>() {
        Ok(n) if is_digits(raw) && n > 0 => Ok(OptionValue::Integer(n)),
        _ => Err("a positive integer".to_string()),
    }
}

const DATE_REASON: &str = "an epoch-seconds or ISO 8601 date";

fn parse_date(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
    let raw = raw.unwrap_or_default().trim();

    if is_digits(raw) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(OptionValue::Date)
            .ok_or_else(|| DATE_REASON.to_string());
    }

    if raw.contains('T') {
        let naive = raw
            .strip_suffix('Z')
            .or_else(|| raw.strip_suffix('z'))
            .unwrap_or(raw);
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
                return Ok(OptionValue::Date(dt.and_utc()));
            }
        }
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(OptionValue::Date(dt.and_utc()));
        }
    }

    Err(DATE_REASON.to_string())
}
