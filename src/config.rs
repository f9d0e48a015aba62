//! JSON configuration types for option specs, parsing, help and completion.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading configuration or compiling an option table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown option type: \"{0}\"")]
    UnknownType(String),

    #[error("duplicate option type: \"{0}\"")]
    DuplicateType(String),

    #[error("duplicate option name: \"{0}\"")]
    DuplicateOption(String),

    #[error("option spec (type \"{0}\") has neither 'name' nor 'names'")]
    MissingName(String),

    #[error("option \"{0}\" sets both 'name' and 'names'")]
    NameAndNames(String),

    #[error("invalid option name \"{0}\": use ASCII alphanumerics, '_' or '-', not a leading '-'")]
    InvalidOptionName(String),

    #[error("option \"{0}\" has an empty environment variable name")]
    EmptyEnvName(String),

    #[error("option name \"{0}\" is reserved for parse results")]
    ReservedOptionName(String),

    #[error("invalid completion name \"{0}\": use ASCII alphanumerics, '.', '_', '+' or '-'")]
    InvalidCompletionName(String),
}

fn default_true() -> bool {
    true
}

/// Deserialize `env` from either a single string or a list of strings.
fn deserialize_env<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};

    struct EnvNamesVisitor;

    impl<'de> Visitor<'de> for EnvNamesVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an environment variable name or a list of names")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut names = Vec::new();
            while let Some(name) = seq.next_element::<String>()? {
                names.push(name);
            }
            Ok(names)
        }
    }

    deserializer.deserialize_any(EnvNamesVisitor)
}

/// Declarative description of one recognized option.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    /// The option name, when it has no aliases
    #[serde(default)]
    pub name: Option<String>,
    /// The option name and aliases; the first one is the result key
    #[serde(default)]
    pub names: Vec<String>,
    /// Option type name, resolved through the type registry
    #[serde(rename = "type")]
    pub type_name: String,
    /// Bash completion hint for the option argument
    #[serde(default)]
    pub completion_type: Option<String>,
    /// Environment variable fallbacks, first set one wins
    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: Vec<String>,
    #[serde(default)]
    pub help: Option<String>,
    /// Placeholder for the option argument in help output
    #[serde(default)]
    pub help_arg: Option<String>,
    /// Set to false to keep this option's help text unwrapped
    #[serde(default = "default_true")]
    pub help_wrap: bool,
    /// Raw default, parsed through the option type when used
    #[serde(default)]
    pub default: Option<String>,
    /// Omit from help and completion lists
    #[serde(default)]
    pub hidden: bool,
}

impl OptionSpec {
    /// Create a spec from its names (first is canonical) and type name.
    pub fn new<I, S>(names: I, type_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            names: names.into_iter().map(Into::into).collect(),
            type_name: type_name.into(),
            completion_type: None,
            env: Vec::new(),
            help: None,
            help_arg: None,
            help_wrap: true,
            default: None,
            hidden: false,
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn help_arg(mut self, help_arg: impl Into<String>) -> Self {
        self.help_arg = Some(help_arg.into());
        self
    }

    pub fn no_help_wrap(mut self) -> Self {
        self.help_wrap = false;
        self
    }

    /// Add an environment variable fallback.
    pub fn env(mut self, var: impl Into<String>) -> Self {
        self.env.push(var.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn completion_type(mut self, completion_type: impl Into<String>) -> Self {
        self.completion_type = Some(completion_type.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// All names of this option, `name` or `names`, whichever is set.
    pub fn all_names(&self) -> Vec<&str> {
        match &self.name {
            Some(name) => vec![name.as_str()],
            None => self.names.iter().map(String::as_str).collect(),
        }
    }
}

/// A heading placed between options in help output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMarker {
    pub group: String,
}

/// One entry in an option list: an option spec or a group heading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Group(GroupMarker),
    Option(OptionSpec),
}

impl From<OptionSpec> for Entry {
    fn from(spec: OptionSpec) -> Self {
        Entry::Option(spec)
    }
}

impl From<GroupMarker> for Entry {
    fn from(group: GroupMarker) -> Self {
        Entry::Group(group)
    }
}

/// Group heading entry.
pub fn group(label: impl Into<String>) -> Entry {
    Entry::Group(GroupMarker {
        group: label.into(),
    })
}

/// Configuration for building a parser.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseConfig {
    /// Options and group headings, in declaration order
    #[serde(default)]
    pub options: Vec<Entry>,
    /// Keep scanning for options after the first positional argument
    #[serde(default = "default_true")]
    pub interspersed: bool,
    /// Keep unknown option tokens as positional arguments instead of failing
    #[serde(default)]
    pub allow_unknown: bool,
    /// Number of leading argv tokens to skip
    #[serde(default)]
    pub slice: Option<usize>,
    /// Environment snapshot; the process environment is used when absent
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            interspersed: true,
            allow_unknown: false,
            slice: None,
            env: None,
        }
    }
}

impl ParseConfig {
    /// Parse a JSON string into a ParseConfig.
    pub fn from_json(json: &str) -> Result<ParseConfig, ConfigError> {
        let config: ParseConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn new<I, E>(options: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Entry>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn interspersed(mut self, interspersed: bool) -> Self {
        self.interspersed = interspersed;
        self
    }

    pub fn allow_unknown(mut self, allow_unknown: bool) -> Self {
        self.allow_unknown = allow_unknown;
        self
    }

    pub fn slice(mut self, slice: usize) -> Self {
        self.slice = Some(slice);
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }
}

/// Indentation given as a number of spaces or a literal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indent {
    Spaces(usize),
    Literal(String),
}

impl Indent {
    pub fn render(&self) -> String {
        match self {
            Indent::Spaces(n) => " ".repeat(*n),
            Indent::Literal(s) => s.clone(),
        }
    }

    /// Display width in characters.
    pub fn width(&self) -> usize {
        match self {
            Indent::Spaces(n) => *n,
            Indent::Literal(s) => s.chars().count(),
        }
    }
}

impl Default for Indent {
    fn default() -> Self {
        Indent::Spaces(4)
    }
}

impl<'de> Deserialize<'de> for Indent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct IndentVisitor;

        impl<'de> Visitor<'de> for IndentVisitor {
            type Value = Indent;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a number of spaces or an indent string")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(Indent::Spaces)
                    .map_err(|_| de::Error::custom("indent is too large"))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(Indent::Spaces)
                    .map_err(|_| de::Error::custom("indent must not be negative"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Indent::Literal(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Indent::Literal(value))
            }
        }

        deserializer.deserialize_any(IndentVisitor)
    }
}

/// How option names are ordered on a help line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameSort {
    /// Shortest rendered name first, so `-h, --help` rather than `--help, -h`
    #[default]
    Length,
    /// Keep declaration order
    None,
}

impl FromStr for NameSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "length" => Ok(NameSort::Length),
            "none" => Ok(NameSort::None),
            other => Err(format!("invalid name sort '{other}': expected 'length' or 'none'")),
        }
    }
}

/// Layout settings for help output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelpConfig {
    pub indent: Indent,
    /// Indent for group headings (default: half the option indent)
    pub heading_indent: Option<Indent>,
    pub name_sort: NameSort,
    /// Wrap help text at this column
    pub max_col: usize,
    /// Fixed help column; computed from the option lines when absent
    pub help_col: Option<usize>,
    pub min_help_col: usize,
    pub max_help_col: usize,
    pub help_wrap: bool,
    /// Append "Environment: ..." to options with env fallbacks
    pub include_env: bool,
    /// Append "Default: ..." to options with a default value
    pub include_default: bool,
}

impl Default for HelpConfig {
    fn default() -> Self {
        Self {
            indent: Indent::default(),
            heading_indent: None,
            name_sort: NameSort::default(),
            max_col: 80,
            help_col: None,
            min_help_col: 20,
            max_help_col: 40,
            help_wrap: true,
            include_env: false,
            include_default: false,
        }
    }
}

impl HelpConfig {
    pub fn effective_heading_indent(&self) -> String {
        match &self.heading_indent {
            Some(indent) => indent.render(),
            None => " ".repeat(self.indent.width() / 2),
        }
    }
}

/// Settings for Bash completion output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionConfig {
    /// Tool name the completion is registered for
    pub name: String,
    /// Extra Bash appended to the script, typically `complete_TYPE` functions
    pub spec_extra: Option<String>,
    /// Completion types for positional arguments, the last one repeats
    pub argtypes: Vec<String>,
    /// Offer hidden options as completions too
    pub include_hidden: bool,
    /// Suffix for the `cmd*` variables, used for subcommand scoping
    pub context: String,
}

impl CompletionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
