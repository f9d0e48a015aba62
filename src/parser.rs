//! Argv parsing against a compiled option table.

use crate::completion;
use crate::config::{CompletionConfig, ConfigError, HelpConfig, ParseConfig};
use crate::help;
use crate::table::{is_short, CompiledOption, OptionTable};
use crate::types::{OptionValue, TypeRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during argument parsing.
///
/// Positions are indexes into the argv given to the parser, before any
/// slicing. Values coming from the environment or a default have no position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown option: \"{token}\"")]
    UnknownOption { token: String, position: usize },

    #[error("do not have enough args for \"{option}\" option")]
    MissingArgument { option: String, position: usize },

    #[error("argument given to \"{option}\" option that does not take one: \"{token}\"")]
    UnexpectedArgument {
        option: String,
        token: String,
        position: usize,
    },

    #[error("arg for \"{option}\" is not {reason}: \"{value}\"")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
        position: Option<usize>,
    },
}

impl ParseError {
    /// Index of the offending argv token, if the error came from argv.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::UnknownOption { position, .. }
            | ParseError::MissingArgument { position, .. }
            | ParseError::UnexpectedArgument { position, .. } => Some(*position),
            ParseError::InvalidValue { position, .. } => *position,
        }
    }

    /// The offending token or option string.
    pub fn token(&self) -> &str {
        match self {
            ParseError::UnknownOption { token, .. }
            | ParseError::UnexpectedArgument { token, .. } => token,
            ParseError::MissingArgument { option, .. }
            | ParseError::InvalidValue { option, .. } => option,
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Argv,
    Env,
    Default,
}

/// One value determination made during a parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedArg {
    /// Canonical option name
    pub name: String,
    pub value: OptionValue,
    pub from: Provenance,
}

/// Outcome of a successful parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Results {
    /// Resolved values keyed by canonical option name
    #[serde(flatten)]
    pub values: BTreeMap<String, OptionValue>,
    /// Every value determination, argv occurrences first
    #[serde(rename = "_order")]
    pub order: Vec<ParsedArg>,
    /// Positional arguments
    #[serde(rename = "_args")]
    pub args: Vec<String>,
}

impl Results {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(OptionValue::as_bool)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(OptionValue::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(OptionValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(OptionValue::as_f64)
    }

    pub fn get_date(&self, name: &str) -> Option<&DateTime<Utc>> {
        self.get(name).and_then(OptionValue::as_date)
    }

    pub fn get_array(&self, name: &str) -> Option<&[OptionValue]> {
        self.get(name).and_then(OptionValue::as_array)
    }

    /// Provenance of the final value for an option.
    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.order
            .iter()
            .rev()
            .find(|arg| arg.name == name)
            .map(|arg| arg.from)
    }
}

/// Option parser built from a [`ParseConfig`].
#[derive(Debug, Clone)]
pub struct Parser {
    table: OptionTable,
    interspersed: bool,
    allow_unknown: bool,
    slice: Option<usize>,
    env: HashMap<String, String>,
}

impl Parser {
    /// Build a parser using the built-in option types.
    pub fn new(config: &ParseConfig) -> Result<Self, ConfigError> {
        Self::with_registry(config, &TypeRegistry::new())
    }

    /// Build a parser resolving option types through `registry`.
    pub fn with_registry(
        config: &ParseConfig,
        registry: &TypeRegistry,
    ) -> Result<Self, ConfigError> {
        let table = OptionTable::compile(&config.options, registry)?;
        let env = match &config.env {
            Some(env) => env.clone(),
            None => process_env(),
        };
        Ok(Self {
            table,
            interspersed: config.interspersed,
            allow_unknown: config.allow_unknown,
            slice: config.slice,
            env,
        })
    }

    pub fn table(&self) -> &OptionTable {
        &self.table
    }

    /// Parse `argv`, skipping the configured `slice` (default 0) leading tokens.
    pub fn parse<S: AsRef<str>>(&self, argv: &[S]) -> Result<Results, ParseError> {
        self.parse_with_env(argv, &self.env)
    }

    /// Parse `argv` against an explicit environment snapshot.
    pub fn parse_with_env<S: AsRef<str>>(
        &self,
        argv: &[S],
        env: &HashMap<String, String>,
    ) -> Result<Results, ParseError> {
        self.run(argv, self.slice.unwrap_or(0), env)
    }

    /// Parse the process arguments, skipping the configured `slice` (default 1).
    pub fn parse_process_args(&self) -> Result<Results, ParseError> {
        let argv: Vec<String> = std::env::args_os()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        self.run(&argv, self.slice.unwrap_or(1), &self.env)
    }

    fn run<S: AsRef<str>>(
        &self,
        argv: &[S],
        slice: usize,
        env: &HashMap<String, String>,
    ) -> Result<Results, ParseError> {
        let mut state = ParseState::new(self);
        state.scan(argv, slice)?;
        state.apply_fallbacks(env)?;

        tracing::debug!(
            values = state.results.values.len(),
            args = state.results.args.len(),
            slice,
            "parsed arguments"
        );
        Ok(state.results)
    }

    /// Render help text for the options.
    pub fn help(&self, config: &HelpConfig) -> String {
        help::render(&self.table, config)
    }

    /// Render a complete Bash completion script.
    ///
    /// Fails when `config.name` is not a plain command name.
    pub fn bash_completion(&self, config: &CompletionConfig) -> Result<String, ConfigError> {
        completion::bash_completion(&self.table, config)
    }

    /// Render only the Bash `local cmd_*` spec lines.
    pub fn completion_spec(&self, config: &CompletionConfig) -> String {
        completion::completion_spec(&self.table, config)
    }
}

/// Snapshot of the process environment, skipping non-UTF-8 entries.
fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Per-call parse state.
struct ParseState<'a> {
    parser: &'a Parser,
    results: Results,
}

impl<'a> ParseState<'a> {
    fn new(parser: &'a Parser) -> Self {
        Self {
            parser,
            results: Results::default(),
        }
    }

    fn scan<S: AsRef<str>>(&mut self, argv: &[S], slice: usize) -> Result<(), ParseError> {
        let mut i = slice;

        while i < argv.len() {
            let arg = argv[i].as_ref();
            tracing::trace!(position = i, token = arg, "scanning token");

            if arg == "--" {
                // Stop parsing options, everything after is positional
                self.push_positionals(&argv[i + 1..]);
                break;
            }

            if let Some(body) = arg.strip_prefix("--") {
                i = self.parse_long_option(argv, i, body)?;
            } else if arg.starts_with('-') && arg.len() > 1 {
                i = self.parse_short_options(argv, i)?;
            } else if self.parser.interspersed {
                self.results.args.push(arg.to_string());
            } else {
                self.push_positionals(&argv[i..]);
                break;
            }

            i += 1;
        }

        Ok(())
    }

    fn push_positionals<S: AsRef<str>>(&mut self, tokens: &[S]) {
        self.results
            .args
            .extend(tokens.iter().map(|t| t.as_ref().to_string()));
    }

    /// Handle `--name` or `--name=value` at `position`; returns the index of
    /// the last token consumed.
    fn parse_long_option<S: AsRef<str>>(
        &mut self,
        argv: &[S],
        position: usize,
        body: &str,
    ) -> Result<usize, ParseError> {
        let arg = argv[position].as_ref();
        let (name, inline_value) = match body.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (body, None),
        };

        let parser = self.parser;
        let option = match parser.table.lookup(name).filter(|_| !is_short(name)) {
            Some(option) => option,
            None if parser.allow_unknown => {
                self.results.args.push(arg.to_string());
                return Ok(position);
            }
            None => {
                return Err(ParseError::UnknownOption {
                    token: format!("--{}", name),
                    position,
                })
            }
        };
        let optstr = format!("--{}", name);

        if !option.takes_arg() {
            if inline_value.is_some() {
                return Err(ParseError::UnexpectedArgument {
                    option: optstr,
                    token: arg.to_string(),
                    position,
                });
            }
            self.record(option, &optstr, None, Provenance::Argv, Some(position))?;
            return Ok(position);
        }

        match inline_value {
            Some(value) => {
                self.record(option, &optstr, Some(value), Provenance::Argv, Some(position))?;
                Ok(position)
            }
            None => {
                let next = position + 1;
                let value = argv
                    .get(next)
                    .ok_or_else(|| ParseError::MissingArgument {
                        option: optstr.clone(),
                        position,
                    })?
                    .as_ref();
                self.record(option, &optstr, Some(value), Provenance::Argv, Some(next))?;
                Ok(next)
            }
        }
    }

    /// Handle a group of short options like `-vx` or `-ofile` at `position`;
    /// returns the index of the last token consumed.
    fn parse_short_options<S: AsRef<str>>(
        &mut self,
        argv: &[S],
        position: usize,
    ) -> Result<usize, ParseError> {
        let arg = argv[position].as_ref();
        let chars: Vec<char> = arg[1..].chars().collect(); // Strip "-"

        let parser = self.parser;
        if parser.allow_unknown && self.has_unknown_short(&chars) {
            self.results.args.push(arg.to_string());
            return Ok(position);
        }

        for (i, c) in chars.iter().enumerate() {
            let optstr = format!("-{}", c);
            let option = parser
                .table
                .lookup(&c.to_string())
                .ok_or_else(|| ParseError::UnknownOption {
                    token: optstr.clone(),
                    position,
                })?;

            if !option.takes_arg() {
                self.record(option, &optstr, None, Provenance::Argv, Some(position))?;
                continue;
            }

            // The value is the rest of this token (-ofile.txt) or the next token (-o file.txt)
            let remaining: String = chars[i + 1..].iter().collect();
            if !remaining.is_empty() {
                self.record(
                    option,
                    &optstr,
                    Some(remaining.as_str()),
                    Provenance::Argv,
                    Some(position),
                )?;
                return Ok(position);
            }

            let next = position + 1;
            let value = argv
                .get(next)
                .ok_or_else(|| ParseError::MissingArgument {
                    option: optstr.clone(),
                    position,
                })?
                .as_ref();
            self.record(option, &optstr, Some(value), Provenance::Argv, Some(next))?;
            return Ok(next);
        }

        Ok(position)
    }

    /// Whether a short group names an unknown option before its first
    /// value-taking option.
    fn has_unknown_short(&self, chars: &[char]) -> bool {
        for c in chars {
            match self.parser.table.lookup(&c.to_string()) {
                None => return true,
                Some(option) if option.takes_arg() => return false,
                Some(_) => {}
            }
        }
        false
    }

    /// Resolve options not given in argv from the environment or defaults.
    fn apply_fallbacks(&mut self, env: &HashMap<String, String>) -> Result<(), ParseError> {
        let parser = self.parser;
        for option in parser.table.options() {
            if self.results.values.contains_key(option.key()) {
                continue;
            }

            let from_env = option
                .spec
                .env
                .iter()
                .find_map(|var| env.get(var).map(|value| (var, value)));

            if let Some((var, value)) = from_env {
                tracing::trace!(option = option.key(), var = %var, "using environment fallback");
                self.record(option, var, Some(value.as_str()), Provenance::Env, None)?;
            } else if let Some(default) = &option.spec.default {
                tracing::trace!(option = option.key(), "using default");
                self.record(
                    option,
                    &option.display_key(),
                    Some(default.as_str()),
                    Provenance::Default,
                    None,
                )?;
            } else if let Some(default) = &option.option_type.default {
                self.results
                    .values
                    .insert(option.key().to_string(), default.clone());
                self.results.order.push(ParsedArg {
                    name: option.key().to_string(),
                    value: default.clone(),
                    from: Provenance::Default,
                });
            }
        }
        Ok(())
    }

    /// Convert a raw value through the option type and store it.
    fn record(
        &mut self,
        option: &CompiledOption,
        optstr: &str,
        raw: Option<&str>,
        from: Provenance,
        position: Option<usize>,
    ) -> Result<(), ParseError> {
        let option_type = &option.option_type;
        let value = (option_type.parse_arg)(&option.spec, optstr, raw).map_err(|reason| {
            ParseError::InvalidValue {
                option: optstr.to_string(),
                value: raw.unwrap_or_default().to_string(),
                reason,
                position,
            }
        })?;

        self.results.order.push(ParsedArg {
            name: option.key().to_string(),
            value: value.clone(),
            from,
        });

        let key = option.key().to_string();
        if option_type.array {
            let slot = self
                .results
                .values
                .entry(key)
                .or_insert_with(|| OptionValue::Array(Vec::new()));
            if let OptionValue::Array(items) = slot {
                match value {
                    OptionValue::Array(nested) if option_type.array_flatten => items.extend(nested),
                    value => items.push(value),
                }
            }
        } else {
            self.results.values.insert(key, value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Entry, OptionSpec};
    use crate::types::OptionType;

    fn parser(json: &str) -> Parser {
        let mut config = ParseConfig::from_json(json).unwrap();
        config.env.get_or_insert_with(HashMap::new);
        Parser::new(&config).unwrap()
    }

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const BASIC: &str = r#"{"options": [
        {"names": ["verbose", "v"], "type": "bool"},
        {"names": ["output", "o"], "type": "string"},
        {"names": ["count", "c"], "type": "integer"}
    ]}"#;

    #[test]
    fn test_parse_flag_short() {
        let result = parser(BASIC).parse(&args(&["-v"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
        assert_eq!(result.provenance("verbose"), Some(Provenance::Argv));
    }

    #[test]
    fn test_parse_flag_long() {
        let result = parser(BASIC).parse(&args(&["--verbose"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
    }

    #[test]
    fn test_flag_absent_has_no_key() {
        let result = parser(BASIC).parse(&args(&[])).unwrap();
        assert!(!result.contains("verbose"));
        assert!(result.order.is_empty());
        assert!(result.args.is_empty());
    }

    #[test]
    fn test_repeated_flag_stays_true() {
        let result = parser(BASIC).parse(&args(&["-v", "-v", "--verbose"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
        assert_eq!(result.order.len(), 3);
    }

    #[test]
    fn test_parse_combined_short_flags() {
        let p = parser(
            r#"{"options": [
                {"name": "a", "type": "bool"},
                {"name": "b", "type": "bool"},
                {"name": "c", "type": "bool"}
            ]}"#,
        );
        let result = p.parse(&args(&["-abc"])).unwrap();
        assert_eq!(result.get_bool("a"), Some(true));
        assert_eq!(result.get_bool("b"), Some(true));
        assert_eq!(result.get_bool("c"), Some(true));
    }

    #[test]
    fn test_parse_option_long_space() {
        let result = parser(BASIC).parse(&args(&["--output", "file.txt"])).unwrap();
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_parse_option_long_equals() {
        let result = parser(BASIC).parse(&args(&["--output=file.txt"])).unwrap();
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_option_equals_empty() {
        let result = parser(BASIC).parse(&args(&["--output="])).unwrap();
        assert_eq!(result.get_str("output"), Some(""));
    }

    #[test]
    fn test_option_value_with_equals() {
        let result = parser(BASIC).parse(&args(&["--output=a=b"])).unwrap();
        assert_eq!(result.get_str("output"), Some("a=b"));
    }

    #[test]
    fn test_parse_option_short_space() {
        let result = parser(BASIC).parse(&args(&["-o", "file.txt"])).unwrap();
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_parse_option_short_attached() {
        let result = parser(BASIC).parse(&args(&["-ofile.txt"])).unwrap();
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_short_flag_then_option() {
        let result = parser(BASIC).parse(&args(&["-vo", "file.txt"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_short_option_with_attached_value() {
        let result = parser(BASIC).parse(&args(&["-vofile.txt"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
        assert_eq!(result.get_str("output"), Some("file.txt"));
    }

    #[test]
    fn test_option_argument_may_look_like_option() {
        let result = parser(BASIC).parse(&args(&["-c", "-5", "-o", "--verbose"])).unwrap();
        assert_eq!(result.get_i64("count"), Some(-5));
        assert_eq!(result.get_str("output"), Some("--verbose"));
        assert!(!result.contains("verbose"));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let result = parser(BASIC).parse(&args(&["-c", "1", "--count=2"])).unwrap();
        assert_eq!(result.get_i64("count"), Some(2));
        let counts: Vec<&OptionValue> = result
            .order
            .iter()
            .filter(|a| a.name == "count")
            .map(|a| &a.value)
            .collect();
        assert_eq!(counts, vec![&OptionValue::Integer(1), &OptionValue::Integer(2)]);
    }

    #[test]
    fn test_interspersed_positionals() {
        let result = parser(BASIC)
            .parse(&args(&["in.txt", "-v", "other", "-o", "out.txt", "last"]))
            .unwrap();
        assert_eq!(result.args, vec!["in.txt", "other", "last"]);
        assert_eq!(result.get_bool("verbose"), Some(true));
        assert_eq!(result.get_str("output"), Some("out.txt"));
    }

    #[test]
    fn test_not_interspersed_stops_at_first_positional() {
        let p = parser(
            r#"{"interspersed": false, "options": [{"names": ["verbose", "v"], "type": "bool"}]}"#,
        );
        let result = p.parse(&args(&["-v", "cmd", "-v", "--x"])).unwrap();
        assert_eq!(result.args, vec!["cmd", "-v", "--x"]);
        assert_eq!(result.order.len(), 1);
    }

    #[test]
    fn test_parse_double_dash_separator() {
        let result = parser(BASIC).parse(&args(&["-v", "--", "-o", "--", "x"])).unwrap();
        assert_eq!(result.args, vec!["-o", "--", "x"]);
        assert!(!result.contains("output"));
    }

    #[test]
    fn test_single_dash_is_positional() {
        let result = parser(BASIC).parse(&args(&["-"])).unwrap();
        assert_eq!(result.args, vec!["-"]);
    }

    #[test]
    fn test_error_unknown_long_option() {
        let result = parser(BASIC).parse(&args(&["-v", "--bogus"]));
        assert_eq!(
            result,
            Err(ParseError::UnknownOption {
                token: "--bogus".to_string(),
                position: 1
            })
        );
        assert_eq!(result.unwrap_err().to_string(), "unknown option: \"--bogus\"");
    }

    #[test]
    fn test_error_unknown_short_in_group() {
        let result = parser(BASIC).parse(&args(&["-vz"]));
        assert!(matches!(
            result,
            Err(ParseError::UnknownOption { token, position: 0 }) if token == "-z"
        ));
    }

    #[test]
    fn test_long_form_does_not_match_short_name() {
        let result = parser(BASIC).parse(&args(&["--v"]));
        assert!(matches!(result, Err(ParseError::UnknownOption { .. })));
    }

    #[test]
    fn test_allow_unknown_keeps_tokens_positional() {
        let p = parser(
            r#"{"allowUnknown": true, "options": [
                {"names": ["verbose", "v"], "type": "bool"},
                {"names": ["output", "o"], "type": "string"}
            ]}"#,
        );
        let result = p
            .parse(&args(&["--bogus=1", "-vz", "-vofile", "-x", "pos"]))
            .unwrap();
        assert_eq!(result.args, vec!["--bogus=1", "-vz", "-x", "pos"]);
        assert_eq!(result.get_str("output"), Some("file"));
        // Only the fully known group applied its flag.
        assert_eq!(result.order.iter().filter(|a| a.name == "verbose").count(), 1);
    }

    #[test]
    fn test_error_missing_argument() {
        let result = parser(BASIC).parse(&args(&["-v", "--output"]));
        assert_eq!(
            result,
            Err(ParseError::MissingArgument {
                option: "--output".to_string(),
                position: 1
            })
        );

        let result = parser(BASIC).parse(&args(&["-vo"]));
        assert!(matches!(
            result,
            Err(ParseError::MissingArgument { option, .. }) if option == "-o"
        ));
    }

    #[test]
    fn test_error_unexpected_argument() {
        let result = parser(BASIC).parse(&args(&["--verbose=yes"]));
        assert!(matches!(
            result,
            Err(ParseError::UnexpectedArgument { option, position: 0, .. }) if option == "--verbose"
        ));
    }

    #[test]
    fn test_error_invalid_value() {
        let result = parser(BASIC).parse(&args(&["-o", "x", "--count", "abc"]));
        let err = result.unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidValue {
                option: "--count".to_string(),
                value: "abc".to_string(),
                reason: "an integer".to_string(),
                position: Some(3),
            }
        );
        assert_eq!(err.to_string(), "arg for \"--count\" is not an integer: \"abc\"");
        assert_eq!(err.position(), Some(3));
        assert_eq!(err.token(), "--count");
    }

    #[test]
    fn test_slice_skips_leading_tokens() {
        let mut config = ParseConfig::from_json(BASIC).unwrap().slice(2);
        config.env = Some(HashMap::new());
        let p = Parser::new(&config).unwrap();
        let result = p.parse(&args(&["node", "tool", "-v", "--bogus"]));
        assert!(matches!(result, Err(ParseError::UnknownOption { position: 3, .. })));
        let result = p.parse(&args(&["node", "tool", "-v"])).unwrap();
        assert_eq!(result.get_bool("verbose"), Some(true));
    }

    #[test]
    fn test_process_args_skip_program_name() {
        let p = parser(r#"{"allowUnknown": true, "options": []}"#);
        let result = p.parse_process_args().unwrap();
        let expected: Vec<String> = std::env::args().skip(1).filter(|a| a != "--").collect();
        assert_eq!(result.args, expected);
    }

    #[test]
    fn test_array_accumulates_in_order() {
        let p = parser(r#"{"options": [{"names": ["include", "I"], "type": "arrayOfString"}]}"#);
        let result = p
            .parse(&args(&["-I", "a", "--include=b", "x", "-Ic"]))
            .unwrap();
        assert_eq!(
            result.get_array("include"),
            Some(
                &[
                    OptionValue::String("a".into()),
                    OptionValue::String("b".into()),
                    OptionValue::String("c".into())
                ][..]
            )
        );
        assert_eq!(result.order.len(), 3);
        assert_eq!(result.args, vec!["x"]);
    }

    #[test]
    fn test_array_of_bool_counts_occurrences() {
        let p = parser(r#"{"options": [{"names": ["verbose", "v"], "type": "arrayOfBool"}]}"#);
        let result = p.parse(&args(&["-vvv"])).unwrap();
        assert_eq!(result.get_array("verbose").map(|a| a.len()), Some(3));
    }

    fn parse_comma_list(_: &OptionSpec, _: &str, raw: Option<&str>) -> Result<OptionValue, String> {
        Ok(OptionValue::Array(
            raw.unwrap_or_default()
                .split(',')
                .map(|s| OptionValue::String(s.trim().to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_array_flatten() {
        let mut registry = TypeRegistry::new();
        registry
            .register(OptionType::new("commaList", parse_comma_list).array_flatten())
            .unwrap();
        registry
            .register(OptionType::new("nestedList", parse_comma_list).array())
            .unwrap();

        let config = ParseConfig::new([
            OptionSpec::new(["flat"], "commaList"),
            OptionSpec::new(["nested"], "nestedList"),
        ])
        .env(HashMap::new());
        let p = Parser::with_registry(&config, &registry).unwrap();
        let result = p
            .parse(&args(&["--flat", "a,b", "--flat=c", "--nested", "a,b", "--nested=c"]))
            .unwrap();

        assert_eq!(result.get_array("flat").map(|a| a.len()), Some(3));
        let nested = result.get_array("nested").unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_env_fallback_order() {
        let p = parser(
            r#"{"options": [{"name": "level", "type": "string", "env": ["FOO", "BAR"]}]}"#,
        );

        let result = p
            .parse_with_env(&args(&[]), &env(&[("BAR", "from-bar")]))
            .unwrap();
        assert_eq!(result.get_str("level"), Some("from-bar"));
        assert_eq!(result.provenance("level"), Some(Provenance::Env));

        let result = p
            .parse_with_env(&args(&[]), &env(&[("BAR", "b"), ("FOO", "f")]))
            .unwrap();
        assert_eq!(result.get_str("level"), Some("f"));
    }

    #[test]
    fn test_argv_overrides_env() {
        let p = parser(r#"{"options": [{"name": "level", "type": "string", "env": "LEVEL"}]}"#);
        let result = p
            .parse_with_env(&args(&["--level", "cli"]), &env(&[("LEVEL", "env")]))
            .unwrap();
        assert_eq!(result.get_str("level"), Some("cli"));
        assert_eq!(result.order.len(), 1);
        assert_eq!(result.provenance("level"), Some(Provenance::Argv));
    }

    #[test]
    fn test_env_bool() {
        let p = parser(r#"{"options": [{"name": "debug", "type": "bool", "env": "DEBUG"}]}"#);
        let on = p.parse_with_env(&args(&[]), &env(&[("DEBUG", "1")])).unwrap();
        assert_eq!(on.get_bool("debug"), Some(true));
        let off = p.parse_with_env(&args(&[]), &env(&[("DEBUG", "0")])).unwrap();
        assert_eq!(off.get_bool("debug"), Some(false));
        assert_eq!(off.provenance("debug"), Some(Provenance::Env));
    }

    #[test]
    fn test_env_invalid_value_has_no_position() {
        let p = parser(r#"{"options": [{"name": "count", "type": "integer", "env": "COUNT"}]}"#);
        let result = p.parse_with_env(&args(&[]), &env(&[("COUNT", "many")]));
        assert_eq!(
            result,
            Err(ParseError::InvalidValue {
                option: "COUNT".to_string(),
                value: "many".to_string(),
                reason: "an integer".to_string(),
                position: None,
            })
        );
    }

    #[test]
    fn test_env_array_value() {
        let p = parser(r#"{"options": [{"name": "tag", "type": "arrayOfString", "env": "TAG"}]}"#);
        let result = p.parse_with_env(&args(&[]), &env(&[("TAG", "x")])).unwrap();
        assert_eq!(
            result.get("tag"),
            Some(&OptionValue::Array(vec![OptionValue::String("x".into())]))
        );
    }

    #[test]
    fn test_parse_default_value() {
        let p = parser(
            r#"{"options": [{"name": "count", "type": "positiveInteger", "default": "1"}]}"#,
        );
        let result = p.parse(&args(&[])).unwrap();
        assert_eq!(result.get_i64("count"), Some(1));
        assert_eq!(result.provenance("count"), Some(Provenance::Default));
    }

    #[test]
    fn test_parse_default_overridden() {
        let p = parser(
            r#"{"options": [{"name": "out", "type": "string", "default": "default.txt"}]}"#,
        );
        let result = p.parse(&args(&["--out", "custom.txt"])).unwrap();
        assert_eq!(result.get_str("out"), Some("custom.txt"));
        assert_eq!(result.order.len(), 1);
    }

    #[test]
    fn test_env_beats_default() {
        let p = parser(
            r#"{"options": [{"name": "out", "type": "string", "env": "OUT", "default": "d"}]}"#,
        );
        let result = p.parse_with_env(&args(&[]), &env(&[("OUT", "e")])).unwrap();
        assert_eq!(result.get_str("out"), Some("e"));
    }

    #[test]
    fn test_invalid_default_fails_parse() {
        let p = parser(
            r#"{"options": [{"name": "count", "type": "positiveInteger", "default": "0"}]}"#,
        );
        let result = p.parse(&args(&[]));
        assert!(matches!(
            result,
            Err(ParseError::InvalidValue { option, position: None, .. }) if option == "--count"
        ));
    }

    #[test]
    fn test_type_default() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                OptionType::new("level", |_, _, raw| {
                    Ok(OptionValue::Integer(raw.unwrap_or_default().len() as i64))
                })
                .default_value(OptionValue::Integer(3)),
            )
            .unwrap();
        let config = ParseConfig::new([Entry::Option(OptionSpec::new(["level"], "level"))])
            .env(HashMap::new());
        let p = Parser::with_registry(&config, &registry).unwrap();
        let result = p.parse(&args(&[])).unwrap();
        assert_eq!(result.get_i64("level"), Some(3));
        assert_eq!(result.provenance("level"), Some(Provenance::Default));
    }

    #[test]
    fn test_fallbacks_follow_argv_in_order() {
        let p = parser(
            r#"{"options": [
                {"name": "a", "type": "string", "default": "x"},
                {"name": "b", "type": "string", "env": "B"},
                {"name": "c", "type": "bool"}
            ]}"#,
        );
        let result = p
            .parse_with_env(&args(&["-c"]), &env(&[("B", "y")]))
            .unwrap();
        let order: Vec<(&str, Provenance)> = result
            .order
            .iter()
            .map(|a| (a.name.as_str(), a.from))
            .collect();
        assert_eq!(
            order,
            vec![
                ("c", Provenance::Argv),
                ("a", Provenance::Default),
                ("b", Provenance::Env)
            ]
        );
    }

    #[test]
    fn test_results_serialize() {
        let p = parser(BASIC);
        let result = p.parse(&args(&["-v", "-c", "2", "file"])).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["verbose"], serde_json::json!(true));
        assert_eq!(json["count"], serde_json::json!(2));
        assert_eq!(json["_args"], serde_json::json!(["file"]));
        assert_eq!(
            json["_order"][0],
            serde_json::json!({"name": "verbose", "value": true, "from": "argv"})
        );
    }

    #[test]
    fn test_config_env_snapshot_is_used() {
        let config = ParseConfig::from_json(
            r#"{"env": {"NAME": "snap"},
                "options": [{"name": "name", "type": "string", "env": "NAME"}]}"#,
        )
        .unwrap();
        let p = Parser::new(&config).unwrap();
        let result = p.parse(&args(&[])).unwrap();
        assert_eq!(result.get_str("name"), Some("snap"));
    }
}
