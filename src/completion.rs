//! Bash completion generation for an option table.

use crate::config::{CompletionConfig, ConfigError};
use crate::table::{display_name, is_short, OptionTable};

const TEMPLATE: &str = r#"#!/bin/bash
#
# Bash completion for `{{name}}`.
#
# Source this file from ~/.bashrc, or install it into a bash-completion
# directory such as /etc/bash_completion.d/{{name}}.
#

function complete_none {
    return 0
}

function complete_file {
    local word="$1"
    COMPREPLY+=($(compgen -f -- "$word"))
}

function _{{fn}}_complete_type {
    local argtype="$1"
    local word="$2"
    if declare -F "complete_$argtype" >/dev/null; then
        "complete_$argtype" "$word"
    else
        complete_file "$word"
    fi
}

function _{{fn}}_completer {
{{spec}}
    local cur="${COMP_WORDS[COMP_CWORD]}"
    local prev=""
    if [[ $COMP_CWORD -gt 0 ]]; then
        prev="${COMP_WORDS[COMP_CWORD-1]}"
    fi
    COMPREPLY=()

    local argtype=""
    local optarg
    for optarg in $cmd_optargs; do
        if [[ "$prev" == "${optarg%%=*}" ]]; then
            argtype="${optarg#*=}"
            break
        fi
    done
    if [[ -n "$argtype" ]]; then
        _{{fn}}_complete_type "$argtype" "$cur"
        return 0
    fi

    if [[ "$cur" == --* ]]; then
        COMPREPLY=($(compgen -W "$cmd_longopts" -- "$cur"))
        return 0
    fi
    if [[ "$cur" == -* ]]; then
        COMPREPLY=($(compgen -W "$cmd_shortopts $cmd_longopts" -- "$cur"))
        return 0
    fi

    local nargs=0
    local skip=0
    local i word
    for ((i = 1; i < COMP_CWORD; i++)); do
        word="${COMP_WORDS[i]}"
        if [[ $skip -eq 1 ]]; then
            skip=0
            continue
        fi
        if [[ "$word" == -* ]]; then
            for optarg in $cmd_optargs; do
                if [[ "$word" == "${optarg%%=*}" ]]; then
                    skip=1
                    break
                fi
            done
            continue
        fi
        nargs=$((nargs + 1))
    done

    local argtypes=($cmd_argtypes)
    if [[ ${#argtypes[@]} -eq 0 ]]; then
        argtype="file"
    elif [[ $nargs -lt ${#argtypes[@]} ]]; then
        argtype="${argtypes[$nargs]}"
    else
        argtype="${argtypes[${#argtypes[@]}-1]}"
    fi
    _{{fn}}_complete_type "$argtype" "$cur"
}

complete -o default -F _{{fn}}_completer {{name}}
"#;

/// Escape a string for use inside double quotes in a Bash script.
///
/// Escapes: $, `, \, and "
fn escape_shell_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '$' => escaped.push_str("\\$"),
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Tool names are written unquoted into the script, so only plain command
/// name characters are allowed.
fn is_valid_command_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}

/// Convert a tool name to a valid Bash function name fragment.
fn to_function_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Bash `local` declarations describing the options, for embedding in a
/// completion function.
pub fn completion_spec(table: &OptionTable, config: &CompletionConfig) -> String {
    let mut shortopts = Vec::new();
    let mut longopts = Vec::new();
    let mut optargs = Vec::new();

    for option in table.options() {
        let offered = config.include_hidden || !option.spec.hidden;
        for name in &option.names {
            let flag = display_name(name);
            if offered {
                if is_short(name) {
                    shortopts.push(flag.clone());
                } else {
                    longopts.push(flag.clone());
                }
            }
            // Hidden options still get their argument completed when used
            if option.takes_arg() {
                optargs.push(format!("{}={}", flag, option.completion_type()));
            }
        }
    }

    shortopts.sort();
    longopts.sort();
    optargs.sort();

    let context = &config.context;
    let mut lines = vec![
        format!(
            "local cmd{}_shortopts=\"{}\"",
            context,
            escape_shell_value(&shortopts.join(" "))
        ),
        format!(
            "local cmd{}_longopts=\"{}\"",
            context,
            escape_shell_value(&longopts.join(" "))
        ),
        format!(
            "local cmd{}_optargs=\"{}\"",
            context,
            escape_shell_value(&optargs.join(" "))
        ),
    ];
    if !config.argtypes.is_empty() {
        lines.push(format!(
            "local cmd{}_argtypes=\"{}\"",
            context,
            escape_shell_value(&config.argtypes.join(" "))
        ));
    }

    let mut spec = lines.join("\n");
    spec.push('\n');
    spec
}

/// A complete Bash completion script for `config.name`.
///
/// The caller's `spec_extra` is appended verbatim at the end, typically
/// `complete_TYPE` functions for custom completion types.
pub fn bash_completion(
    table: &OptionTable,
    config: &CompletionConfig,
) -> Result<String, ConfigError> {
    if !is_valid_command_name(&config.name) {
        return Err(ConfigError::InvalidCompletionName(config.name.clone()));
    }

    let spec_config = CompletionConfig {
        context: String::new(),
        ..config.clone()
    };
    let spec: String = completion_spec(table, &spec_config)
        .lines()
        .map(|line| format!("    {}\n", line))
        .collect();

    let mut script = TEMPLATE
        .replace("{{spec}}", spec.trim_end_matches('\n'))
        .replace("{{fn}}", &to_function_name(&config.name))
        .replace("{{name}}", &config.name);

    if let Some(extra) = &config.spec_extra {
        script.push('\n');
        script.push_str(extra);
        if !extra.ends_with('\n') {
            script.push('\n');
        }
    }

    tracing::debug!(name = %config.name, bytes = script.len(), "generated bash completion");
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Entry, OptionSpec, ParseConfig};
    use crate::types::TypeRegistry;

    fn table(json: &str) -> OptionTable {
        let config = ParseConfig::from_json(json).unwrap();
        OptionTable::compile(&config.options, &TypeRegistry::new()).unwrap()
    }

    const OPTIONS: &str = r#"{"options": [
        {"names": ["help", "h"], "type": "bool"},
        {"names": ["file", "f"], "type": "string", "completionType": "file"},
        {"group": "Advanced"},
        {"name": "count", "type": "positiveInteger"},
        {"name": "name", "type": "string"},
        {"names": ["debug-token", "D"], "type": "string", "hidden": true}
    ]}"#;

    #[test]
    fn test_completion_spec() {
        let spec = completion_spec(&table(OPTIONS), &CompletionConfig::new("tool"));
        assert_eq!(
            spec,
            concat!(
                "local cmd_shortopts=\"-f -h\"\n",
                "local cmd_longopts=\"--count --file --help --name\"\n",
                "local cmd_optargs=\"--count=none --debug-token=string --file=file ",
                "--name=string -D=string -f=file\"\n",
            )
        );
    }

    #[test]
    fn test_completion_spec_include_hidden_and_argtypes() {
        let config = CompletionConfig {
            include_hidden: true,
            argtypes: vec!["file".to_string(), "none".to_string()],
            context: "_sub".to_string(),
            ..CompletionConfig::new("tool")
        };
        let spec = completion_spec(&table(OPTIONS), &config);
        assert!(spec.contains("local cmd_sub_shortopts=\"-D -f -h\"\n"));
        assert!(spec.contains(
            "local cmd_sub_longopts=\"--count --debug-token --file --help --name\"\n"
        ));
        assert!(spec.ends_with("local cmd_sub_argtypes=\"file none\"\n"));
    }

    #[test]
    fn test_completion_spec_empty_table() {
        let entries: Vec<Entry> = vec![];
        let t = OptionTable::compile(&entries, &TypeRegistry::new()).unwrap();
        let spec = completion_spec(&t, &CompletionConfig::new("tool"));
        assert_eq!(
            spec,
            "local cmd_shortopts=\"\"\nlocal cmd_longopts=\"\"\nlocal cmd_optargs=\"\"\n"
        );
    }

    #[test]
    fn test_bash_completion_script() {
        let config = CompletionConfig {
            spec_extra: Some(
                "function complete_fruit {\n    COMPREPLY=(apple pear)\n}".to_string(),
            ),
            ..CompletionConfig::new("my-tool")
        };
        let script = bash_completion(&table(OPTIONS), &config).unwrap();

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains(
            "function _my_tool_completer {\n    local cmd_shortopts=\"-f -h\"\n"
        ));
        assert!(script.contains("complete -o default -F _my_tool_completer my-tool\n"));
        assert!(script.ends_with("function complete_fruit {\n    COMPREPLY=(apple pear)\n}\n"));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn test_bash_completion_ignores_context() {
        let config = CompletionConfig {
            context: "_sub".to_string(),
            ..CompletionConfig::new("tool")
        };
        let script = bash_completion(&table(OPTIONS), &config).unwrap();
        assert!(script.contains("local cmd_optargs="));
        assert!(!script.contains("cmd_sub_"));
    }

    #[test]
    fn test_custom_type_completion_fallback() {
        let entries = vec![Entry::Option(OptionSpec::new(["when", "w"], "date"))];
        let t = OptionTable::compile(&entries, &TypeRegistry::new()).unwrap();
        let spec = completion_spec(&t, &CompletionConfig::new("tool"));
        assert!(spec.contains("local cmd_optargs=\"--when=none -w=none\""));
    }

    #[test]
    fn test_escape_shell_value() {
        assert_eq!(escape_shell_value("plain"), "plain");
        assert_eq!(
            escape_shell_value("$x `y` \"z\" \\"),
            "\\$x \\`y\\` \\\"z\\\" \\\\"
        );
        assert_eq!(escape_shell_value("a!b"), "a!b");
    }

    #[test]
    fn test_bash_completion_rejects_unsafe_names() {
        let t = table(OPTIONS);
        for name in ["my tool; rm -rf x", "tool\necho hi", "$(id)", "a|b", ""] {
            let result = bash_completion(&t, &CompletionConfig::new(name));
            assert!(
                matches!(&result, Err(ConfigError::InvalidCompletionName(n)) if n == name),
                "expected {:?} to be rejected",
                name
            );
        }

        for name in ["tool", "my-tool.v2", "g++", "x_y"] {
            assert!(bash_completion(&t, &CompletionConfig::new(name)).is_ok());
        }
    }

    #[test]
    fn test_completion_type_with_bang_is_literal() {
        let entries = vec![Entry::Option(
            OptionSpec::new(["pick"], "string").completion_type("a!b"),
        )];
        let t = OptionTable::compile(&entries, &TypeRegistry::new()).unwrap();
        let spec = completion_spec(&t, &CompletionConfig::new("tool"));
        assert!(spec.contains("local cmd_optargs=\"--pick=a!b\""), "got: {}", spec);
    }

    #[test]
    fn test_to_function_name() {
        assert_eq!(to_function_name("my-tool.v2"), "my_tool_v2");
    }
}
