//! Compilation of option entries into a validated, indexed option table.

use crate::config::{ConfigError, Entry, OptionSpec};
use crate::types::{OptionType, TypeRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// An option spec bound to its resolved type.
#[derive(Debug, Clone)]
pub struct CompiledOption {
    pub spec: OptionSpec,
    /// All names, canonical first
    pub names: Vec<String>,
    pub option_type: Arc<OptionType>,
}

impl CompiledOption {
    /// Canonical name, used as the result key.
    pub fn key(&self) -> &str {
        &self.names[0]
    }

    pub fn takes_arg(&self) -> bool {
        self.option_type.takes_arg
    }

    /// Help placeholder for the option argument.
    pub fn help_arg(&self) -> &str {
        self.spec
            .help_arg
            .as_deref()
            .or(self.option_type.help_arg.as_deref())
            .unwrap_or("ARG")
    }

    /// Bash completion hint for the option argument.
    pub fn completion_type(&self) -> &str {
        self.spec
            .completion_type
            .as_deref()
            .or(self.option_type.completion_type.as_deref())
            .unwrap_or(&self.option_type.name)
    }

    /// The option as written on the command line for its canonical name.
    pub fn display_key(&self) -> String {
        display_name(self.key())
    }
}

/// Render a bare option name with its dash prefix.
pub fn display_name(name: &str) -> String {
    if is_short(name) {
        format!("-{}", name)
    } else {
        format!("--{}", name)
    }
}

/// Single-character names are short options.
pub fn is_short(name: &str) -> bool {
    name.chars().count() == 1
}

/// One compiled entry, in declaration order.
#[derive(Debug, Clone)]
pub enum TableEntry {
    /// Index into [`OptionTable::options`]
    Option(usize),
    Group(String),
}

/// Validated option table with a name index.
#[derive(Debug, Clone)]
pub struct OptionTable {
    entries: Vec<TableEntry>,
    options: Vec<CompiledOption>,
    index: HashMap<String, usize>,
}

impl OptionTable {
    /// Validate entries against the registry and build the table.
    pub fn compile(entries: &[Entry], registry: &TypeRegistry) -> Result<Self, ConfigError> {
        let mut table = OptionTable {
            entries: Vec::with_capacity(entries.len()),
            options: Vec::new(),
            index: HashMap::new(),
        };

        for entry in entries {
            match entry {
                Entry::Group(group) => {
                    table.entries.push(TableEntry::Group(group.group.clone()));
                }
                Entry::Option(spec) => {
                    let compiled = compile_option(spec, registry)?;
                    let position = table.options.len();
                    for name in &compiled.names {
                        if table.index.contains_key(name) {
                            return Err(ConfigError::DuplicateOption(name.clone()));
                        }
                        table.index.insert(name.clone(), position);
                    }
                    table.options.push(compiled);
                    table.entries.push(TableEntry::Option(position));
                }
            }
        }

        tracing::debug!(
            options = table.options.len(),
            names = table.index.len(),
            "compiled option table"
        );
        Ok(table)
    }

    /// Look up an option by bare name (no dashes).
    pub fn lookup(&self, name: &str) -> Option<&CompiledOption> {
        self.index.get(name).map(|&i| &self.options[i])
    }

    /// Options in declaration order.
    pub fn options(&self) -> &[CompiledOption] {
        &self.options
    }

    /// Options and group headings in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = TableEntryRef<'_>> {
        self.entries.iter().map(move |entry| match entry {
            TableEntry::Option(i) => TableEntryRef::Option(&self.options[*i]),
            TableEntry::Group(label) => TableEntryRef::Group(label),
        })
    }
}

/// Borrowed view of a table entry.
#[derive(Debug, Clone, Copy)]
pub enum TableEntryRef<'a> {
    Option(&'a CompiledOption),
    Group(&'a str),
}

/// Names that would collide with the `_order` and `_args` keys of serialized results.
const RESERVED_NAMES: [&str; 2] = ["_order", "_args"];

fn compile_option(
    spec: &OptionSpec,
    registry: &TypeRegistry,
) -> Result<CompiledOption, ConfigError> {
    let names: Vec<String> = match (&spec.name, spec.names.is_empty()) {
        (Some(name), false) => return Err(ConfigError::NameAndNames(name.clone())),
        (None, true) => return Err(ConfigError::MissingName(spec.type_name.clone())),
        (Some(name), true) => vec![name.clone()],
        (None, false) => spec.names.clone(),
    };

    for name in &names {
        if !is_valid_name(name) {
            return Err(ConfigError::InvalidOptionName(name.clone()));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::ReservedOptionName(name.clone()));
        }
    }

    if spec.env.iter().any(|var| var.is_empty()) {
        return Err(ConfigError::EmptyEnvName(names[0].clone()));
    }

    let option_type = registry.get(&spec.type_name)?;

    Ok(CompiledOption {
        spec: spec.clone(),
        names,
        option_type,
    })
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
