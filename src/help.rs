//! Help text generation for an option table.

use crate::config::{HelpConfig, NameSort};
use crate::table::{display_name, is_short, CompiledOption, OptionTable, TableEntryRef};

/// Render help text for every non-hidden option, in declaration order.
pub fn render(table: &OptionTable, config: &HelpConfig) -> String {
    let indent = config.indent.render();
    let heading_indent = config.effective_heading_indent();

    let option_lines: Vec<Option<String>> = table
        .entries()
        .map(|entry| match entry {
            TableEntryRef::Option(option) if !option.spec.hidden => {
                Some(format!("{}{}", indent, option_line(option, config.name_sort)))
            }
            _ => None,
        })
        .collect();

    let help_col = config.help_col.unwrap_or_else(|| {
        let widest = option_lines
            .iter()
            .flatten()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        (widest + 2).max(config.min_help_col).min(config.max_help_col)
    });
    let help_width = config.max_col.saturating_sub(help_col);

    let mut lines: Vec<String> = Vec::new();
    for (entry, line) in table.entries().zip(option_lines) {
        match entry {
            TableEntryRef::Group(label) => {
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                if !label.is_empty() {
                    lines.push(format!("{}{}", heading_indent, label));
                }
            }
            TableEntryRef::Option(option) => {
                let Some(line) = line else { continue };
                let text = help_text(option, config);
                let wrap = config.help_wrap && option.spec.help_wrap;
                let help_lines = if wrap {
                    wrap_text(&text, help_width)
                } else {
                    text.lines().map(str::to_string).collect()
                };
                layout_option(&mut lines, line, &help_lines, help_col);
            }
        }
    }

    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Names and argument placeholder, e.g. `-f, --file=FILE`.
fn option_line(option: &CompiledOption, name_sort: NameSort) -> String {
    let mut names: Vec<String> = option.names.iter().map(|n| display_name(n)).collect();
    if name_sort == NameSort::Length {
        names.sort_by_key(|n| n.chars().count());
    }

    let mut line = names.join(", ");
    if option.takes_arg() {
        let last_is_short = names.last().is_some_and(|n| !n.starts_with("--"));
        line.push(if last_is_short { ' ' } else { '=' });
        line.push_str(option.help_arg());
    }
    line
}

/// The option's help plus the configured environment and default suffixes.
fn help_text(option: &CompiledOption, config: &HelpConfig) -> String {
    let mut text = option.spec.help.clone().unwrap_or_default();

    if config.include_env && !option.spec.env.is_empty() {
        let assignment = if option.takes_arg() {
            option.help_arg().to_string()
        } else {
            "1".to_string()
        };
        let vars: Vec<String> = option
            .spec
            .env
            .iter()
            .map(|var| format!("{}={}", var, assignment))
            .collect();
        append_sentence(&mut text, &format!("Environment: {}.", vars.join(", ")));
    }

    if config.include_default {
        let default = match (&option.spec.default, &option.option_type.default) {
            (Some(raw), _) => serde_json::to_string(raw).ok(),
            (None, Some(value)) => serde_json::to_string(value).ok(),
            (None, None) => None,
        };
        if let Some(default) = default {
            append_sentence(&mut text, &format!("Default: {}.", default));
        }
    }

    text
}

fn append_sentence(text: &mut String, sentence: &str) {
    if !text.is_empty() && !text.ends_with(char::is_whitespace) {
        text.push(' ');
    }
    text.push_str(sentence);
}

fn layout_option(lines: &mut Vec<String>, line: String, help_lines: &[String], help_col: usize) {
    let Some((first, rest)) = help_lines.split_first() else {
        lines.push(line);
        return;
    };

    let pad = " ".repeat(help_col);
    if line.chars().count() < help_col {
        lines.push(format!("{:<width$}{}", line, first, width = help_col));
    } else {
        lines.push(line);
        lines.push(format!("{}{}", pad, first));
    }
    for help_line in rest {
        lines.push(format!("{}{}", pad, help_line));
    }
}

/// Greedy word wrap on whitespace. Words longer than `width` overflow.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }
    lines
}

/// One-line synopsis of an option, e.g. `[ -f FILE | --file=FILE ]`.
pub fn synopsis(option: &CompiledOption) -> String {
    let parts: Vec<String> = option
        .names
        .iter()
        .map(|name| {
            let mut part = display_name(name);
            if option.takes_arg() {
                part.push(if is_short(name) { ' ' } else { '=' });
                part.push_str(option.help_arg());
            }
            part
        })
        .collect();
    format!("[ {} ]", parts.join(" | "))
}
