//! Command descriptions: argument parsing and JSON/NDJSON files.
//!
//! The first argument is either a delimiter (two or more arguments) or the
//! path to a command descriptions file (exactly one argument). Files hold
//! either a JSON array of descriptions or NDJSON, one object per line.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::labels;

/// A status indicator: a Unicode form for emoji-capable hosts and an
/// ASCII fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub unicode: String,
    pub ascii: String,
}

/// One status rule: a regex matched against SGR-stripped output lines,
/// and the indicator it selects (`None` clears the status).
#[derive(Debug, Clone)]
pub struct StatusRule {
    pub regex: Regex,
    pub indicator: Option<Indicator>,
}

/// Everything needed to construct one command at startup.
#[derive(Debug, Clone)]
pub struct CommandDescription {
    /// Display title; defaults to the presentation form of `command`.
    pub title: String,
    /// Working directory, default `.`.
    pub cwd: String,
    /// Executable and arguments, passed verbatim (no shell).
    pub command: Vec<String>,
    /// Rules in file order; the last match in a chunk wins.
    pub status_rules: Vec<StatusRule>,
    /// Indicator shown before any rule has matched.
    pub default_status: Option<Indicator>,
}

/// Outcome of command-line parsing.
#[derive(Debug)]
pub enum ParsedArgs {
    /// Print help, exit 0.
    Help,
    /// A delimiter with nothing between: nothing to run, exit 0.
    NoCommands,
    Commands(Vec<CommandDescription>),
}

static SAFE_ARG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._,:/=@%+-]+$").unwrap());

/// Render a command vector the way a user would type it in a shell:
/// arguments containing anything outside the safe set are single-quoted,
/// literal single quotes become `\'`, an empty argument becomes `''`.
pub fn presentation_name(command: &[String]) -> String {
    command
        .iter()
        .map(|part| {
            if part.is_empty() {
                return "''".to_string();
            }
            part.split('\'')
                .map(|sub| {
                    if sub.is_empty() {
                        String::new()
                    } else if SAFE_ARG_REGEX.is_match(sub) {
                        sub.to_string()
                    } else {
                        format!("'{sub}'")
                    }
                })
                .collect::<Vec<_>>()
                .join("\\'")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn description_from_command(command: Vec<String>) -> CommandDescription {
    CommandDescription {
        title: presentation_name(&command),
        cwd: ".".to_string(),
        command,
        status_rules: Vec::new(),
        default_status: None,
    }
}

/// Parse the argument vector (without the program name).
pub fn parse_args(args: &[String]) -> AppResult<ParsedArgs> {
    match args {
        [] => Ok(ParsedArgs::Help),
        [flag] if flag == "-h" || flag == "--help" => Ok(ParsedArgs::Help),
        [path] => parse_file(path).map(ParsedArgs::Commands),
        [delimiter, rest @ ..] => {
            let commands = parse_delimited(delimiter, rest);
            if commands.is_empty() {
                Ok(ParsedArgs::NoCommands)
            } else {
                Ok(ParsedArgs::Commands(
                    commands.into_iter().map(description_from_command).collect(),
                ))
            }
        }
    }
}

/// Group the arguments into runs separated by the delimiter. Empty runs
/// are discarded.
fn parse_delimited(delimiter: &str, args: &[String]) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let mut current = Vec::new();
    for arg in args {
        if arg == delimiter {
            if !current.is_empty() {
                commands.push(std::mem::take(&mut current));
            }
        } else {
            current.push(arg.clone());
        }
    }
    if !current.is_empty() {
        commands.push(current);
    }
    commands
}

fn parse_file(path: &str) -> AppResult<Vec<CommandDescription>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "The first argument is either a delimiter between commands or the path to a command descriptions file.\n\
             Failed to read it as a file: {e}\n\
             If you meant a delimiter, pass at least one command after it."
        ))
    })?;
    parse_descriptions(&content)
}

/// Parse file content: JSON array when the first byte is `[`, NDJSON when
/// it is `{`.
pub fn parse_descriptions(content: &str) -> AppResult<Vec<CommandDescription>> {
    match content.trim_start().chars().next() {
        Some('[') => parse_json(content),
        Some('{') => parse_ndjson(content),
        first => Err(AppError::Config(format!(
            "Expected input to start with [ or {{ but got: {}",
            match first {
                Some(c) => c.to_string(),
                None => "nothing".to_string(),
            }
        ))),
    }
}

fn json_syntax_error(e: serde_json::Error) -> AppError {
    AppError::Config(format!(
        "Failed to read command descriptions file as JSON:\n{e}"
    ))
}

fn parse_json(content: &str) -> AppResult<Vec<CommandDescription>> {
    let value: Value = serde_json::from_str(content).map_err(json_syntax_error)?;
    let items = match value {
        Value::Array(items) => items,
        // Unreachable for well-formed JSON whose first byte is `[`.
        _ => {
            return Err(AppError::Config(
                "Failed to read command descriptions file as JSON:\nExpected an array".to_string(),
            ));
        }
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_item(item).map_err(|msg| AppError::Config(format!("Index {i}: {msg}")))
        })
        .collect()
}

fn parse_ndjson(content: &str) -> AppResult<Vec<CommandDescription>> {
    let mut descriptions = Vec::new();
    let mut index = 0;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            AppError::Config(format!(
                "Failed to read command descriptions file as JSON:\nLine {}: {e}",
                line_no + 1
            ))
        })?;
        let description = parse_item(&value)
            .map_err(|msg| AppError::Config(format!("Index {index}: {msg}")))?;
        descriptions.push(description);
        index += 1;
    }
    Ok(descriptions)
}

/// Validate one description object. Unknown keys are fatal.
fn parse_item(value: &Value) -> Result<CommandDescription, String> {
    let obj = value.as_object().ok_or("Expected an object")?;

    let mut title = None;
    let mut cwd = None;
    let mut command: Option<Vec<String>> = None;
    let mut status_rules = Vec::new();
    let mut default_status = None;

    for (key, val) in obj {
        match key.as_str() {
            "title" => {
                title = Some(
                    val.as_str()
                        .ok_or("title: Expected a string")?
                        .to_string(),
                );
            }
            "cwd" => {
                cwd = Some(val.as_str().ok_or("cwd: Expected a string")?.to_string());
            }
            "command" => {
                let arr = val
                    .as_array()
                    .filter(|a| !a.is_empty())
                    .ok_or("command: Expected a non-empty array")?;
                let parts = arr
                    .iter()
                    .enumerate()
                    .map(|(j, v)| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or(format!("command[{j}]: Expected a string"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                command = Some(parts);
            }
            "status" => {
                let map = val.as_object().ok_or("status: Expected an object")?;
                for (pattern, v) in map {
                    let regex = Regex::new(pattern).map_err(|e| {
                        format!("status[{pattern:?}]: This key is not a valid regex: {e}")
                    })?;
                    let indicator =
                        parse_indicator(v).map_err(|msg| format!("status[{pattern:?}]: {msg}"))?;
                    status_rules.push(StatusRule { regex, indicator });
                }
            }
            "defaultStatus" => {
                default_status =
                    parse_indicator(val).map_err(|msg| format!("defaultStatus: {msg}"))?;
            }
            other => return Err(format!("Unknown key: {other}")),
        }
    }

    let command = command.ok_or("command: Expected a non-empty array")?;
    Ok(CommandDescription {
        title: title.unwrap_or_else(|| presentation_name(&command)),
        cwd: cwd.unwrap_or_else(|| ".".to_string()),
        command,
        status_rules,
        default_status,
    })
}

/// `null` clears the status; otherwise a `[unicode, ascii]` pair.
fn parse_indicator(value: &Value) -> Result<Option<Indicator>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => match items.as_slice() {
            [Value::String(unicode), Value::String(ascii)] => Ok(Some(Indicator {
                unicode: unicode.clone(),
                ascii: ascii.clone(),
            })),
            _ => Err("Expected null or an array of two strings".to_string()),
        },
        _ => Err("Expected null or an array of two strings".to_string()),
    }
}

/// The help screen (zero arguments, `-h` or `--help`).
pub fn help_text() -> String {
    format!(
        "\
Run several commands concurrently.
Show output for one command at a time.
Kill all at once.

    [ctrl+z] dashboard
    [ctrl+c] kill focused command, or all commands from the dashboard
    [{labels}] focus command in the dashboard

Separate the commands with a character of choice:

    run-pty % npm start % make watch % some_command arg1 arg2

All arguments are strings passed as-is to the child - no shell execution.

Alternatively, describe the commands in a file and pass its path as the
only argument:

    run-pty run-pty.json

The file is a JSON array of descriptions, or NDJSON (one object per
line). Each description supports:

    command        required, non-empty array of strings
    title          optional display string for the dashboard
    cwd            optional working directory, default \".\"
    status         optional object mapping regexes to indicators
    defaultStatus  optional indicator shown before any regex matched

An indicator is null or a two-element array [unicode, ascii].

Environment variables:

    RUN_PTY_MAX_HISTORY
        Bytes of output to remember per command.
        Default: 1000000

    NO_COLOR
        Disable colored output and emoji.

    RUN_PTY_LOG
        Append internal diagnostics to this file.
",
        labels = labels::summarize(labels::ALPHABET.len()),
    )
}
